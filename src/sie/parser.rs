//! Line-based SIE parser
//!
//! Each non-blank line starts with a `#TAG`. Verifications open a block with
//! `{`, contain `#TRANS` lines and close with `}`. A malformed line becomes a
//! [`ParseWarning`] and parsing carries on with the next line; only input with
//! no readable SIE record at all is fatal.

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::str::FromStr;
use tracing::{debug, info};

use crate::encoding::{decode_auto, SNIFF_PREFIX_LEN};
use crate::sie::tags::SieTag;
use crate::sie::tokenizer::{tokenize, Field};
use crate::types::*;

/// Parsed data together with every recoverable problem found on the way
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    pub data: SieData,
    pub warnings: Vec<ParseWarning>,
}

impl ParseOutcome {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Parse decoded SIE text
pub fn parse(text: &str) -> SieResult<ParseOutcome> {
    SieParser::default().run(text)
}

/// Decode uploaded bytes and parse them
pub fn parse_bytes(bytes: &[u8]) -> SieResult<ParseOutcome> {
    parse(&decode_auto(bytes, SNIFF_PREFIX_LEN))
}

/// Parse an amount written with either `,` or `.` as decimal separator
pub fn parse_amount(value: &str) -> Option<BigDecimal> {
    let value = value.trim();
    let value = value.strip_prefix('+').unwrap_or(value);
    if value.is_empty()
        || !value
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
    {
        return None;
    }
    BigDecimal::from_str(&value.replace(',', ".")).ok()
}

/// Parse a `YYYYMMDD` date (`YYYY-MM-DD` is tolerated)
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    match value.len() {
        8 if value.chars().all(|c| c.is_ascii_digit()) => {
            NaiveDate::parse_from_str(value, "%Y%m%d").ok()
        }
        10 => NaiveDate::parse_from_str(value, "%Y-%m-%d").ok(),
        _ => None,
    }
}

/// State of the verification block currently being read
#[derive(Debug, Default)]
enum Block {
    #[default]
    Closed,
    Open {
        verifikation: Verifikation,
        brace_seen: bool,
    },
    /// The `#VER` line was malformed; skip its lines until the block ends
    Skipping,
}

#[derive(Debug, Default)]
struct SieParser {
    data: SieData,
    warnings: Vec<ParseWarning>,
    block: Block,
    recognised: usize,
    /// Header lines seen and header lines that could be read
    headers_seen: usize,
    headers_read: usize,
}

type LineResult = Result<(), String>;

impl SieParser {
    fn run(mut self, text: &str) -> SieResult<ParseOutcome> {
        if text.trim().is_empty() {
            return Err(SieError::Fatal("filen är tom".to_string()));
        }

        let mut last_line = 0;
        for (idx, raw) in text.lines().enumerate() {
            last_line = idx + 1;
            self.line(idx + 1, raw);
        }
        self.finish_block(last_line, "");

        if self.recognised == 0 {
            return Err(SieError::Fatal(
                "ingen läsbar SIE-post hittades i filen".to_string(),
            ));
        }
        if self.headers_seen > 0 && self.headers_read == 0 {
            return Err(SieError::Fatal(format!(
                "filhuvudet är oläsbart: ingen av {} huvudrader kunde läsas",
                self.headers_seen
            )));
        }

        self.fill_missing_names();

        info!(
            konton = self.data.konton.len(),
            verifikationer = self.data.verifikationer.len(),
            ingaende = self.data.balanser.ingaende.len(),
            utgaende = self.data.balanser.utgaende.len(),
            resultat = self.data.resultat.len(),
            varningar = self.warnings.len(),
            "parsed SIE file"
        );

        Ok(ParseOutcome {
            data: self.data,
            warnings: self.warnings,
        })
    }

    fn warn(&mut self, line: usize, raw: &str, message: impl Into<String>) {
        let warning = ParseWarning {
            line,
            raw: raw.trim().to_string(),
            message: message.into(),
        };
        debug!(line = warning.line, message = %warning.message, "skipping SIE line");
        self.warnings.push(warning);
    }

    fn line(&mut self, line_no: usize, raw: &str) {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return;
        }

        match trimmed {
            "{" => return self.open_brace(line_no, raw),
            "}" => return self.close_brace(line_no, raw),
            _ => {}
        }

        let fields = match tokenize(trimmed) {
            Ok(fields) => fields,
            Err(message) => {
                let tag = trimmed.split_whitespace().next().and_then(SieTag::parse);
                if tag.is_some_and(|t| t.is_header()) {
                    self.headers_seen += 1;
                }
                if !matches!(self.block, Block::Skipping) {
                    self.warn(line_no, raw, message);
                }
                return;
            }
        };

        let Some(tag_field) = fields.first().and_then(Field::as_text) else {
            return self.warn(line_no, raw, "raden saknar tagg");
        };
        let Some(tag) = SieTag::parse(tag_field) else {
            let message = if tag_field.starts_with('#') {
                format!("okänd tagg {}", tag_field)
            } else {
                "raden saknar tagg".to_string()
            };
            return self.warn(line_no, raw, message);
        };
        let args = &fields[1..];

        if matches!(tag, SieTag::Trans | SieTag::Rtrans | SieTag::Btrans) {
            return self.transaction_line(line_no, raw, tag, args);
        }

        // Any other tag ends an open block
        self.finish_block(line_no, raw);

        let result = self.record(line_no, raw, tag, args);
        if tag.is_header() {
            self.headers_seen += 1;
            if result.is_ok() {
                self.headers_read += 1;
            }
        }
        match result {
            Ok(()) => self.recognised += 1,
            Err(message) => {
                if tag == SieTag::Ver {
                    self.block = Block::Skipping;
                }
                self.warn(line_no, raw, format!("{}: {}", tag, message));
            }
        }
    }

    fn record(&mut self, line_no: usize, raw: &str, tag: SieTag, args: &[Field]) -> LineResult {
        match tag {
            SieTag::Flagga => self.flagga(args),
            SieTag::Program => self.program(args),
            SieTag::Format => {
                self.data.header.format = Some(text_arg(args, 0, "format")?);
                Ok(())
            }
            SieTag::Gen => self.gen(args),
            SieTag::SieTyp => self.sie_typ(args),
            SieTag::Fnr => {
                self.data.header.foretagsnummer = Some(text_arg(args, 0, "företags-id")?);
                Ok(())
            }
            SieTag::OrgNr => {
                self.data.header.organisationsnummer =
                    Some(text_arg(args, 0, "organisationsnummer")?);
                Ok(())
            }
            SieTag::Fnamn => {
                self.data.header.foretagsnamn = Some(text_arg(args, 0, "företagsnamn")?);
                Ok(())
            }
            SieTag::Rar => self.rar(args),
            SieTag::Kptyp => {
                self.data.header.kontoplan = Some(text_arg(args, 0, "kontoplanstyp")?);
                Ok(())
            }
            SieTag::Valuta => {
                self.data.header.valuta = Some(text_arg(args, 0, "valutakod")?);
                Ok(())
            }
            SieTag::Konto => self.konto(line_no, raw, args),
            SieTag::Ktyp => self.ktyp(args),
            SieTag::Sru => self.sru(args),
            SieTag::Ib => self.balans(BalansTyp::Ingaende, args),
            SieTag::Ub => self.balans(BalansTyp::Utgaende, args),
            SieTag::Res => self.resultat(args),
            SieTag::Ver => self.ver(line_no, args),
            // handled by transaction_line
            SieTag::Trans | SieTag::Rtrans | SieTag::Btrans => Ok(()),
            _ => Ok(()),
        }
    }

    fn open_brace(&mut self, line_no: usize, raw: &str) {
        match &mut self.block {
            Block::Open { brace_seen, .. } if !*brace_seen => {
                *brace_seen = true;
                return;
            }
            Block::Skipping => return,
            _ => {}
        }
        self.warn(line_no, raw, "oväntad '{'");
    }

    fn close_brace(&mut self, line_no: usize, raw: &str) {
        match std::mem::take(&mut self.block) {
            Block::Open {
                verifikation,
                brace_seen: true,
            } => self.data.verifikationer.push(verifikation),
            Block::Open {
                verifikation,
                brace_seen: false,
            } => {
                self.warn(line_no, raw, "oväntad '}'");
                self.data.verifikationer.push(verifikation);
            }
            Block::Skipping => {}
            Block::Closed => self.warn(line_no, raw, "oväntad '}'"),
        }
    }

    /// Close an open verification when a top-level tag or end of file is seen
    fn finish_block(&mut self, line_no: usize, raw: &str) {
        match std::mem::take(&mut self.block) {
            Block::Open {
                verifikation,
                brace_seen,
            } => {
                let message = if brace_seen {
                    format!("verifikation {} saknar avslutande '}}'", verifikation.key())
                } else {
                    format!("verifikation {} saknar transaktionsblock", verifikation.key())
                };
                self.warn(line_no, raw, message);
                self.data.verifikationer.push(verifikation);
            }
            Block::Skipping | Block::Closed => {}
        }
    }

    fn transaction_line(&mut self, line_no: usize, raw: &str, tag: SieTag, args: &[Field]) {
        match self.block {
            Block::Skipping => return,
            Block::Closed => {
                return self.warn(line_no, raw, format!("{} utanför verifikation", tag));
            }
            Block::Open { .. } => {}
        }

        if tag != SieTag::Trans {
            // #RTRANS is always followed by an identical #TRANS,
            // #BTRANS describes a removed row
            self.recognised += 1;
            return;
        }

        match trans(args) {
            Ok(transaktion) => {
                if let Block::Open { verifikation, .. } = &mut self.block {
                    verifikation.transaktioner.push(transaktion);
                }
                self.recognised += 1;
            }
            Err(message) => self.warn(line_no, raw, format!("{}: {}", tag, message)),
        }
    }

    fn flagga(&mut self, args: &[Field]) -> LineResult {
        let value = text_arg(args, 0, "flagga")?;
        let flagga = value
            .parse::<u8>()
            .map_err(|_| format!("ogiltig flagga '{}'", value))?;
        self.data.header.flagga = Some(flagga);
        Ok(())
    }

    fn program(&mut self, args: &[Field]) -> LineResult {
        let namn = text_arg(args, 0, "programnamn")?;
        let version = opt_text(args, 1);
        self.data.header.program = Some(Program { namn, version });
        Ok(())
    }

    fn gen(&mut self, args: &[Field]) -> LineResult {
        self.data.header.generated = Some(date_arg(args, 0, "datum")?);
        Ok(())
    }

    fn sie_typ(&mut self, args: &[Field]) -> LineResult {
        let value = text_arg(args, 0, "typnummer")?;
        let typ = value
            .parse::<u8>()
            .ok()
            .filter(|t| (1..=4).contains(t))
            .ok_or_else(|| format!("ogiltig SIE-typ '{}'", value))?;
        self.data.header.sie_typ = Some(typ);
        Ok(())
    }

    fn rar(&mut self, args: &[Field]) -> LineResult {
        let arsnr = arsnr_arg(args, 0)?;
        let start = date_arg(args, 1, "startdatum")?;
        let slut = date_arg(args, 2, "slutdatum")?;
        if slut < start {
            return Err(format!("slutdatum {} före startdatum {}", slut, start));
        }

        let rar = Rakenskapsar { arsnr, start, slut };
        let years = &mut self.data.header.rakenskapsar;
        match years.iter_mut().find(|r| r.arsnr == arsnr) {
            Some(existing) => *existing = rar,
            None => years.push(rar),
        }
        Ok(())
    }

    fn konto_entry(&mut self, nummer: &str) -> &mut Konto {
        self.data
            .konton
            .entry(nummer.to_string())
            .or_insert_with(|| Konto::new(nummer, ""))
    }

    fn konto(&mut self, line_no: usize, raw: &str, args: &[Field]) -> LineResult {
        let nummer = text_arg(args, 0, "kontonummer")?;
        let namn = opt_text(args, 1).unwrap_or_default();
        if nummer.trim().is_empty() {
            return Err("tomt kontonummer".to_string());
        }

        let redefined = self
            .data
            .konton
            .get(&nummer)
            .is_some_and(|k| !k.namn.is_empty());
        if redefined {
            self.warn(
                line_no,
                raw,
                format!("konto {} definieras mer än en gång, sista definitionen används", nummer),
            );
        }
        self.konto_entry(&nummer).namn = namn;
        Ok(())
    }

    fn ktyp(&mut self, args: &[Field]) -> LineResult {
        let nummer = text_arg(args, 0, "kontonummer")?;
        let code = text_arg(args, 1, "kontotyp")?;
        let typ = KontoTyp::from_code(&code).ok_or_else(|| format!("okänd kontotyp '{}'", code))?;
        self.konto_entry(&nummer).typ = Some(typ);
        Ok(())
    }

    fn sru(&mut self, args: &[Field]) -> LineResult {
        let nummer = text_arg(args, 0, "kontonummer")?;
        let sru = text_arg(args, 1, "SRU-kod")?;
        self.konto_entry(&nummer).sru = Some(sru);
        Ok(())
    }

    fn balans(&mut self, typ: BalansTyp, args: &[Field]) -> LineResult {
        let arsnr = arsnr_arg(args, 0)?;
        let konto = text_arg(args, 1, "kontonummer")?;
        let belopp = amount_arg(args, 2)?;
        let post = BalansPost {
            arsnr,
            konto,
            belopp,
        };

        let list = match typ {
            BalansTyp::Ingaende => &mut self.data.balanser.ingaende,
            BalansTyp::Utgaende => &mut self.data.balanser.utgaende,
        };
        // one amount per account and year
        match list
            .iter_mut()
            .find(|p| p.arsnr == post.arsnr && p.konto == post.konto)
        {
            Some(existing) => *existing = post,
            None => list.push(post),
        }
        Ok(())
    }

    fn resultat(&mut self, args: &[Field]) -> LineResult {
        let arsnr = arsnr_arg(args, 0)?;
        let konto = text_arg(args, 1, "kontonummer")?;
        let belopp = amount_arg(args, 2)?;
        let post = ResultatPost {
            arsnr,
            konto,
            belopp,
        };

        let list = &mut self.data.resultat;
        match list
            .iter_mut()
            .find(|p| p.arsnr == post.arsnr && p.konto == post.konto)
        {
            Some(existing) => *existing = post,
            None => list.push(post),
        }
        Ok(())
    }

    fn ver(&mut self, line_no: usize, args: &[Field]) -> LineResult {
        let serie = text_arg(args, 0, "serie")?;
        let nummer = text_arg(args, 1, "verifikationsnummer")?;
        if nummer.trim().is_empty() {
            return Err("verifikationsnummer saknas".to_string());
        }
        let datum = date_arg(args, 2, "verifikationsdatum")?;
        let text = opt_text(args, 3).unwrap_or_default();
        let regdatum = match opt_text(args, 4) {
            Some(value) => Some(parse_date(&value).ok_or_else(|| format!("ogiltigt registreringsdatum '{}'", value))?),
            None => None,
        };

        let mut verifikation = Verifikation::new(serie, nummer, datum, text);
        verifikation.regdatum = regdatum;
        verifikation.rad = line_no;
        self.block = Block::Open {
            verifikation,
            brace_seen: false,
        };
        Ok(())
    }

    /// Accounts that only appeared in `#KTYP`/`#SRU` get a generated name
    fn fill_missing_names(&mut self) {
        let unnamed: Vec<String> = self
            .data
            .konton
            .values()
            .filter(|k| k.namn.is_empty())
            .map(|k| k.nummer.clone())
            .collect();
        for nummer in unnamed {
            if let Some(konto) = self.data.konton.get_mut(&nummer) {
                konto.namn = format!("Konto {}", nummer);
            }
        }
    }
}

fn trans(args: &[Field]) -> Result<Transaktion, String> {
    let konto = text_arg(args, 0, "kontonummer")?;
    if konto.trim().is_empty() {
        return Err("tomt kontonummer".to_string());
    }

    // The object list is mandatory in the format but some writers omit it
    let (objekt, rest) = match args.get(1) {
        Some(Field::List(items)) => (items.clone(), &args[2..]),
        _ => (Vec::new(), args.get(1..).unwrap_or(&[])),
    };

    let belopp = amount_arg(rest, 0)?;
    let datum = match opt_text(rest, 1) {
        Some(value) => Some(parse_date(&value).ok_or_else(|| format!("ogiltigt transaktionsdatum '{}'", value))?),
        None => None,
    };
    let text = opt_text(rest, 2);
    let kvantitet = match opt_text(rest, 3) {
        Some(value) => Some(parse_amount(&value).ok_or_else(|| format!("ogiltig kvantitet '{}'", value))?),
        None => None,
    };

    Ok(Transaktion {
        konto,
        belopp,
        datum,
        text,
        objekt,
        kvantitet,
    })
}

fn text_arg(args: &[Field], index: usize, name: &str) -> Result<String, String> {
    args.get(index)
        .and_then(Field::as_text)
        .map(str::to_string)
        .ok_or_else(|| format!("{} saknas", name))
}

/// Optional trailing text field; empty strings count as absent
fn opt_text(args: &[Field], index: usize) -> Option<String> {
    args.get(index)
        .and_then(Field::as_text)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn date_arg(args: &[Field], index: usize, name: &str) -> Result<NaiveDate, String> {
    let value = text_arg(args, index, name)?;
    parse_date(&value).ok_or_else(|| format!("ogiltigt {} '{}'", name, value))
}

fn amount_arg(args: &[Field], index: usize) -> Result<BigDecimal, String> {
    let value = text_arg(args, index, "belopp")?;
    parse_amount(&value).ok_or_else(|| format!("ogiltigt belopp '{}'", value))
}

fn arsnr_arg(args: &[Field], index: usize) -> Result<i32, String> {
    let value = text_arg(args, index, "årsnummer")?;
    value
        .parse::<i32>()
        .map_err(|_| format!("ogiltigt årsnummer '{}'", value))
}
