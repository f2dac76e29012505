//! SIE type 4 writer

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::fmt::Write as FmtWrite;
use std::io::Write;

use crate::config::ExportConfig;
use crate::encoding::encode;
use crate::sie::tags::SieTag;
use crate::sie::tokenizer::quote;
use crate::types::*;

/// Serializes [`SieData`] into SIE text
pub struct SieGenerator<'a> {
    config: &'a ExportConfig,
}

impl<'a> SieGenerator<'a> {
    pub fn new(config: &'a ExportConfig) -> Self {
        Self { config }
    }

    /// Render the whole file as text
    pub fn generate(&self, data: &SieData) -> String {
        let mut out = String::new();
        self.header(&mut out, &data.header);
        self.konton(&mut out, data);
        self.balanser(&mut out, data);
        for ver in &data.verifikationer {
            self.verifikation(&mut out, ver);
        }
        out
    }

    /// Render the file as CP850 bytes, which is what `#FORMAT PC8` promises
    pub fn generate_bytes(&self, data: &SieData) -> Vec<u8> {
        encode(&self.generate(data))
    }

    /// Write CP850 bytes to a writer
    pub fn write_to<W: Write>(&self, mut w: W, data: &SieData) -> SieResult<()> {
        w.write_all(&self.generate_bytes(data))?;
        Ok(())
    }

    fn header(&self, out: &mut String, header: &SieHeader) {
        line(out, SieTag::Flagga, &[header.flagga.unwrap_or(0).to_string()]);
        line(out, SieTag::Format, &["PC8".to_string()]);
        line(out, SieTag::SieTyp, &[header.sie_typ.unwrap_or(4).to_string()]);
        line(
            out,
            SieTag::Program,
            &[
                quote(&self.config.program_name),
                quote(&self.config.program_version),
            ],
        );
        let generated = header
            .generated
            .unwrap_or_else(|| chrono::Utc::now().date_naive());
        line(out, SieTag::Gen, &[format_date(generated)]);

        if let Some(fnr) = &header.foretagsnummer {
            line(out, SieTag::Fnr, &[quote(fnr)]);
        }
        if let Some(orgnr) = &header.organisationsnummer {
            line(out, SieTag::OrgNr, &[quote(orgnr)]);
        }
        if let Some(namn) = &header.foretagsnamn {
            line(out, SieTag::Fnamn, &[quote(namn)]);
        }

        let mut years = header.rakenskapsar.clone();
        years.sort_by(|a, b| b.arsnr.cmp(&a.arsnr));
        for rar in years {
            line(
                out,
                SieTag::Rar,
                &[
                    rar.arsnr.to_string(),
                    format_date(rar.start),
                    format_date(rar.slut),
                ],
            );
        }

        if let Some(kptyp) = &header.kontoplan {
            line(out, SieTag::Kptyp, &[quote(kptyp)]);
        }
        if let Some(valuta) = &header.valuta {
            line(out, SieTag::Valuta, &[quote(valuta)]);
        }
    }

    fn konton(&self, out: &mut String, data: &SieData) {
        for konto in data.konton.values() {
            line(out, SieTag::Konto, &[quote(&konto.nummer), quote(&konto.namn)]);
        }
        for konto in data.konton.values() {
            if let Some(typ) = konto.typ {
                line(out, SieTag::Ktyp, &[quote(&konto.nummer), typ.code().to_string()]);
            }
        }
        for konto in data.konton.values() {
            if let Some(sru) = &konto.sru {
                line(out, SieTag::Sru, &[quote(&konto.nummer), quote(sru)]);
            }
        }
    }

    fn balanser(&self, out: &mut String, data: &SieData) {
        for post in &data.balanser.ingaende {
            line(out, SieTag::Ib, &self.post(post.arsnr, &post.konto, &post.belopp));
        }
        for post in &data.balanser.utgaende {
            line(out, SieTag::Ub, &self.post(post.arsnr, &post.konto, &post.belopp));
        }
        for post in &data.resultat {
            line(out, SieTag::Res, &self.post(post.arsnr, &post.konto, &post.belopp));
        }
    }

    fn post(&self, arsnr: i32, konto: &str, belopp: &BigDecimal) -> [String; 3] {
        [arsnr.to_string(), quote(konto), self.amount(belopp)]
    }

    fn verifikation(&self, out: &mut String, ver: &Verifikation) {
        let serie = if ver.serie.is_empty() {
            &self.config.default_series
        } else {
            &ver.serie
        };

        let mut fields = vec![
            quote(serie),
            quote(&ver.nummer),
            format_date(ver.datum),
            quote(&ver.text),
        ];
        if let Some(regdatum) = ver.regdatum {
            fields.push(format_date(regdatum));
        }
        line(out, SieTag::Ver, &fields);
        out.push_str("{\n");

        for trans in &ver.transaktioner {
            let objekt = trans
                .objekt
                .iter()
                .map(|o| quote(o))
                .collect::<Vec<_>>()
                .join(" ");
            let mut fields = vec![
                quote(&trans.konto),
                format!("{{{}}}", objekt),
                self.amount(&trans.belopp),
            ];

            // trailing optional fields are positional
            let tail = [
                trans.datum.map(format_date),
                trans.text.as_deref().map(quote),
                trans.kvantitet.as_ref().map(|k| k.normalized().to_string()),
            ];
            let used = tail.iter().rposition(Option::is_some).map_or(0, |i| i + 1);
            fields.extend(
                tail.into_iter()
                    .take(used)
                    .map(|f| f.unwrap_or_else(|| "\"\"".to_string())),
            );

            out.push_str("   ");
            line(out, SieTag::Trans, &fields);
        }
        out.push_str("}\n");
    }

    fn amount(&self, belopp: &BigDecimal) -> String {
        format_amount(belopp, self.config.decimal_places)
    }
}

/// Render an amount with a fixed number of decimals and `.` as separator
pub fn format_amount(belopp: &BigDecimal, decimals: u32) -> String {
    let scale = i64::from(decimals);
    belopp.round(scale).with_scale(scale).to_string()
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

fn line(out: &mut String, tag: SieTag, fields: &[String]) {
    let _ = write!(out, "{}", tag);
    for field in fields {
        let _ = write!(out, " {}", field);
    }
    out.push('\n');
}
