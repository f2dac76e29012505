//! SIE record tags

use std::fmt;

/// Every tag the parser understands.
///
/// Tags listed under "known but ignored" are valid SIE but carry data this
/// crate does not materialise (addresses, dimensions, period balances, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SieTag {
    Flagga,
    Program,
    Format,
    Gen,
    SieTyp,
    Fnr,
    OrgNr,
    Fnamn,
    Rar,
    Kptyp,
    Valuta,
    Konto,
    Ktyp,
    Sru,
    Ib,
    Ub,
    Res,
    Ver,
    Trans,
    // known but ignored
    Adress,
    Taxar,
    Omfattn,
    Prosa,
    Ftyp,
    Bkod,
    Dim,
    Underdim,
    Objekt,
    Enhet,
    Oib,
    Oub,
    Psaldo,
    Pbudget,
    Ksumma,
    Rtrans,
    Btrans,
}

impl SieTag {
    /// Parse a tag including its leading `#`
    pub fn parse(tag: &str) -> Option<Self> {
        let name = tag.strip_prefix('#')?;
        let tag = match name.to_ascii_uppercase().as_str() {
            "FLAGGA" => SieTag::Flagga,
            "PROGRAM" => SieTag::Program,
            "FORMAT" => SieTag::Format,
            "GEN" => SieTag::Gen,
            "SIETYP" => SieTag::SieTyp,
            "FNR" => SieTag::Fnr,
            "ORGNR" => SieTag::OrgNr,
            "FNAMN" => SieTag::Fnamn,
            "RAR" => SieTag::Rar,
            "KPTYP" => SieTag::Kptyp,
            "VALUTA" => SieTag::Valuta,
            "KONTO" => SieTag::Konto,
            "KTYP" => SieTag::Ktyp,
            "SRU" => SieTag::Sru,
            "IB" => SieTag::Ib,
            "UB" => SieTag::Ub,
            "RES" => SieTag::Res,
            "VER" => SieTag::Ver,
            "TRANS" => SieTag::Trans,
            "ADRESS" => SieTag::Adress,
            "TAXAR" => SieTag::Taxar,
            "OMFATTN" => SieTag::Omfattn,
            "PROSA" => SieTag::Prosa,
            "FTYP" => SieTag::Ftyp,
            "BKOD" => SieTag::Bkod,
            "DIM" => SieTag::Dim,
            "UNDERDIM" => SieTag::Underdim,
            "OBJEKT" => SieTag::Objekt,
            "ENHET" => SieTag::Enhet,
            "OIB" => SieTag::Oib,
            "OUB" => SieTag::Oub,
            "PSALDO" => SieTag::Psaldo,
            "PBUDGET" => SieTag::Pbudget,
            "KSUMMA" => SieTag::Ksumma,
            "RTRANS" => SieTag::Rtrans,
            "BTRANS" => SieTag::Btrans,
            _ => return None,
        };
        Some(tag)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SieTag::Flagga => "#FLAGGA",
            SieTag::Program => "#PROGRAM",
            SieTag::Format => "#FORMAT",
            SieTag::Gen => "#GEN",
            SieTag::SieTyp => "#SIETYP",
            SieTag::Fnr => "#FNR",
            SieTag::OrgNr => "#ORGNR",
            SieTag::Fnamn => "#FNAMN",
            SieTag::Rar => "#RAR",
            SieTag::Kptyp => "#KPTYP",
            SieTag::Valuta => "#VALUTA",
            SieTag::Konto => "#KONTO",
            SieTag::Ktyp => "#KTYP",
            SieTag::Sru => "#SRU",
            SieTag::Ib => "#IB",
            SieTag::Ub => "#UB",
            SieTag::Res => "#RES",
            SieTag::Ver => "#VER",
            SieTag::Trans => "#TRANS",
            SieTag::Adress => "#ADRESS",
            SieTag::Taxar => "#TAXAR",
            SieTag::Omfattn => "#OMFATTN",
            SieTag::Prosa => "#PROSA",
            SieTag::Ftyp => "#FTYP",
            SieTag::Bkod => "#BKOD",
            SieTag::Dim => "#DIM",
            SieTag::Underdim => "#UNDERDIM",
            SieTag::Objekt => "#OBJEKT",
            SieTag::Enhet => "#ENHET",
            SieTag::Oib => "#OIB",
            SieTag::Oub => "#OUB",
            SieTag::Psaldo => "#PSALDO",
            SieTag::Pbudget => "#PBUDGET",
            SieTag::Ksumma => "#KSUMMA",
            SieTag::Rtrans => "#RTRANS",
            SieTag::Btrans => "#BTRANS",
        }
    }

    /// Tags that describe the file and company rather than ledger data
    pub fn is_header(&self) -> bool {
        matches!(
            self,
            SieTag::Flagga
                | SieTag::Program
                | SieTag::Format
                | SieTag::Gen
                | SieTag::SieTyp
                | SieTag::Fnr
                | SieTag::OrgNr
                | SieTag::Fnamn
                | SieTag::Rar
                | SieTag::Kptyp
                | SieTag::Valuta
                | SieTag::Adress
                | SieTag::Taxar
                | SieTag::Omfattn
                | SieTag::Prosa
                | SieTag::Ftyp
                | SieTag::Bkod
        )
    }

    /// Tags that are accepted and skipped
    pub fn is_ignored(&self) -> bool {
        matches!(
            self,
            SieTag::Adress
                | SieTag::Taxar
                | SieTag::Omfattn
                | SieTag::Prosa
                | SieTag::Ftyp
                | SieTag::Bkod
                | SieTag::Dim
                | SieTag::Underdim
                | SieTag::Objekt
                | SieTag::Enhet
                | SieTag::Oib
                | SieTag::Oub
                | SieTag::Psaldo
                | SieTag::Pbudget
                | SieTag::Ksumma
                | SieTag::Rtrans
                | SieTag::Btrans
        )
    }
}

impl fmt::Display for SieTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
