//! Core types and data structures for SIE interchange

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use uuid::Uuid;

/// Account types as declared by `#KTYP`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KontoTyp {
    /// Tillgång - asset (`T`)
    Tillgang,
    /// Skuld - liability or equity (`S`)
    Skuld,
    /// Intäkt - income (`I`)
    Intakt,
    /// Kostnad - expense (`K`)
    Kostnad,
}

impl KontoTyp {
    /// Parse the single-letter SIE code
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "T" => Some(KontoTyp::Tillgang),
            "S" => Some(KontoTyp::Skuld),
            "I" => Some(KontoTyp::Intakt),
            "K" => Some(KontoTyp::Kostnad),
            _ => None,
        }
    }

    /// The single-letter SIE code
    pub fn code(&self) -> &'static str {
        match self {
            KontoTyp::Tillgang => "T",
            KontoTyp::Skuld => "S",
            KontoTyp::Intakt => "I",
            KontoTyp::Kostnad => "K",
        }
    }

    /// Infer the type from the BAS account class (first digit)
    pub fn from_bas(nummer: &str) -> Option<Self> {
        match nummer.chars().next()? {
            '1' => Some(KontoTyp::Tillgang),
            '2' => Some(KontoTyp::Skuld),
            '3' => Some(KontoTyp::Intakt),
            '4'..='8' => Some(KontoTyp::Kostnad),
            _ => None,
        }
    }
}

/// Ledger account (`#KONTO`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Konto {
    /// Account number, typically four BAS digits
    pub nummer: String,
    /// Display name
    pub namn: String,
    /// Declared type, if any
    pub typ: Option<KontoTyp>,
    /// SRU code for tax reporting
    pub sru: Option<String>,
}

impl Konto {
    /// Create a new account
    pub fn new(nummer: impl Into<String>, namn: impl Into<String>) -> Self {
        Self {
            nummer: nummer.into(),
            namn: namn.into(),
            typ: None,
            sru: None,
        }
    }

    /// Declared type, falling back to the BAS class
    pub fn effective_typ(&self) -> Option<KontoTyp> {
        self.typ.or_else(|| KontoTyp::from_bas(&self.nummer))
    }
}

/// Program that produced the file (`#PROGRAM`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub namn: String,
    pub version: Option<String>,
}

/// Fiscal year declaration (`#RAR`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rakenskapsar {
    /// 0 is the current year, -1 the previous one and so on
    pub arsnr: i32,
    pub start: NaiveDate,
    pub slut: NaiveDate,
}

/// File header
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SieHeader {
    pub flagga: Option<u8>,
    pub program: Option<Program>,
    pub format: Option<String>,
    pub generated: Option<NaiveDate>,
    pub sie_typ: Option<u8>,
    pub foretagsnummer: Option<String>,
    pub organisationsnummer: Option<String>,
    pub foretagsnamn: Option<String>,
    pub rakenskapsar: Vec<Rakenskapsar>,
    /// Chart-of-accounts identifier (`#KPTYP`)
    pub kontoplan: Option<String>,
    pub valuta: Option<String>,
}

impl SieHeader {
    /// Fiscal year with the given index
    pub fn rakenskapsar(&self, arsnr: i32) -> Option<&Rakenskapsar> {
        self.rakenskapsar.iter().find(|r| r.arsnr == arsnr)
    }
}

/// Compound identity of a verification
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VerificationKey {
    pub serie: String,
    pub nummer: String,
}

impl VerificationKey {
    pub fn new(serie: impl Into<String>, nummer: impl Into<String>) -> Self {
        Self {
            serie: serie.into(),
            nummer: nummer.into(),
        }
    }
}

impl fmt::Display for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.serie, self.nummer)
    }
}

/// Transaction line within a verification (`#TRANS`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaktion {
    pub konto: String,
    /// Positive is debit, negative is credit
    pub belopp: BigDecimal,
    pub datum: Option<NaiveDate>,
    pub text: Option<String>,
    /// Object list as raw `dimension object` pairs
    pub objekt: Vec<String>,
    pub kvantitet: Option<BigDecimal>,
}

impl Transaktion {
    /// Create a transaction line with only account and amount
    pub fn new(konto: impl Into<String>, belopp: BigDecimal) -> Self {
        Self {
            konto: konto.into(),
            belopp,
            datum: None,
            text: None,
            objekt: Vec::new(),
            kvantitet: None,
        }
    }

    pub fn is_debit(&self) -> bool {
        self.belopp > BigDecimal::from(0)
    }
}

/// Journal entry (`#VER`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verifikation {
    pub serie: String,
    pub nummer: String,
    pub datum: NaiveDate,
    pub text: String,
    pub regdatum: Option<NaiveDate>,
    pub transaktioner: Vec<Transaktion>,
    /// Source line of the `#VER` tag, 0 when not parsed from a file
    #[serde(default)]
    pub rad: usize,
}

impl Verifikation {
    /// Create a new verification without transaction lines
    pub fn new(
        serie: impl Into<String>,
        nummer: impl Into<String>,
        datum: NaiveDate,
        text: impl Into<String>,
    ) -> Self {
        Self {
            serie: serie.into(),
            nummer: nummer.into(),
            datum,
            text: text.into(),
            regdatum: None,
            transaktioner: Vec::new(),
            rad: 0,
        }
    }

    /// Add a transaction line
    pub fn with_transaktion(mut self, konto: impl Into<String>, belopp: BigDecimal) -> Self {
        self.transaktioner.push(Transaktion::new(konto, belopp));
        self
    }

    pub fn key(&self) -> VerificationKey {
        VerificationKey::new(self.serie.clone(), self.nummer.clone())
    }

    /// Sum of all transaction amounts
    pub fn summa(&self) -> BigDecimal {
        self.transaktioner.iter().map(|t| &t.belopp).sum()
    }

    /// Check if the verification is balanced (amounts sum to zero)
    pub fn is_balanced(&self) -> bool {
        self.summa() == BigDecimal::from(0)
    }

    /// Total of the debit side
    pub fn omslutning(&self) -> BigDecimal {
        self.transaktioner
            .iter()
            .filter(|t| t.is_debit())
            .map(|t| &t.belopp)
            .sum()
    }

    /// Every account number referenced by the transaction lines
    pub fn konton(&self) -> impl Iterator<Item = &str> {
        self.transaktioner.iter().map(|t| t.konto.as_str())
    }
}

/// Opening or closing balance for one account (`#IB` / `#UB`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalansPost {
    pub arsnr: i32,
    pub konto: String,
    pub belopp: BigDecimal,
}

/// Income-statement figure for one account (`#RES`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultatPost {
    pub arsnr: i32,
    pub konto: String,
    pub belopp: BigDecimal,
}

/// Balance direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BalansTyp {
    Ingaende,
    Utgaende,
}

/// Opening and closing balances
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Balanser {
    pub ingaende: Vec<BalansPost>,
    pub utgaende: Vec<BalansPost>,
}

/// Root parse result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SieData {
    pub header: SieHeader,
    pub konton: BTreeMap<String, Konto>,
    pub verifikationer: Vec<Verifikation>,
    pub balanser: Balanser,
    pub resultat: Vec<ResultatPost>,
}

impl SieData {
    /// Look up a declared account
    pub fn konto(&self, nummer: &str) -> Option<&Konto> {
        self.konton.get(nummer)
    }

    /// Insert or replace an account definition
    pub fn add_konto(&mut self, konto: Konto) -> Option<Konto> {
        self.konton.insert(konto.nummer.clone(), konto)
    }
}

/// Categories an import can materialise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImportCategory {
    Verifikationer,
    IngaendeBalanser,
    UtgaendeBalanser,
    Resultat,
}

impl ImportCategory {
    pub const ALL: [ImportCategory; 4] = [
        ImportCategory::Verifikationer,
        ImportCategory::IngaendeBalanser,
        ImportCategory::UtgaendeBalanser,
        ImportCategory::Resultat,
    ];

    /// Whether the settings enable this category
    pub fn is_enabled(&self, settings: &ImportSettings) -> bool {
        match self {
            ImportCategory::Verifikationer => settings.inkludera_verifikationer,
            ImportCategory::IngaendeBalanser | ImportCategory::UtgaendeBalanser => {
                settings.inkludera_balanser
            }
            ImportCategory::Resultat => settings.inkludera_resultat,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ImportCategory::Verifikationer => "verifikationer",
            ImportCategory::IngaendeBalanser => "ingående balanser",
            ImportCategory::UtgaendeBalanser => "utgående balanser",
            ImportCategory::Resultat => "resultat",
        }
    }
}

/// User-chosen scope for one import run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSettings {
    pub start_datum: Option<NaiveDate>,
    pub slut_datum: Option<NaiveDate>,
    pub inkludera_verifikationer: bool,
    pub inkludera_balanser: bool,
    pub inkludera_resultat: bool,
    pub skapa_konton: bool,
    pub exkludera_verifikationer: HashSet<VerificationKey>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            start_datum: None,
            slut_datum: None,
            inkludera_verifikationer: true,
            inkludera_balanser: true,
            inkludera_resultat: true,
            skapa_konton: false,
            exkludera_verifikationer: HashSet::new(),
        }
    }
}

impl ImportSettings {
    /// Inclusive date range check; an open bound accepts everything on that side
    pub fn in_range(&self, datum: NaiveDate) -> bool {
        self.start_datum.is_none_or(|start| datum >= start)
            && self.slut_datum.is_none_or(|slut| datum <= slut)
    }
}

/// Outcome of one import run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportResultat {
    pub import_id: Uuid,
    pub skapade_konton: usize,
    pub importerade_verifikationer: usize,
    pub importerade_balanser: usize,
    pub importerade_resultat: usize,
    pub antal_dubbletter: usize,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub fel: Vec<String>,
}

impl ImportResultat {
    pub(crate) fn empty() -> Self {
        Self {
            import_id: Uuid::new_v4(),
            skapade_konton: 0,
            importerade_verifikationer: 0,
            importerade_balanser: 0,
            importerade_resultat: 0,
            antal_dubbletter: 0,
            fel: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.fel.is_empty()
    }
}

/// A recoverable problem found while parsing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseWarning {
    /// 1-indexed source line
    pub line: usize,
    pub raw: String,
    pub message: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rad {}: {} ({})", self.line, self.message, self.raw)
    }
}

/// Errors that can occur while reading, writing or importing SIE data
#[derive(Debug, thiserror::Error)]
pub enum SieError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Fatal parse error: {0}")]
    Fatal(String),
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Verification not found: {0}")]
    VerificationNotFound(String),
    #[error("Verification {0} is referenced elsewhere")]
    Referenced(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Import aborted after partial write: {source}")]
    PartialImport {
        partial: Box<ImportResultat>,
        source: Box<SieError>,
    },
}

impl SieError {
    /// Text for [`ImportResultat::fel`]: validation errors are reported without
    /// the error kind prefix
    pub fn message(&self) -> String {
        match self {
            SieError::Validation(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type for SIE operations
pub type SieResult<T> = Result<T, SieError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_balanced_verification() {
        let ver = Verifikation::new("A", "1", date(2024, 1, 10), "Försäljning")
            .with_transaktion("1930", BigDecimal::from(1000))
            .with_transaktion("3001", BigDecimal::from(-1000));

        assert!(ver.is_balanced());
        assert_eq!(ver.omslutning(), BigDecimal::from(1000));
    }

    #[test]
    fn test_unbalanced_verification() {
        let ver = Verifikation::new("A", "2", date(2024, 1, 10), "Fel")
            .with_transaktion("1930", BigDecimal::from(1050))
            .with_transaktion("3001", BigDecimal::from(-1000));

        assert!(!ver.is_balanced());
        assert_eq!(ver.summa(), BigDecimal::from(50));
    }

    #[test]
    fn test_ore_precision_sum() {
        let ver = Verifikation::new("A", "3", date(2024, 1, 10), "Öresavrundning")
            .with_transaktion("1930", BigDecimal::from_str("0.10").unwrap())
            .with_transaktion("1930", BigDecimal::from_str("0.20").unwrap())
            .with_transaktion("3740", BigDecimal::from_str("-0.30").unwrap());

        assert!(ver.is_balanced());
    }

    #[test]
    fn test_konto_typ_from_bas() {
        assert_eq!(KontoTyp::from_bas("1930"), Some(KontoTyp::Tillgang));
        assert_eq!(KontoTyp::from_bas("2440"), Some(KontoTyp::Skuld));
        assert_eq!(KontoTyp::from_bas("3001"), Some(KontoTyp::Intakt));
        assert_eq!(KontoTyp::from_bas("7210"), Some(KontoTyp::Kostnad));
        assert_eq!(KontoTyp::from_bas("x"), None);

        let mut konto = Konto::new("2081", "Aktiekapital");
        assert_eq!(konto.effective_typ(), Some(KontoTyp::Skuld));
        konto.typ = Some(KontoTyp::Tillgang);
        assert_eq!(konto.effective_typ(), Some(KontoTyp::Tillgang));
    }

    #[test]
    fn test_settings_range_is_inclusive() {
        let settings = ImportSettings {
            start_datum: Some(date(2024, 1, 1)),
            slut_datum: Some(date(2024, 12, 31)),
            ..Default::default()
        };

        assert!(settings.in_range(date(2024, 1, 1)));
        assert!(settings.in_range(date(2024, 12, 31)));
        assert!(!settings.in_range(date(2023, 12, 31)));
        assert!(!settings.in_range(date(2025, 1, 1)));
    }

    #[test]
    fn test_category_toggles() {
        let settings = ImportSettings {
            inkludera_balanser: false,
            ..Default::default()
        };

        let enabled: Vec<_> = ImportCategory::ALL
            .iter()
            .filter(|c| c.is_enabled(&settings))
            .collect();
        assert_eq!(
            enabled,
            vec![&ImportCategory::Verifikationer, &ImportCategory::Resultat]
        );
    }
}
