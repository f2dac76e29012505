//! Duplicate detection for verifications
//!
//! The `(serie, nummer)` pair is the natural identity of a verification. A
//! content fingerprint can be enabled on top of it to catch copies that were
//! renumbered by the exporting program.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

use crate::sie::generator::format_amount;
use crate::traits::{LedgerStorage, PersistedVerification};
use crate::types::*;

/// How strictly verifications are compared against the ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicateCheck {
    /// Only the `(serie, nummer)` key
    #[default]
    KeyOnly,
    /// Key, or same date, total and transaction lines
    KeyAndContent,
}

/// Content identity of a verification, independent of its number
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub datum: NaiveDate,
    pub omslutning: String,
    lines: Vec<(String, String)>,
}

impl Fingerprint {
    pub fn of(verifikation: &Verifikation) -> Self {
        let mut lines: Vec<(String, String)> = verifikation
            .transaktioner
            .iter()
            .map(|t| (t.konto.clone(), format_amount(&t.belopp, 2)))
            .collect();
        lines.sort();
        Self {
            datum: verifikation.datum,
            omslutning: format_amount(&verifikation.omslutning(), 2),
            lines,
        }
    }
}

/// Keys and fingerprints already present in the ledger
#[derive(Debug, Clone, Default)]
pub struct ExistingVerifications {
    keys: HashSet<VerificationKey>,
    fingerprints: HashSet<Fingerprint>,
}

impl ExistingVerifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_verifications<'a>(verifikationer: impl IntoIterator<Item = &'a Verifikation>) -> Self {
        let mut existing = Self::new();
        for ver in verifikationer {
            existing.insert(ver);
        }
        existing
    }

    pub fn insert(&mut self, verifikation: &Verifikation) {
        self.keys.insert(verifikation.key());
        self.fingerprints.insert(Fingerprint::of(verifikation));
    }

    pub fn contains_key(&self, key: &VerificationKey) -> bool {
        self.keys.contains(key)
    }

    pub fn contains_fingerprint(&self, fingerprint: &Fingerprint) -> bool {
        self.fingerprints.contains(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Why a verification was considered a duplicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicateReason {
    /// Key already in the ledger
    Key,
    /// Same content already in the ledger under another number
    Content,
    /// Same key appeared earlier in the same file
    InBatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Duplicate {
    pub key: VerificationKey,
    pub reason: DuplicateReason,
}

/// Outcome of [`find_duplicates`]
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateReport {
    pub antal_dubbletter: usize,
    pub dubbletter: Vec<Duplicate>,
    /// Verifications that are safe to import, in input order
    pub unika: Vec<Verifikation>,
}

/// Split verifications into new ones and duplicates
pub fn find_duplicates(
    verifikationer: Vec<Verifikation>,
    existing: &ExistingVerifications,
    check: DuplicateCheck,
) -> DuplicateReport {
    let mut seen = ExistingVerifications::new();
    let mut dubbletter = Vec::new();
    let mut unika = Vec::new();

    for ver in verifikationer {
        let key = ver.key();
        let reason = if existing.contains_key(&key) {
            Some(DuplicateReason::Key)
        } else if seen.contains_key(&key) {
            Some(DuplicateReason::InBatch)
        } else if check == DuplicateCheck::KeyAndContent {
            let fingerprint = Fingerprint::of(&ver);
            if existing.contains_fingerprint(&fingerprint) {
                Some(DuplicateReason::Content)
            } else if seen.contains_fingerprint(&fingerprint) {
                Some(DuplicateReason::InBatch)
            } else {
                None
            }
        } else {
            None
        };

        match reason {
            Some(reason) => {
                debug!(verifikation = %key, ?reason, "duplicate verification");
                dubbletter.push(Duplicate { key, reason });
            }
            None => {
                seen.insert(&ver);
                unika.push(ver);
            }
        }
    }

    DuplicateReport {
        antal_dubbletter: dubbletter.len(),
        dubbletter,
        unika,
    }
}

/// Outcome of [`rensa_dubbletter`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Rows removed
    pub rensade: usize,
    /// Rows that could not be removed
    pub fel: Vec<String>,
}

/// Remove persisted verifications that share a key, keeping the earliest copy.
///
/// Rows the ledger refuses to delete because they are referenced elsewhere
/// are reported in [`CleanupReport::fel`]. Storage failures abort.
pub async fn rensa_dubbletter<S: LedgerStorage + ?Sized>(storage: &mut S) -> SieResult<CleanupReport> {
    let persisted = storage.list_verifications().await?;

    let mut groups: BTreeMap<VerificationKey, Vec<PersistedVerification>> = BTreeMap::new();
    for row in persisted {
        groups.entry(row.verifikation.key()).or_default().push(row);
    }

    let mut report = CleanupReport::default();
    for (key, mut rows) in groups {
        if rows.len() < 2 {
            continue;
        }
        rows.sort_by_key(|r| r.persisted_seq);

        for extra in rows.iter().skip(1) {
            match storage.delete_verification(extra.id).await {
                Ok(()) => report.rensade += 1,
                Err(SieError::Referenced(_)) => {
                    warn!(verifikation = %key, id = %extra.id, "duplicate is referenced, keeping it");
                    report.fel.push(format!(
                        "Dubblett av verifikation {} ({}) kunde inte tas bort eftersom den används",
                        key, extra.id
                    ));
                }
                Err(SieError::VerificationNotFound(_)) => {
                    debug!(verifikation = %key, id = %extra.id, "duplicate already removed");
                }
                Err(err) => return Err(err),
            }
        }
    }

    info!(rensade = report.rensade, fel = report.fel.len(), "duplicate cleanup done");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;

    fn ver(serie: &str, nummer: &str, day: u32, belopp: i64) -> Verifikation {
        Verifikation::new(
            serie,
            nummer,
            NaiveDate::from_ymd_opt(2024, 4, day).unwrap(),
            "Test",
        )
        .with_transaktion("1930", BigDecimal::from(belopp))
        .with_transaktion("3001", BigDecimal::from(-belopp))
    }

    #[test]
    fn test_key_duplicates() {
        let existing = ExistingVerifications::from_verifications(&[ver("A", "1", 1, 100)]);
        let report = find_duplicates(
            vec![ver("A", "1", 1, 100), ver("A", "2", 2, 200)],
            &existing,
            DuplicateCheck::KeyOnly,
        );

        assert_eq!(report.antal_dubbletter, 1);
        assert_eq!(report.dubbletter[0].key, VerificationKey::new("A", "1"));
        assert_eq!(report.dubbletter[0].reason, DuplicateReason::Key);
        assert_eq!(report.unika.len(), 1);
        assert_eq!(report.unika[0].nummer, "2");
    }

    #[test]
    fn test_same_key_twice_in_batch() {
        let report = find_duplicates(
            vec![ver("A", "1", 1, 100), ver("A", "1", 1, 100)],
            &ExistingVerifications::new(),
            DuplicateCheck::KeyOnly,
        );
        assert_eq!(report.antal_dubbletter, 1);
        assert_eq!(report.dubbletter[0].reason, DuplicateReason::InBatch);
    }

    #[test]
    fn test_renumbered_copy_needs_content_check() {
        let existing = ExistingVerifications::from_verifications(&[ver("A", "1", 1, 100)]);
        let renumbered = vec![ver("B", "77", 1, 100)];

        let key_only = find_duplicates(renumbered.clone(), &existing, DuplicateCheck::KeyOnly);
        assert_eq!(key_only.antal_dubbletter, 0);

        let content = find_duplicates(renumbered, &existing, DuplicateCheck::KeyAndContent);
        assert_eq!(content.antal_dubbletter, 1);
        assert_eq!(content.dubbletter[0].reason, DuplicateReason::Content);
    }

    #[test]
    fn test_fingerprint_ignores_line_order_and_scale() {
        let a = ver("A", "1", 3, 100);
        let mut b = ver("C", "9", 3, 100);
        b.transaktioner.reverse();
        b.transaktioner[0].belopp = "-100.00".parse().unwrap();
        assert_eq!(Fingerprint::of(&a), Fingerprint::of(&b));
        assert_ne!(Fingerprint::of(&a), Fingerprint::of(&ver("A", "1", 4, 100)));
    }
}
