//! Post-parse consistency checks

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::types::*;

/// A structural problem in parsed data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValidationIssue {
    /// Transaction lines do not sum to zero
    Obalanserad {
        key: VerificationKey,
        summa: BigDecimal,
        rad: usize,
    },
    /// Verification without transaction lines
    Tom { key: VerificationKey, rad: usize },
    /// An account is referenced but never declared with `#KONTO`
    OdefinieratKonto { konto: String, kalla: String },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::Obalanserad { key, summa, rad } => write!(
                f,
                "verifikation {} (rad {}) är obalanserad, differens {}",
                key, rad, summa
            ),
            ValidationIssue::Tom { key, rad } => {
                write!(f, "verifikation {} (rad {}) saknar transaktioner", key, rad)
            }
            ValidationIssue::OdefinieratKonto { konto, kalla } => {
                write!(f, "konto {} används i {} men är inte definierat", konto, kalla)
            }
        }
    }
}

/// Check double-entry balance and account references
pub fn validate(data: &SieData) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut undefined: BTreeSet<(String, String)> = BTreeSet::new();

    for ver in &data.verifikationer {
        if ver.transaktioner.is_empty() {
            issues.push(ValidationIssue::Tom {
                key: ver.key(),
                rad: ver.rad,
            });
        } else if !ver.is_balanced() {
            issues.push(ValidationIssue::Obalanserad {
                key: ver.key(),
                summa: ver.summa(),
                rad: ver.rad,
            });
        }

        for konto in ver.konton() {
            if !data.konton.contains_key(konto) {
                undefined.insert((konto.to_string(), format!("verifikation {}", ver.key())));
            }
        }
    }

    let balances = data
        .balanser
        .ingaende
        .iter()
        .map(|p| (&p.konto, "#IB"))
        .chain(data.balanser.utgaende.iter().map(|p| (&p.konto, "#UB")))
        .chain(data.resultat.iter().map(|p| (&p.konto, "#RES")));
    for (konto, tag) in balances {
        if !data.konton.contains_key(konto) {
            undefined.insert((konto.clone(), tag.to_string()));
        }
    }

    issues.extend(
        undefined
            .into_iter()
            .map(|(konto, kalla)| ValidationIssue::OdefinieratKonto { konto, kalla }),
    );
    issues
}
