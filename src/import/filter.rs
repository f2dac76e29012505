//! Applies [`ImportSettings`] to parsed data before anything is written

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

use crate::traits::{AccountValidator, VerificationValidator};
use crate::types::*;

/// Why a record was left out of the import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExclusionReason {
    /// Dated outside the chosen range
    DateRange,
    /// Listed in `exkludera_verifikationer`
    ExplicitlyExcluded,
    /// Failed validation (e.g. not balanced)
    Invalid(String),
    /// References accounts that do not exist and may not be created
    MissingAccounts(Vec<String>),
}

/// A verification that was filtered out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    pub key: VerificationKey,
    pub reason: ExclusionReason,
}

/// The part of a file that survives the settings, ready to be written
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilteredImport {
    pub verifikationer: Vec<Verifikation>,
    pub ingaende: Vec<BalansPost>,
    pub utgaende: Vec<BalansPost>,
    pub resultat: Vec<ResultatPost>,
    /// Accounts to create before anything else is written
    pub konton_att_skapa: Vec<Konto>,
    /// Actionable messages for records that were rejected
    pub fel: Vec<String>,
    pub exkluderade: Vec<Exclusion>,
    /// Balance and result rows skipped because they belong to another year
    pub andra_ar: usize,
}

/// Filter parsed data for import.
///
/// Rules, in order: date range, category toggles, explicit exclusions,
/// verification validity, missing accounts. Accounts declared in the file
/// but missing in the ledger are always queued for creation; accounts that
/// are only referenced are created when `skapa_konton` is set and otherwise
/// cause the referencing record to be rejected.
///
/// Every queued account must pass `account_validator`. An account it rejects
/// is never created and counts as missing for every record that uses it.
pub fn apply_settings(
    data: &SieData,
    settings: &ImportSettings,
    ledger_accounts: &HashSet<String>,
    account_validator: &dyn AccountValidator,
    validator: &dyn VerificationValidator,
) -> FilteredImport {
    let mut filtered = FilteredImport::default();
    let mut accounts = AccountPlan::new(
        data,
        ledger_accounts,
        account_validator,
        settings.skapa_konton,
    );

    if ImportCategory::Verifikationer.is_enabled(settings) {
        for ver in &data.verifikationer {
            let key = ver.key();

            if !settings.in_range(ver.datum) {
                filtered.exclude(key, ExclusionReason::DateRange);
                continue;
            }
            if settings.exkludera_verifikationer.contains(&key) {
                filtered.exclude(key, ExclusionReason::ExplicitlyExcluded);
                continue;
            }
            if let Err(err) = validator.validate_verification(ver) {
                filtered.fel.push(err.message());
                filtered.exclude(key, ExclusionReason::Invalid(err.message()));
                continue;
            }

            let missing = accounts.resolve(ver.konton());
            if !missing.is_empty() {
                filtered.fel.push(format!(
                    "Verifikation {} refererar till konton som saknas: {}",
                    key,
                    missing.join(", ")
                ));
                filtered.exclude(key, ExclusionReason::MissingAccounts(missing));
                continue;
            }

            filtered.verifikationer.push(ver.clone());
        }
    }

    let current_year = data.header.rakenskapsar(0);
    let year_start = current_year.map(|r| r.start);
    let year_end = current_year.map(|r| r.slut);

    if ImportCategory::IngaendeBalanser.is_enabled(settings) {
        for post in &data.balanser.ingaende {
            if filtered.keep_snapshot(post.arsnr, year_start, settings) {
                if let Some(post) = filtered.check_accounts(&mut accounts, "#IB", post) {
                    filtered.ingaende.push(post);
                }
            }
        }
    }

    if ImportCategory::UtgaendeBalanser.is_enabled(settings) {
        for post in &data.balanser.utgaende {
            if filtered.keep_snapshot(post.arsnr, year_end, settings) {
                if let Some(post) = filtered.check_accounts(&mut accounts, "#UB", post) {
                    filtered.utgaende.push(post);
                }
            }
        }
    }

    if ImportCategory::Resultat.is_enabled(settings) {
        for post in &data.resultat {
            if !filtered.keep_snapshot(post.arsnr, year_end, settings) {
                continue;
            }
            let missing = accounts.resolve(std::iter::once(post.konto.as_str()));
            if missing.is_empty() {
                filtered.resultat.push(post.clone());
            } else {
                filtered.fel.push(format!(
                    "#RES för konto {} hoppades över eftersom kontot saknas",
                    post.konto
                ));
            }
        }
    }

    let (queue, rejected) = accounts.into_parts();
    filtered.konton_att_skapa = queue;
    filtered.fel.extend(rejected);
    debug!(
        verifikationer = filtered.verifikationer.len(),
        exkluderade = filtered.exkluderade.len(),
        konton_att_skapa = filtered.konton_att_skapa.len(),
        "applied import settings"
    );
    filtered
}

impl FilteredImport {
    fn exclude(&mut self, key: VerificationKey, reason: ExclusionReason) {
        debug!(verifikation = %key, ?reason, "excluding verification");
        self.exkluderade.push(Exclusion { key, reason });
    }

    /// Only current-year snapshots are materialised, and only when their
    /// date (if known) is inside the range
    fn keep_snapshot(&mut self, arsnr: i32, datum: Option<NaiveDate>, settings: &ImportSettings) -> bool {
        if arsnr != 0 {
            self.andra_ar += 1;
            return false;
        }
        datum.is_none_or(|d| settings.in_range(d))
    }

    fn check_accounts(&mut self, accounts: &mut AccountPlan, tag: &str, post: &BalansPost) -> Option<BalansPost> {
        let missing = accounts.resolve(std::iter::once(post.konto.as_str()));
        if missing.is_empty() {
            Some(post.clone())
        } else {
            self.fel.push(format!(
                "{} för konto {} hoppades över eftersom kontot saknas",
                tag, post.konto
            ));
            None
        }
    }
}

/// Tracks which accounts exist, which will be created and which are missing
struct AccountPlan<'a> {
    ledger: &'a HashSet<String>,
    validator: &'a dyn AccountValidator,
    skapa_konton: bool,
    queue: BTreeMap<String, Konto>,
    rejected: BTreeSet<String>,
    fel: Vec<String>,
}

impl<'a> AccountPlan<'a> {
    fn new(
        data: &SieData,
        ledger: &'a HashSet<String>,
        validator: &'a dyn AccountValidator,
        skapa_konton: bool,
    ) -> Self {
        let mut plan = Self {
            ledger,
            validator,
            skapa_konton,
            queue: BTreeMap::new(),
            rejected: BTreeSet::new(),
            fel: Vec::new(),
        };
        for konto in data.konton.values() {
            if !ledger.contains(&konto.nummer) {
                plan.enqueue(konto.clone());
            }
        }
        plan
    }

    /// Queue an account for creation unless the validator rejects it
    fn enqueue(&mut self, konto: Konto) -> bool {
        match self.validator.validate_konto(&konto) {
            Ok(()) => {
                self.queue.insert(konto.nummer.clone(), konto);
                true
            }
            Err(err) => {
                debug!(konto = %konto.nummer, error = %err, "account rejected");
                self.fel
                    .push(format!("Konto {} skapades inte: {}", konto.nummer, err.message()));
                self.rejected.insert(konto.nummer);
                false
            }
        }
    }

    /// Returns the account numbers that cannot be satisfied, queueing
    /// auto-created accounts as a side effect
    fn resolve<'k>(&mut self, konton: impl Iterator<Item = &'k str>) -> Vec<String> {
        let mut missing: Vec<String> = konton
            .filter(|nr| !self.ledger.contains(*nr) && !self.queue.contains_key(*nr))
            .map(str::to_string)
            .collect();
        missing.sort();
        missing.dedup();

        if self.skapa_konton {
            missing.retain(|nummer| {
                self.rejected.contains(nummer)
                    || !self.enqueue(Konto::new(nummer.clone(), format!("Konto {}", nummer)))
            });
        }
        missing
    }

    fn into_parts(self) -> (Vec<Konto>, Vec<String>) {
        (self.queue.into_values().collect(), self.fel)
    }
}
