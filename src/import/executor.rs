//! Import executor: ties decoding, parsing, filtering and duplicate detection
//! together and writes the result into the target ledger

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::SieConfig;
use crate::encoding::decode_auto;
use crate::import::duplicates::{find_duplicates, rensa_dubbletter, CleanupReport, DuplicateCheck};
use crate::import::filter::{apply_settings, FilteredImport};
use crate::sie::parser::parse;
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::validate_upload;

/// Per-organisation import locks.
///
/// Two imports into the same organisation's ledger must not interleave their
/// writes, otherwise both could pass duplicate detection for the same
/// verification. Clones share the same registry. An organisation's entry is
/// removed when its last guard is dropped and nobody is waiting for it.
#[derive(Debug, Clone, Default)]
pub struct ImportLocks {
    inner: Arc<StdMutex<Registry>>,
}

type Registry = HashMap<String, Arc<Mutex<()>>>;

impl ImportLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one organisation's ledger
    pub async fn acquire(&self, organisation: &str) -> ImportGuard {
        let lock = {
            let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(organisation.to_string()).or_default().clone()
        };
        let guard = lock.clone().lock_owned().await;
        ImportGuard {
            organisation: organisation.to_string(),
            lock,
            guard: Some(guard),
            registry: Arc::clone(&self.inner),
        }
    }

    /// Number of organisations with a held or awaited lock
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive access to one organisation's ledger, released on drop
#[derive(Debug)]
pub struct ImportGuard {
    organisation: String,
    lock: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    registry: Arc<StdMutex<Registry>>,
}

impl Drop for ImportGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        // the registry and this guard hold the only references
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.organisation);
        }
    }
}

/// Imports SIE data into a [`LedgerStorage`]
pub struct SieImporter<S: LedgerStorage> {
    storage: S,
    locks: ImportLocks,
    organisation: Option<String>,
    config: SieConfig,
    account_validator: Box<dyn AccountValidator>,
    verification_validator: Box<dyn VerificationValidator>,
    duplicate_check: DuplicateCheck,
}

impl<S: LedgerStorage> SieImporter<S> {
    /// Create an importer with default configuration and validators
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            locks: ImportLocks::new(),
            organisation: None,
            config: SieConfig::default(),
            account_validator: Box::new(DefaultAccountValidator),
            verification_validator: Box::new(DefaultVerificationValidator),
            duplicate_check: DuplicateCheck::default(),
        }
    }

    pub fn with_config(mut self, config: SieConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a lock registry with other importers
    pub fn with_locks(mut self, locks: ImportLocks) -> Self {
        self.locks = locks;
        self
    }

    /// Identify the target ledger. Without it the file's `#ORGNR` is used as
    /// the lock key.
    pub fn with_organisation(mut self, organisation: impl Into<String>) -> Self {
        self.organisation = Some(organisation.into());
        self
    }

    pub fn with_validators(
        mut self,
        account_validator: Box<dyn AccountValidator>,
        verification_validator: Box<dyn VerificationValidator>,
    ) -> Self {
        self.account_validator = account_validator;
        self.verification_validator = verification_validator;
        self
    }

    pub fn with_duplicate_check(mut self, check: DuplicateCheck) -> Self {
        self.duplicate_check = check;
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Validate, decode, parse and import an uploaded file.
    ///
    /// Parse warnings are reported in [`ImportResultat::fel`] next to the
    /// import's own messages.
    pub async fn import_bytes(
        &mut self,
        bytes: &[u8],
        content_type: &str,
        settings: &ImportSettings,
    ) -> SieResult<ImportResultat> {
        validate_upload(bytes, content_type, &self.config.upload)?;

        let text = decode_auto(bytes, self.config.upload.sniff_prefix_len);
        let outcome = parse(&text)?;
        let warnings: Vec<String> = outcome.warnings.iter().map(ToString::to_string).collect();

        match self.import(&outcome.data, settings).await {
            Ok(mut resultat) => {
                prepend(&mut resultat.fel, warnings);
                Ok(resultat)
            }
            Err(SieError::PartialImport { mut partial, source }) => {
                prepend(&mut partial.fel, warnings);
                Err(SieError::PartialImport { partial, source })
            }
            Err(err) => Err(err),
        }
    }

    /// Import parsed data.
    ///
    /// Expected conditions (duplicates, excluded or invalid records, missing
    /// accounts) are reported in the result. Only storage failures return an
    /// error; once writing has started that error is
    /// [`SieError::PartialImport`] with the counts committed so far.
    pub async fn import(&mut self, data: &SieData, settings: &ImportSettings) -> SieResult<ImportResultat> {
        let organisation = self
            .organisation
            .clone()
            .or_else(|| data.header.organisationsnummer.clone())
            .unwrap_or_default();
        let _guard = self.locks.acquire(&organisation).await;

        let mut resultat = ImportResultat::empty();
        info!(
            import_id = %resultat.import_id,
            organisation = %organisation,
            verifikationer = data.verifikationer.len(),
            "starting SIE import"
        );

        let ledger_accounts: HashSet<String> = self
            .storage
            .list_accounts()
            .await?
            .into_iter()
            .map(|k| k.nummer)
            .collect();
        let existing = self.storage.existing_verifications().await?;

        let filtered = apply_settings(
            data,
            settings,
            &ledger_accounts,
            self.account_validator.as_ref(),
            self.verification_validator.as_ref(),
        );
        if filtered.andra_ar > 0 {
            info!(rader = filtered.andra_ar, "skipping balances and results of other fiscal years");
        }

        let FilteredImport {
            verifikationer,
            ingaende,
            utgaende,
            resultat: resultatposter,
            konton_att_skapa,
            fel,
            ..
        } = filtered;
        resultat.fel = fel;

        let report = find_duplicates(verifikationer, &existing, self.duplicate_check);
        resultat.antal_dubbletter = report.antal_dubbletter;
        if report.antal_dubbletter > 0 {
            info!(antal = report.antal_dubbletter, "skipping duplicate verifications");
        }

        let writes = Writes {
            konton: konton_att_skapa,
            verifikationer: report.unika,
            ingaende,
            utgaende,
            resultat: resultatposter,
        };
        if let Err(source) = self.persist(writes, &mut resultat).await {
            warn!(
                import_id = %resultat.import_id,
                error = %source,
                skapade_konton = resultat.skapade_konton,
                importerade_verifikationer = resultat.importerade_verifikationer,
                "import aborted by storage failure"
            );
            return Err(SieError::PartialImport {
                partial: Box::new(resultat),
                source: Box::new(source),
            });
        }

        info!(
            import_id = %resultat.import_id,
            skapade_konton = resultat.skapade_konton,
            verifikationer = resultat.importerade_verifikationer,
            balanser = resultat.importerade_balanser,
            resultat = resultat.importerade_resultat,
            dubbletter = resultat.antal_dubbletter,
            fel = resultat.fel.len(),
            "SIE import finished"
        );
        Ok(resultat)
    }

    /// Remove duplicate verifications already in the ledger
    pub async fn rensa_dubbletter(&mut self) -> SieResult<CleanupReport> {
        rensa_dubbletter(&mut self.storage).await
    }

    /// Accounts first so every later row references an existing account.
    /// The accounts have already passed the account validator in
    /// [`apply_settings`].
    async fn persist(&mut self, writes: Writes, resultat: &mut ImportResultat) -> SieResult<()> {
        for konto in &writes.konton {
            self.storage.save_account(konto).await?;
            debug!(konto = %konto.nummer, namn = %konto.namn, "created account");
            resultat.skapade_konton += 1;
        }

        for ver in &writes.verifikationer {
            self.storage.save_verification(ver).await?;
            resultat.importerade_verifikationer += 1;
        }

        for post in &writes.ingaende {
            self.storage.upsert_balance(BalansTyp::Ingaende, post).await?;
            resultat.importerade_balanser += 1;
        }
        for post in &writes.utgaende {
            self.storage.upsert_balance(BalansTyp::Utgaende, post).await?;
            resultat.importerade_balanser += 1;
        }

        for post in &writes.resultat {
            self.storage.upsert_result(post).await?;
            resultat.importerade_resultat += 1;
        }

        Ok(())
    }
}

fn prepend(fel: &mut Vec<String>, mut first: Vec<String>) {
    first.append(fel);
    *fel = first;
}

struct Writes {
    konton: Vec<Konto>,
    verifikationer: Vec<Verifikation>,
    ingaende: Vec<BalansPost>,
    utgaende: Vec<BalansPost>,
    resultat: Vec<ResultatPost>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_locks_serialize_same_organisation() {
        let locks = ImportLocks::new();
        let guard = locks.acquire("556677-8899").await;

        let other = locks.clone();
        let waiting = tokio::spawn(async move {
            let _guard = other.acquire("556677-8899").await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(guard);
        waiting.await.unwrap();
    }

    #[tokio::test]
    async fn test_lock_registry_is_pruned() {
        let locks = ImportLocks::new();
        let a = locks.acquire("A").await;
        let b = locks.acquire("B").await;
        assert_eq!(locks.len(), 2);

        drop(a);
        assert_eq!(locks.len(), 1);

        // a waiter keeps the entry alive after the holder is gone
        let other = locks.clone();
        let waiting = tokio::spawn(async move {
            let _guard = other.acquire("B").await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(b);
        assert_eq!(locks.len(), 1);

        waiting.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_locks_are_independent_per_organisation() {
        let locks = ImportLocks::new();
        let _a = locks.acquire("A").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("B")).await;
        assert!(b.is_ok());
    }
}
