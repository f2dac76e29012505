//! Traits for storage abstraction and extensibility

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::import::duplicates::ExistingVerifications;
use crate::types::*;

/// A verification as stored in the target ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedVerification {
    /// Row identifier assigned by the ledger
    pub id: Uuid,
    /// Monotonic insertion order; lower means persisted earlier
    pub persisted_seq: u64,
    pub verifikation: Verifikation,
}

/// Storage abstraction for the target ledger
///
/// The import pipeline never talks to a database directly. Whatever owns the
/// ledger rows (PostgreSQL, SQLite, in-memory, ...) implements this trait and
/// the handle is passed into [`crate::import::SieImporter`].
#[async_trait]
pub trait LedgerStorage: Send + Sync {
    /// List every account in the ledger
    async fn list_accounts(&self) -> SieResult<Vec<Konto>>;

    /// Save a new account
    async fn save_account(&mut self, konto: &Konto) -> SieResult<()>;

    /// List every persisted verification
    async fn list_verifications(&self) -> SieResult<Vec<PersistedVerification>>;

    /// Persist a verification and return the stored row
    async fn save_verification(
        &mut self,
        verifikation: &Verifikation,
    ) -> SieResult<PersistedVerification>;

    /// Delete a persisted verification.
    ///
    /// Returns [`SieError::Referenced`] when other rows depend on it.
    async fn delete_verification(&mut self, id: Uuid) -> SieResult<()>;

    /// Insert or replace the balance of one account
    async fn upsert_balance(&mut self, typ: BalansTyp, post: &BalansPost) -> SieResult<()>;

    /// Insert or replace the result figure of one account
    async fn upsert_result(&mut self, post: &ResultatPost) -> SieResult<()>;

    /// List stored balances of the given direction
    async fn list_balances(&self, typ: BalansTyp) -> SieResult<Vec<BalansPost>>;

    /// List stored result figures
    async fn list_results(&self) -> SieResult<Vec<ResultatPost>>;

    /// Keys and fingerprints of everything already imported
    async fn existing_verifications(&self) -> SieResult<ExistingVerifications> {
        let persisted = self.list_verifications().await?;
        Ok(ExistingVerifications::from_verifications(
            persisted.iter().map(|p| &p.verifikation),
        ))
    }
}

/// Trait for implementing custom account validation rules
pub trait AccountValidator: Send + Sync {
    /// Validate an account before it is created
    fn validate_konto(&self, konto: &Konto) -> SieResult<()>;
}

/// Trait for implementing custom verification validation rules
pub trait VerificationValidator: Send + Sync {
    /// Validate a verification before it is imported
    fn validate_verification(&self, verifikation: &Verifikation) -> SieResult<()>;
}

/// Default account validator with basic rules
pub struct DefaultAccountValidator;

impl AccountValidator for DefaultAccountValidator {
    fn validate_konto(&self, konto: &Konto) -> SieResult<()> {
        if konto.nummer.trim().is_empty() {
            return Err(SieError::Validation(
                "Kontonummer får inte vara tomt".to_string(),
            ));
        }

        Ok(())
    }
}

/// Default verification validator with basic double-entry rules
pub struct DefaultVerificationValidator;

impl VerificationValidator for DefaultVerificationValidator {
    fn validate_verification(&self, verifikation: &Verifikation) -> SieResult<()> {
        if verifikation.transaktioner.is_empty() {
            return Err(SieError::Validation(format!(
                "Verifikation {} saknar transaktioner",
                verifikation.key()
            )));
        }

        if !verifikation.is_balanced() {
            return Err(SieError::Validation(format!(
                "Verifikation {} är obalanserad: summa {}",
                verifikation.key(),
                verifikation.summa()
            )));
        }

        Ok(())
    }
}
