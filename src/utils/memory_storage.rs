//! In-memory ledger implementation for testing

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::traits::*;
use crate::types::*;

type BalanceKey = (i32, String);

/// In-memory ledger for testing and development.
///
/// Clones share the same data, so a test can keep one handle for
/// inspection while an importer owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    accounts: Arc<RwLock<BTreeMap<String, Konto>>>,
    verifications: Arc<RwLock<BTreeMap<u64, PersistedVerification>>>,
    ingaende: Arc<RwLock<BTreeMap<BalanceKey, BalansPost>>>,
    utgaende: Arc<RwLock<BTreeMap<BalanceKey, BalansPost>>>,
    results: Arc<RwLock<BTreeMap<BalanceKey, ResultatPost>>>,
    next_seq: Arc<AtomicU64>,
    referenced: Arc<RwLock<HashSet<Uuid>>>,
    /// Remaining successful writes before every write fails
    write_budget: Arc<RwLock<Option<usize>>>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write after the first `writes` fail with a storage error
    pub fn fail_after(&self, writes: usize) -> SieResult<()> {
        *write(&self.write_budget)? = Some(writes);
        Ok(())
    }

    /// Mark a verification as used elsewhere so it cannot be deleted
    pub fn mark_referenced(&self, id: Uuid) -> SieResult<()> {
        write(&self.referenced)?.insert(id);
        Ok(())
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) -> SieResult<()> {
        write(&self.accounts)?.clear();
        write(&self.verifications)?.clear();
        write(&self.ingaende)?.clear();
        write(&self.utgaende)?.clear();
        write(&self.results)?.clear();
        write(&self.referenced)?.clear();
        *write(&self.write_budget)? = None;
        Ok(())
    }

    fn check_write(&self) -> SieResult<()> {
        let mut budget = write(&self.write_budget)?;
        match *budget {
            Some(0) => Err(SieError::Storage("write rejected by ledger".to_string())),
            Some(ref mut remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn balances(&self, typ: BalansTyp) -> &RwLock<BTreeMap<BalanceKey, BalansPost>> {
        match typ {
            BalansTyp::Ingaende => &self.ingaende,
            BalansTyp::Utgaende => &self.utgaende,
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> SieResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| SieError::Storage("memory storage lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> SieResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| SieError::Storage("memory storage lock poisoned".to_string()))
}

#[async_trait]
impl LedgerStorage for MemoryStorage {
    async fn list_accounts(&self) -> SieResult<Vec<Konto>> {
        Ok(read(&self.accounts)?.values().cloned().collect())
    }

    async fn save_account(&mut self, konto: &Konto) -> SieResult<()> {
        self.check_write()?;
        write(&self.accounts)?.insert(konto.nummer.clone(), konto.clone());
        Ok(())
    }

    async fn list_verifications(&self) -> SieResult<Vec<PersistedVerification>> {
        Ok(read(&self.verifications)?.values().cloned().collect())
    }

    async fn save_verification(
        &mut self,
        verifikation: &Verifikation,
    ) -> SieResult<PersistedVerification> {
        self.check_write()?;
        let row = PersistedVerification {
            id: Uuid::new_v4(),
            persisted_seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            verifikation: verifikation.clone(),
        };
        write(&self.verifications)?.insert(row.persisted_seq, row.clone());
        Ok(row)
    }

    async fn delete_verification(&mut self, id: Uuid) -> SieResult<()> {
        if read(&self.referenced)?.contains(&id) {
            return Err(SieError::Referenced(id.to_string()));
        }

        let mut rows = write(&self.verifications)?;
        let seq = rows
            .values()
            .find(|row| row.id == id)
            .map(|row| row.persisted_seq)
            .ok_or_else(|| SieError::VerificationNotFound(id.to_string()))?;
        rows.remove(&seq);
        Ok(())
    }

    async fn upsert_balance(&mut self, typ: BalansTyp, post: &BalansPost) -> SieResult<()> {
        self.check_write()?;
        write(self.balances(typ))?.insert((post.arsnr, post.konto.clone()), post.clone());
        Ok(())
    }

    async fn upsert_result(&mut self, post: &ResultatPost) -> SieResult<()> {
        self.check_write()?;
        write(&self.results)?.insert((post.arsnr, post.konto.clone()), post.clone());
        Ok(())
    }

    async fn list_balances(&self, typ: BalansTyp) -> SieResult<Vec<BalansPost>> {
        Ok(read(self.balances(typ))?.values().cloned().collect())
    }

    async fn list_results(&self) -> SieResult<Vec<ResultatPost>> {
        Ok(read(&self.results)?.values().cloned().collect())
    }
}
