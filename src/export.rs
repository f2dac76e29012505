//! Export a ledger as [`SieData`] ready for [`crate::sie::SieGenerator`]

use tracing::info;

use crate::traits::LedgerStorage;
use crate::types::*;

/// Walk the ledger and collect everything a SIE 4 file carries.
///
/// Verifications are ordered by date, then by the order they were persisted.
pub async fn export_ledger<S: LedgerStorage + ?Sized>(storage: &S, header: SieHeader) -> SieResult<SieData> {
    let mut data = SieData {
        header,
        ..Default::default()
    };

    for konto in storage.list_accounts().await? {
        data.add_konto(konto);
    }

    let mut rows = storage.list_verifications().await?;
    rows.sort_by_key(|row| (row.verifikation.datum, row.persisted_seq));
    data.verifikationer = rows.into_iter().map(|row| row.verifikation).collect();

    data.balanser.ingaende = storage.list_balances(BalansTyp::Ingaende).await?;
    data.balanser.utgaende = storage.list_balances(BalansTyp::Utgaende).await?;
    data.resultat = storage.list_results().await?;

    info!(
        konton = data.konton.len(),
        verifikationer = data.verifikationer.len(),
        "exported ledger"
    );
    Ok(data)
}
