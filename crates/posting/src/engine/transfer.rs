//! INTERNAL_TRANSFER posting.
//!
//! Not AP/AR-affecting: exactly two cash entries sharing one
//! `transfer_group_id`, an OUT on the source account and an IN on the
//! destination, both for the same amount.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use tradebook_core::EntryId;
use tradebook_ledgers::{CashDirection, CashEntryType, CashLedgerEntry};
use tradebook_model::{Document, TransferDetails};
use tradebook_store::PostingTx;

use crate::engine::{flip_and_number, load_active_account};
use crate::error::PostingError;

pub(crate) async fn post<T: PostingTx>(
    tx: &mut T,
    document: &mut Document,
    details: &TransferDetails,
    idempotency_key: &str,
    now: DateTime<Utc>,
) -> Result<(), PostingError> {
    load_active_account(tx, document.tenant_id, details.from_account).await?;
    load_active_account(tx, document.tenant_id, details.to_account).await?;

    flip_and_number(tx, document, idempotency_key, 0, now).await?;

    let transfer_group_id = Uuid::now_v7();
    for (account_id, direction) in [
        (details.from_account, CashDirection::Out),
        (details.to_account, CashDirection::In),
    ] {
        tx.insert_cash_entry(&CashLedgerEntry {
            id: EntryId::new(),
            tenant_id: document.tenant_id,
            document_id: document.id,
            account_id,
            entry_type: CashEntryType::Transfer,
            direction,
            amount: details.amount,
            counterparty: None,
            transfer_group_id: Some(transfer_group_id),
            occurred_at: now,
        })
        .await?;
    }

    Ok(())
}
