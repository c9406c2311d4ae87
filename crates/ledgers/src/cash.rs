//! Cash (payment-account) ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tradebook_core::{AccountId, DocumentId, EntryId, PartyRef, TenantId};

/// What kind of money movement an entry records.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CashEntryType {
    MoneyIn,
    MoneyOut,
    Transfer,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CashDirection {
    In,
    Out,
}

impl CashDirection {
    pub fn sign(&self) -> i64 {
        match self {
            CashDirection::In => 1,
            CashDirection::Out => -1,
        }
    }
}

/// One payment-account balance change. Append-only.
///
/// Internal transfers write exactly two entries sharing one
/// `transfer_group_id`: an OUT on the source account and an IN on the
/// destination, both of type `Transfer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashLedgerEntry {
    pub id: EntryId,
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub account_id: AccountId,
    pub entry_type: CashEntryType,
    pub direction: CashDirection,
    /// Strictly positive; direction carries the sign.
    pub amount: i64,
    /// The party the money moved against, when there is one.
    pub counterparty: Option<PartyRef>,
    /// Pairs the two legs of one internal transfer.
    pub transfer_group_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
}

impl CashLedgerEntry {
    pub fn signed_amount(&self) -> i64 {
        self.direction.sign() * self.amount
    }
}

/// Account balance: opening balance plus signed sum of the account's entries.
pub fn account_balance<'a>(
    account_id: AccountId,
    opening_balance: i64,
    entries: impl IntoIterator<Item = &'a CashLedgerEntry>,
) -> i64 {
    opening_balance
        + entries
            .into_iter()
            .filter(|e| e.account_id == account_id)
            .map(|e| e.signed_amount())
            .sum::<i64>()
}
