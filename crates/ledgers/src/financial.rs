//! Financial (AP/AR) ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradebook_core::{DocumentId, EntryId, PartyRef, TenantId};

/// Direction of an AP/AR balance change.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinancialEntryType {
    ApIncrease,
    ApDecrease,
    ArIncrease,
    ArDecrease,
}

impl FinancialEntryType {
    /// Sign the entry contributes to its party's running balance.
    pub fn sign(&self) -> i64 {
        match self {
            FinancialEntryType::ApIncrease | FinancialEntryType::ArIncrease => 1,
            FinancialEntryType::ApDecrease | FinancialEntryType::ArDecrease => -1,
        }
    }
}

/// One AP/AR balance change. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialLedgerEntry {
    pub id: EntryId,
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub entry_type: FinancialEntryType,
    pub party: PartyRef,
    /// Strictly positive; the entry type carries the sign.
    pub amount: i64,
    pub occurred_at: DateTime<Utc>,
}

impl FinancialLedgerEntry {
    pub fn signed_amount(&self) -> i64 {
        self.entry_type.sign() * self.amount
    }
}

/// Running balance for one party: signed sum of its entries.
pub fn party_balance<'a>(
    party: PartyRef,
    entries: impl IntoIterator<Item = &'a FinancialLedgerEntry>,
) -> i64 {
    entries
        .into_iter()
        .filter(|e| e.party == party)
        .map(|e| e.signed_amount())
        .sum()
}
