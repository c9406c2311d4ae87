//! Payment accounts.

use serde::{Deserialize, Serialize};

use tradebook_core::{AccountId, TenantId};

/// A cash/bank/wallet account money moves through.
///
/// Balance is not stored: it is `opening_balance` plus the signed fold of
/// cash ledger entries, so statements stay a pure aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAccount {
    pub id: AccountId,
    pub tenant_id: TenantId,
    pub name: String,
    pub active: bool,
    /// Balance before the first ledger entry, smallest currency unit.
    pub opening_balance: i64,
}
