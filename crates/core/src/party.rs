//! Party references.

use serde::{Deserialize, Serialize};

use crate::id::{CustomerId, SupplierId};

/// The counterparty side of a money or balance movement.
///
/// AP balances fold over `Supplier` entries, AR balances over `Customer`
/// entries; the two never mix in one running balance.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyRef {
    Supplier(SupplierId),
    Customer(CustomerId),
}

impl core::fmt::Display for PartyRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PartyRef::Supplier(id) => write!(f, "supplier:{id}"),
            PartyRef::Customer(id) => write!(f, "customer:{id}"),
        }
    }
}
