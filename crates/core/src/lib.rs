//! `tradebook-core` — identifiers and arithmetic shared by every layer.
//!
//! This crate contains **pure domain** primitives (no storage or transport
//! concerns): the strongly-typed ids that scope every row to a tenant, and
//! the integer rounding rule the weighted-average cost formula depends on.

pub mod id;
pub mod money;
pub mod party;

pub use id::{
    AccountId, CustomerId, DocumentId, EntryId, InvalidId, LineId, SupplierId, TenantId, VariantId,
};
pub use money::div_round;
pub use party::PartyRef;
