//! `tradebook-model` — the mutable-until-posted store entities.
//!
//! A [`Document`] and its [`DocumentLine`]s are created as drafts by the
//! draft/validation layer (out of scope here) and mutated exactly once more,
//! by the posting engine, when they flip to `Posted`. After that they are
//! immutable; corrections happen through new compensating documents.

pub mod account;
pub mod document;
pub mod line;
pub mod variant;

pub use account::PaymentAccount;
pub use document::{
    AdjustmentDetails, AllocationRequest, CustomerPaymentDetails, CustomerReturnDetails,
    Document, DocumentRuleViolation, DocumentStatus, DocumentType, DocumentKind,
    PurchaseDetails, SaleDetails, SupplierPaymentDetails, SupplierReturnDetails,
    TransferDetails,
};
pub use line::{AdjustmentDirection, DocumentLine, LineDetail};
pub use variant::ProductVariant;
