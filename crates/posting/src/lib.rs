//! `tradebook-posting` — the posting engine.
//!
//! The engine is the only component that turns a mutable draft [`Document`]
//! into immutable ledger rows. One `post` call runs entirely inside one
//! serializable store transaction: it validates state and business rules,
//! assigns the document number, flips the document to `Posted`, and writes
//! the inventory/financial/cash/allocation rows — all or nothing.
//!
//! Correctness under concurrency is delegated to the store's serializable
//! isolation (see `tradebook-store`): two postings racing on the same
//! weighted-average snapshot or the same number series end with one of them
//! receiving a retryable [`PostingError::Conflict`], never corrupted state.
//! Callers retry with the **same** idempotency key; the replay path then
//! returns the already-posted result without writing a second set of rows.
//!
//! [`Document`]: tradebook_model::Document

pub mod average;
pub mod engine;
pub mod error;
pub mod number;

pub use engine::{PostRequest, PostedDocument, PostingEngine};
pub use error::{PostingError, StockShortfall, UnprocessableReason};
