//! Posting error taxonomy.
//!
//! Every failure aborts the whole in-flight transaction; no ledger row from
//! a failed posting is ever visible. Only `Conflict { retryable: true }` is
//! worth retrying with unchanged input (same idempotency key); every other
//! kind requires the caller to correct something first, and carries the ids
//! and amounts needed to do that in one round trip.

use serde::Serialize;
use thiserror::Error;

use tradebook_core::{AccountId, DocumentId, LineId, VariantId};
use tradebook_store::StoreError;

/// One line the stock check could not satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockShortfall {
    pub line_id: LineId,
    pub variant_id: VariantId,
    /// Remaining availability after earlier lines of the same document.
    pub available: i64,
    pub required: i64,
}

/// A business-rule violation against current ledger state.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum UnprocessableReason {
    /// The complete list of failing lines, never just the first one.
    #[error("insufficient stock on {} line(s)", .shortfalls.len())]
    InsufficientStock { shortfalls: Vec<StockShortfall> },

    #[error("payment account {account_id} is inactive")]
    InactiveAccount { account_id: AccountId },

    #[error(
        "return of {requested} against line {source_line_id} exceeds its quantity \
         ({already_returned} of {original_quantity} already returned)"
    )]
    OverReturn {
        line_id: LineId,
        source_line_id: LineId,
        original_quantity: i64,
        already_returned: i64,
        requested: i64,
    },

    #[error("return line {line_id} does not match its source line: {detail}")]
    ReturnSourceInvalid {
        line_id: LineId,
        source_line_id: LineId,
        detail: String,
    },

    #[error("allocations total {allocated} exceeds payment amount {payment_amount}")]
    AllocationExceedsPayment { allocated: i64, payment_amount: i64 },

    #[error("allocation target {invoice_id} is not a posted invoice of this tenant")]
    AllocationTargetInvalid { invoice_id: DocumentId },

    #[error("allocation target {invoice_id} belongs to a different party")]
    AllocationPartyMismatch { invoice_id: DocumentId },

    #[error(
        "allocation of {amount} exceeds outstanding balance {outstanding} \
         of invoice {invoice_id}"
    )]
    AllocationExceedsInvoiceBalance {
        invoice_id: DocumentId,
        amount: i64,
        outstanding: i64,
    },
}

/// Typed failure of one `post` call.
#[derive(Debug, Error)]
pub enum PostingError {
    /// Document, or a referenced account, absent within the tenant.
    #[error("not found: {0}")]
    NotFound(String),

    /// The document is in a state that cannot be posted.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Idempotency-key collision, or a serialization conflict detected by
    /// the store at commit. Only the latter is retryable.
    #[error("conflict: {message}")]
    Conflict { message: String, retryable: bool },

    /// The request or the document's own arithmetic is wrong.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The document is well-formed but current ledger state forbids it.
    #[error("unprocessable: {0}")]
    Unprocessable(UnprocessableReason),

    /// Non-retryable storage failure, propagated unchanged.
    #[error(transparent)]
    Storage(StoreError),
}

impl PostingError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict {
            message: msg.into(),
            retryable: false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { retryable: true, .. })
    }
}

impl From<StoreError> for PostingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Serialization(msg) => Self::Conflict {
                message: format!("serialization conflict, retry with the same idempotency key: {msg}"),
                retryable: true,
            },
            other => Self::Storage(other),
        }
    }
}
