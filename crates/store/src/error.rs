//! Store operation errors.

use thiserror::Error;

/// Infrastructure-level store failure.
///
/// Keep this focused on storage concerns; business/domain failures belong to
/// the posting layer's own taxonomy.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store detected a serialization conflict (or an equivalent
    /// unique-constraint race at commit). Retryable: re-run the unit of work
    /// with the same inputs.
    #[error("serialization conflict: {0}")]
    Serialization(String),

    /// A write referenced a row owned by a different tenant.
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    /// Any other backend failure (connection, decode, constraint).
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Whether re-running the unit of work with unchanged inputs can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Serialization(_))
    }
}
