//! `tradebook-store` — the transactional boundary the posting engine writes
//! through.
//!
//! The engine's correctness contract (see `tradebook-posting`) leans
//! entirely on the store providing **serializable multi-statement
//! transactions**: every `post` call runs inside one [`PostingTx`] unit of
//! work, nothing a failed posting wrote is ever visible, and two postings
//! racing on the same weighted-average snapshot must end with one of them
//! aborted, never a silently corrupted average.
//!
//! Two implementations are provided:
//!
//! - [`MemStore`]: exclusive-lock in-memory store. One open transaction holds
//!   the whole state for its lifetime, which is strictly serializable by
//!   construction. Used by tests, local dev, and the api's in-memory mode.
//! - [`PgStore`]: PostgreSQL via sqlx, `ISOLATION LEVEL SERIALIZABLE`, with
//!   SQLSTATE 40001 surfaced as the retryable [`StoreError::Serialization`].

pub mod error;
pub mod memory;
pub mod postgres;
pub mod tx;

pub use error::StoreError;
pub use memory::MemStore;
pub use postgres::PgStore;
pub use tx::{LedgerStore, PostingTx};
