//! `tradebook-api` — HTTP surface over the posting engine.
//!
//! One write operation is exposed: "post a document". Everything else is a
//! read-only fold over the ledgers the engine writes. Tenant context comes
//! from the `x-tenant-id` header; the full auth layer lives in front of this
//! service and is out of scope here.

pub mod app;
pub mod context;
