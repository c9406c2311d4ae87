pub mod dto;
pub mod errors;
pub mod routes;

use std::sync::Arc;

use axum::{http::StatusCode, middleware, response::IntoResponse, routing::get, Extension, Router};

use tradebook_posting::PostingEngine;
use tradebook_store::{MemStore, PgStore};

use crate::context;

/// In-memory application: posting plus the read-only reporting routes.
///
/// Used by tests and local development; state lives for the process only.
pub fn build_app(store: MemStore) -> Router {
    let engine = Arc::new(PostingEngine::new(store.clone()));
    Router::new()
        .merge(routes::documents::router::<MemStore>())
        .merge(routes::reports::router())
        .layer(middleware::from_fn(context::tenant_middleware))
        .layer(Extension(engine))
        .layer(Extension(store))
        .route("/health", get(health))
}

/// Postgres-backed application: the posting surface only. Reporting reads
/// are served by the (out-of-scope) read layer directly against the ledgers.
pub fn build_pg_app(store: PgStore) -> Router {
    let engine = Arc::new(PostingEngine::new(store));
    Router::new()
        .merge(routes::documents::router::<PgStore>())
        .layer(middleware::from_fn(context::tenant_middleware))
        .layer(Extension(engine))
        .route("/health", get(health))
}

async fn health() -> axum::response::Response {
    (StatusCode::OK, "ok").into_response()
}
