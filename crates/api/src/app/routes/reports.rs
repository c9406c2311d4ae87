//! Read-only reporting seams.
//!
//! These routes never write: every number they return is a pure fold over
//! the append-only ledgers, which is exactly what makes them safe to serve
//! without involving the posting engine.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;

use tradebook_core::{AccountId, CustomerId, DocumentId, PartyRef, SupplierId, VariantId};
use tradebook_store::MemStore;

use crate::app::errors::json_error;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/variants/:id/stock", get(variant_stock))
        .route("/accounts/:id/balance", get(account_balance))
        .route("/suppliers/:id/balance", get(supplier_balance))
        .route("/customers/:id/balance", get(customer_balance))
        .route("/documents/:id", get(get_document))
}

async fn variant_stock(
    Extension(store): Extension<MemStore>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let variant_id: VariantId = match id.parse() {
        Ok(v) => v,
        Err(_) => return json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid variant id"),
    };
    let Some(variant) = store.get_variant(tenant.tenant_id(), variant_id).await else {
        return json_error(StatusCode::NOT_FOUND, "not_found", "variant not found");
    };
    let on_hand = store.stock_on_hand(tenant.tenant_id(), variant_id).await;
    (
        StatusCode::OK,
        Json(json!({
            "variant_id": variant_id.to_string(),
            "sku": variant.sku,
            "on_hand": on_hand,
            "avg_cost": variant.avg_cost,
        })),
    )
        .into_response()
}

async fn account_balance(
    Extension(store): Extension<MemStore>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let account_id: AccountId = match id.parse() {
        Ok(v) => v,
        Err(_) => return json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid account id"),
    };
    match store.balance_of_account(tenant.tenant_id(), account_id).await {
        Some(balance) => (
            StatusCode::OK,
            Json(json!({
                "account_id": account_id.to_string(),
                "balance": balance,
            })),
        )
            .into_response(),
        None => json_error(StatusCode::NOT_FOUND, "not_found", "account not found"),
    }
}

async fn supplier_balance(
    Extension(store): Extension<MemStore>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let supplier_id: SupplierId = match id.parse() {
        Ok(v) => v,
        Err(_) => return json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid supplier id"),
    };
    let balance = store
        .balance_of_party(tenant.tenant_id(), PartyRef::Supplier(supplier_id))
        .await;
    (
        StatusCode::OK,
        Json(json!({
            "supplier_id": supplier_id.to_string(),
            "payable": balance,
        })),
    )
        .into_response()
}

async fn customer_balance(
    Extension(store): Extension<MemStore>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let customer_id: CustomerId = match id.parse() {
        Ok(v) => v,
        Err(_) => return json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid customer id"),
    };
    let balance = store
        .balance_of_party(tenant.tenant_id(), PartyRef::Customer(customer_id))
        .await;
    (
        StatusCode::OK,
        Json(json!({
            "customer_id": customer_id.to_string(),
            "receivable": balance,
        })),
    )
        .into_response()
}

async fn get_document(
    Extension(store): Extension<MemStore>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let document_id: DocumentId = match id.parse() {
        Ok(v) => v,
        Err(_) => return json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid document id"),
    };
    match store.get_document(tenant.tenant_id(), document_id).await {
        Some(document) => (StatusCode::OK, Json(document)).into_response(),
        None => json_error(StatusCode::NOT_FOUND, "not_found", "document not found"),
    }
}
