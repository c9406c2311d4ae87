use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use tradebook_core::{AccountId, DocumentId};
use tradebook_posting::{PostRequest, PostingEngine};
use tradebook_store::LedgerStore;

use crate::app::{dto, errors};
use crate::context::TenantContext;

/// How many times a posting is re-driven through a serialization conflict
/// before the conflict is handed back to the caller.
const POST_RETRY_ATTEMPTS: u32 = 3;

pub fn router<S>() -> Router
where
    S: LedgerStore + 'static,
{
    Router::new().route("/documents/:id/post", post(post_document::<S>))
}

async fn post_document<S>(
    Extension(engine): Extension<Arc<PostingEngine<S>>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::PostDocumentRequest>,
) -> axum::response::Response
where
    S: LedgerStore + 'static,
{
    let document_id: DocumentId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid document id")
        }
    };

    let mut request = PostRequest::new(document_id, body.idempotency_key);
    request.settlement_amount = body.settlement_amount;
    if let Some(raw) = body.settlement_account_id {
        match raw.parse::<AccountId>() {
            Ok(account_id) => request.settlement_account_id = Some(account_id),
            Err(_) => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_id",
                    "invalid settlement_account_id",
                )
            }
        }
    }

    match engine
        .post_with_retry(tenant.tenant_id(), request, POST_RETRY_ATTEMPTS)
        .await
    {
        Ok(posted) => (StatusCode::OK, Json(posted)).into_response(),
        Err(e) => errors::posting_error_to_response(e),
    }
}
