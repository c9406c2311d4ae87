use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use tradebook_posting::PostingError;

/// Map an engine error onto the HTTP taxonomy.
///
/// `Conflict` responses carry a `retryable` flag: a serialization conflict
/// is worth retrying with the same idempotency key, a key collision is not.
/// `Unprocessable` responses carry the full structured reason (e.g. the
/// complete shortfall list) so the caller can correct in one round trip.
pub fn posting_error_to_response(err: PostingError) -> axum::response::Response {
    match err {
        PostingError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        PostingError::InvalidState(msg) => json_error(StatusCode::CONFLICT, "invalid_state", msg),
        PostingError::Conflict { message, retryable } => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": "conflict",
                "message": message,
                "retryable": retryable,
            })),
        )
            .into_response(),
        PostingError::InvalidArgument(msg) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_argument", msg)
        }
        PostingError::Unprocessable(reason) => {
            let detail = serde_json::to_value(&reason).unwrap_or_default();
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({
                    "error": "unprocessable",
                    "message": reason.to_string(),
                    "detail": detail,
                })),
            )
                .into_response()
        }
        PostingError::Storage(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
