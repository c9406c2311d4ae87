use serde::Deserialize;

/// Body of `POST /documents/:id/post`.
#[derive(Debug, Clone, Deserialize)]
pub struct PostDocumentRequest {
    /// Required, opaque. Retries must re-send the same key.
    pub idempotency_key: String,
    /// `paid_now`/`received_now` for purchase/sale postings.
    #[serde(default)]
    pub settlement_amount: Option<i64>,
    #[serde(default)]
    pub settlement_account_id: Option<String>,
}
