use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};

use tradebook_core::TenantId;

use crate::app::errors::json_error;

/// Tenant context for a request.
///
/// This is immutable and must be present for all domain routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Extract the tenant from `x-tenant-id` and attach it to the request.
///
/// The upstream auth layer is responsible for having authenticated the
/// caller against this tenant; this service only propagates the scope.
pub async fn tenant_middleware(
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let Some(raw) = req.headers().get("x-tenant-id") else {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "missing_tenant",
            "x-tenant-id header is required",
        ));
    };
    let raw = raw.to_str().map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_tenant",
            "x-tenant-id header is not valid UTF-8",
        )
    })?;
    let tenant_id: TenantId = raw.parse().map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_tenant",
            "x-tenant-id header is not a valid id",
        )
    })?;

    req.extensions_mut().insert(TenantContext::new(tenant_id));
    Ok(next.run(req).await)
}
