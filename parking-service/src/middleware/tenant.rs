//! Tenant context middleware for multi-tenancy support.
//!
//! Extracts the tenant and acting operator from request headers. These
//! headers are set by the auth middleware after authenticating the caller
//! and validating their tenant membership; all database access is scoped by
//! the extracted tenant id, never by ambient state.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

/// Tenant context extracted from request headers.
#[derive(Debug, Clone)]
pub struct TenantContext {
    /// Tenant whose data this request may touch.
    pub tenant_id: Uuid,
    /// Operator making the request (optional for back-office calls).
    pub operator_id: Option<Uuid>,
}

impl TenantContext {
    pub fn new(tenant_id: Uuid, operator_id: Option<Uuid>) -> Self {
        Self {
            tenant_id,
            operator_id,
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = parts
            .headers
            .get("X-Tenant-ID")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::bad_request("Missing X-Tenant-ID header"))
            .and_then(|raw| {
                Uuid::parse_str(raw)
                    .map_err(|_| AppError::bad_request("Invalid X-Tenant-ID header"))
            })?;

        let operator_id = parts
            .headers
            .get("X-Operator-ID")
            .and_then(|v| v.to_str().ok())
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|_| AppError::bad_request("Invalid X-Operator-ID header"))?;

        // Add to tracing span for observability
        let span = tracing::Span::current();
        span.record("tenant_id", tenant_id.to_string().as_str());
        if let Some(ref op) = operator_id {
            span.record("operator_id", op.to_string().as_str());
        }

        Ok(TenantContext::new(tenant_id, operator_id))
    }
}
