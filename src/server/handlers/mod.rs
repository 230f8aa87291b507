//! API endpoint handlers.

mod invoices;
mod status;

pub use invoices::{
    approve_invoice, get_invoice, ingest_invoice, retry_job, submit_corrections,
};
pub use status::job_status;

use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;

use super::error::ApiError;

/// Health check endpoint for container orchestration.
pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// Tenant context header, required on every tenant-scoped route.
pub(super) fn require_tenant(headers: &HeaderMap) -> Result<String, ApiError> {
    header_value(headers, "x-tenant-id")
        .ok_or_else(|| ApiError::BadRequest("missing X-Tenant-Id header".to_string()))
}

/// Acting user header, required on mutating review routes.
pub(super) fn require_actor(headers: &HeaderMap) -> Result<String, ApiError> {
    header_value(headers, "x-actor-id")
        .ok_or_else(|| ApiError::BadRequest("missing X-Actor-Id header".to_string()))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
