//! Job status endpoint handlers.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use uuid::Uuid;

use super::super::{ApiError, AppState};
use super::require_tenant;
use crate::services::JobStatusPayload;

/// `GET /api/jobs/:job_id/status` — tenant-scoped job status projection.
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<JobStatusPayload>, ApiError> {
    let tenant_id = require_tenant(&headers)?;
    if Uuid::parse_str(&job_id).is_err() {
        return Err(ApiError::BadRequest("job id must be a UUID".to_string()));
    }
    let payload = state.status.job_status(&job_id, &tenant_id)?;
    Ok(Json(payload))
}
