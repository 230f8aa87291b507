//! Invoice endpoint handlers: ingest, snapshot, corrections, approval,
//! manual retry.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::super::{ApiError, AppState};
use super::{require_actor, require_tenant};
use crate::repository::RepositoryError;
use crate::services::{ClientOcr, CorrectionInput};

/// Body of `POST /api/invoices`.
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub filename: String,
    /// Base64-encoded file content.
    pub content: String,
    /// Client-produced OCR text, when the uploader already ran recognition.
    pub ocr_text: Option<String>,
    pub ocr_confidence: Option<u8>,
}

/// `POST /api/invoices` — register an upload and queue it for extraction.
pub async fn ingest_invoice(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<IngestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = require_tenant(&headers)?;
    let content = BASE64
        .decode(request.content.as_bytes())
        .map_err(|_| ApiError::BadRequest("content must be base64".to_string()))?;
    if content.is_empty() {
        return Err(ApiError::BadRequest("content must not be empty".to_string()));
    }

    let client_ocr = request.ocr_text.map(|text| ClientOcr {
        text,
        confidence: request.ocr_confidence.unwrap_or(0),
    });
    let (invoice, job) = state
        .intake
        .register(&tenant_id, &request.filename, &content, client_ocr)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "invoice_id": invoice.id,
            "job_id": job.id,
            "status": invoice.status,
        })),
    ))
}

/// `GET /api/invoices/:invoice_id` — tenant-scoped invoice snapshot.
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = require_tenant(&headers)?;
    let invoice = state
        .db
        .invoices()
        .get_for_tenant(&invoice_id, &tenant_id)
        .map_err(|e| match e {
            RepositoryError::NotFound => ApiError::NotFound,
            other => ApiError::Internal(other.into()),
        })?;
    Ok(Json(invoice))
}

/// Body of `POST /api/invoices/:invoice_id/corrections`.
#[derive(Debug, Deserialize)]
pub struct CorrectionsRequest {
    pub corrections: Vec<CorrectionInput>,
    pub notes: Option<String>,
}

/// `POST /api/invoices/:invoice_id/corrections` — apply reviewer edits.
pub async fn submit_corrections(
    State(state): State<AppState>,
    Path(invoice_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<CorrectionsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = require_tenant(&headers)?;
    let actor = require_actor(&headers)?;
    let applied = state.review.submit_corrections(
        &invoice_id,
        &tenant_id,
        &request.corrections,
        &actor,
        request.notes.as_deref(),
    )?;
    Ok(Json(applied))
}

/// `POST /api/invoices/:invoice_id/approve` — freeze a reviewed invoice.
pub async fn approve_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = require_tenant(&headers)?;
    let actor = require_actor(&headers)?;
    let invoice = state.review.approve(&invoice_id, &tenant_id, &actor)?;
    Ok(Json(json!({
        "invoice_id": invoice.id,
        "status": invoice.status,
        "approved_at": invoice.approved_at,
        "approved_by": invoice.approved_by,
    })))
}

/// `POST /api/jobs/:job_id/retry` — manual retry for a failed job.
pub async fn retry_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = require_tenant(&headers)?;
    if Uuid::parse_str(&job_id).is_err() {
        return Err(ApiError::BadRequest("job id must be a UUID".to_string()));
    }
    let job = state.intake.retry(&job_id, &tenant_id)?;
    Ok(Json(json!({
        "job_id": job.id,
        "status": job.status,
        "retry_count": job.retry_count,
    })))
}
