//! HTTP error mapping for the API surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::services::{IngestError, ReviewError, StatusError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("internal error")]
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(e) => {
                error!(error = ?e, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<StatusError> for ApiError {
    fn from(e: StatusError) -> Self {
        match e {
            StatusError::NotFound => Self::NotFound,
            StatusError::Repository(e) => Self::Internal(e.into()),
        }
    }
}

impl From<ReviewError> for ApiError {
    fn from(e: ReviewError) -> Self {
        match e {
            ReviewError::NotFound => Self::NotFound,
            ReviewError::AlreadyApproved | ReviewError::NotReviewed => Self::Conflict(e.to_string()),
            ReviewError::UnsupportedPath(_) | ReviewError::InvalidValue { .. } => {
                Self::BadRequest(e.to_string())
            }
            ReviewError::Repository(e) => Self::Internal(e.into()),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::NotFound => Self::NotFound,
            IngestError::DuplicateJob(_) | IngestError::NotRetriable => {
                Self::Conflict(e.to_string())
            }
            IngestError::Storage(e) => Self::Internal(e.into()),
            IngestError::Repository(e) => Self::Internal(e.into()),
        }
    }
}
