//! Structured extraction adapter.
//!
//! Sends raw OCR text to a generative extraction capability constrained to
//! a fixed invoice JSON schema and validates what comes back. Retries are
//! the orchestrator's responsibility, never performed here.

mod client;
mod prompts;

pub use client::{LlmConfig, LlmExtractionClient};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{ConfidenceScores, ExtractedData, TokenUsage};

/// Errors from the extraction capability.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("extraction service unreachable: {0}")]
    Connection(String),

    #[error("extraction service error: {0}")]
    Api(String),

    #[error("extraction returned no content")]
    NoContent,

    #[error("extraction response is not valid JSON: {0}")]
    Parse(String),

    #[error("extraction response violates the invoice schema: {0}")]
    Schema(String),
}

/// Result of one successful extraction call.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub fields: ExtractedData,
    pub confidence: ConfidenceScores,
    pub usage: TokenUsage,
}

/// Opaque extraction capability.
#[async_trait]
pub trait ExtractionClient: Send + Sync {
    async fn extract(&self, raw_text: &str) -> Result<ExtractionOutcome, ExtractionError>;
}
