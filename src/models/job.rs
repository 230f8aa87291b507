//! OCR job state machine types and the append-only processing log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of one asynchronous processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Queued and processing jobs block new jobs for the same invoice.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Processing)
    }
}

/// Pipeline steps, logged individually as the orchestrator advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Upload,
    Preprocess,
    Ocr,
    AiExtract,
    Validate,
    Save,
}

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Preprocess => "preprocess",
            Self::Ocr => "ocr",
            Self::AiExtract => "ai_extract",
            Self::Validate => "validate",
            Self::Save => "save",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "upload" => Some(Self::Upload),
            "preprocess" => Some(Self::Preprocess),
            "ocr" => Some(Self::Ocr),
            "ai_extract" => Some(Self::AiExtract),
            "validate" => Some(Self::Validate),
            "save" => Some(Self::Save),
            _ => None,
        }
    }

    /// Fixed progress percentage shown while this step is the most recent one.
    pub fn progress_percent(&self) -> u8 {
        match self {
            Self::Upload => 10,
            Self::Preprocess => 20,
            Self::Ocr => 50,
            Self::AiExtract => 80,
            Self::Validate => 90,
            Self::Save => 95,
        }
    }
}

/// Outcome of one logged step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Started,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "started" => Some(Self::Started),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Small result summary stored on a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub overall_confidence: u8,
    pub valid: bool,
    pub validation_errors: Vec<String>,
}

/// One asynchronous processing attempt for an invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrJob {
    pub id: String,
    pub invoice_id: String,
    pub tenant_id: String,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub failed_step: Option<PipelineStep>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub result_summary: Option<JobSummary>,
    pub created_at: DateTime<Utc>,
}

impl OcrJob {
    /// Create a queued job for an invoice.
    pub fn new(invoice_id: &str, tenant_id: &str, max_retries: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            invoice_id: invoice_id.to_string(),
            tenant_id: tenant_id.to_string(),
            status: JobStatus::Queued,
            started_at: None,
            completed_at: None,
            error: None,
            failed_step: None,
            retry_count: 0,
            max_retries,
            result_summary: None,
            created_at: Utc::now(),
        }
    }

    /// Whether the runtime will retry this job after a failure.
    pub fn will_retry(&self) -> bool {
        self.status == JobStatus::Failed && self.retry_count < self.max_retries
    }
}

/// Immutable record of one pipeline step transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingLogEntry {
    pub job_id: String,
    pub tenant_id: String,
    pub step: PipelineStep,
    pub status: StepStatus,
    /// Step-specific details: OCR source tag, token usage, error message.
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
