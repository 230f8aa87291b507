//! Read-only status projection over jobs and their processing logs.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::{ConfidenceScores, ExtractedData, JobStatus, PipelineStep};
use crate::repository::{Database, InvoiceRepository, JobRepository, RepositoryError};

/// Fixed wall-clock budget for one pipeline run; the completion estimate is
/// an approximation, not a guarantee.
const PROCESSING_BUDGET_SECS: i64 = 30;

#[derive(Debug, Error)]
pub enum StatusError {
    /// Unknown job, or a job belonging to another tenant. Deliberately the
    /// same answer for both, so job existence never leaks across tenants.
    #[error("job not found")]
    NotFound,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Client-facing status payload; shape depends on the job status.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatusPayload {
    Queued {
        job_id: String,
        queue_position: u64,
        created_at: DateTime<Utc>,
    },
    Processing {
        job_id: String,
        current_step: &'static str,
        progress: u8,
        started_at: Option<DateTime<Utc>>,
        estimated_completion: Option<DateTime<Utc>>,
    },
    Completed {
        job_id: String,
        result: JobResult,
        duration_secs: Option<i64>,
    },
    Failed {
        job_id: String,
        error: Option<String>,
        failed_step: Option<&'static str>,
        retry_count: u32,
        max_retries: u32,
        will_retry: bool,
    },
}

/// Full extraction result attached to a completed job.
#[derive(Debug, Serialize)]
pub struct JobResult {
    pub overall_confidence: Option<u8>,
    pub valid: bool,
    pub validation_errors: Vec<String>,
    pub extracted: Option<ExtractedData>,
    pub confidence: Option<ConfidenceScores>,
}

/// Tenant-scoped, read-only job status queries.
pub struct StatusService {
    jobs: JobRepository,
    invoices: InvoiceRepository,
}

impl StatusService {
    pub fn new(db: &Database) -> Self {
        Self {
            jobs: db.jobs(),
            invoices: db.invoices(),
        }
    }

    pub fn job_status(
        &self,
        job_id: &str,
        tenant_id: &str,
    ) -> Result<JobStatusPayload, StatusError> {
        let job = self
            .jobs
            .get_for_tenant(job_id, tenant_id)
            .map_err(|e| match e {
                RepositoryError::NotFound => StatusError::NotFound,
                other => other.into(),
            })?;

        match job.status {
            JobStatus::Queued => Ok(JobStatusPayload::Queued {
                queue_position: self.jobs.queue_position(&job)?,
                job_id: job.id,
                created_at: job.created_at,
            }),
            JobStatus::Processing => {
                // Steps are written in strict order, so the most recent log
                // entry names the current step.
                let current_step = self
                    .jobs
                    .latest_log(&job.id)?
                    .map(|entry| entry.step)
                    .unwrap_or(PipelineStep::Upload);
                Ok(JobStatusPayload::Processing {
                    job_id: job.id,
                    current_step: current_step.as_str(),
                    progress: current_step.progress_percent(),
                    started_at: job.started_at,
                    estimated_completion: job
                        .started_at
                        .map(|t| t + Duration::seconds(PROCESSING_BUDGET_SECS)),
                })
            }
            JobStatus::Completed => {
                let invoice = self.invoices.get(&job.invoice_id)?;
                let summary = job.result_summary.as_ref();
                let result = JobResult {
                    overall_confidence: invoice
                        .overall_confidence
                        .or(summary.map(|s| s.overall_confidence)),
                    valid: summary.map(|s| s.valid).unwrap_or(true),
                    validation_errors: summary
                        .map(|s| s.validation_errors.clone())
                        .unwrap_or_default(),
                    extracted: invoice.extracted,
                    confidence: invoice.confidence,
                };
                let duration_secs = match (job.started_at, job.completed_at) {
                    (Some(started), Some(completed)) => Some((completed - started).num_seconds()),
                    _ => None,
                };
                Ok(JobStatusPayload::Completed {
                    job_id: job.id,
                    result,
                    duration_secs,
                })
            }
            JobStatus::Failed => {
                let will_retry = job.will_retry();
                Ok(JobStatusPayload::Failed {
                    job_id: job.id,
                    error: job.error,
                    failed_step: job.failed_step.map(|s| s.as_str()),
                    retry_count: job.retry_count,
                    max_retries: job.max_retries,
                    will_retry,
                })
            }
        }
    }
}
