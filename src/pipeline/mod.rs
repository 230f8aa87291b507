//! Asynchronous OCR/AI extraction pipeline.
//!
//! The orchestrator drives one job through its steps (recognize, extract,
//! validate, save), writes the processing log, and owns every job state
//! transition. It performs no internal retries: failures are classified and
//! the worker decides whether to schedule another attempt.

mod confidence;
mod error;
mod events;
mod validation;
mod worker;

pub use confidence::{
    overall_confidence, requires_review, CRITICAL_FIELD_FLOOR, DEFAULT_REVIEW_THRESHOLD,
};
pub use error::PipelineError;
pub use events::{EventBus, InvoiceUploaded, JobEvent};
pub use validation::{validate, ValidationReport};
pub use worker::Worker;

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::extraction::{ExtractionClient, ExtractionOutcome};
use crate::models::{
    Invoice, InvoiceStatus, JobStatus, JobSummary, OcrJob, PipelineStep, ProcessingLogEntry,
    StepStatus,
};
use crate::ocr::{OcrSource, RecognizedText, TextRecognizer};
use crate::repository::{Database, InvoiceRepository, JobRepository, RepositoryError};
use crate::storage::FileStore;

/// Drives queued jobs to completion or failure.
pub struct Orchestrator {
    invoices: InvoiceRepository,
    jobs: JobRepository,
    store: Arc<dyn FileStore>,
    recognizer: Arc<dyn TextRecognizer>,
    extractor: Arc<dyn ExtractionClient>,
    bus: EventBus,
    review_threshold: u8,
}

impl Orchestrator {
    pub fn new(
        db: &Database,
        store: Arc<dyn FileStore>,
        recognizer: Arc<dyn TextRecognizer>,
        extractor: Arc<dyn ExtractionClient>,
        bus: EventBus,
        review_threshold: u8,
    ) -> Self {
        Self {
            invoices: db.invoices(),
            jobs: db.jobs(),
            store,
            recognizer,
            extractor,
            bus,
            review_threshold,
        }
    }

    /// Process one uploaded-invoice trigger to a terminal job state.
    pub async fn process(&self, event: &InvoiceUploaded) -> Result<(), PipelineError> {
        let (invoice, job) = match self.initialize(event).await {
            Ok(pair) => pair,
            Err(err) => {
                // Release the active-job slot so the invoice is not blocked
                // forever; non-retriable errors also burn the retry budget
                // so the status projection shows no pending retry.
                if let Ok(job) = self.jobs.get(&event.job_id) {
                    if job.status.is_active() {
                        let _ = self
                            .jobs
                            .mark_failed(&job.id, Utc::now(), &err.to_string(), None);
                        if !err.is_retriable() {
                            let _ = self.jobs.exhaust_retries(&job.id);
                        }
                    }
                }
                let will_retry = err.is_retriable()
                    && self
                        .jobs
                        .get(&event.job_id)
                        .map(|j| j.will_retry())
                        .unwrap_or(false);
                self.bus.notify(JobEvent::Failed {
                    job_id: event.job_id.clone(),
                    invoice_id: event.invoice_id.clone(),
                    tenant_id: event.tenant_id.clone(),
                    error: err.to_string(),
                    will_retry,
                });
                return Err(err);
            }
        };

        let runner = StepRunner::new(self.jobs.clone(), job.id.clone(), job.tenant_id.clone());
        match self.run_steps(&invoice, &job, &runner).await {
            Ok(summary) => {
                info!(
                    job_id = %job.id,
                    invoice_id = %invoice.id,
                    overall_confidence = summary.overall_confidence,
                    valid = summary.valid,
                    "job completed"
                );
                self.bus.notify(JobEvent::Completed {
                    job_id: job.id.clone(),
                    invoice_id: invoice.id.clone(),
                    tenant_id: job.tenant_id.clone(),
                });
                Ok(())
            }
            Err((step, err)) => {
                self.jobs
                    .mark_failed(&job.id, Utc::now(), &err.to_string(), Some(step))?;
                let failed = self.jobs.get(&job.id)?;
                self.bus.notify(JobEvent::Failed {
                    job_id: job.id.clone(),
                    invoice_id: invoice.id.clone(),
                    tenant_id: job.tenant_id.clone(),
                    error: err.to_string(),
                    will_retry: err.is_retriable() && failed.will_retry(),
                });
                Err(err)
            }
        }
    }

    /// Load and guard the invoice, claim the queued job, move both to
    /// their processing states.
    async fn initialize(
        &self,
        event: &InvoiceUploaded,
    ) -> Result<(Invoice, OcrJob), PipelineError> {
        let invoice = self.invoices.get(&event.invoice_id).map_err(|e| match e {
            RepositoryError::NotFound => PipelineError::InvoiceNotFound(event.invoice_id.clone()),
            other => other.into(),
        })?;

        let job = self.jobs.get(&event.job_id).map_err(|e| match e {
            RepositoryError::NotFound => PipelineError::JobNotFound(event.job_id.clone()),
            other => other.into(),
        })?;

        if job.status != JobStatus::Queued {
            return Err(PipelineError::InvalidJobState {
                job_id: job.id.clone(),
                status: job.status.as_str().to_string(),
            });
        }

        // Duplicate-submission guard: the single active job for this
        // invoice must be the one we were triggered for.
        match self.jobs.find_active_for_invoice(&invoice.id)? {
            Some(active) if active.id == job.id => {}
            Some(_) => return Err(PipelineError::DuplicateJob(invoice.id.clone())),
            None => {
                return Err(PipelineError::InvalidJobState {
                    job_id: job.id.clone(),
                    status: job.status.as_str().to_string(),
                })
            }
        }

        // Double-processing guard: fresh uploads only, or an invoice left
        // in PROCESSING by an earlier attempt of a requeued job.
        let retrying = invoice.status == InvoiceStatus::Processing;
        if !invoice.status.is_processable() && !retrying {
            return Err(PipelineError::InvalidInvoiceState {
                invoice_id: invoice.id.clone(),
                status: invoice.status.as_str().to_string(),
            });
        }

        self.jobs.mark_processing(&job.id, Utc::now())?;
        self.invoices
            .set_status(&invoice.id, InvoiceStatus::Processing)?;
        Ok((invoice, job))
    }

    async fn run_steps(
        &self,
        invoice: &Invoice,
        job: &OcrJob,
        runner: &StepRunner,
    ) -> Result<JobSummary, (PipelineStep, PipelineError)> {
        let (recognized, _) = runner
            .run(PipelineStep::Ocr, self.recognize(invoice), |(text, source)| {
                json!({
                    "source": source.as_str(),
                    "confidence": text.confidence,
                    "characters": text.text.len(),
                })
            })
            .await
            .map_err(|e| (PipelineStep::Ocr, e))?;

        let outcome = runner
            .run(
                PipelineStep::AiExtract,
                async {
                    self.extractor
                        .extract(&recognized.text)
                        .await
                        .map_err(PipelineError::from)
                },
                |o: &ExtractionOutcome| json!({ "usage": o.usage }),
            )
            .await
            .map_err(|e| (PipelineStep::AiExtract, e))?;

        let report = runner
            .run(
                PipelineStep::Validate,
                async { Ok(validation::validate(&outcome.fields)) },
                |r: &ValidationReport| json!({ "valid": r.valid, "errors": r.errors }),
            )
            .await
            .map_err(|e| (PipelineStep::Validate, e))?;

        let summary = runner
            .run(
                PipelineStep::Save,
                self.save(invoice, job, &recognized, &outcome, &report),
                |s: &JobSummary| {
                    json!({
                        "overall_confidence": s.overall_confidence,
                        "valid": s.valid,
                    })
                },
            )
            .await
            .map_err(|e| (PipelineStep::Save, e))?;

        Ok(summary)
    }

    /// Use client-supplied OCR when present, otherwise download the file
    /// through a short-lived reference and run server-side recognition.
    async fn recognize(
        &self,
        invoice: &Invoice,
    ) -> Result<(RecognizedText, OcrSource), PipelineError> {
        if let Some(text) = &invoice.ocr_text {
            return Ok((
                RecognizedText {
                    text: text.clone(),
                    confidence: invoice.ocr_confidence.unwrap_or(0),
                },
                OcrSource::ClientSide,
            ));
        }
        let url = self.store.download_url(&invoice.file_ref).await?;
        let bytes = self.store.fetch(&url).await?;
        let recognized = self.recognizer.recognize(&bytes).await?;
        Ok((recognized, OcrSource::ServerSide))
    }

    /// Write the pipeline result onto the invoice and close out the job.
    async fn save(
        &self,
        invoice: &Invoice,
        job: &OcrJob,
        recognized: &RecognizedText,
        outcome: &ExtractionOutcome,
        report: &ValidationReport,
    ) -> Result<JobSummary, PipelineError> {
        let overall = confidence::overall_confidence(&outcome.confidence);
        let needs_review = !report.valid
            || confidence::requires_review(overall, &outcome.confidence, self.review_threshold);
        let status = if needs_review {
            InvoiceStatus::NeedsReview
        } else {
            InvoiceStatus::Extracted
        };

        self.invoices.save_extraction(
            &invoice.id,
            &outcome.fields,
            &outcome.confidence,
            overall,
            &recognized.text,
            &report.errors,
            status,
            Utc::now(),
        )?;

        let summary = JobSummary {
            overall_confidence: overall,
            valid: report.valid,
            validation_errors: report.errors.clone(),
        };
        self.jobs.mark_completed(&job.id, Utc::now(), &summary)?;
        Ok(summary)
    }
}

/// Generic step executor: writes a STARTED entry, runs the operation, then
/// writes COMPLETED with caller-supplied metadata or FAILED with the error.
/// Keeps the logging boilerplate out of the individual steps.
struct StepRunner {
    jobs: JobRepository,
    job_id: String,
    tenant_id: String,
}

impl StepRunner {
    fn new(jobs: JobRepository, job_id: String, tenant_id: String) -> Self {
        Self {
            jobs,
            job_id,
            tenant_id,
        }
    }

    async fn run<T, F, M>(
        &self,
        step: PipelineStep,
        operation: F,
        metadata: M,
    ) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, PipelineError>>,
        M: FnOnce(&T) -> serde_json::Value,
    {
        self.append(step, StepStatus::Started, json!({}))?;
        match operation.await {
            Ok(value) => {
                self.append(step, StepStatus::Completed, metadata(&value))?;
                Ok(value)
            }
            Err(err) => {
                self.append(step, StepStatus::Failed, json!({ "error": err.to_string() }))?;
                Err(err)
            }
        }
    }

    fn append(
        &self,
        step: PipelineStep,
        status: StepStatus,
        metadata: serde_json::Value,
    ) -> Result<(), PipelineError> {
        self.jobs
            .append_log(&ProcessingLogEntry {
                job_id: self.job_id.clone(),
                tenant_id: self.tenant_id.clone(),
                step,
                status,
                metadata,
                created_at: Utc::now(),
            })
            .map_err(Into::into)
    }
}
