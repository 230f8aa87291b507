//! Upload registration: store the file, create the invoice and its job,
//! and hand the trigger to the processing worker.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::models::{
    Invoice, InvoiceStatus, OcrJob, PipelineStep, ProcessingLogEntry, StepStatus,
};
use crate::pipeline::{EventBus, InvoiceUploaded};
use crate::repository::{Database, InvoiceRepository, JobRepository, RepositoryError};
use crate::storage::{FileStore, StorageError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invoice {0} already has an active processing job")]
    DuplicateJob(String),

    #[error("job not found")]
    NotFound,

    #[error("only failed jobs can be retried manually")]
    NotRetriable,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for IngestError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::DuplicateActiveJob(invoice_id) => Self::DuplicateJob(invoice_id),
            other => Self::Repository(other),
        }
    }
}

/// Client-produced OCR shipped along with an upload.
#[derive(Debug, Clone)]
pub struct ClientOcr {
    pub text: String,
    pub confidence: u8,
}

/// Registers uploads and enqueues processing jobs.
pub struct IngestService {
    invoices: InvoiceRepository,
    jobs: JobRepository,
    store: Arc<dyn FileStore>,
    bus: EventBus,
    max_retries: u32,
}

impl IngestService {
    pub fn new(db: &Database, store: Arc<dyn FileStore>, bus: EventBus, max_retries: u32) -> Self {
        Self {
            invoices: db.invoices(),
            jobs: db.jobs(),
            store,
            bus,
            max_retries,
        }
    }

    /// Register an uploaded document and queue it for extraction.
    pub async fn register(
        &self,
        tenant_id: &str,
        filename: &str,
        content: &[u8],
        client_ocr: Option<ClientOcr>,
    ) -> Result<(Invoice, OcrJob), IngestError> {
        let extension = filename.rsplit_once('.').map(|(_, e)| e).unwrap_or("bin");
        let file_ref = self.store.put(content, extension).await?;

        let mut invoice = Invoice::new(tenant_id, &file_ref);
        if let Some(ocr) = client_ocr {
            invoice = invoice.with_client_ocr(ocr.text, ocr.confidence.min(100));
        }
        self.invoices.insert(&invoice)?;

        let job = self.enqueue(&invoice)?;
        info!(
            invoice_id = %invoice.id,
            job_id = %job.id,
            tenant_id,
            status = invoice.status.as_str(),
            "invoice registered"
        );
        Ok((invoice, job))
    }

    /// Create the queued job for an invoice and emit the uploaded trigger.
    /// The store's unique index is what actually rejects duplicates.
    fn enqueue(&self, invoice: &Invoice) -> Result<OcrJob, IngestError> {
        let job = OcrJob::new(&invoice.id, &invoice.tenant_id, self.max_retries);
        self.jobs.create(&job)?;

        // First log entry: the upload itself is complete by the time the
        // job row exists.
        self.jobs.append_log(&ProcessingLogEntry {
            job_id: job.id.clone(),
            tenant_id: job.tenant_id.clone(),
            step: PipelineStep::Upload,
            status: StepStatus::Completed,
            metadata: json!({ "file_ref": invoice.file_ref }),
            created_at: Utc::now(),
        })?;

        self.bus.trigger(InvoiceUploaded {
            invoice_id: invoice.id.clone(),
            tenant_id: invoice.tenant_id.clone(),
            file_ref: invoice.file_ref.clone(),
            job_id: job.id.clone(),
        });
        Ok(job)
    }

    /// Manually retry a failed job whose automatic budget ran out.
    pub fn retry(&self, job_id: &str, tenant_id: &str) -> Result<OcrJob, IngestError> {
        let job = self
            .jobs
            .get_for_tenant(job_id, tenant_id)
            .map_err(|e| match e {
                RepositoryError::NotFound => IngestError::NotFound,
                other => other.into(),
            })?;
        if job.status != crate::models::JobStatus::Failed {
            return Err(IngestError::NotRetriable);
        }
        let invoice = self.invoices.get(&job.invoice_id)?;
        if matches!(
            invoice.status,
            InvoiceStatus::Extracted | InvoiceStatus::NeedsReview | InvoiceStatus::Verified
        ) {
            // A later job already produced a result; nothing to redo.
            return Err(IngestError::NotRetriable);
        }

        self.jobs.requeue_manual(&job.id)?;
        // The invoice may have been marked failed when retries ran out.
        self.invoices
            .set_status(&job.invoice_id, InvoiceStatus::Processing)?;
        self.bus.trigger(InvoiceUploaded {
            invoice_id: invoice.id.clone(),
            tenant_id: invoice.tenant_id.clone(),
            file_ref: invoice.file_ref.clone(),
            job_id: job.id.clone(),
        });
        info!(job_id = %job.id, invoice_id = %invoice.id, "manual retry queued");
        self.jobs.get(&job.id).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalFileStore;

    fn setup() -> (tempfile::TempDir, Database, IngestService) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        let store = Arc::new(LocalFileStore::new(&dir.path().join("files"), 300));
        let (bus, _rx) = EventBus::new();
        let service = IngestService::new(&db, store, bus, 3);
        (dir, db, service)
    }

    #[tokio::test]
    async fn test_register_creates_invoice_job_and_log() {
        let (_dir, db, service) = setup();
        let (invoice, job) = service
            .register("tenant-1", "scan.pdf", b"%PDF-1.7 x", None)
            .await
            .unwrap();

        assert_eq!(invoice.status, InvoiceStatus::Uploaded);
        assert!(invoice.file_ref.ends_with(".pdf"));
        assert_eq!(job.status, crate::models::JobStatus::Queued);
        assert_eq!(job.max_retries, 3);

        let logs = db.jobs().logs_for_job(&job.id).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].step, PipelineStep::Upload);
        assert_eq!(logs[0].status, StepStatus::Completed);
    }

    #[tokio::test]
    async fn test_register_with_client_ocr() {
        let (_dir, db, service) = setup();
        let (invoice, _job) = service
            .register(
                "tenant-1",
                "scan.png",
                b"\x89PNG\r\n\x1a\n",
                Some(ClientOcr {
                    text: "Faktura VAT".into(),
                    confidence: 83,
                }),
            )
            .await
            .unwrap();

        assert_eq!(invoice.status, InvoiceStatus::UploadedWithOcr);
        let loaded = db.invoices().get(&invoice.id).unwrap();
        assert_eq!(loaded.ocr_text.as_deref(), Some("Faktura VAT"));
        assert_eq!(loaded.ocr_confidence, Some(83));
    }

    #[tokio::test]
    async fn test_retry_rejects_active_job() {
        let (_dir, _db, service) = setup();
        let (_invoice, job) = service
            .register("tenant-1", "scan.pdf", b"%PDF-1.7 x", None)
            .await
            .unwrap();

        // Still queued, not failed.
        let err = service.retry(&job.id, "tenant-1").unwrap_err();
        assert!(matches!(err, IngestError::NotRetriable));
    }

    #[tokio::test]
    async fn test_retry_requeues_failed_job() {
        let (_dir, db, service) = setup();
        let (invoice, job) = service
            .register("tenant-1", "scan.pdf", b"%PDF-1.7 x", None)
            .await
            .unwrap();
        db.jobs().mark_processing(&job.id, Utc::now()).unwrap();
        db.jobs()
            .mark_failed(&job.id, Utc::now(), "boom", Some(PipelineStep::Ocr))
            .unwrap();
        db.invoices()
            .set_status(&invoice.id, InvoiceStatus::Failed)
            .unwrap();

        let requeued = service.retry(&job.id, "tenant-1").unwrap();
        assert_eq!(requeued.status, crate::models::JobStatus::Queued);
        let reloaded = db.invoices().get(&invoice.id).unwrap();
        assert_eq!(reloaded.status, InvoiceStatus::Processing);
    }
}
