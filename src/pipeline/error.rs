//! Pipeline error taxonomy.
//!
//! The orchestrator is the single place where failures are classified as
//! retriable or not; adapters surface raw errors and the worker consults
//! [`PipelineError::is_retriable`] before scheduling another attempt.

use thiserror::Error;

use crate::extraction::ExtractionError;
use crate::ocr::OcrError;
use crate::repository::RepositoryError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The triggering event referenced an invoice that does not exist.
    #[error("invoice {0} not found")]
    InvoiceNotFound(String),

    /// The invoice is not in a state that allows processing; guards against
    /// double-processing already-extracted invoices.
    #[error("invoice {invoice_id} is in state {status} and cannot be processed")]
    InvalidInvoiceState {
        invoice_id: String,
        status: String,
    },

    /// Another queued or processing job already exists for the invoice.
    #[error("invoice {0} already has an active processing job")]
    DuplicateJob(String),

    /// The triggering event referenced a job row that does not exist.
    #[error("job {0} not found")]
    JobNotFound(String),

    /// The job is not in a claimable state; guards against duplicate
    /// trigger deliveries for an already-finished job.
    #[error("job {job_id} is in state {status} and cannot be claimed")]
    InvalidJobState { job_id: String, status: String },

    #[error("recognition failed: {0}")]
    Ocr(#[from] OcrError),

    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("persistence failed: {0}")]
    Repository(#[from] RepositoryError),
}

impl PipelineError {
    /// Whether the runtime should spend retry budget on this failure.
    ///
    /// Bad state, duplicates and missing records never become right on a
    /// retry; adapter and infrastructure failures might.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::InvoiceNotFound(_)
            | Self::InvalidInvoiceState { .. }
            | Self::DuplicateJob(_)
            | Self::JobNotFound(_)
            | Self::InvalidJobState { .. } => false,
            Self::Ocr(_) | Self::Extraction(_) | Self::Storage(_) | Self::Repository(_) => true,
        }
    }
}
