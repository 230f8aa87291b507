//! Domain models for invoices, extraction results, and processing jobs.

mod correction;
mod extraction;
mod invoice;
mod job;

pub use correction::CorrectionRecord;
pub use extraction::{ConfidenceScores, ExtractedData, Party, TokenUsage};
pub use invoice::{Invoice, InvoiceStatus};
pub use job::{JobStatus, JobSummary, OcrJob, PipelineStep, ProcessingLogEntry, StepStatus};
