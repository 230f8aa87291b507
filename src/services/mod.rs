//! Application services consumed by the HTTP handlers and the CLI.

mod ingest;
mod review;
mod status;

pub use ingest::{ClientOcr, IngestError, IngestService};
pub use review::{AppliedCorrections, CorrectionInput, ReviewError, ReviewService};
pub use status::{JobResult, JobStatusPayload, StatusError, StatusService};
