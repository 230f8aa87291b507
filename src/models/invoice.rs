//! Invoice record and lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ConfidenceScores, ExtractedData};

/// Lifecycle status of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    /// Uploaded, waiting for processing.
    Uploaded,
    /// Uploaded together with client-produced OCR text.
    UploadedWithOcr,
    /// An extraction job is running.
    Processing,
    /// Extraction finished and passed validation.
    Extracted,
    /// Extraction finished but needs a human reviewer.
    NeedsReview,
    /// Reviewed and approved; immutable from here on.
    Verified,
    /// Processing failed with no retries remaining.
    Failed,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::UploadedWithOcr => "uploaded_with_ocr",
            Self::Processing => "processing",
            Self::Extracted => "extracted",
            Self::NeedsReview => "needs_review",
            Self::Verified => "verified",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "uploaded" => Some(Self::Uploaded),
            "uploaded_with_ocr" => Some(Self::UploadedWithOcr),
            "processing" => Some(Self::Processing),
            "extracted" => Some(Self::Extracted),
            "needs_review" => Some(Self::NeedsReview),
            "verified" => Some(Self::Verified),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Statuses from which a new processing job may be started.
    pub fn is_processable(&self) -> bool {
        matches!(self, Self::Uploaded | Self::UploadedWithOcr)
    }
}

/// A tenant-owned invoice document record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    /// UUID assigned at upload.
    pub id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Storage key of the original file.
    pub file_ref: String,
    pub status: InvoiceStatus,
    /// Structured fields written by the pipeline, corrected by reviewers.
    pub extracted: Option<ExtractedData>,
    /// Per-field confidence as reported by the extraction capability.
    pub confidence: Option<ConfidenceScores>,
    /// Rounded mean of the per-field scores.
    pub overall_confidence: Option<u8>,
    /// Raw recognized text the extraction ran on.
    pub ocr_text: Option<String>,
    /// Recognition confidence; set at upload time for client-side OCR.
    pub ocr_confidence: Option<u8>,
    /// Validation rule violations from the last pipeline run.
    pub validation_errors: Vec<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Create a fresh invoice record for an uploaded file.
    pub fn new(tenant_id: &str, file_ref: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            file_ref: file_ref.to_string(),
            status: InvoiceStatus::Uploaded,
            extracted: None,
            confidence: None,
            overall_confidence: None,
            ocr_text: None,
            ocr_confidence: None,
            validation_errors: Vec::new(),
            processed_at: None,
            reviewed_at: None,
            reviewed_by: None,
            approved_at: None,
            approved_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach client-produced OCR so the pipeline can skip server-side recognition.
    pub fn with_client_ocr(mut self, text: String, confidence: u8) -> Self {
        self.ocr_text = Some(text);
        self.ocr_confidence = Some(confidence);
        self.status = InvoiceStatus::UploadedWithOcr;
        self
    }

    /// Whether the invoice has been approved and is frozen to edits.
    pub fn is_approved(&self) -> bool {
        self.approved_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            InvoiceStatus::Uploaded,
            InvoiceStatus::UploadedWithOcr,
            InvoiceStatus::Processing,
            InvoiceStatus::Extracted,
            InvoiceStatus::NeedsReview,
            InvoiceStatus::Verified,
            InvoiceStatus::Failed,
        ] {
            assert_eq!(InvoiceStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(InvoiceStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_client_ocr_changes_status() {
        let invoice = Invoice::new("tenant-1", "files/abc.pdf").with_client_ocr("text".into(), 88);
        assert_eq!(invoice.status, InvoiceStatus::UploadedWithOcr);
        assert_eq!(invoice.ocr_confidence, Some(88));
        assert!(invoice.status.is_processable());
    }
}
