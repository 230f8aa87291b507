//! Human corrections to extracted fields, kept for audit and model feedback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One human edit to one extracted field. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionRecord {
    pub invoice_id: String,
    pub tenant_id: String,
    /// Dotted field path, e.g. "seller.nip".
    pub field_name: String,
    pub original_value: Option<String>,
    pub corrected_value: String,
    /// Confidence the pipeline had in the original value.
    pub original_confidence: Option<u8>,
    pub corrected_by: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}
