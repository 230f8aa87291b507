//! Correction ledger and approval workflow.
//!
//! Reviewers fix extracted fields on not-yet-approved invoices; every edit
//! is recorded as an immutable correction for audit and model feedback.
//! Approval is a separate operation gated on the review stamp.

use chrono::Utc;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

use crate::models::{CorrectionRecord, ExtractedData, Invoice};
use crate::repository::{CorrectionRepository, Database, InvoiceRepository, RepositoryError};

#[derive(Debug, Error)]
pub enum ReviewError {
    /// Unknown invoice, or an invoice owned by another tenant.
    #[error("invoice not found")]
    NotFound,

    #[error("invoice is already approved and cannot be changed")]
    AlreadyApproved,

    #[error("invoice has not been reviewed yet")]
    NotReviewed,

    /// Correction paths deeper than two levels are rejected outright
    /// rather than silently dropped.
    #[error("unsupported correction path: {0}")]
    UnsupportedPath(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// One correction as submitted by a reviewer.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CorrectionInput {
    /// Dotted field path, e.g. "invoice_number" or "seller.nip".
    pub field_name: String,
    pub corrected_value: String,
    pub original_value: Option<String>,
}

/// Result of a correction submission.
#[derive(Debug, serde::Serialize)]
pub struct AppliedCorrections {
    pub applied: usize,
    pub extracted: ExtractedData,
}

/// Correction and approval service.
pub struct ReviewService {
    invoices: InvoiceRepository,
    corrections: CorrectionRepository,
}

impl ReviewService {
    pub fn new(db: &Database) -> Self {
        Self {
            invoices: db.invoices(),
            corrections: db.corrections(),
        }
    }

    /// Apply reviewer corrections to an invoice's extracted data.
    ///
    /// The whole batch is validated before anything is written: one bad
    /// path or value rejects the submission and leaves no trace.
    pub fn submit_corrections(
        &self,
        invoice_id: &str,
        tenant_id: &str,
        corrections: &[CorrectionInput],
        actor: &str,
        notes: Option<&str>,
    ) -> Result<AppliedCorrections, ReviewError> {
        let invoice = self.load(invoice_id, tenant_id)?;
        if invoice.is_approved() {
            return Err(ReviewError::AlreadyApproved);
        }

        let mut extracted = invoice.extracted.clone().unwrap_or_default();
        for correction in corrections {
            apply_field(
                &mut extracted,
                &correction.field_name,
                &correction.corrected_value,
            )?;
        }

        let confidence = invoice.confidence.clone().unwrap_or_default();
        for correction in corrections {
            let original_confidence = confidence_key_for(&correction.field_name)
                .and_then(|key| confidence.get(key));
            self.corrections.append(&CorrectionRecord {
                invoice_id: invoice.id.clone(),
                tenant_id: invoice.tenant_id.clone(),
                field_name: correction.field_name.clone(),
                original_value: correction.original_value.clone(),
                corrected_value: correction.corrected_value.clone(),
                original_confidence,
                corrected_by: actor.to_string(),
                notes: notes.map(str::to_string),
                created_at: Utc::now(),
            })?;
        }

        self.invoices.update_extracted(&invoice.id, &extracted)?;
        self.invoices.mark_reviewed(&invoice.id, actor, Utc::now())?;

        info!(
            invoice_id = %invoice.id,
            applied = corrections.len(),
            actor,
            "corrections applied"
        );
        Ok(AppliedCorrections {
            applied: corrections.len(),
            extracted,
        })
    }

    /// Approve a reviewed invoice, freezing it to further edits.
    pub fn approve(
        &self,
        invoice_id: &str,
        tenant_id: &str,
        actor: &str,
    ) -> Result<Invoice, ReviewError> {
        let invoice = self.load(invoice_id, tenant_id)?;
        if invoice.is_approved() {
            return Err(ReviewError::AlreadyApproved);
        }
        if invoice.reviewed_at.is_none() {
            return Err(ReviewError::NotReviewed);
        }
        self.invoices.mark_approved(&invoice.id, actor, Utc::now())?;
        info!(invoice_id = %invoice.id, actor, "invoice approved");
        self.load(invoice_id, tenant_id)
    }

    fn load(&self, invoice_id: &str, tenant_id: &str) -> Result<Invoice, ReviewError> {
        self.invoices
            .get_for_tenant(invoice_id, tenant_id)
            .map_err(|e| match e {
                RepositoryError::NotFound => ReviewError::NotFound,
                other => other.into(),
            })
    }
}

/// Confidence key recorded with a correction, by corrected field.
///
/// Currency has no dedicated score in older extraction results, so the
/// gross amount score stands in for it. That proxy is intentional and
/// mirrored by downstream feedback tooling; change both together.
fn confidence_key_for(field_name: &str) -> Option<&'static str> {
    match field_name {
        "invoice_number" => Some("invoice_number"),
        "issue_date" => Some("issue_date"),
        "due_date" => Some("due_date"),
        "net_amount" => Some("net_amount"),
        "vat_amount" => Some("vat_amount"),
        "gross_amount" => Some("gross_amount"),
        "currency" => Some("gross_amount"),
        "seller.name" => Some("seller_name"),
        "seller.nip" => Some("seller_nip"),
        "buyer.name" => Some("buyer_name"),
        "buyer.nip" => Some("buyer_nip"),
        _ => None,
    }
}

/// Write one corrected value into the extracted-data structure. Only one-
/// and two-level paths exist in the schema; anything else is unsupported.
fn apply_field(
    extracted: &mut ExtractedData,
    field_name: &str,
    value: &str,
) -> Result<(), ReviewError> {
    let parts: Vec<&str> = field_name.split('.').collect();
    match parts.as_slice() {
        ["invoice_number"] => extracted.invoice_number = non_empty(value),
        ["currency"] => extracted.currency = non_empty(value),
        ["issue_date"] => extracted.issue_date = Some(parse_date(field_name, value)?),
        ["due_date"] => extracted.due_date = Some(parse_date(field_name, value)?),
        ["net_amount"] => extracted.net_amount = Some(parse_amount(field_name, value)?),
        ["vat_amount"] => extracted.vat_amount = Some(parse_amount(field_name, value)?),
        ["gross_amount"] => extracted.gross_amount = Some(parse_amount(field_name, value)?),
        ["seller", "name"] => extracted.seller.name = non_empty(value),
        ["seller", "nip"] => extracted.seller.nip = non_empty(value),
        ["buyer", "name"] => extracted.buyer.name = non_empty(value),
        ["buyer", "nip"] => extracted.buyer.nip = non_empty(value),
        _ => return Err(ReviewError::UnsupportedPath(field_name.to_string())),
    }
    Ok(())
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_date(field: &str, value: &str) -> Result<chrono::NaiveDate, ReviewError> {
    chrono::NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        ReviewError::InvalidValue {
            field: field.to_string(),
            reason: format!("{value:?} is not a YYYY-MM-DD date"),
        }
    })
}

fn parse_amount(field: &str, value: &str) -> Result<Decimal, ReviewError> {
    Decimal::from_str(value.trim()).map_err(|_| ReviewError::InvalidValue {
        field: field.to_string(),
        reason: format!("{value:?} is not a decimal amount"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConfidenceScores, InvoiceStatus, Party};

    fn setup() -> (tempfile::TempDir, Database, Invoice) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        let invoice = Invoice::new("tenant-1", "f");
        db.invoices().insert(&invoice).unwrap();
        db.invoices()
            .save_extraction(
                &invoice.id,
                &ExtractedData {
                    invoice_number: Some("FV/1/2026".into()),
                    seller: Party {
                        name: Some("ACME".into()),
                        nip: Some("123456789".into()),
                    },
                    ..Default::default()
                },
                &ConfidenceScores {
                    invoice_number: Some(95),
                    gross_amount: Some(72),
                    seller_nip: Some(61),
                    ..Default::default()
                },
                80,
                "raw",
                &["seller tax id must be exactly 10 digits".into()],
                InvoiceStatus::NeedsReview,
                Utc::now(),
            )
            .unwrap();
        let invoice = db.invoices().get(&invoice.id).unwrap();
        (dir, db, invoice)
    }

    fn correction(field: &str, value: &str) -> CorrectionInput {
        CorrectionInput {
            field_name: field.into(),
            corrected_value: value.into(),
            original_value: Some("old".into()),
        }
    }

    #[test]
    fn test_corrections_apply_and_append_records() {
        let (_dir, db, invoice) = setup();
        let service = ReviewService::new(&db);

        let applied = service
            .submit_corrections(
                &invoice.id,
                "tenant-1",
                &[
                    correction("seller.nip", "1234567890"),
                    correction("gross_amount", "1230.00"),
                ],
                "reviewer-1",
                Some("fixed during review"),
            )
            .unwrap();

        assert_eq!(applied.applied, 2);
        assert_eq!(applied.extracted.seller.nip.as_deref(), Some("1234567890"));

        let reloaded = db.invoices().get(&invoice.id).unwrap();
        assert_eq!(reloaded.reviewed_by.as_deref(), Some("reviewer-1"));
        assert!(reloaded.reviewed_at.is_some());

        let records = db.corrections().list_for_invoice(&invoice.id).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].original_confidence, Some(61));
        assert_eq!(records[0].notes.as_deref(), Some("fixed during review"));
    }

    #[test]
    fn test_currency_correction_uses_gross_amount_confidence() {
        let (_dir, db, invoice) = setup();
        let service = ReviewService::new(&db);

        service
            .submit_corrections(
                &invoice.id,
                "tenant-1",
                &[correction("currency", "EUR")],
                "reviewer-1",
                None,
            )
            .unwrap();

        let records = db.corrections().list_for_invoice(&invoice.id).unwrap();
        // Proxy mapping: the gross amount score (72) stands in for currency.
        assert_eq!(records[0].original_confidence, Some(72));
    }

    #[test]
    fn test_approved_invoice_rejects_corrections() {
        let (_dir, db, invoice) = setup();
        let service = ReviewService::new(&db);
        db.invoices()
            .mark_reviewed(&invoice.id, "reviewer-1", Utc::now())
            .unwrap();
        db.invoices()
            .mark_approved(&invoice.id, "approver-1", Utc::now())
            .unwrap();

        let err = service
            .submit_corrections(
                &invoice.id,
                "tenant-1",
                &[correction("currency", "EUR")],
                "reviewer-1",
                None,
            )
            .unwrap_err();
        assert!(matches!(err, ReviewError::AlreadyApproved));
        assert_eq!(db.corrections().count_for_invoice(&invoice.id).unwrap(), 0);
    }

    #[test]
    fn test_deep_path_rejected_without_side_effects() {
        let (_dir, db, invoice) = setup();
        let service = ReviewService::new(&db);

        let err = service
            .submit_corrections(
                &invoice.id,
                "tenant-1",
                &[
                    correction("seller.nip", "1234567890"),
                    correction("seller.address.street", "Main 1"),
                ],
                "reviewer-1",
                None,
            )
            .unwrap_err();
        assert!(matches!(err, ReviewError::UnsupportedPath(_)));

        // Nothing was written, not even the valid first correction.
        assert_eq!(db.corrections().count_for_invoice(&invoice.id).unwrap(), 0);
        let reloaded = db.invoices().get(&invoice.id).unwrap();
        assert_eq!(
            reloaded.extracted.unwrap().seller.nip.as_deref(),
            Some("123456789")
        );
        assert!(reloaded.reviewed_at.is_none());
    }

    #[test]
    fn test_bad_amount_value_rejected() {
        let (_dir, db, invoice) = setup();
        let service = ReviewService::new(&db);
        let err = service
            .submit_corrections(
                &invoice.id,
                "tenant-1",
                &[correction("net_amount", "a lot")],
                "reviewer-1",
                None,
            )
            .unwrap_err();
        assert!(matches!(err, ReviewError::InvalidValue { .. }));
    }

    #[test]
    fn test_approval_requires_review_first() {
        let (_dir, db, invoice) = setup();
        let service = ReviewService::new(&db);

        let err = service.approve(&invoice.id, "tenant-1", "approver-1").unwrap_err();
        assert!(matches!(err, ReviewError::NotReviewed));

        db.invoices()
            .mark_reviewed(&invoice.id, "reviewer-1", Utc::now())
            .unwrap();
        let approved = service.approve(&invoice.id, "tenant-1", "approver-1").unwrap();
        assert_eq!(approved.status, InvoiceStatus::Verified);

        // Second approval conflicts.
        let err = service.approve(&invoice.id, "tenant-1", "approver-1").unwrap_err();
        assert!(matches!(err, ReviewError::AlreadyApproved));
    }

    #[test]
    fn test_foreign_tenant_sees_not_found() {
        let (_dir, db, invoice) = setup();
        let service = ReviewService::new(&db);
        let err = service
            .submit_corrections(
                &invoice.id,
                "tenant-2",
                &[correction("currency", "EUR")],
                "reviewer-1",
                None,
            )
            .unwrap_err();
        assert!(matches!(err, ReviewError::NotFound));
    }
}
