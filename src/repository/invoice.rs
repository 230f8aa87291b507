//! Invoice repository for SQLite persistence.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use super::{parse_datetime, RepositoryError, Result};
use crate::models::{ConfidenceScores, ExtractedData, Invoice, InvoiceStatus};

/// SQLite-backed invoice repository.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    db_path: PathBuf,
}

/// Raw row before JSON columns are decoded.
struct InvoiceRow {
    id: String,
    tenant_id: String,
    file_ref: String,
    status: String,
    extracted: Option<String>,
    confidence: Option<String>,
    overall_confidence: Option<i64>,
    ocr_text: Option<String>,
    ocr_confidence: Option<i64>,
    validation_errors: String,
    processed_at: Option<String>,
    reviewed_at: Option<String>,
    reviewed_by: Option<String>,
    approved_at: Option<String>,
    approved_by: Option<String>,
    created_at: String,
    updated_at: String,
}

const COLUMNS: &str = "id, tenant_id, file_ref, status, extracted, confidence, \
     overall_confidence, ocr_text, ocr_confidence, validation_errors, processed_at, \
     reviewed_at, reviewed_by, approved_at, approved_by, created_at, updated_at";

impl InvoiceRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            file_ref: row.get(2)?,
            status: row.get(3)?,
            extracted: row.get(4)?,
            confidence: row.get(5)?,
            overall_confidence: row.get(6)?,
            ocr_text: row.get(7)?,
            ocr_confidence: row.get(8)?,
            validation_errors: row.get(9)?,
            processed_at: row.get(10)?,
            reviewed_at: row.get(11)?,
            reviewed_by: row.get(12)?,
            approved_at: row.get(13)?,
            approved_by: row.get(14)?,
            created_at: row.get(15)?,
            updated_at: row.get(16)?,
        })
    }

    fn into_invoice(self) -> Result<Invoice> {
        let status = InvoiceStatus::from_str(&self.status)
            .ok_or_else(|| RepositoryError::Corrupt(format!("invoice status: {}", self.status)))?;
        let extracted: Option<ExtractedData> = decode_json(self.extracted.as_deref())?;
        let confidence: Option<ConfidenceScores> = decode_json(self.confidence.as_deref())?;
        let validation_errors: Vec<String> = serde_json::from_str(&self.validation_errors)
            .map_err(|e| RepositoryError::Corrupt(format!("validation_errors: {e}")))?;
        Ok(Invoice {
            id: self.id,
            tenant_id: self.tenant_id,
            file_ref: self.file_ref,
            status,
            extracted,
            confidence,
            overall_confidence: self.overall_confidence.map(|v| v as u8),
            ocr_text: self.ocr_text,
            ocr_confidence: self.ocr_confidence.map(|v| v as u8),
            validation_errors,
            processed_at: self.processed_at.as_deref().map(parse_datetime),
            reviewed_at: self.reviewed_at.as_deref().map(parse_datetime),
            reviewed_by: self.reviewed_by,
            approved_at: self.approved_at.as_deref().map(parse_datetime),
            approved_by: self.approved_by,
            created_at: parse_datetime(&self.created_at),
            updated_at: parse_datetime(&self.updated_at),
        })
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(s: Option<&str>) -> Result<Option<T>> {
    match s {
        None => Ok(None),
        Some(s) => serde_json::from_str(s)
            .map(Some)
            .map_err(|e| RepositoryError::Corrupt(format!("json column: {e}"))),
    }
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Corrupt(format!("json encode: {e}")))
}

impl InvoiceRepository {
    pub(super) fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    fn connect(&self) -> Result<Connection> {
        super::connect(&self.db_path)
    }

    /// Insert a freshly uploaded invoice.
    pub fn insert(&self, invoice: &Invoice) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO invoices (id, tenant_id, file_ref, status, ocr_text, ocr_confidence, \
             validation_errors, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                invoice.id,
                invoice.tenant_id,
                invoice.file_ref,
                invoice.status.as_str(),
                invoice.ocr_text,
                invoice.ocr_confidence.map(|v| v as i64),
                encode_json(&invoice.validation_errors)?,
                invoice.created_at.to_rfc3339(),
                invoice.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Load an invoice by id.
    pub fn get(&self, id: &str) -> Result<Invoice> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM invoices WHERE id = ?1"),
                params![id],
                InvoiceRow::from_row,
            )
            .map_err(not_found)?;
        row.into_invoice()
    }

    /// Load an invoice scoped to a tenant. A foreign tenant's invoice is
    /// indistinguishable from a missing one.
    pub fn get_for_tenant(&self, id: &str, tenant_id: &str) -> Result<Invoice> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM invoices WHERE id = ?1 AND tenant_id = ?2"),
                params![id, tenant_id],
                InvoiceRow::from_row,
            )
            .map_err(not_found)?;
        row.into_invoice()
    }

    pub fn set_status(&self, id: &str, status: InvoiceStatus) -> Result<()> {
        let conn = self.connect()?;
        let n = conn.execute(
            "UPDATE invoices SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), Utc::now().to_rfc3339()],
        )?;
        if n == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Write the full pipeline result onto the invoice. Only the save step
    /// of the orchestrator calls this.
    #[allow(clippy::too_many_arguments)]
    pub fn save_extraction(
        &self,
        id: &str,
        extracted: &ExtractedData,
        confidence: &ConfidenceScores,
        overall_confidence: u8,
        ocr_text: &str,
        validation_errors: &[String],
        status: InvoiceStatus,
        processed_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.connect()?;
        let n = conn.execute(
            "UPDATE invoices SET extracted = ?2, confidence = ?3, overall_confidence = ?4, \
             ocr_text = ?5, validation_errors = ?6, status = ?7, processed_at = ?8, \
             updated_at = ?9 WHERE id = ?1",
            params![
                id,
                encode_json(extracted)?,
                encode_json(confidence)?,
                overall_confidence as i64,
                ocr_text,
                encode_json(&validation_errors)?,
                status.as_str(),
                processed_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        if n == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Replace the extracted data structure after reviewer corrections.
    pub fn update_extracted(&self, id: &str, extracted: &ExtractedData) -> Result<()> {
        let conn = self.connect()?;
        let n = conn.execute(
            "UPDATE invoices SET extracted = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, encode_json(extracted)?, Utc::now().to_rfc3339()],
        )?;
        if n == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    pub fn mark_reviewed(&self, id: &str, actor: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.connect()?;
        let n = conn.execute(
            "UPDATE invoices SET reviewed_at = ?2, reviewed_by = ?3, updated_at = ?4 \
             WHERE id = ?1",
            params![id, at.to_rfc3339(), actor, Utc::now().to_rfc3339()],
        )?;
        if n == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    pub fn mark_approved(&self, id: &str, actor: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.connect()?;
        let n = conn.execute(
            "UPDATE invoices SET approved_at = ?2, approved_by = ?3, status = ?4, \
             updated_at = ?5 WHERE id = ?1",
            params![
                id,
                at.to_rfc3339(),
                actor,
                InvoiceStatus::Verified.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        if n == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

fn not_found(e: rusqlite::Error) -> RepositoryError {
    match e {
        rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound,
        other => RepositoryError::Sqlite(other),
    }
}

#[cfg(test)]
mod tests {
    use super::super::Database;
    use super::*;

    fn setup() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn test_insert_and_get_roundtrip() {
        let (_dir, db) = setup();
        let repo = db.invoices();
        let invoice = Invoice::new("tenant-1", "files/ab/cdef.pdf");
        repo.insert(&invoice).unwrap();

        let loaded = repo.get(&invoice.id).unwrap();
        assert_eq!(loaded.tenant_id, "tenant-1");
        assert_eq!(loaded.status, InvoiceStatus::Uploaded);
        assert!(loaded.extracted.is_none());
        assert!(loaded.validation_errors.is_empty());
    }

    #[test]
    fn test_tenant_scoping_returns_not_found() {
        let (_dir, db) = setup();
        let repo = db.invoices();
        let invoice = Invoice::new("tenant-1", "f");
        repo.insert(&invoice).unwrap();

        assert!(matches!(
            repo.get_for_tenant(&invoice.id, "tenant-2"),
            Err(RepositoryError::NotFound)
        ));
        assert!(repo.get_for_tenant(&invoice.id, "tenant-1").is_ok());
    }

    #[test]
    fn test_save_extraction_sets_result_fields() {
        let (_dir, db) = setup();
        let repo = db.invoices();
        let invoice = Invoice::new("tenant-1", "f");
        repo.insert(&invoice).unwrap();

        let extracted = ExtractedData {
            invoice_number: Some("FV/1/2026".into()),
            ..Default::default()
        };
        let confidence = ConfidenceScores {
            invoice_number: Some(92),
            ..Default::default()
        };
        repo.save_extraction(
            &invoice.id,
            &extracted,
            &confidence,
            92,
            "raw text",
            &[],
            InvoiceStatus::Extracted,
            Utc::now(),
        )
        .unwrap();

        let loaded = repo.get(&invoice.id).unwrap();
        assert_eq!(loaded.status, InvoiceStatus::Extracted);
        assert_eq!(loaded.overall_confidence, Some(92));
        assert_eq!(loaded.extracted.unwrap().invoice_number.as_deref(), Some("FV/1/2026"));
        assert_eq!(loaded.ocr_text.as_deref(), Some("raw text"));
        assert!(loaded.processed_at.is_some());
    }

    #[test]
    fn test_approve_sets_verified() {
        let (_dir, db) = setup();
        let repo = db.invoices();
        let invoice = Invoice::new("tenant-1", "f");
        repo.insert(&invoice).unwrap();
        repo.mark_reviewed(&invoice.id, "user-1", Utc::now()).unwrap();
        repo.mark_approved(&invoice.id, "user-2", Utc::now()).unwrap();

        let loaded = repo.get(&invoice.id).unwrap();
        assert_eq!(loaded.status, InvoiceStatus::Verified);
        assert!(loaded.is_approved());
        assert_eq!(loaded.approved_by.as_deref(), Some("user-2"));
    }
}
