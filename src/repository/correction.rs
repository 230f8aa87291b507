//! Correction repository: append-only audit ledger of reviewer edits.

use std::path::PathBuf;

use rusqlite::{params, Connection, Row};

use super::{parse_datetime, Result};
use crate::models::CorrectionRecord;

/// SQLite-backed correction ledger.
#[derive(Debug, Clone)]
pub struct CorrectionRepository {
    db_path: PathBuf,
}

impl CorrectionRepository {
    pub(super) fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    fn connect(&self) -> Result<Connection> {
        super::connect(&self.db_path)
    }

    /// Append one correction record. Records are never updated or deleted.
    pub fn append(&self, record: &CorrectionRecord) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO corrections (invoice_id, tenant_id, field_name, original_value, \
             corrected_value, original_confidence, corrected_by, notes, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.invoice_id,
                record.tenant_id,
                record.field_name,
                record.original_value,
                record.corrected_value,
                record.original_confidence.map(|v| v as i64),
                record.corrected_by,
                record.notes,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All corrections for an invoice in submission order.
    pub fn list_for_invoice(&self, invoice_id: &str) -> Result<Vec<CorrectionRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT invoice_id, tenant_id, field_name, original_value, corrected_value, \
             original_confidence, corrected_by, notes, created_at \
             FROM corrections WHERE invoice_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![invoice_id], record_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn count_for_invoice(&self, invoice_id: &str) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM corrections WHERE invoice_id = ?1",
            params![invoice_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

fn record_from_row(row: &Row) -> rusqlite::Result<CorrectionRecord> {
    let original_confidence: Option<i64> = row.get(5)?;
    let created_at: String = row.get(8)?;
    Ok(CorrectionRecord {
        invoice_id: row.get(0)?,
        tenant_id: row.get(1)?,
        field_name: row.get(2)?,
        original_value: row.get(3)?,
        corrected_value: row.get(4)?,
        original_confidence: original_confidence.map(|v| v as u8),
        corrected_by: row.get(6)?,
        notes: row.get(7)?,
        created_at: parse_datetime(&created_at),
    })
}

#[cfg(test)]
mod tests {
    use super::super::Database;
    use super::*;
    use crate::models::Invoice;
    use chrono::Utc;

    #[test]
    fn test_append_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        let invoice = Invoice::new("tenant-1", "f");
        db.invoices().insert(&invoice).unwrap();

        let repo = db.corrections();
        repo.append(&CorrectionRecord {
            invoice_id: invoice.id.clone(),
            tenant_id: "tenant-1".into(),
            field_name: "seller.nip".into(),
            original_value: Some("123456789".into()),
            corrected_value: "1234567890".into(),
            original_confidence: Some(61),
            corrected_by: "user-1".into(),
            notes: None,
            created_at: Utc::now(),
        })
        .unwrap();

        let records = repo.list_for_invoice(&invoice.id).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].field_name, "seller.nip");
        assert_eq!(records[0].original_confidence, Some(61));
        assert_eq!(repo.count_for_invoice(&invoice.id).unwrap(), 1);
    }
}
