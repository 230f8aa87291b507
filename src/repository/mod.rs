//! Repository layer for SQLite persistence.
//!
//! Each repository owns a database path and opens short-lived connections
//! per call. Schema initialization is idempotent and runs on open.

mod correction;
mod invoice;
mod job;

pub use correction::CorrectionRepository;
pub use invoice::InvoiceRepository;
pub use job::JobRepository;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use thiserror::Error;

/// Errors surfaced by the repository layer.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,

    /// The partial unique index rejected a second active job for an invoice.
    /// This is the canonical duplicate-submission signal.
    #[error("an active processing job already exists for invoice {0}")]
    DuplicateActiveJob(String),

    #[error("invalid stored data: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS invoices (
    id                 TEXT PRIMARY KEY,
    tenant_id          TEXT NOT NULL,
    file_ref           TEXT NOT NULL,
    status             TEXT NOT NULL,
    extracted          TEXT,
    confidence         TEXT,
    overall_confidence INTEGER,
    ocr_text           TEXT,
    ocr_confidence     INTEGER,
    validation_errors  TEXT NOT NULL DEFAULT '[]',
    processed_at       TEXT,
    reviewed_at        TEXT,
    reviewed_by        TEXT,
    approved_at        TEXT,
    approved_by        TEXT,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_invoices_tenant ON invoices(tenant_id);

CREATE TABLE IF NOT EXISTS ocr_jobs (
    id             TEXT PRIMARY KEY,
    invoice_id     TEXT NOT NULL REFERENCES invoices(id),
    tenant_id      TEXT NOT NULL,
    status         TEXT NOT NULL,
    started_at     TEXT,
    completed_at   TEXT,
    error          TEXT,
    failed_step    TEXT,
    retry_count    INTEGER NOT NULL DEFAULT 0,
    max_retries    INTEGER NOT NULL DEFAULT 3,
    result_summary TEXT,
    created_at     TEXT NOT NULL
);
-- At most one queued-or-processing job per invoice, enforced by the store.
CREATE UNIQUE INDEX IF NOT EXISTS idx_ocr_jobs_active
    ON ocr_jobs(invoice_id) WHERE status IN ('queued', 'processing');
CREATE INDEX IF NOT EXISTS idx_ocr_jobs_tenant_status ON ocr_jobs(tenant_id, status);

CREATE TABLE IF NOT EXISTS processing_logs (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id     TEXT NOT NULL REFERENCES ocr_jobs(id),
    tenant_id  TEXT NOT NULL,
    step       TEXT NOT NULL,
    status     TEXT NOT NULL,
    metadata   TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_processing_logs_job ON processing_logs(job_id, id);

CREATE TABLE IF NOT EXISTS corrections (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    invoice_id          TEXT NOT NULL REFERENCES invoices(id),
    tenant_id           TEXT NOT NULL,
    field_name          TEXT NOT NULL,
    original_value      TEXT,
    corrected_value     TEXT NOT NULL,
    original_confidence INTEGER,
    corrected_by        TEXT NOT NULL,
    notes               TEXT,
    created_at          TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_corrections_invoice ON corrections(invoice_id, id);
"#;

/// Handle to the SQLite database. Cheap to clone; hands out per-table
/// repositories that share the same file.
#[derive(Debug, Clone)]
pub struct Database {
    db_path: PathBuf,
}

impl Database {
    /// Open (or create) the database and initialize the schema.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| RepositoryError::Corrupt(format!("cannot create db dir: {e}")))?;
            }
        }
        let db = Self {
            db_path: db_path.to_path_buf(),
        };
        db.connect()?.execute_batch(SCHEMA)?;
        Ok(db)
    }

    pub fn invoices(&self) -> InvoiceRepository {
        InvoiceRepository::new(self.db_path.clone())
    }

    pub fn jobs(&self) -> JobRepository {
        JobRepository::new(self.db_path.clone())
    }

    pub fn corrections(&self) -> CorrectionRepository {
        CorrectionRepository::new(self.db_path.clone())
    }

    fn connect(&self) -> Result<Connection> {
        connect(&self.db_path)
    }
}

/// Open a connection with the pragmas every repository relies on.
pub(crate) fn connect(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        Database::open(&path).unwrap();
        Database::open(&path).unwrap();
    }

    #[test]
    fn test_parse_datetime_fallback() {
        assert_eq!(parse_datetime("not a date"), DateTime::UNIX_EPOCH);
        let parsed = parse_datetime("2026-01-15T10:00:00+00:00");
        assert_eq!(parsed.to_rfc3339(), "2026-01-15T10:00:00+00:00");
    }
}
