//! Job and processing-log repository for SQLite persistence.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use super::{parse_datetime, RepositoryError, Result};
use crate::models::{
    JobStatus, JobSummary, OcrJob, PipelineStep, ProcessingLogEntry, StepStatus,
};

/// SQLite-backed repository for OCR jobs and their append-only step log.
#[derive(Debug, Clone)]
pub struct JobRepository {
    db_path: PathBuf,
}

const JOB_COLUMNS: &str = "id, invoice_id, tenant_id, status, started_at, completed_at, \
     error, failed_step, retry_count, max_retries, result_summary, created_at";

fn job_from_row(row: &Row) -> rusqlite::Result<JobRow> {
    Ok(JobRow {
        id: row.get(0)?,
        invoice_id: row.get(1)?,
        tenant_id: row.get(2)?,
        status: row.get(3)?,
        started_at: row.get(4)?,
        completed_at: row.get(5)?,
        error: row.get(6)?,
        failed_step: row.get(7)?,
        retry_count: row.get(8)?,
        max_retries: row.get(9)?,
        result_summary: row.get(10)?,
        created_at: row.get(11)?,
    })
}

struct JobRow {
    id: String,
    invoice_id: String,
    tenant_id: String,
    status: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    error: Option<String>,
    failed_step: Option<String>,
    retry_count: i64,
    max_retries: i64,
    result_summary: Option<String>,
    created_at: String,
}

impl JobRow {
    fn into_job(self) -> Result<OcrJob> {
        let status = JobStatus::from_str(&self.status)
            .ok_or_else(|| RepositoryError::Corrupt(format!("job status: {}", self.status)))?;
        let failed_step = match self.failed_step.as_deref() {
            None => None,
            Some(s) => Some(
                PipelineStep::from_str(s)
                    .ok_or_else(|| RepositoryError::Corrupt(format!("failed step: {s}")))?,
            ),
        };
        let result_summary: Option<JobSummary> = match self.result_summary.as_deref() {
            None => None,
            Some(s) => Some(
                serde_json::from_str(s)
                    .map_err(|e| RepositoryError::Corrupt(format!("result_summary: {e}")))?,
            ),
        };
        Ok(OcrJob {
            id: self.id,
            invoice_id: self.invoice_id,
            tenant_id: self.tenant_id,
            status,
            started_at: self.started_at.as_deref().map(parse_datetime),
            completed_at: self.completed_at.as_deref().map(parse_datetime),
            error: self.error,
            failed_step,
            retry_count: self.retry_count as u32,
            max_retries: self.max_retries as u32,
            result_summary,
            created_at: parse_datetime(&self.created_at),
        })
    }
}

impl JobRepository {
    pub(super) fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    fn connect(&self) -> Result<Connection> {
        super::connect(&self.db_path)
    }

    /// Insert a new job. The partial unique index rejects the insert when
    /// the invoice already has a queued or processing job; that violation
    /// is surfaced as [`RepositoryError::DuplicateActiveJob`].
    pub fn create(&self, job: &OcrJob) -> Result<()> {
        let conn = self.connect()?;
        let result = conn.execute(
            "INSERT INTO ocr_jobs (id, invoice_id, tenant_id, status, retry_count, \
             max_retries, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                job.id,
                job.invoice_id,
                job.tenant_id,
                job.status.as_str(),
                job.retry_count as i64,
                job.max_retries as i64,
                job.created_at.to_rfc3339(),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(RepositoryError::DuplicateActiveJob(job.invoice_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get(&self, id: &str) -> Result<OcrJob> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM ocr_jobs WHERE id = ?1"),
                params![id],
                job_from_row,
            )
            .map_err(not_found)?;
        row.into_job()
    }

    /// Load a job scoped to a tenant; foreign jobs read as missing.
    pub fn get_for_tenant(&self, id: &str, tenant_id: &str) -> Result<OcrJob> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM ocr_jobs WHERE id = ?1 AND tenant_id = ?2"),
                params![id, tenant_id],
                job_from_row,
            )
            .map_err(not_found)?;
        row.into_job()
    }

    /// The queued or processing job for an invoice, if any.
    pub fn find_active_for_invoice(&self, invoice_id: &str) -> Result<Option<OcrJob>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM ocr_jobs \
             WHERE invoice_id = ?1 AND status IN ('queued', 'processing')"
        ))?;
        let mut rows = stmt.query_map(params![invoice_id], job_from_row)?;
        match rows.next() {
            None => Ok(None),
            Some(row) => Ok(Some(row?.into_job()?)),
        }
    }

    /// Claim a queued job for processing.
    pub fn mark_processing(&self, id: &str, started_at: DateTime<Utc>) -> Result<()> {
        self.update_status(
            "UPDATE ocr_jobs SET status = 'processing', started_at = ?2 WHERE id = ?1",
            params![id, started_at.to_rfc3339()],
        )
    }

    pub fn mark_completed(
        &self,
        id: &str,
        completed_at: DateTime<Utc>,
        summary: &JobSummary,
    ) -> Result<()> {
        let encoded = serde_json::to_string(summary)
            .map_err(|e| RepositoryError::Corrupt(format!("result_summary: {e}")))?;
        self.update_status(
            "UPDATE ocr_jobs SET status = 'completed', completed_at = ?2, result_summary = ?3 \
             WHERE id = ?1",
            params![id, completed_at.to_rfc3339(), encoded],
        )
    }

    pub fn mark_failed(
        &self,
        id: &str,
        completed_at: DateTime<Utc>,
        error: &str,
        failed_step: Option<PipelineStep>,
    ) -> Result<()> {
        self.update_status(
            "UPDATE ocr_jobs SET status = 'failed', completed_at = ?2, error = ?3, \
             failed_step = ?4 WHERE id = ?1",
            params![
                id,
                completed_at.to_rfc3339(),
                error,
                failed_step.map(|s| s.as_str()),
            ],
        )
    }

    /// Re-queue a failed job for another attempt, consuming one retry.
    pub fn prepare_retry(&self, id: &str) -> Result<()> {
        self.update_status(
            "UPDATE ocr_jobs SET status = 'queued', retry_count = retry_count + 1, \
             started_at = NULL, completed_at = NULL WHERE id = ?1 AND status = 'failed'",
            params![id],
        )
    }

    /// Consume the remaining retry budget. Used for non-retriable failures
    /// so the status projection reports no pending automatic retry.
    pub fn exhaust_retries(&self, id: &str) -> Result<()> {
        self.update_status(
            "UPDATE ocr_jobs SET retry_count = max_retries WHERE id = ?1",
            params![id],
        )
    }

    /// Re-queue a failed job without touching its retry budget (manual retry).
    pub fn requeue_manual(&self, id: &str) -> Result<()> {
        self.update_status(
            "UPDATE ocr_jobs SET status = 'queued', started_at = NULL, completed_at = NULL \
             WHERE id = ?1 AND status = 'failed'",
            params![id],
        )
    }

    /// Position of a queued job in its tenant's queue (1-based): the number
    /// of queued jobs created strictly earlier, plus one.
    pub fn queue_position(&self, job: &OcrJob) -> Result<u64> {
        let conn = self.connect()?;
        let ahead: i64 = conn.query_row(
            "SELECT COUNT(*) FROM ocr_jobs \
             WHERE tenant_id = ?1 AND status = 'queued' AND created_at < ?2",
            params![job.tenant_id, job.created_at.to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(ahead as u64 + 1)
    }

    fn update_status(&self, sql: &str, params: impl rusqlite::Params) -> Result<()> {
        let conn = self.connect()?;
        let n = conn.execute(sql, params)?;
        if n == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Append one immutable processing log entry.
    pub fn append_log(&self, entry: &ProcessingLogEntry) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO processing_logs (job_id, tenant_id, step, status, metadata, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.job_id,
                entry.tenant_id,
                entry.step.as_str(),
                entry.status.as_str(),
                entry.metadata.to_string(),
                entry.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All log entries for a job in write order.
    pub fn logs_for_job(&self, job_id: &str) -> Result<Vec<ProcessingLogEntry>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT job_id, tenant_id, step, status, metadata, created_at \
             FROM processing_logs WHERE job_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![job_id], log_from_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry()?);
        }
        Ok(entries)
    }

    /// The most recent log entry for a job; steps are written in order, so
    /// this identifies the current step.
    pub fn latest_log(&self, job_id: &str) -> Result<Option<ProcessingLogEntry>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT job_id, tenant_id, step, status, metadata, created_at \
             FROM processing_logs WHERE job_id = ?1 ORDER BY id DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![job_id], log_from_row)?;
        match rows.next() {
            None => Ok(None),
            Some(row) => Ok(Some(row?.into_entry()?)),
        }
    }
}

struct LogRow {
    job_id: String,
    tenant_id: String,
    step: String,
    status: String,
    metadata: String,
    created_at: String,
}

fn log_from_row(row: &Row) -> rusqlite::Result<LogRow> {
    Ok(LogRow {
        job_id: row.get(0)?,
        tenant_id: row.get(1)?,
        step: row.get(2)?,
        status: row.get(3)?,
        metadata: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl LogRow {
    fn into_entry(self) -> Result<ProcessingLogEntry> {
        let step = PipelineStep::from_str(&self.step)
            .ok_or_else(|| RepositoryError::Corrupt(format!("log step: {}", self.step)))?;
        let status = StepStatus::from_str(&self.status)
            .ok_or_else(|| RepositoryError::Corrupt(format!("log status: {}", self.status)))?;
        let metadata = serde_json::from_str(&self.metadata)
            .map_err(|e| RepositoryError::Corrupt(format!("log metadata: {e}")))?;
        Ok(ProcessingLogEntry {
            job_id: self.job_id,
            tenant_id: self.tenant_id,
            step,
            status,
            metadata,
            created_at: parse_datetime(&self.created_at),
        })
    }
}

fn not_found(e: rusqlite::Error) -> RepositoryError {
    match e {
        rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound,
        other => RepositoryError::Sqlite(other),
    }
}
