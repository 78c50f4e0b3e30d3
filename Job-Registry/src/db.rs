use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::types::{JobRecord, JobStatus};

/// Longest stored error message, in characters.
pub const MAX_ERROR_CHARS: usize = 500;
/// Longest stored text preview, in characters.
pub const MAX_PREVIEW_CHARS: usize = 100;

/// Error recorded for jobs left running by a process that went away.
pub const STALE_JOB_ERROR: &str = "Server restarted during generation";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id              TEXT PRIMARY KEY,
    status          TEXT NOT NULL CHECK(status IN ('running', 'completed', 'failed')),
    input_mode      TEXT NOT NULL,
    started_at      TEXT NOT NULL,
    completed_at    TEXT,
    post_id         TEXT,
    error           TEXT,
    text_preview    TEXT
);

CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
CREATE INDEX IF NOT EXISTS idx_jobs_started_at ON jobs(started_at);
"#;

const COLUMNS: &str =
    "id, status, input_mode, started_at, completed_at, post_id, error, text_preview";

/// Result of [`insert_job_if_capacity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AtCapacity { running: u32 },
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
    let status: String = row.get(1)?;
    Ok(JobRecord {
        id: row.get(0)?,
        // The CHECK constraint keeps unknown values out.
        status: JobStatus::parse(&status).unwrap_or(JobStatus::Failed),
        input_mode: row.get(2)?,
        started_at: row.get(3)?,
        completed_at: row.get(4)?,
        post_id: row.get(5)?,
        error: row.get(6)?,
        text_preview: row.get(7)?,
    })
}

/// Open (or create) the job database. Pass `None` for an in-memory database.
pub fn open_database(path: Option<&std::path::Path>) -> Result<Connection> {
    let conn = match path {
        Some(p) => Connection::open(p).context("Failed to open job database")?,
        None => Connection::open_in_memory().context("Failed to open in-memory database")?,
    };

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;",
    )
    .context("Failed to set PRAGMA options")?;

    conn.execute_batch(SCHEMA)
        .context("Failed to create job schema")?;

    Ok(conn)
}

/// Number of jobs currently running.
pub fn count_running(conn: &Connection) -> Result<u32> {
    let count: u32 = conn
        .query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = 'running'",
            [],
            |row| row.get(0),
        )
        .context("Failed to count running jobs")?;
    Ok(count)
}

/// Insert a running job unless `max_running` jobs are already running.
///
/// The count and the insert share one IMMEDIATE transaction, so two
/// processes racing for the last slot cannot both get it.
pub fn insert_job_if_capacity(
    conn: &mut Connection,
    job_id: &str,
    input_mode: &str,
    text: Option<&str>,
    max_running: u32,
) -> Result<InsertOutcome> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("Failed to begin job transaction")?;

    let running = count_running(&tx)?;
    if running >= max_running {
        return Ok(InsertOutcome::AtCapacity { running });
    }

    let preview = text.map(|t| truncate_chars(t.trim(), MAX_PREVIEW_CHARS));
    tx.execute(
        "INSERT INTO jobs (id, status, input_mode, started_at, text_preview)
         VALUES (?1, 'running', ?2, ?3, ?4)",
        params![job_id, input_mode, now(), preview],
    )
    .context("Failed to insert job")?;
    tx.commit().context("Failed to commit job insert")?;
    Ok(InsertOutcome::Inserted)
}

/// Mark a running job completed. Returns `false` if no running job matched.
pub fn complete_job(conn: &Connection, job_id: &str, post_id: Option<&str>) -> Result<bool> {
    let updated = conn
        .execute(
            "UPDATE jobs SET status = 'completed', completed_at = ?1, post_id = ?2
             WHERE id = ?3 AND status = 'running'",
            params![now(), post_id, job_id],
        )
        .context("Failed to mark job as completed")?;
    Ok(updated > 0)
}

/// Mark a running job failed. The error is cut to [`MAX_ERROR_CHARS`].
/// Returns `false` if no running job matched.
pub fn fail_job(conn: &Connection, job_id: &str, error: &str) -> Result<bool> {
    let updated = conn
        .execute(
            "UPDATE jobs SET status = 'failed', completed_at = ?1, error = ?2
             WHERE id = ?3 AND status = 'running'",
            params![now(), truncate_chars(error, MAX_ERROR_CHARS), job_id],
        )
        .context("Failed to mark job as failed")?;
    Ok(updated > 0)
}

pub fn get_job(conn: &Connection, job_id: &str) -> Result<Option<JobRecord>> {
    conn.query_row(
        &format!("SELECT {} FROM jobs WHERE id = ?1", COLUMNS),
        params![job_id],
        record_from_row,
    )
    .optional()
    .context("Failed to query job")
}

fn query_jobs(conn: &Connection, sql: &str, limit: Option<u32>) -> Result<Vec<JobRecord>> {
    let mut stmt = conn.prepare(sql).context("Failed to prepare job query")?;
    let rows = match limit {
        Some(limit) => stmt.query_map(params![limit], record_from_row),
        None => stmt.query_map([], record_from_row),
    }
    .context("Failed to execute job query")?;

    let mut jobs = Vec::new();
    for row in rows {
        jobs.push(row.context("Failed to read job row")?);
    }
    Ok(jobs)
}

/// Running jobs, oldest first.
pub fn running_jobs(conn: &Connection) -> Result<Vec<JobRecord>> {
    query_jobs(
        conn,
        &format!(
            "SELECT {} FROM jobs WHERE status = 'running' ORDER BY started_at ASC, rowid ASC",
            COLUMNS
        ),
        None,
    )
}

/// The most recently started jobs, newest first.
pub fn recent_jobs(conn: &Connection, limit: u32) -> Result<Vec<JobRecord>> {
    query_jobs(
        conn,
        &format!(
            "SELECT {} FROM jobs ORDER BY started_at DESC, rowid DESC LIMIT ?1",
            COLUMNS
        ),
        Some(limit),
    )
}

/// Fail every job still marked running. Returns the number of jobs changed.
pub fn cleanup_stale_jobs(conn: &Connection) -> Result<u32> {
    let count = conn
        .execute(
            "UPDATE jobs SET status = 'failed', completed_at = ?1, error = ?2
             WHERE status = 'running'",
            params![now(), STALE_JOB_ERROR],
        )
        .context("Failed to clean up stale jobs")?;
    Ok(count as u32)
}

/// Delete finished jobs that completed more than `days` days ago.
/// Returns the number of jobs deleted.
pub fn prune_old_jobs(conn: &Connection, days: u32) -> Result<u32> {
    let cutoff = chrono::Utc::now() - chrono::Duration::days(days as i64);

    let count = conn
        .execute(
            "DELETE FROM jobs
             WHERE status IN ('completed', 'failed')
             AND completed_at < ?1",
            params![cutoff.to_rfc3339()],
        )
        .context("Failed to prune old jobs")?;

    Ok(count as u32)
}
