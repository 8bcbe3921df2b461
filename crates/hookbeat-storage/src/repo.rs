use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use tracing::info;

use crate::{
    db::init_db,
    error::{Result, StorageError},
    types::{CreateJobParams, ExecutionLog, ExecutionOutcome, Job, RunStatus, UpdateJobParams},
};

/// Default number of log rows returned when the caller passes 0.
const DEFAULT_LOG_LIMIT: usize = 50;

/// Shared handle over the SQLite database.
///
/// Wraps the connection in `Arc<Mutex<_>>` so the scheduler loop, concurrent
/// dispatch tasks, and HTTP handlers can all write without conflicting.
/// Cloning is cheap and shares the same connection.
#[derive(Clone)]
pub struct Repository {
    conn: Arc<Mutex<Connection>>,
}

impl Repository {
    /// Open (or create) the database at `path`, apply pragmas and run the
    /// schema migration.
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        init_db(&conn)?;
        info!(path = %path, "database opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database with the full schema. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ── Jobs ─────────────────────────────────────────────────────────────

    /// Insert a new job (active by default). Returns the assigned id.
    pub fn create_job(&self, params: &CreateJobParams) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO jobs (name, cron_expr, url, method, payload, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
            rusqlite::params![
                params.name,
                params.cron_expr,
                params.url,
                params.method,
                params.payload,
                Utc::now().to_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        info!(job_id = id, name = %params.name, "job created");
        Ok(id)
    }

    /// Fetch a job by id.
    pub fn get_job(&self, id: i64) -> Result<Job> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("{JOB_SELECT} WHERE id = ?1"),
            [id],
            map_job,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StorageError::JobNotFound { id },
            other => other.into(),
        })
    }

    /// All jobs, newest first.
    pub fn list_jobs(&self) -> Result<Vec<Job>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("{JOB_SELECT} ORDER BY created_at DESC"))?;
        let jobs = stmt
            .query_map([], map_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    /// Active jobs only — the set the scheduler arms at startup.
    pub fn list_active_jobs(&self) -> Result<Vec<Job>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare(&format!("{JOB_SELECT} WHERE is_active = 1 ORDER BY created_at DESC"))?;
        let jobs = stmt
            .query_map([], map_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    /// Replace a job's definition fields. The active flag and the advisory
    /// status columns are untouched.
    pub fn update_job(&self, params: &UpdateJobParams) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE jobs SET name = ?1, cron_expr = ?2, url = ?3, method = ?4, payload = ?5
             WHERE id = ?6",
            rusqlite::params![
                params.name,
                params.cron_expr,
                params.url,
                params.method,
                params.payload,
                params.id,
            ],
        )?;
        if n == 0 {
            return Err(StorageError::JobNotFound { id: params.id });
        }
        Ok(())
    }

    /// Flip a job's active flag.
    pub fn toggle_job(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("UPDATE jobs SET is_active = NOT is_active WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(StorageError::JobNotFound { id });
        }
        Ok(())
    }

    /// Delete a job. Its execution logs go with it (ON DELETE CASCADE).
    pub fn delete_job(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM jobs WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(StorageError::JobNotFound { id });
        }
        info!(job_id = id, "job deleted");
        Ok(())
    }

    /// Update the denormalized last-run columns after a dispatch.
    pub fn update_job_status(&self, id: i64, status: RunStatus, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE jobs SET last_run_at = ?1, last_status = ?2 WHERE id = ?3",
            rusqlite::params![at.to_rfc3339(), status.to_string(), id],
        )?;
        Ok(())
    }

    // ── Execution logs ───────────────────────────────────────────────────

    /// Append one execution outcome to the log.
    pub fn append_log(&self, outcome: &ExecutionOutcome) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO job_logs
               (job_id, status, http_code, duration_ms, response_body, error_message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                outcome.job_id,
                outcome.status.to_string(),
                outcome.http_code.map(i64::from),
                outcome.duration_ms as i64,
                outcome.response_body,
                outcome.error_message,
                outcome.started_at,
            ],
        )?;
        Ok(())
    }

    /// Recent log rows for a job, newest first. `limit` of 0 means the
    /// default (50).
    pub fn recent_logs(&self, job_id: i64, limit: usize) -> Result<Vec<ExecutionLog>> {
        let limit = if limit == 0 { DEFAULT_LOG_LIMIT } else { limit };
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{LOG_SELECT} WHERE job_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2"
        ))?;
        let logs = stmt
            .query_map(rusqlite::params![job_id, limit as i64], map_log)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(logs)
    }

    /// The most recent log row for a job, if any.
    pub fn latest_log(&self, job_id: i64) -> Result<Option<ExecutionLog>> {
        Ok(self.recent_logs(job_id, 1)?.into_iter().next())
    }
}

const JOB_SELECT: &str = "SELECT id, name, cron_expr, url, method, payload, is_active,
                                 created_at, last_run_at, last_status
                          FROM jobs";

const LOG_SELECT: &str = "SELECT id, job_id, status, http_code, duration_ms,
                                 response_body, error_message, created_at
                          FROM job_logs";

fn map_job(row: &Row<'_>) -> rusqlite::Result<Job> {
    Ok(Job {
        id: row.get(0)?,
        name: row.get(1)?,
        cron_expr: row.get(2)?,
        url: row.get(3)?,
        method: row.get(4)?,
        payload: row.get(5)?,
        is_active: row.get::<_, i64>(6)? != 0,
        created_at: row.get(7)?,
        last_run_at: row.get(8)?,
        last_status: row
            .get::<_, Option<String>>(9)?
            .and_then(|s| s.parse::<RunStatus>().ok()),
    })
}

fn map_log(row: &Row<'_>) -> rusqlite::Result<ExecutionLog> {
    Ok(ExecutionLog {
        id: row.get(0)?,
        job_id: row.get(1)?,
        status: row
            .get::<_, String>(2)?
            .parse::<RunStatus>()
            .unwrap_or(RunStatus::Error),
        http_code: row.get::<_, Option<i64>>(3)?.map(|c| c as u16),
        duration_ms: row.get::<_, i64>(4)? as u64,
        response_body: row.get(5)?,
        error_message: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(name: &str) -> CreateJobParams {
        CreateJobParams {
            name: name.to_string(),
            cron_expr: "0 * * * * *".to_string(),
            url: "http://localhost:1/ping".to_string(),
            method: "GET".to_string(),
            payload: None,
        }
    }

    fn outcome(job_id: i64, status: RunStatus) -> ExecutionOutcome {
        ExecutionOutcome {
            job_id,
            status,
            http_code: Some(200),
            duration_ms: 12,
            response_body: Some("pong".to_string()),
            error_message: None,
            started_at: Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn create_get_round_trip() {
        let repo = Repository::open_in_memory().unwrap();
        let id = repo.create_job(&params("ping")).unwrap();

        let job = repo.get_job(id).unwrap();
        assert_eq!(job.name, "ping");
        assert_eq!(job.method, "GET");
        assert!(job.is_active);
        assert!(job.last_run_at.is_none());
        assert!(job.last_status.is_none());
    }

    #[test]
    fn get_missing_job_is_not_found() {
        let repo = Repository::open_in_memory().unwrap();
        assert!(matches!(
            repo.get_job(99),
            Err(StorageError::JobNotFound { id: 99 })
        ));
    }

    #[test]
    fn update_replaces_definition_fields() {
        let repo = Repository::open_in_memory().unwrap();
        let id = repo.create_job(&params("ping")).unwrap();

        repo.update_job(&UpdateJobParams {
            id,
            name: "ping-v2".to_string(),
            cron_expr: "30 * * * * *".to_string(),
            url: "http://localhost:1/v2".to_string(),
            method: "POST".to_string(),
            payload: Some("{}".to_string()),
        })
        .unwrap();

        let job = repo.get_job(id).unwrap();
        assert_eq!(job.name, "ping-v2");
        assert_eq!(job.cron_expr, "30 * * * * *");
        assert_eq!(job.method, "POST");
        assert_eq!(job.payload.as_deref(), Some("{}"));
    }

    #[test]
    fn toggle_flips_active_and_filters_listing() {
        let repo = Repository::open_in_memory().unwrap();
        let id = repo.create_job(&params("ping")).unwrap();
        assert_eq!(repo.list_active_jobs().unwrap().len(), 1);

        repo.toggle_job(id).unwrap();
        assert!(!repo.get_job(id).unwrap().is_active);
        assert!(repo.list_active_jobs().unwrap().is_empty());
        assert_eq!(repo.list_jobs().unwrap().len(), 1);

        repo.toggle_job(id).unwrap();
        assert!(repo.get_job(id).unwrap().is_active);
    }

    #[test]
    fn delete_removes_job_and_logs() {
        let repo = Repository::open_in_memory().unwrap();
        let id = repo.create_job(&params("ping")).unwrap();
        repo.append_log(&outcome(id, RunStatus::Success)).unwrap();

        repo.delete_job(id).unwrap();
        assert!(repo.get_job(id).is_err());
        assert!(repo.recent_logs(id, 0).unwrap().is_empty());
        assert!(matches!(
            repo.delete_job(id),
            Err(StorageError::JobNotFound { .. })
        ));
    }

    #[test]
    fn status_update_sets_advisory_columns() {
        let repo = Repository::open_in_memory().unwrap();
        let id = repo.create_job(&params("ping")).unwrap();

        repo.update_job_status(id, RunStatus::Error, Utc::now()).unwrap();
        let job = repo.get_job(id).unwrap();
        assert_eq!(job.last_status, Some(RunStatus::Error));
        assert!(job.last_run_at.is_some());
    }

    #[test]
    fn logs_read_back_newest_first() {
        let repo = Repository::open_in_memory().unwrap();
        let id = repo.create_job(&params("ping")).unwrap();

        for status in [RunStatus::Success, RunStatus::Failed, RunStatus::Error] {
            repo.append_log(&outcome(id, status)).unwrap();
        }

        let logs = repo.recent_logs(id, 0).unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].status, RunStatus::Error);

        let latest = repo.latest_log(id).unwrap().unwrap();
        assert_eq!(latest.status, RunStatus::Error);
        assert_eq!(latest.http_code, Some(200));

        let limited = repo.recent_logs(id, 2).unwrap();
        assert_eq!(limited.len(), 2);
    }
}
