use rusqlite::Connection;

use crate::error::Result;

/// Initialise the hookbeat schema in `conn`. Safe to call on every startup
/// (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            name         TEXT    NOT NULL,
            cron_expr    TEXT    NOT NULL,   -- six-field cron expression
            url          TEXT    NOT NULL,
            method       TEXT    NOT NULL DEFAULT 'GET',
            payload      TEXT,               -- optional request body
            is_active    INTEGER NOT NULL DEFAULT 1,
            created_at   TEXT    NOT NULL,   -- ISO-8601
            last_run_at  TEXT,               -- advisory cache, ISO-8601 or NULL
            last_status  TEXT                -- advisory cache: SUCCESS/FAILED/ERROR
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_jobs_active ON jobs (is_active);

        CREATE TABLE IF NOT EXISTS job_logs (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id        INTEGER NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            status        TEXT    NOT NULL,
            http_code     INTEGER,           -- NULL when no response arrived
            duration_ms   INTEGER NOT NULL,
            response_body TEXT,              -- truncated capture, NULL when empty
            error_message TEXT,
            created_at    TEXT    NOT NULL   -- ISO-8601 attempt start time
        ) STRICT;

        -- History reads: SELECT ... WHERE job_id = ? ORDER BY created_at DESC
        CREATE INDEX IF NOT EXISTS idx_logs_job ON job_logs (job_id, created_at DESC);
        ",
    )?;
    Ok(())
}
