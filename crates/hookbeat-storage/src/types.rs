use serde::{Deserialize, Serialize};

/// Outcome classification for a single execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// HTTP response received with a status code below 400.
    Success,
    /// HTTP response received with a status code of 400 or above.
    Failed,
    /// No response: timeout, DNS failure, refused connection, TLS failure,
    /// or a request that could not be built at all.
    Error,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Success => "SUCCESS",
            RunStatus::Failed => "FAILED",
            RunStatus::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(RunStatus::Success),
            "FAILED" => Ok(RunStatus::Failed),
            "ERROR" => Ok(RunStatus::Error),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// A persisted job definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// SQLite rowid — primary key.
    pub id: i64,
    /// Human-readable label.
    pub name: String,
    /// Six-field cron expression (seconds minutes hours dom month dow).
    /// Validated by the scheduler when the job is armed, not here.
    pub cron_expr: String,
    /// Target URL for the outbound call.
    pub url: String,
    /// HTTP method (GET, POST, ...).
    pub method: String,
    /// Optional request body, sent as application/json when present.
    pub payload: Option<String>,
    /// Paused jobs stay in the table but are never armed.
    pub is_active: bool,
    /// ISO-8601 timestamp of job creation.
    pub created_at: String,
    /// ISO-8601 timestamp of the most recent execution start, if any.
    pub last_run_at: Option<String>,
    /// Status of the most recent execution. Advisory — see crate docs.
    pub last_status: Option<RunStatus>,
}

/// Parameters for creating a new job.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobParams {
    pub name: String,
    pub cron_expr: String,
    pub url: String,
    pub method: String,
    pub payload: Option<String>,
}

/// Parameters for updating an existing job's definition.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateJobParams {
    pub id: i64,
    pub name: String,
    pub cron_expr: String,
    pub url: String,
    pub method: String,
    pub payload: Option<String>,
}

/// The immutable record of one execution attempt, as produced by the
/// dispatcher. Written once to `job_logs`; never updated.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub job_id: i64,
    pub status: RunStatus,
    /// Absent when no response was received (status == ERROR).
    pub http_code: Option<u16>,
    pub duration_ms: u64,
    /// Captured response body, truncated to the capture cap.
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    /// ISO-8601 wall-clock time the attempt started.
    pub started_at: String,
}

/// A `job_logs` row as read back from the database.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionLog {
    pub id: i64,
    pub job_id: i64,
    pub status: RunStatus,
    pub http_code: Option<u16>,
    pub duration_ms: u64,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_round_trips_through_strings() {
        for status in [RunStatus::Success, RunStatus::Failed, RunStatus::Error] {
            let parsed: RunStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn unknown_status_string_is_rejected() {
        assert!("PENDING".parse::<RunStatus>().is_err());
    }
}
