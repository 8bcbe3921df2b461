//! Outbound HTTP dispatch for a single job firing.
//!
//! One [`Executor`] is shared by the whole engine: it owns the HTTP client
//! (fixed timeout, identifying user-agent) and the storage handle the
//! outcome is written through. Transport failures never escape — every
//! failure mode ends up classified inside the [`ExecutionOutcome`].

use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::debug;

use hookbeat_core::config::{DISPATCH_TIMEOUT_SECS, MAX_CAPTURED_BODY_BYTES};
use hookbeat_storage::{ExecutionOutcome, Job, Repository, RunStatus};

use crate::error::Result;

/// Identifying user-agent sent with every outbound call.
const USER_AGENT: &str = concat!("hookbeat/", env!("CARGO_PKG_VERSION"));

/// Performs one bounded outbound HTTP call per firing and records the
/// outcome. Cloning shares the client and the storage handle.
#[derive(Clone)]
pub struct Executor {
    repo: Repository,
    client: reqwest::Client,
}

impl Executor {
    pub fn new(repo: Repository) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DISPATCH_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .expect("reqwest client");
        Self { repo, client }
    }

    /// Run one dispatch for `job`: perform the call, append the outcome to
    /// the execution log, then refresh the job's advisory status columns.
    ///
    /// The returned `Err` only ever means a storage write failed; the HTTP
    /// side of the dispatch is always captured in the outcome. The two
    /// writes are deliberately not transactional: when the log append
    /// fails the status update is skipped, and when only the status update
    /// fails the log row is already durable and the cached status stays
    /// stale until the next successful run.
    pub async fn execute(&self, job: &Job) -> Result<ExecutionOutcome> {
        let started_at = Utc::now();
        let started = Instant::now();
        debug!(job_id = job.id, method = %job.method, url = %job.url, "dispatching");

        let (status, http_code, response_body, error_message) = self.perform(job).await;
        let outcome = ExecutionOutcome {
            job_id: job.id,
            status,
            http_code,
            duration_ms: started.elapsed().as_millis() as u64,
            response_body,
            error_message,
            started_at: started_at.to_rfc3339(),
        };

        debug!(
            job_id = job.id,
            status = %outcome.status,
            code = ?outcome.http_code,
            duration_ms = outcome.duration_ms,
            "dispatch finished"
        );

        self.repo.append_log(&outcome)?;
        self.repo.update_job_status(job.id, outcome.status, started_at)?;
        Ok(outcome)
    }

    /// The HTTP half of a dispatch: (status, http code, captured body,
    /// error message). Infallible by construction.
    async fn perform(&self, job: &Job) -> (RunStatus, Option<u16>, Option<String>, Option<String>) {
        let method = match reqwest::Method::from_bytes(job.method.as_bytes()) {
            Ok(m) => m,
            Err(_) => {
                return (
                    RunStatus::Error,
                    None,
                    None,
                    Some(format!("invalid HTTP method: {:?}", job.method)),
                )
            }
        };

        let mut request = self.client.request(method, &job.url);
        if let Some(payload) = job.payload.as_deref().filter(|p| !p.is_empty()) {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(payload.to_string());
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => return (RunStatus::Error, None, None, Some(e.to_string())),
        };

        let code = response.status().as_u16();
        let status = if code < 400 {
            RunStatus::Success
        } else {
            RunStatus::Failed
        };

        match read_capped(response).await {
            Ok(body) => {
                let body = if body.is_empty() { None } else { Some(body) };
                (status, Some(code), body, None)
            }
            Err(e) => (
                RunStatus::Error,
                None,
                None,
                Some(format!("failed to read response body: {e}")),
            ),
        }
    }
}

/// Read at most [`MAX_CAPTURED_BODY_BYTES`] of the response body. Once the
/// cap is reached the response is dropped, so the excess is discarded
/// rather than buffered.
async fn read_capped(mut response: reqwest::Response) -> reqwest::Result<String> {
    let mut captured: Vec<u8> = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let remaining = MAX_CAPTURED_BODY_BYTES - captured.len();
        if remaining == 0 {
            break;
        }
        captured.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
    }
    Ok(String::from_utf8_lossy(&captured).into_owned())
}
