//! Job management API — the request-handling layer in front of the engine.
//!
//! Writes go to storage first, then the engine is told to re-arm. A job
//! whose new expression fails to schedule is still persisted; the
//! scheduling error comes back in the response body so the client can show
//! it, matching the engine contract (the job is simply left unscheduled).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use hookbeat_scheduler::SchedulerError;
use hookbeat_storage::{CreateJobParams, Job, StorageError, UpdateJobParams};

use crate::app::AppState;

type ApiError = (StatusCode, Json<Value>);

/// GET /api/jobs — all jobs, with their next trigger when armed.
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let jobs = state.repo.list_jobs().map_err(storage_error)?;
    let jobs: Vec<Value> = jobs.iter().map(|j| job_json(&state, j)).collect();
    Ok(Json(json!({ "jobs": jobs })))
}

/// POST /api/jobs — create a job and arm it.
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(params): Json<CreateJobParams>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let id = state.repo.create_job(&params).map_err(storage_error)?;
    let job = state.repo.get_job(id).map_err(storage_error)?;
    let scheduling_error = arm(&state, &job)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "job": job_json(&state, &job),
            "scheduling_error": scheduling_error,
        })),
    ))
}

/// GET /api/jobs/{id} — one job plus its recent execution history.
pub async fn job_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let job = state.repo.get_job(id).map_err(storage_error)?;
    let logs = state.repo.recent_logs(id, 0).map_err(storage_error)?;
    Ok(Json(json!({
        "job": job_json(&state, &job),
        "logs": logs,
    })))
}

/// Body for PUT /api/jobs/{id} — same shape as create.
#[derive(Debug, Deserialize)]
pub struct JobBody {
    pub name: String,
    pub cron_expr: String,
    pub url: String,
    pub method: String,
    pub payload: Option<String>,
}

/// PUT /api/jobs/{id} — replace the definition and re-arm.
pub async fn update_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<JobBody>,
) -> Result<Json<Value>, ApiError> {
    state
        .repo
        .update_job(&UpdateJobParams {
            id,
            name: body.name,
            cron_expr: body.cron_expr,
            url: body.url,
            method: body.method,
            payload: body.payload,
        })
        .map_err(storage_error)?;

    let scheduling_error = reload(&state, id)?;
    let job = state.repo.get_job(id).map_err(storage_error)?;
    Ok(Json(json!({
        "job": job_json(&state, &job),
        "scheduling_error": scheduling_error,
    })))
}

/// POST /api/jobs/{id}/toggle — pause or resume a job.
pub async fn toggle_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    state.repo.toggle_job(id).map_err(storage_error)?;
    let scheduling_error = reload(&state, id)?;
    let job = state.repo.get_job(id).map_err(storage_error)?;
    Ok(Json(json!({
        "job": job_json(&state, &job),
        "scheduling_error": scheduling_error,
    })))
}

/// POST /api/jobs/{id}/run — dispatch immediately, bypassing the schedule.
pub async fn run_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    state.scheduler.run_now(id).map_err(scheduler_error)?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "dispatched" }))))
}

/// DELETE /api/jobs/{id} — disarm, then delete the row (logs cascade).
pub async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    state.scheduler.remove(id);
    state.repo.delete_job(id).map_err(storage_error)?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub limit: usize,
}

/// GET /api/jobs/{id}/logs — recent execution log rows, newest first.
pub async fn job_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Value>, ApiError> {
    // 404 for unknown jobs rather than an empty list.
    state.repo.get_job(id).map_err(storage_error)?;
    let logs = state.repo.recent_logs(id, query.limit).map_err(storage_error)?;
    Ok(Json(json!({ "logs": logs })))
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Serialize a job, annotated with its next trigger when armed.
fn job_json(state: &AppState, job: &Job) -> Value {
    let mut value = serde_json::to_value(job).unwrap_or_else(|_| json!({}));
    if let Some(map) = value.as_object_mut() {
        map.insert(
            "next_run_at".to_string(),
            state
                .scheduler
                .next_trigger(job.id)
                .map(|at| json!(at.to_rfc3339()))
                .unwrap_or(Value::Null),
        );
    }
    value
}

/// Arm a job after create; an invalid expression is reported, not fatal.
fn arm(state: &AppState, job: &Job) -> Result<Option<String>, ApiError> {
    match state.scheduler.add(job.clone()) {
        Ok(()) => Ok(None),
        Err(SchedulerError::InvalidExpression(msg)) => {
            warn!(job_id = job.id, error = %msg, "job saved but not scheduled");
            Ok(Some(msg))
        }
        Err(other) => Err(scheduler_error(other)),
    }
}

/// Re-arm a job after an edit or toggle; same error policy as [`arm`].
fn reload(state: &AppState, id: i64) -> Result<Option<String>, ApiError> {
    match state.scheduler.reload(id) {
        Ok(()) => Ok(None),
        Err(SchedulerError::InvalidExpression(msg)) => {
            warn!(job_id = id, error = %msg, "job saved but not scheduled");
            Ok(Some(msg))
        }
        Err(other) => Err(scheduler_error(other)),
    }
}

fn storage_error(e: StorageError) -> ApiError {
    match e {
        StorageError::JobNotFound { .. } => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "job not found" })),
        ),
        other => {
            warn!(error = %other, "storage operation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error" })),
            )
        }
    }
}

fn scheduler_error(e: SchedulerError) -> ApiError {
    match e {
        SchedulerError::JobNotFound { .. } => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "job not found" })),
        ),
        SchedulerError::InvalidExpression(msg) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": msg })),
        ),
        other => {
            warn!(error = %other, "scheduler operation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error" })),
            )
        }
    }
}
