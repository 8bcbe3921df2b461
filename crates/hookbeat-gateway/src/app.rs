use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use hookbeat_core::config::HookbeatConfig;
use hookbeat_scheduler::SchedulerEngine;
use hookbeat_storage::Repository;

/// Central shared state — passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: HookbeatConfig,
    pub repo: Repository,
    pub scheduler: Arc<SchedulerEngine>,
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(crate::http::ui::ui_handler))
        .route("/health", get(crate::http::health::health_handler))
        .route(
            "/api/jobs",
            get(crate::http::jobs::list_jobs).post(crate::http::jobs::create_job),
        )
        .route(
            "/api/jobs/{id}",
            get(crate::http::jobs::job_detail)
                .put(crate::http::jobs::update_job)
                .delete(crate::http::jobs::delete_job),
        )
        .route("/api/jobs/{id}/toggle", post(crate::http::jobs::toggle_job))
        .route("/api/jobs/{id}/run", post(crate::http::jobs::run_job))
        .route("/api/jobs/{id}/logs", get(crate::http::jobs::job_logs))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
