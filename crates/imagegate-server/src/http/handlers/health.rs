//! `GET /health`, a liveness/readiness probe reporting worker pool state.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::http::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    workers_ready: usize,
    total_workers: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        workers_ready: state.pool.ready_worker_count(),
        total_workers: state.pool.num_workers(),
    })
}

/// `GET /status`: pool detail including the count of requests currently
/// awaiting completion, surfaced via the mailbox registry's `active_requests`
/// equivalent.
#[derive(Serialize)]
pub struct StatusResponse {
    workers_ready: usize,
    total_workers: usize,
    active_requests: usize,
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        workers_ready: state.pool.ready_worker_count(),
        total_workers: state.pool.num_workers(),
        active_requests: state.mailbox.inflight_count().await,
    })
}
