//! Health, metrics, and conversation admin.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use crate::browser::health;
use crate::metrics;

use super::super::state::AppState;

pub async fn healthz(State(state): State<AppState>) -> Json<Value> {
    let report = health::probe(state.supervisor.port().as_ref()).await;
    let queue_depth = state.tasks.queue_depth();
    let status = if report.healthy() { "healthy" } else { "degraded" };
    Json(json!({
        "status": status,
        "components": {
            "browser": if report.healthy() { "up" } else { "down" },
            "workers": {
                "busy": state.tasks.busy_workers(),
                "total": state.config.worker_pool,
            },
            "queue_depth": queue_depth,
        },
    }))
}

pub async fn livez(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.started_at.elapsed().as_secs();
    (StatusCode::OK, Json(json!({ "live": true, "uptime_secs": uptime })))
}

pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let report = health::probe(state.supervisor.port().as_ref()).await;
    let status = if report.healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(json!({ "ready": report.healthy() })))
}

pub async fn metrics() -> String {
    metrics::render()
}

/// Clears conversation state; never touches in-flight tasks that have not
/// observed cancellation.
pub async fn reset(State(state): State<AppState>) -> Json<Value> {
    state.reset_conversation();
    Json(json!({ "status": "ok" }))
}
