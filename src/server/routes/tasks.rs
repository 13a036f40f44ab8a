//! Task polling endpoints.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use super::super::state::AppState;

pub async fn status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Json<Value> {
    match state.tasks.status(&task_id) {
        Some(status) => Json(serde_json::to_value(&status).unwrap_or_else(|_| {
            json!({ "task_id": task_id, "state": "unknown" })
        })),
        None => Json(json!({ "task_id": task_id, "state": "unknown" })),
    }
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Json<Value> {
    let known = state.tasks.cancel(&task_id);
    Json(json!({
        "status": if known { "requested" } else { "unknown_task" },
    }))
}
