//! Plan execution endpoints.
//!
//! `/execute-dsl` runs a wire plan synchronously and returns the full
//! result. `/execute` is the orchestrator: it consults the planner,
//! submits the returned actions asynchronously, and answers with the
//! explanation plus a task handle so the client can poll.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::planner::{PlanningContext, TurnRecord};
use crate::warnings::{format_warning, Severity};

use super::super::state::AppState;

/// Unwrap a JSON body, converting extraction failures into a 200 payload
/// with an ERROR warning instead of a 4xx/5xx.
fn body_or_warning(body: Result<Json<Value>, JsonRejection>) -> Result<Value, Json<Value>> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(Json(json!({
            "success": false,
            "warnings": [format_warning(
                Severity::Error,
                "auto",
                &format!("request body rejected: {rejection}"),
            )],
            "is_done": false,
        }))),
    }
}

pub async fn execute_dsl(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Json<Value> {
    let body = match body_or_warning(body) {
        Ok(body) => body,
        Err(response) => return response,
    };

    let actions = body
        .get("actions")
        .cloned()
        .or_else(|| {
            body.get("plan")
                .and_then(|plan| plan.get("actions"))
                .cloned()
        })
        .unwrap_or_else(|| Value::Array(vec![]));
    let expected_catalog_version = body
        .get("expected_catalog_version")
        .and_then(Value::as_str)
        .map(str::to_string);

    let result = state
        .executor
        .execute_wire(&actions, expected_catalog_version, CancellationToken::new())
        .await;
    match serde_json::to_value(&result) {
        Ok(value) => Json(value),
        Err(err) => Json(json!({
            "success": false,
            "warnings": [format_warning(
                Severity::Error,
                "auto",
                &format!("result serialization failed: {err}"),
            )],
            "is_done": false,
        })),
    }
}

pub async fn execute_command(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Json<Value> {
    let body = match body_or_warning(body) {
        Ok(body) => body,
        Err(response) => return response,
    };

    let command = body
        .get("command")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let context = PlanningContext {
        command: command.clone(),
        history: state.history(),
        html: body.get("html").and_then(Value::as_str).map(str::to_string),
        screenshot_b64: body
            .get("screenshot")
            .and_then(Value::as_str)
            .map(str::to_string),
        model: body
            .get("model")
            .and_then(Value::as_str)
            .map(str::to_string),
        catalog: state.catalog.snapshot(),
    };

    let planned = match state.planner.plan(context).await {
        Ok(planned) => planned,
        Err(err) => {
            warn!(%err, "planner failed");
            return Json(json!({
                "explanation": err.kind.user_message(),
                "actions": [],
                "complete": true,
                "async_execution": false,
                "warnings": [format_warning(
                    Severity::Error,
                    "planner",
                    &err.detail,
                )],
            }));
        }
    };

    let has_actions = planned
        .actions
        .as_array()
        .map_or(false, |actions| !actions.is_empty());
    let task_id = if has_actions {
        let task_id = state.tasks.create();
        let executor = state.executor.clone();
        let actions = planned.actions.clone();
        state.tasks.submit(&task_id, move |cancel| async move {
            executor.execute_wire(&actions, None, cancel).await
        });
        info!(%task_id, "plan submitted for async execution");
        Some(task_id)
    } else {
        None
    };

    state.push_turn(TurnRecord {
        command,
        explanation: planned.explanation.clone(),
        task_id: task_id.clone(),
    });

    Json(json!({
        "explanation": planned.explanation,
        "actions": planned.actions,
        "complete": planned.complete,
        "task_id": task_id,
        "async_execution": task_id.is_some(),
    }))
}
