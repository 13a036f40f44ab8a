//! Read-only page observation endpoints. None of these take the browser
//! lock; they may run while a plan executes.

use axum::extract::State;
use axum::Json;
use base64::Engine;
use serde_json::{json, Value};

use super::super::state::AppState;

pub async fn source(State(state): State<AppState>) -> String {
    state
        .supervisor
        .port()
        .html()
        .await
        .unwrap_or_default()
}

pub async fn screenshot(State(state): State<AppState>) -> String {
    match state.supervisor.port().screenshot_png().await {
        Ok(png) => base64::engine::general_purpose::STANDARD.encode(png),
        Err(_) => String::new(),
    }
}

pub async fn url(State(state): State<AppState>) -> String {
    state
        .supervisor
        .port()
        .current_url()
        .await
        .unwrap_or_default()
}

pub async fn catalog(State(state): State<AppState>) -> Json<Value> {
    let port = state.supervisor.port();
    match state.catalog.ensure_fresh(port.as_ref()).await {
        Ok(catalog) => Json(json!({
            "version": catalog.version,
            "entries": catalog.entries,
        })),
        Err(err) => Json(json!({
            "version": Value::Null,
            "entries": [],
            "warnings": [crate::warnings::format_warning(
                crate::warnings::Severity::Error,
                "catalog",
                &err.detail,
            )],
        })),
    }
}
