//! HTTP contract tests driven through the router with `oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use pagepilot::browser::{BrowserSupervisor, StubBrowser};
use pagepilot::catalog::CatalogService;
use pagepilot::config::Config;
use pagepilot::executor::DslExecutor;
use pagepilot::planner::{Planner, PlannerOutput, ScriptedPlanner, UnconfiguredPlanner};
use pagepilot::server::{build_router, AppState};
use pagepilot::tasks::TaskManager;

fn app_with(planner: Arc<dyn Planner>) -> (Router, Arc<StubBrowser>) {
    let config = Arc::new(Config {
        save_debug_artifacts: false,
        locator_retries: 0,
        ..Config::default()
    });
    let stub = Arc::new(StubBrowser::new());
    let supervisor = Arc::new(BrowserSupervisor::new(stub.clone(), config.clone()));
    let catalog = Arc::new(CatalogService::new());
    let executor = Arc::new(DslExecutor::new(
        supervisor.clone(),
        catalog.clone(),
        config.clone(),
    ));
    let tasks = TaskManager::new(&config);
    let state = AppState::new(config, supervisor, executor, tasks, planner, catalog);
    (build_router(state), stub)
}

fn app() -> (Router, Arc<StubBrowser>) {
    app_with(Arc::new(UnconfiguredPlanner))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8_lossy(&bytes).to_string())
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn healthz_reports_components() {
    let (app, _stub) = app();
    let (status, body) = get(&app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    let value: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(value["status"], "healthy");
    assert_eq!(value["components"]["browser"], "up");
    assert_eq!(value["components"]["queue_depth"], 0);
}

#[tokio::test]
async fn execute_dsl_empty_plan_is_success() {
    let (app, _stub) = app();
    let (status, body) = post_json(&app, "/execute-dsl", json!({ "actions": [] })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["warnings"], json!([]));
    assert_eq!(body["is_done"], false);
}

#[tokio::test]
async fn execute_dsl_never_returns_5xx_for_bad_input() {
    let (app, _stub) = app();

    // Malformed JSON body.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/execute-dsl")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("this is not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["success"], false);
    assert!(value["warnings"][0]
        .as_str()
        .unwrap()
        .starts_with("ERROR:auto:"));

    // Unknown action kind.
    let (status, body) = post_json(
        &app,
        "/execute-dsl",
        json!({ "actions": [{ "kind": "teleport" }] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn execute_dsl_accepts_legacy_plan_wrapper() {
    let (app, stub) = app();
    let (_, body) = post_json(
        &app,
        "/execute-dsl",
        json!({ "plan": { "actions": [{ "action": "navigate", "target": "https://example.com" }] } }),
    )
    .await;
    assert_eq!(body["success"], true);
    assert_eq!(body["observation"]["url"], "https://example.com");
    assert_eq!(body["observation"]["nav_detected"], true);
    assert_eq!(stub.nav_log(), vec!["https://example.com".to_string()]);
}

#[tokio::test]
async fn execute_orchestrates_and_status_polls() {
    let planner = Arc::new(ScriptedPlanner::new([PlannerOutput {
        explanation: "I will take a screenshot.".into(),
        actions: json!([{ "kind": "screenshot" }]),
        complete: false,
    }]));
    let (app, _stub) = app_with(planner);

    let (status, body) = post_json(
        &app,
        "/execute",
        json!({ "command": "screenshot the page" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["explanation"], "I will take a screenshot.");
    assert_eq!(body["async_execution"], true);
    let task_id = body["task_id"].as_str().unwrap().to_string();

    // Poll until the task settles.
    let mut state = String::new();
    for _ in 0..50 {
        let (_, status_body) = get(&app, &format!("/status/{task_id}")).await;
        let value: Value = serde_json::from_str(&status_body).unwrap();
        state = value["state"].as_str().unwrap_or_default().to_string();
        if state == "completed" || state == "failed" {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(state, "completed");
}

#[tokio::test]
async fn cancel_unknown_task_reports_unknown() {
    let (app, _stub) = app();
    let (status, body) = post_json(&app, "/cancel/task-nope", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "unknown_task");
}

#[tokio::test]
async fn status_unknown_task_is_200() {
    let (app, _stub) = app();
    let (status, body) = get(&app, "/status/task-nope").await;
    assert_eq!(status, StatusCode::OK);
    let value: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(value["state"], "unknown");
}

#[tokio::test]
async fn observation_endpoints_serve_text_bodies() {
    let (app, stub) = app();
    stub.set_url("https://example.com/live");
    stub.set_html("<html><body>live</body></html>");

    let (_, url) = get(&app, "/url").await;
    assert_eq!(url, "https://example.com/live");

    let (_, source) = get(&app, "/source").await;
    assert!(source.contains("live"));

    let (_, shot) = get(&app, "/screenshot").await;
    assert!(!shot.is_empty());
    assert!(shot.chars().all(|c| c.is_ascii()));
}

#[tokio::test]
async fn catalog_endpoint_returns_versioned_entries() {
    let (app, _stub) = app();
    let (status, body) = get(&app, "/catalog").await;
    assert_eq!(status, StatusCode::OK);
    let value: Value = serde_json::from_str(&body).unwrap();
    assert!(value["version"].is_string());
    assert_eq!(value["entries"].as_array().unwrap().len(), 2);
    assert_eq!(value["entries"][0]["index"], 0);
}

#[tokio::test]
async fn reset_clears_conversation_only() {
    let (app, _stub) = app();
    let (status, body) = post_json(&app, "/reset", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn metrics_endpoint_renders_prometheus_text() {
    let (app, _stub) = app();
    // Touch a counter so the family is present.
    pagepilot::metrics::ACTIONS_TOTAL
        .with_label_values(&["click", "ok"])
        .inc();
    let (status, body) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("pagepilot_actions_total"));
}

#[tokio::test]
async fn responses_carry_correlation_ids() {
    let (app, _stub) = app();
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/url").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.headers().contains_key("x-correlation-id"));
}
