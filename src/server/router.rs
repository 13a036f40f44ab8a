//! Router assembly.
//!
//! All payload endpoints answer `200 OK`; faults ride inside the body as
//! warnings. Every response carries an `x-correlation-id` header linking
//! it to the server logs.

use axum::http::{HeaderValue, Method};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tracing::debug;
use uuid::Uuid;

use super::routes::{admin, execute, observe, tasks};
use super::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/execute-dsl", post(execute::execute_dsl))
        .route("/execute", post(execute::execute_command))
        .route("/status/:task_id", get(tasks::status))
        .route("/cancel/:task_id", post(tasks::cancel))
        .route("/source", get(observe::source))
        .route("/screenshot", get(observe::screenshot))
        .route("/url", get(observe::url))
        .route("/catalog", get(observe::catalog))
        .route("/healthz", get(admin::healthz))
        .route("/livez", get(admin::livez))
        .route("/readyz", get(admin::readyz))
        .route("/metrics", get(admin::metrics))
        .route("/reset", post(admin::reset))
        .layer(middleware::map_response(attach_correlation_id))
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

async fn attach_correlation_id(mut response: Response) -> Response {
    let correlation_id = Uuid::new_v4().simple().to_string();
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert("x-correlation-id", value);
    }
    debug!(%correlation_id, status = %response.status(), "response");
    response
}
