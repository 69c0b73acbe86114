use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

mod data_source;
mod readiness;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/livez", get(liveness_handler))
        .route("/readyz", get(readiness::handler))
        .route("/version", get(version_handler))
        .with_state(state)
}

async fn liveness_handler() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

async fn version_handler() -> impl IntoResponse {
    Json(common::version::build_info())
}
