//! Public routes through which clients query the protocol engine.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

mod evaluate;

use crate::ServiceState;

pub const WELCOME_TEXT: &str = "leakcheck evaluation service";

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/", get(index_handler))
        .route("/config", get(config_handler))
        .route("/evaluate", post(evaluate::handler))
        .with_state(state)
}

async fn index_handler() -> impl IntoResponse {
    WELCOME_TEXT
}

/// What a client needs to build requests for the configured engine
async fn config_handler(State(state): State<ServiceState>) -> impl IntoResponse {
    Json(state.engine().config())
}
