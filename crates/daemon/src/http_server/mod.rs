use axum::extract::DefaultBodyLimit;
use axum::{Extension, Router};
use http::header::{ACCEPT, CONTENT_TYPE, ORIGIN};
use http::Method;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_http::trace::{DefaultOnFailure, DefaultOnResponse};
use tower_http::LatencyUnit;

pub mod api;
mod config;
mod evaluate;
mod handlers;
mod health;

pub use config::Config;
pub use evaluate::WELCOME_TEXT;

use crate::ServiceState;

const API_PREFIX: &str = "/api";
const STATUS_PREFIX: &str = "/_status";

/// Maximum evaluate request size in bytes (64 KiB)
pub const MAX_EVALUATE_BODY_BYTES: usize = 64 * 1024;
/// Maximum insert request size in bytes (1 MiB)
pub const MAX_INSERT_BODY_BYTES: usize = 1024 * 1024;

/// Routes of the public evaluation server: `/`, `/config`, `/evaluate` and `/_status`
pub fn evaluate_router(state: ServiceState) -> Router {
    // clients may call from browsers
    let cors = CorsLayer::new()
        .allow_methods(vec![Method::GET, Method::POST])
        .allow_headers(vec![ACCEPT, CONTENT_TYPE, ORIGIN])
        .allow_origin(Any)
        .allow_credentials(false);

    Router::new()
        .nest(STATUS_PREFIX, health::router(state.clone()))
        .merge(evaluate::router(state.clone()))
        .fallback(handlers::not_found_handler)
        .layer(DefaultBodyLimit::max(MAX_EVALUATE_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Routes of the private API server: `/api/v0/insert` and `/_status`
pub fn api_router(state: ServiceState) -> Router {
    Router::new()
        .nest(STATUS_PREFIX, health::router(state.clone()))
        .nest(API_PREFIX, api::router(state.clone()))
        .fallback(handlers::not_found_handler)
        .layer(DefaultBodyLimit::max(MAX_INSERT_BODY_BYTES))
        .with_state(state)
}

/// Run the evaluation HTTP server (public, serves /_status + / + /config + /evaluate).
pub async fn run_evaluate(
    config: Config,
    state: ServiceState,
    shutdown_rx: watch::Receiver<()>,
) -> Result<(), HttpServerError> {
    serve("evaluation", config, evaluate_router(state), shutdown_rx).await
}

/// Run the API HTTP server (private, serves /_status + /api routes).
pub async fn run_api(
    config: Config,
    state: ServiceState,
    shutdown_rx: watch::Receiver<()>,
) -> Result<(), HttpServerError> {
    serve("API", config, api_router(state), shutdown_rx).await
}

async fn serve(
    name: &'static str,
    config: Config,
    router: Router,
    mut shutdown_rx: watch::Receiver<()>,
) -> Result<(), HttpServerError> {
    let listen_addr = config.listen_addr;
    let trace_layer = TraceLayer::new_for_http()
        .on_response(
            DefaultOnResponse::new()
                .include_headers(false)
                .level(config.log_level)
                .latency_unit(LatencyUnit::Micros),
        )
        .on_failure(DefaultOnFailure::new().latency_unit(LatencyUnit::Micros));

    let router = router.layer(Extension(config)).layer(trace_layer);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(addr = ?listen_addr, "{} server listening", name);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        })
        .await?;

    tracing::info!(addr = ?listen_addr, "{} server stopped", name);
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    #[error("an error occurred running the HTTP server: {0}")]
    ServingFailed(#[from] std::io::Error),
}
