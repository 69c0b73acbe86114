use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio::time::timeout;

use super::data_source::*;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[tracing::instrument]
pub async fn handler(data_src: StateDataSource) -> Response {
    let failure = match timeout(HEALTH_CHECK_TIMEOUT, data_src.is_ready()).await {
        Ok(Ok(())) => None,
        Ok(Err(DataSourceError::DependencyFailure)) => {
            Some("one or more dependencies aren't available")
        }
        Ok(Err(DataSourceError::ShuttingDown)) => Some("service is shutting down"),
        Err(_) => Some("health check timed out"),
    };

    match failure {
        None => (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response(),
        Some(message) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "failure", "message": message})),
        )
            .into_response(),
    }
}
