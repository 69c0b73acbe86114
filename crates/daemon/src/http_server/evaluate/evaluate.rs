use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use common::engine::EngineError;

use crate::http_server::handlers::error_response;
use crate::ServiceState;

const OCTET_STREAM: &str = "application/octet-stream";

/// Hand the raw request body to the engine and return its serialized answer
pub async fn handler(
    State(state): State<ServiceState>,
    body: Bytes,
) -> Result<impl IntoResponse, EvaluateError> {
    let response = state
        .engine()
        .handle_request(&body, state.store())
        .await?;

    tracing::debug!(
        request_len = body.len(),
        response_len = response.len(),
        "evaluate request served"
    );
    Ok(([(header::CONTENT_TYPE, OCTET_STREAM)], response))
}

#[derive(Debug, thiserror::Error)]
pub enum EvaluateError {
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error("evaluation failed: {0}")]
    Internal(#[source] EngineError),
}

impl From<EngineError> for EvaluateError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::MalformedRequest(msg) => EvaluateError::Malformed(msg),
            other => EvaluateError::Internal(other),
        }
    }
}

impl IntoResponse for EvaluateError {
    fn into_response(self) -> Response {
        match self {
            EvaluateError::Malformed(msg) => {
                tracing::debug!(reason = %msg, "rejected malformed evaluate request");
                error_response(StatusCode::BAD_REQUEST, "malformed request", false)
            }
            EvaluateError::Internal(e) => {
                // store and encryption details stay in the logs
                tracing::error!(error = %e, "evaluate request failed");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error",
                    false,
                )
            }
        }
    }
}
