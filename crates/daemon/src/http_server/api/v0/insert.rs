use axum::extract::{Json, State};
use axum::response::{IntoResponse, Response};
use reqwest::{Client, RequestBuilder, Url};

use common::ingest::{InsertError, InsertReport, InsertRequest};

use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::http_server::handlers::error_response;
use crate::ServiceState;

/// Run one breach record through the insertion pipeline
pub async fn handler(
    State(state): State<ServiceState>,
    Json(req): Json<InsertRequest>,
) -> Result<impl IntoResponse, InsertRecordError> {
    tracing::debug!(phase = %req.phase, num_variants = req.num_variants, "insert request received");

    let report = state.inserter().insert(&req).await?;
    Ok((http::StatusCode::OK, Json(report)))
}

#[derive(Debug, thiserror::Error)]
pub enum InsertRecordError {
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("insert failed: {0}")]
    Failed(String),
}

impl From<InsertError<sqlx::Error>> for InsertRecordError {
    fn from(e: InsertError<sqlx::Error>) -> Self {
        match e {
            InsertError::InvalidRequest(msg) => InsertRecordError::Invalid(msg),
            InsertError::GeneratorUnavailable => {
                InsertRecordError::Invalid("no external variant generator is configured".into())
            }
            other => InsertRecordError::Failed(other.to_string()),
        }
    }
}

impl IntoResponse for InsertRecordError {
    fn into_response(self) -> Response {
        match self {
            InsertRecordError::Invalid(msg) => {
                tracing::warn!(reason = %msg, "rejected insert request");
                error_response(http::StatusCode::BAD_REQUEST, &msg, true)
            }
            InsertRecordError::Failed(msg) => {
                tracing::error!(error = %msg, "insert request failed");
                error_response(
                    http::StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error",
                    true,
                )
            }
        }
    }
}

// Client implementation - builds request for this operation
impl ApiRequest for InsertRequest {
    type Response = InsertReport;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/insert")?;
        Ok(client.post(full_url).json(&self))
    }
}
