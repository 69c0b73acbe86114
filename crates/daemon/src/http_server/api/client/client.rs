use reqwest::{header::HeaderMap, header::HeaderValue, Client, StatusCode};
use serde::Deserialize;
use url::Url;

use super::ApiRequest;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("HTTP status {0}: {1}")]
    HttpStatus(StatusCode, String),
}

/// Error body written by the server's handlers
#[derive(Debug, Deserialize)]
struct ErrorBody {
    msg: String,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    pub remote: Url,
    client: Client,
}

impl ApiClient {
    pub fn new(remote: &Url) -> Result<Self, ApiError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        default_headers.insert("Accept", HeaderValue::from_static("application/json"));
        let client = Client::builder().default_headers(default_headers).build()?;

        Ok(Self {
            remote: remote.clone(),
            client,
        })
    }

    pub async fn call<T: ApiRequest>(&self, request: T) -> Result<T::Response, ApiError> {
        let request_builder = request.build_request(&self.remote, &self.client)?;
        let response = request_builder.send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T::Response>().await?);
        }

        let text = response.text().await?;
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.msg)
            .unwrap_or(text);
        Err(ApiError::HttpStatus(status, message))
    }

    /// GET a status route (e.g. `/_status/livez`) on `base` and return the status code
    pub async fn probe(&self, base: &Url, path: &str) -> Result<StatusCode, ApiError> {
        let url = base.join(path)?;
        let response = self.client.get(url).send().await?;
        Ok(response.status())
    }

    /// Get the base URL for API requests
    pub fn base_url(&self) -> &Url {
        &self.remote
    }
}
