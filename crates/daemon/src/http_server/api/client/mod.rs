#[allow(clippy::module_inception)]
mod client;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

pub use client::{ApiClient, ApiError};

/// A request the CLI can send to the API server
///
/// Implemented next to the handler that serves it, so the route and
///  the payload live in one place.
pub trait ApiRequest {
    type Response: DeserializeOwned;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError>;
}
