use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;

use crate::error::{AnisubError, Result};

/// Shared client settings for provider calls
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(concat!("anisub/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .map_err(AnisubError::Http)
}

/// Turn a non-success response into a provider error carrying the body
pub async fn check_status(response: Response, provider: &str) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    debug!("{} error body: {}", provider, body);
    Err(AnisubError::Provider(format!("{} API error {}: {}", provider, status, body.trim())))
}

pub fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}
