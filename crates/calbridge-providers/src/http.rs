//! HTTP plumbing shared by the adapters and the token provider.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{trace, warn};

use crate::error::{ProviderError, ProviderResult};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_USER_AGENT: &str = concat!("calbridge/", env!("CARGO_PKG_VERSION"));

/// Transport settings common to every adapter.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub user_agent: String,
    /// Turning this off accepts self-signed certificates.
    pub verify_tls: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            verify_tls: true,
        }
    }
}

impl HttpSettings {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    pub fn build_client(&self) -> ProviderResult<Client> {
        Client::builder()
            .danger_accept_invalid_certs(!self.verify_tls)
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .build()
            .map_err(|e| {
                ProviderError::configuration(format!("failed to create HTTP client: {e}"))
                    .with_source(e)
            })
    }
}

/// Maps a failed `send()` to a network error.
pub fn send_error(err: reqwest::Error) -> ProviderError {
    let message = if err.is_timeout() {
        "request timeout".to_string()
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        format!("request failed: {err}")
    };
    ProviderError::network(message).with_source(err)
}

/// Maps an unsuccessful status to the matching error category.
pub fn status_error(status: StatusCode, retry_after: Option<u64>, body: &str) -> ProviderError {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {body}")
    };
    match status {
        StatusCode::UNAUTHORIZED => {
            ProviderError::authentication(format!("access token expired or invalid ({detail})"))
        }
        StatusCode::FORBIDDEN => ProviderError::authorization(format!("access denied ({detail})")),
        StatusCode::NOT_FOUND => ProviderError::not_found(format!("resource not found ({detail})")),
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => {
            ProviderError::conflict(format!("resource was modified concurrently ({detail})"))
        }
        StatusCode::GONE => ProviderError::gone(format!("resource no longer available ({detail})")),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::rate_limited(format!(
            "rate limit exceeded{}",
            retry_after
                .map(|s| format!(", retry after {s} seconds"))
                .unwrap_or_default()
        )),
        StatusCode::BAD_REQUEST => ProviderError::bad_request(detail),
        s if s.is_server_error() => ProviderError::server(format!("provider error ({detail})")),
        _ => ProviderError::invalid_response(format!("unexpected status {detail}")),
    }
}

/// Passes successful responses through and converts the rest to errors.
pub async fn check(response: Response) -> ProviderResult<Response> {
    let status = response.status();
    trace!(status = %status, url = %response.url(), "received response");
    if status.is_success() || status == StatusCode::MULTI_STATUS {
        return Ok(response);
    }

    let retry_after = header(&response, "Retry-After").and_then(|v| v.parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();
    if status.is_server_error() {
        warn!(status = %status, "provider returned a server error");
    }
    Err(status_error(status, retry_after, body.trim()))
}

pub async fn text(response: Response) -> ProviderResult<String> {
    response
        .text()
        .await
        .map_err(|e| ProviderError::network(format!("failed to read response: {e}")).with_source(e))
}

pub async fn json<T: DeserializeOwned>(response: Response) -> ProviderResult<T> {
    let body = text(response).await?;
    serde_json::from_str(&body).map_err(|e| {
        ProviderError::invalid_response(format!("failed to parse response: {e}")).with_source(e)
    })
}

pub fn header(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
