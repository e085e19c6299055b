//! Gateway error types.
//!
//! Per-operation failures never surface here: they are reported inside the
//! result envelope. A [`GatewayError`] means the gateway could not be set up
//! or its input/output could not be handled at all.

use calbridge_providers::ProviderError;
use thiserror::Error;

/// Result type for gateway setup and CLI plumbing.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Settings file or CLI input is unusable.
    #[error("configuration error: {0}")]
    Config(String),

    /// The provider client config could not be turned into a client.
    #[error("invalid client configuration: {0}")]
    ClientConfig(#[from] ProviderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl GatewayError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
