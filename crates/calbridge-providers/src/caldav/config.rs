//! CalDAV adapter configuration.

use serde::Deserialize;
use url::Url;

use crate::error::{ProviderError, ProviderResult};
use crate::http::HttpSettings;

#[derive(Debug, Clone)]
pub struct CalDavConfig {
    /// Server root used for principal discovery.
    pub server_url: Url,
    pub username: String,
    pub http: HttpSettings,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalDavClientFile {
    #[serde(alias = "user", alias = "appleId")]
    username: Option<String>,
    #[serde(alias = "server_url", alias = "url")]
    server_url: Option<String>,
}

impl CalDavConfig {
    pub const DEFAULT_SERVER_URL: &'static str = "https://caldav.icloud.com";

    pub fn new(server_url: &str, username: impl Into<String>) -> ProviderResult<Self> {
        let server_url = Url::parse(server_url).map_err(|e| {
            ProviderError::configuration(format!("invalid CalDAV server URL '{server_url}': {e}"))
        })?;
        Ok(Self {
            server_url,
            username: username.into(),
            http: HttpSettings::default(),
        })
    }

    /// Parses `{"username": "...", "serverUrl": "..."}`; the server URL
    /// falls back to `default_server`.
    pub fn from_json(json: &str, default_server: &str) -> ProviderResult<Self> {
        let file: CalDavClientFile = serde_json::from_str(json).map_err(|e| {
            ProviderError::configuration(format!("failed to parse client config JSON: {e}"))
                .with_source(e)
        })?;
        let Some(username) = file.username.filter(|u| !u.is_empty()) else {
            return Err(ProviderError::configuration(
                "CalDAV client config must contain 'username'",
            ));
        };
        Self::new(file.server_url.as_deref().unwrap_or(default_server), username)
    }

    pub fn with_http(mut self, http: HttpSettings) -> Self {
        self.http = http;
        self
    }
}
