//! Google adapter configuration.

use crate::http::HttpSettings;

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    /// Calendar API root, overridable for tests and proxies.
    pub api_base: String,
    pub http: HttpSettings,
    /// `maxResults` for event listings; provider default when `None`.
    pub page_size: Option<u32>,
}

impl GoogleConfig {
    pub const DEFAULT_API_BASE: &'static str = "https://www.googleapis.com/calendar/v3";

    pub fn new() -> Self {
        Self {
            api_base: Self::DEFAULT_API_BASE.to_string(),
            http: HttpSettings::default(),
            page_size: None,
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_http(mut self, http: HttpSettings) -> Self {
        self.http = http;
        self
    }

    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self::new()
    }
}
