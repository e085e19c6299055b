//! Graph adapter configuration.

use crate::http::HttpSettings;

#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub api_base: String,
    pub http: HttpSettings,
    /// Window used when walking the delta feed for a new calendar.
    pub window_start: String,
    pub window_end: String,
    /// Sent as `Prefer: odata.maxpagesize`.
    pub page_size: Option<u32>,
}

impl GraphConfig {
    pub const DEFAULT_API_BASE: &'static str = "https://graph.microsoft.com/v1.0";
    pub const DEFAULT_WINDOW_START: &'static str = "2000-01-01T00:00:00Z";
    pub const DEFAULT_WINDOW_END: &'static str = "2099-12-31T23:59:59Z";

    pub fn new() -> Self {
        Self {
            api_base: Self::DEFAULT_API_BASE.to_string(),
            http: HttpSettings::default(),
            window_start: Self::DEFAULT_WINDOW_START.to_string(),
            window_end: Self::DEFAULT_WINDOW_END.to_string(),
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

impl Default for GraphConfig {
    fn default() -> Self {
        Self::new()
    }
}
