//! Caller-owned credential record.
//!
//! Nothing in calbridge stores credentials between calls: every operation
//! takes a [`Credentials`] value and hands back the (possibly rotated) one,
//! which the caller persists for the next call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub access_token: String,
    /// Unix timestamp (seconds) after which the access token is unusable.
    /// `None` when the provider does not report one.
    #[serde(default)]
    pub access_token_expires: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            access_token_expires: None,
            refresh_token: None,
        }
    }

    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    #[must_use]
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.access_token_expires = Some(expires_at.timestamp());
        self
    }

    pub fn has_expiry(&self) -> bool {
        self.access_token_expires.is_some()
    }

    /// True when the token expires within `skew_secs` of `now`.
    ///
    /// Credentials without an expiry are never considered stale up front.
    pub fn is_stale(&self, now: DateTime<Utc>, skew_secs: i64) -> bool {
        self.access_token_expires
            .is_some_and(|expires| now.timestamp() + skew_secs >= expires)
    }
}

// Tokens stay out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("access_token_expires", &self.access_token_expires)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}
