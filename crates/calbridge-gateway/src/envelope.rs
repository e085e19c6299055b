//! Result envelopes returned by every gateway operation.
//!
//! An envelope always carries `success` and `errors`, the credentials the
//! caller must persist (when the operation used any), and the operation's
//! payload flattened next to them:
//!
//! ```json
//! {"success": true, "errors": [], "credentials": {...}, "id": "...", "concurrencyTag": "..."}
//! ```

use calbridge_core::{Credentials, EventRecord, SyncCursor};
use calbridge_providers::ProviderError;
use serde::{Deserialize, Serialize};

/// One failure as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl From<&ProviderError> for ErrorDetail {
    fn from(err: &ProviderError) -> Self {
        Self {
            code: err.code().as_str().to_string(),
            message: err.message().to_string(),
            provider: err.provider().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub success: bool,
    pub errors: Vec<ErrorDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
    #[serde(flatten)]
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn ok(payload: T, credentials: Option<Credentials>) -> Self {
        Self {
            success: true,
            errors: Vec::new(),
            credentials,
            payload,
        }
    }

    pub fn failed(err: &ProviderError, payload: T, credentials: Option<Credentials>) -> Self {
        Self {
            success: false,
            errors: vec![ErrorDetail::from(err)],
            credentials,
            payload,
        }
    }

    /// Code of the first reported error, if any.
    pub fn error_code(&self) -> Option<&str> {
        self.errors.first().map(|e| e.code.as_str())
    }
}

/// Payload of operations that only report success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NoPayload {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthUrlPayload {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarPayload {
    pub id: String,
    pub sync_token: SyncCursor,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
    pub sync_token: SyncCursor,
    pub update_events: Vec<EventRecord>,
    pub delete_events: Vec<String>,
}

impl SyncPayload {
    /// Failure payload: the caller's cursor stays valid, nothing changed.
    pub fn unchanged(sync_token: SyncCursor) -> Self {
        Self {
            sync_token,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub id: String,
    pub concurrency_tag: String,
}
