//! The gateway facade.
//!
//! Every operation follows the same path: make the caller's credentials
//! usable, run the adapter call (or a full reconciler drain for syncs), and
//! fold the outcome into an [`Envelope`]. Operations never return `Err`;
//! only [`Gateway::new`] can fail, when the client config is unusable.

use std::fmt;
use std::sync::Arc;

use calbridge_core::{CalendarRef, Credentials, EventDraft, EventRef, SyncCursor, parse_zone};
use calbridge_providers::{
    CredentialManager, NewCalendar, ProviderAdapter, ProviderError, ProviderResult, Reconciler,
    SyncStart, TokenProvider,
};
use chrono::Utc;
use tracing::{debug, warn};

use crate::config::GatewaySettings;
use crate::envelope::{
    AuthUrlPayload, CalendarPayload, Envelope, EventPayload, NoPayload, SyncPayload,
};
use crate::error::{GatewayError, GatewayResult};

/// Which backend a gateway talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Google,
    Graph,
    CalDav,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Google => "google",
            Self::Graph => "graph",
            Self::CalDav => "caldav",
        })
    }
}

pub struct Gateway {
    adapter: Arc<dyn ProviderAdapter>,
    credentials: CredentialManager,
}

impl Gateway {
    /// Builds a gateway from a provider client config blob.
    ///
    /// # Errors
    ///
    /// Fails when the client config is malformed or the provider support was
    /// not compiled in.
    pub fn new(
        kind: ProviderKind,
        client_config: &str,
        settings: &GatewaySettings,
    ) -> GatewayResult<Self> {
        let http = settings.http_settings();
        let skew = settings.credentials.refresh_skew_secs;

        match kind {
            #[cfg(feature = "google")]
            ProviderKind::Google => {
                use calbridge_providers::google::{GoogleAdapter, GoogleConfig};
                use calbridge_providers::{OAuthClientConfig, OAuthFlavor, OAuthTokenProvider};

                let oauth = OAuthClientConfig::from_json(OAuthFlavor::Google, client_config)?;
                let tokens: Arc<dyn TokenProvider> =
                    Arc::new(OAuthTokenProvider::new(oauth, &http)?);
                let mut config = GoogleConfig::new().with_http(http);
                if let Some(ref base) = settings.google.api_base {
                    config = config.with_api_base(base);
                }
                let adapter = GoogleAdapter::new(config)?;
                Ok(Self::from_parts(Arc::new(adapter), Some(tokens), skew))
            }
            #[cfg(feature = "graph")]
            ProviderKind::Graph => {
                use calbridge_providers::graph::{GraphAdapter, GraphConfig};
                use calbridge_providers::{OAuthClientConfig, OAuthFlavor, OAuthTokenProvider};

                let oauth = OAuthClientConfig::from_json(OAuthFlavor::Microsoft, client_config)?;
                let tokens: Arc<dyn TokenProvider> =
                    Arc::new(OAuthTokenProvider::new(oauth, &http)?);
                let mut config = GraphConfig::new().with_http(http);
                if let Some(ref base) = settings.graph.api_base {
                    config = config.with_api_base(base);
                }
                let adapter = GraphAdapter::new(config)?;
                Ok(Self::from_parts(Arc::new(adapter), Some(tokens), skew))
            }
            #[cfg(feature = "caldav")]
            ProviderKind::CalDav => {
                use calbridge_providers::caldav::{CalDavAdapter, CalDavConfig};

                let default_server = settings
                    .caldav
                    .server_url
                    .as_deref()
                    .unwrap_or(CalDavConfig::DEFAULT_SERVER_URL);
                let config = CalDavConfig::from_json(client_config, default_server)?
                    .with_http(http.with_verify_tls(settings.caldav.verify_tls));
                let adapter = CalDavAdapter::new(config)?;
                // The app password is the access token; nothing to refresh.
                Ok(Self::from_parts(Arc::new(adapter), None, skew))
            }
            #[allow(unreachable_patterns)]
            other => Err(GatewayError::config(format!(
                "calbridge was built without {other} support"
            ))),
        }
    }

    /// Assembles a gateway from an existing adapter and token provider.
    pub fn from_parts(
        adapter: Arc<dyn ProviderAdapter>,
        token_provider: Option<Arc<dyn TokenProvider>>,
        refresh_skew_secs: i64,
    ) -> Self {
        Self {
            adapter,
            credentials: CredentialManager::new(token_provider).with_skew_secs(refresh_skew_secs),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.adapter.name()
    }

    /// Consent URL for the authorization-code flow.
    pub fn get_auth_code(&self) -> Envelope<AuthUrlPayload> {
        let result = self
            .token_provider()
            .and_then(|provider| provider.authorization_url())
            .map(|url| AuthUrlPayload { url });
        self.envelope("get_auth_code", None, result, AuthUrlPayload::default())
    }

    /// Exchanges an authorization code; the new credentials ride in the envelope.
    pub async fn get_auth_tokens(&self, code: &str) -> Envelope<NoPayload> {
        let result = match self.token_provider() {
            Ok(provider) => provider.exchange_code(code).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(pair) => {
                let credentials = pair.into_credentials(Utc::now(), None);
                self.envelope("get_auth_tokens", Some(credentials), Ok(NoPayload {}), NoPayload {})
            }
            Err(err) => self.envelope("get_auth_tokens", None, Err(err), NoPayload {}),
        }
    }

    /// Creates a calendar and returns it with its initial sync cursor.
    pub async fn create_calendar(
        &self,
        credentials: Credentials,
        name: &str,
        description: &str,
    ) -> Envelope<CalendarPayload> {
        let adapter = self.adapter.as_ref();
        let calendar = NewCalendar::new(name).with_description(description);
        let calendar = &calendar;

        // Creation and cursor setup run separately so that an auth retry of
        // the cursor step never creates the calendar a second time.
        let (credentials, created) = self
            .credentials
            .run(credentials, |token| async move {
                adapter.create_calendar(&token, calendar).await
            })
            .await;
        let (credentials, result) = match created {
            Ok(created) => match created.cursor {
                Some(sync_token) => (
                    credentials,
                    Ok(CalendarRef {
                        id: created.id,
                        sync_token,
                    }),
                ),
                None => {
                    let id = created.id.as_str();
                    let (credentials, cursor) = self
                        .credentials
                        .run(credentials, |token| async move {
                            Reconciler::new(adapter).establish_cursor(&token, id).await
                        })
                        .await;
                    let result = cursor.map(|sync_token| CalendarRef {
                        id: created.id.clone(),
                        sync_token,
                    });
                    (credentials, result)
                }
            },
            Err(err) => (credentials, Err(err)),
        };

        let result = result.map(|calendar| CalendarPayload {
            id: calendar.id,
            sync_token: calendar.sync_token,
        });
        self.envelope(
            "create_calendar",
            Some(credentials),
            result,
            CalendarPayload::default(),
        )
    }

    pub async fn delete_calendar(
        &self,
        credentials: Credentials,
        calendar_id: &str,
    ) -> Envelope<NoPayload> {
        let adapter = self.adapter.as_ref();
        let (credentials, result) = self
            .credentials
            .run(credentials, |token| async move {
                adapter.delete_calendar(&token, calendar_id).await
            })
            .await;
        let result = result.map(|()| NoPayload {});
        self.envelope("delete_calendar", Some(credentials), result, NoPayload {})
    }

    /// Drains every change since `sync_token`.
    ///
    /// An empty token performs a baseline listing. On failure the caller's
    /// token is handed back untouched with no changes, so a retry starts from
    /// the same position.
    pub async fn sync_calendar(
        &self,
        credentials: Credentials,
        calendar_id: &str,
        sync_token: &SyncCursor,
        local_time_zone: Option<&str>,
    ) -> Envelope<SyncPayload> {
        let zone = match local_time_zone.filter(|z| !z.is_empty()).map(parse_zone).transpose() {
            Ok(zone) => zone,
            Err(e) => {
                let err = ProviderError::bad_request(e.to_string());
                return self.envelope(
                    "sync_calendar",
                    Some(credentials),
                    Err(err),
                    SyncPayload::unchanged(sync_token.clone()),
                );
            }
        };
        let start = if sync_token.is_empty() {
            SyncStart::Baseline
        } else {
            SyncStart::Since(sync_token.clone())
        };

        let adapter = self.adapter.as_ref();
        let start = &start;
        let (credentials, result) = self
            .credentials
            .run(credentials, |token| async move {
                Reconciler::new(adapter)
                    .sync(&token, calendar_id, start, zone)
                    .await
            })
            .await;

        let result = result.map(|synced| SyncPayload {
            sync_token: synced.new_cursor,
            update_events: synced.updated_events,
            delete_events: synced.deleted_event_ids,
        });
        self.envelope(
            "sync_calendar",
            Some(credentials),
            result,
            SyncPayload::unchanged(sync_token.clone()),
        )
    }

    pub async fn create_event(
        &self,
        credentials: Credentials,
        calendar_id: &str,
        draft: &EventDraft,
    ) -> Envelope<EventPayload> {
        let adapter = self.adapter.as_ref();
        let (credentials, result) = self
            .credentials
            .run(credentials, |token| async move {
                adapter.create_event(&token, calendar_id, draft).await
            })
            .await;
        self.event_envelope("create_event", credentials, result)
    }

    /// Replaces an event if `concurrency_tag` is still its current tag.
    pub async fn update_event(
        &self,
        credentials: Credentials,
        calendar_id: &str,
        event_id: &str,
        concurrency_tag: &str,
        draft: &EventDraft,
    ) -> Envelope<EventPayload> {
        let adapter = self.adapter.as_ref();
        let (credentials, result) = self
            .credentials
            .run(credentials, |token| async move {
                adapter
                    .update_event(&token, calendar_id, event_id, concurrency_tag, draft)
                    .await
            })
            .await;
        self.event_envelope("update_event", credentials, result)
    }

    pub async fn delete_event(
        &self,
        credentials: Credentials,
        calendar_id: &str,
        event_id: &str,
    ) -> Envelope<NoPayload> {
        let adapter = self.adapter.as_ref();
        let (credentials, result) = self
            .credentials
            .run(credentials, |token| async move {
                adapter.delete_event(&token, calendar_id, event_id).await
            })
            .await;
        let result = result.map(|()| NoPayload {});
        self.envelope("delete_event", Some(credentials), result, NoPayload {})
    }

    /// Reads the current concurrency tag of an event.
    pub async fn event_tag(
        &self,
        credentials: Credentials,
        calendar_id: &str,
        event_id: &str,
    ) -> Envelope<EventPayload> {
        let adapter = self.adapter.as_ref();
        let (credentials, result) = self
            .credentials
            .run(credentials, |token| async move {
                adapter.event_tag(&token, calendar_id, event_id).await
            })
            .await;
        self.event_envelope("event_tag", credentials, result)
    }

    fn token_provider(&self) -> ProviderResult<&Arc<dyn TokenProvider>> {
        self.credentials.token_provider().ok_or_else(|| {
            ProviderError::unsupported(format!(
                "{} does not use the authorization-code flow",
                self.adapter.name()
            ))
            .with_provider(self.adapter.name())
        })
    }

    fn event_envelope(
        &self,
        operation: &str,
        credentials: Credentials,
        result: ProviderResult<EventRef>,
    ) -> Envelope<EventPayload> {
        let result = result.map(|event| EventPayload {
            id: event.id,
            concurrency_tag: event.concurrency_tag,
        });
        self.envelope(operation, Some(credentials), result, EventPayload::default())
    }

    fn envelope<T>(
        &self,
        operation: &str,
        credentials: Option<Credentials>,
        result: ProviderResult<T>,
        failure_payload: T,
    ) -> Envelope<T> {
        let provider = self.adapter.name();
        match result {
            Ok(payload) => {
                debug!(provider, operation, "operation succeeded");
                Envelope::ok(payload, credentials)
            }
            Err(err) => {
                warn!(provider, operation, code = %err.code(), error = %err, "operation failed");
                Envelope::failed(&err, failure_payload, credentials)
            }
        }
    }
}
