//! Credential freshness and refresh.
//!
//! The [`CredentialManager`] never stores credentials. It takes the caller's
//! [`Credentials`], refreshes them when needed through a [`TokenProvider`],
//! and returns whatever should be persisted for the next call.

use std::future::Future;
use std::sync::Arc;

use calbridge_core::Credentials;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::adapter::BoxFuture;
use crate::error::{ProviderError, ProviderResult};

/// Refresh this many seconds before the recorded expiry.
pub const DEFAULT_SKEW_SECS: i64 = 300;

/// Result of an authorization-code or refresh-token exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    /// Absent when the provider keeps the previous refresh token valid.
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds.
    pub expires_in: Option<i64>,
}

impl TokenPair {
    /// Builds a credential record from this exchange.
    ///
    /// `previous_refresh` is kept when the exchange did not rotate it.
    pub fn into_credentials(
        self,
        now: DateTime<Utc>,
        previous_refresh: Option<String>,
    ) -> Credentials {
        Credentials {
            access_token: self.access_token,
            access_token_expires: self
                .expires_in
                .map(|secs| (now + Duration::seconds(secs)).timestamp()),
            refresh_token: self.refresh_token.or(previous_refresh),
        }
    }
}

/// The OAuth2 exchange endpoints of a provider.
pub trait TokenProvider: Send + Sync {
    /// URL the user visits to grant access.
    fn authorization_url(&self) -> ProviderResult<String>;

    fn exchange_code<'a>(&'a self, code: &'a str) -> BoxFuture<'a, ProviderResult<TokenPair>>;

    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, ProviderResult<TokenPair>>;
}

/// Keeps access tokens usable across gateway calls.
#[derive(Clone)]
pub struct CredentialManager {
    provider: Option<Arc<dyn TokenProvider>>,
    skew_secs: i64,
}

impl CredentialManager {
    /// `provider` is `None` for backends whose token is a static secret.
    pub fn new(provider: Option<Arc<dyn TokenProvider>>) -> Self {
        Self {
            provider,
            skew_secs: DEFAULT_SKEW_SECS,
        }
    }

    pub fn with_skew_secs(mut self, skew_secs: i64) -> Self {
        self.skew_secs = skew_secs;
        self
    }

    pub fn skew_secs(&self) -> i64 {
        self.skew_secs
    }

    pub fn token_provider(&self) -> Option<&Arc<dyn TokenProvider>> {
        self.provider.as_ref()
    }

    /// Refreshes credentials whose recorded expiry is within the skew window.
    ///
    /// Credentials without an expiry, or without a token provider, pass
    /// through unchanged.
    pub async fn ensure_fresh(&self, credentials: Credentials) -> ProviderResult<Credentials> {
        if self.provider.is_none() || !credentials.is_stale(Utc::now(), self.skew_secs) {
            return Ok(credentials);
        }
        debug!("access token is about to expire, refreshing");
        self.refresh(&credentials).await
    }

    /// Exchanges the refresh token for a new access token.
    pub async fn refresh(&self, credentials: &Credentials) -> ProviderResult<Credentials> {
        let Some(provider) = self.provider.as_ref() else {
            return Err(ProviderError::authentication(
                "credentials cannot be refreshed for this provider",
            ));
        };
        let Some(refresh_token) = credentials.refresh_token.as_deref() else {
            return Err(ProviderError::authentication(
                "access token expired and no refresh token is available",
            ));
        };

        let pair = provider.refresh(refresh_token).await.map_err(|e| {
            warn!(error = %e, "token refresh failed");
            ProviderError::authentication(format!("token refresh failed: {}", e.message()))
                .with_source(e)
        })?;

        let rotated = pair.refresh_token.is_some();
        let fresh = pair.into_credentials(Utc::now(), credentials.refresh_token.clone());
        info!(rotated, "refreshed access token");
        Ok(fresh)
    }

    /// Runs `op` with a usable access token and returns the credentials to
    /// persist alongside its outcome.
    ///
    /// With an expiry the token is refreshed up front when stale. Without
    /// one, an authentication rejection triggers exactly one refresh and
    /// one retry, so `op` may run twice and must be safe to repeat. When a
    /// refresh fails the input credentials are returned.
    pub async fn run<T, F, Fut>(
        &self,
        credentials: Credentials,
        op: F,
    ) -> (Credentials, ProviderResult<T>)
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let current = match self.ensure_fresh(credentials.clone()).await {
            Ok(fresh) => fresh,
            Err(err) => return (credentials, Err(err)),
        };

        let outcome = op(current.access_token.clone()).await;
        let retry_allowed = self.provider.is_some() && !current.has_expiry();
        match outcome {
            Err(err) if retry_allowed && err.is_auth_rejection() => {
                debug!(error = %err, "access token rejected, refreshing once");
                match self.refresh(&current).await {
                    Ok(fresh) => {
                        let retried = op(fresh.access_token.clone()).await;
                        (fresh, retried)
                    }
                    Err(refresh_err) => (current, Err(refresh_err)),
                }
            }
            outcome => (current, outcome),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::ProviderErrorCode;

    /// Issues `access-N` / `refresh-N` and records the refresh tokens used.
    #[derive(Default)]
    struct Rotating {
        calls: AtomicUsize,
        used: Mutex<Vec<String>>,
        rotate: bool,
        fail: bool,
    }

    impl TokenProvider for Rotating {
        fn authorization_url(&self) -> ProviderResult<String> {
            Ok("https://auth.example/authorize".into())
        }

        fn exchange_code<'a>(&'a self, _code: &'a str) -> BoxFuture<'a, ProviderResult<TokenPair>> {
            Box::pin(async { Err(ProviderError::unsupported("not used")) })
        }

        fn refresh<'a>(
            &'a self,
            refresh_token: &'a str,
        ) -> BoxFuture<'a, ProviderResult<TokenPair>> {
            self.used.lock().unwrap().push(refresh_token.to_string());
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let result = if self.fail {
                Err(ProviderError::bad_request("invalid_grant"))
            } else {
                Ok(TokenPair {
                    access_token: format!("access-{n}"),
                    refresh_token: self.rotate.then(|| format!("refresh-{n}")),
                    expires_in: Some(3600),
                })
            };
            Box::pin(async move { result })
        }
    }

    fn manager(provider: Rotating) -> (CredentialManager, Arc<Rotating>) {
        let provider = Arc::new(provider);
        let shared: Arc<dyn TokenProvider> = provider.clone();
        (CredentialManager::new(Some(shared)), provider)
    }

    fn expired() -> Credentials {
        Credentials::new("old")
            .with_refresh_token("refresh-0")
            .with_expiry(Utc::now() - Duration::seconds(10))
    }

    #[tokio::test]
    async fn fresh_credentials_pass_through() {
        let (manager, provider) = manager(Rotating::default());
        let creds = Credentials::new("at")
            .with_refresh_token("rt")
            .with_expiry(Utc::now() + Duration::hours(1));

        let result = manager.ensure_fresh(creds.clone()).await.unwrap();
        assert_eq!(result, creds);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_credentials_refresh_and_keep_refresh_token() {
        let (manager, _) = manager(Rotating::default());
        let fresh = manager.ensure_fresh(expired()).await.unwrap();
        assert_eq!(fresh.access_token, "access-1");
        assert_eq!(fresh.refresh_token.as_deref(), Some("refresh-0"));
        assert!(!fresh.is_stale(Utc::now(), DEFAULT_SKEW_SECS));
    }

    #[tokio::test]
    async fn rotation_replaces_refresh_token() {
        let (manager, _) = manager(Rotating {
            rotate: true,
            ..Default::default()
        });
        let fresh = manager.ensure_fresh(expired()).await.unwrap();
        assert_eq!(fresh.refresh_token.as_deref(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn refresh_failure_is_auth_error() {
        let (manager, _) = manager(Rotating {
            fail: true,
            ..Default::default()
        });
        let err = manager.ensure_fresh(expired()).await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthenticationFailed);
    }

    #[tokio::test]
    async fn missing_refresh_token_is_auth_error() {
        let (manager, provider) = manager(Rotating::default());
        let creds = Credentials::new("at").with_expiry(Utc::now());
        let err = manager.ensure_fresh(creds).await.unwrap_err();
        assert!(err.is_auth_rejection());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn run_without_expiry_retries_once_after_rejection() {
        let (manager, provider) = manager(Rotating::default());
        let attempts = AtomicUsize::new(0);
        let creds = Credentials::new("expired-session").with_refresh_token("rt");

        let (creds, result) = manager
            .run(creds, |token| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if token == "expired-session" {
                        Err(ProviderError::authentication("session expired"))
                    } else {
                        Ok(token)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "access-1");
        assert_eq!(creds.access_token, "access-1");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(*provider.used.lock().unwrap(), vec!["rt".to_string()]);
    }

    #[tokio::test]
    async fn run_does_not_retry_twice() {
        let (manager, provider) = manager(Rotating::default());
        let attempts = AtomicUsize::new(0);

        let (_, result) = manager
            .run(Credentials::new("x").with_refresh_token("rt"), |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ProviderError::authentication("still rejected")) }
            })
            .await;

        assert!(result.unwrap_err().is_auth_rejection());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_with_expiry_does_not_retry() {
        let (manager, provider) = manager(Rotating::default());
        let creds = Credentials::new("at")
            .with_refresh_token("rt")
            .with_expiry(Utc::now() + Duration::hours(1));

        let (returned, result) = manager
            .run(creds.clone(), |_| async {
                Err::<(), _>(ProviderError::authentication("revoked"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(returned, creds);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn run_without_provider_passes_credentials_through() {
        let manager = CredentialManager::new(None);
        let creds = Credentials::new("app-password").with_expiry(Utc::now());

        let (returned, result) = manager
            .run(creds.clone(), |token| async move { Ok(token.len()) })
            .await;

        assert_eq!(returned, creds);
        assert_eq!(result.unwrap(), "app-password".len());
    }
}
