//! OAuth2 client configuration and the reqwest-backed [`TokenProvider`].
//!
//! The client config is the JSON blob the caller hands to the gateway. Two
//! layouts are accepted:
//!
//! - Google console downloads: `{"installed": {...}}`, `{"web": {...}}` or
//!   the same snake_case keys at the root.
//! - Generic OAuth2 provider options: `clientId`, `clientSecret`,
//!   `redirectUri`, `urlAuthorize`, `urlAccessToken`, `scopes`.
//!
//! Endpoints and scopes missing from the blob fall back to the provider's
//! defaults.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::adapter::BoxFuture;
use crate::credentials::{TokenPair, TokenProvider};
use crate::error::{ProviderError, ProviderResult};
use crate::http::{self, HttpSettings};

/// Which identity platform a client config belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthFlavor {
    Google,
    Microsoft,
}

impl OAuthFlavor {
    fn authorize_url(self) -> &'static str {
        match self {
            Self::Google => "https://accounts.google.com/o/oauth2/v2/auth",
            Self::Microsoft => "https://login.microsoftonline.com/common/oauth2/v2.0/authorize",
        }
    }

    fn token_url(self) -> &'static str {
        match self {
            Self::Google => "https://oauth2.googleapis.com/token",
            Self::Microsoft => "https://login.microsoftonline.com/common/oauth2/v2.0/token",
        }
    }

    fn default_scopes(self) -> Vec<String> {
        let scopes: &[&str] = match self {
            Self::Google => &["https://www.googleapis.com/auth/calendar"],
            Self::Microsoft => &["offline_access", "Calendars.ReadWrite"],
        };
        scopes.iter().map(|s| s.to_string()).collect()
    }

    /// Extra authorization parameters needed to get a refresh token back.
    fn extra_auth_params(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Google => &[("access_type", "offline"), ("prompt", "consent")],
            Self::Microsoft => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthClientConfig {
    pub flavor: OAuthFlavor,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub authorize_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ClientSection {
    #[serde(alias = "clientId")]
    client_id: Option<String>,
    #[serde(alias = "clientSecret")]
    client_secret: Option<String>,
    #[serde(alias = "redirectUri")]
    redirect_uri: Option<String>,
    #[serde(default)]
    redirect_uris: Vec<String>,
    #[serde(alias = "urlAuthorize")]
    auth_uri: Option<String>,
    #[serde(alias = "urlAccessToken")]
    token_uri: Option<String>,
    #[serde(alias = "scope")]
    scopes: Option<ScopeList>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScopeList {
    Joined(String),
    Split(Vec<String>),
}

impl ScopeList {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::Joined(s) => s
                .split([' ', ','])
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Self::Split(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ClientConfigFile {
    installed: Option<ClientSection>,
    web: Option<ClientSection>,
    #[serde(flatten)]
    root: ClientSection,
}

impl OAuthClientConfig {
    pub fn new(flavor: OAuthFlavor, client_id: impl Into<String>) -> Self {
        Self {
            flavor,
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: None,
            authorize_url: flavor.authorize_url().to_string(),
            token_url: flavor.token_url().to_string(),
            scopes: flavor.default_scopes(),
        }
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Parses a client config blob.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the JSON is malformed or carries no
    /// client id.
    pub fn from_json(flavor: OAuthFlavor, json: &str) -> ProviderResult<Self> {
        let file: ClientConfigFile = serde_json::from_str(json).map_err(|e| {
            ProviderError::configuration(format!("failed to parse client config JSON: {e}"))
                .with_source(e)
        })?;

        let section = file.installed.or(file.web).unwrap_or(file.root);
        let Some(client_id) = section.client_id.filter(|id| !id.is_empty()) else {
            return Err(ProviderError::configuration(
                "client config must contain a client id \
                 ('installed'/'web' section, 'client_id' or 'clientId')",
            ));
        };

        let mut config = Self::new(flavor, client_id);
        config.client_secret = section.client_secret;
        config.redirect_uri = section
            .redirect_uri
            .or_else(|| section.redirect_uris.into_iter().next());
        if let Some(url) = section.auth_uri {
            config.authorize_url = url;
        }
        if let Some(url) = section.token_uri {
            config.token_url = url;
        }
        if let Some(scopes) = section.scopes.map(ScopeList::into_vec).filter(|s| !s.is_empty()) {
            config.scopes = scopes;
        }
        Ok(config)
    }

    /// Consent URL for the authorization-code flow.
    pub fn authorization_url(&self) -> ProviderResult<String> {
        let scope = self.scopes.join(" ");
        let mut params: Vec<(&str, &str)> = vec![
            ("response_type", "code"),
            ("client_id", self.client_id.as_str()),
            ("scope", scope.as_str()),
        ];
        if let Some(ref redirect) = self.redirect_uri {
            params.push(("redirect_uri", redirect.as_str()));
        }
        params.extend_from_slice(self.flavor.extra_auth_params());

        Url::parse_with_params(&self.authorize_url, &params)
            .map(String::from)
            .map_err(|e| {
                ProviderError::configuration(format!(
                    "invalid authorization endpoint '{}': {e}",
                    self.authorize_url
                ))
            })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

/// Exchanges codes and refresh tokens against the provider's token endpoint.
pub struct OAuthTokenProvider {
    config: OAuthClientConfig,
    http: Client,
}

impl OAuthTokenProvider {
    pub fn new(config: OAuthClientConfig, settings: &HttpSettings) -> ProviderResult<Self> {
        Ok(Self {
            config,
            http: settings.build_client()?,
        })
    }

    pub fn config(&self) -> &OAuthClientConfig {
        &self.config
    }

    async fn request_token(&self, grant: &[(&str, &str)]) -> ProviderResult<TokenPair> {
        let mut form: Vec<(&str, &str)> = grant.to_vec();
        form.push(("client_id", self.config.client_id.as_str()));
        if let Some(ref secret) = self.config.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let grant_type = grant.first().map(|(_, v)| *v).unwrap_or_default();
        debug!(endpoint = %self.config.token_url, grant_type, "requesting token");
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await
            .map_err(http::send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail: TokenErrorResponse = serde_json::from_str(&body).unwrap_or_default();
            return Err(match status {
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                    ProviderError::authentication(format!(
                        "token endpoint rejected the request: {} {}",
                        detail.error, detail.error_description
                    ))
                }
                _ => http::status_error(status, None, body.trim()),
            });
        }

        let token: TokenResponse = http::json(response).await?;
        Ok(TokenPair {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in: token.expires_in,
        })
    }
}

impl TokenProvider for OAuthTokenProvider {
    fn authorization_url(&self) -> ProviderResult<String> {
        self.config.authorization_url()
    }

    fn exchange_code<'a>(&'a self, code: &'a str) -> BoxFuture<'a, ProviderResult<TokenPair>> {
        Box::pin(async move {
            let mut grant = vec![("grant_type", "authorization_code"), ("code", code)];
            if let Some(ref redirect) = self.config.redirect_uri {
                grant.push(("redirect_uri", redirect.as_str()));
            }
            self.request_token(&grant).await
        })
    }

    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, ProviderResult<TokenPair>> {
        Box::pin(async move {
            self.request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await
        })
    }
}
