//! HTTP client for CalDAV operations.
//!
//! Every request carries Basic credentials built from the configured
//! username and the caller's app-specific password.

use base64::Engine;
use reqwest::{Client, Method, RequestBuilder, Response};
use tracing::{debug, trace};
use url::Url;

use crate::error::{ProviderError, ProviderResult};
use crate::http;

use super::config::CalDavConfig;

const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";
const ICS_CONTENT_TYPE: &str = "text/calendar; charset=utf-8";

/// Write precondition for a PUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition<'a> {
    /// Only create; fail if the resource already exists.
    CreateOnly,
    /// Only overwrite the given entity tag.
    IfMatch(&'a str),
}

/// Builds an HTTP Basic `Authorization` header value.
pub fn basic_auth(username: &str, password: &str) -> String {
    let encoded =
        base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
    format!("Basic {encoded}")
}

/// Wraps an entity tag in quotes unless it already is one.
pub fn quote_etag(tag: &str) -> String {
    if tag.starts_with('"') || tag.starts_with("W/") {
        tag.to_string()
    } else {
        format!("\"{tag}\"")
    }
}

#[derive(Debug, Clone)]
pub struct CalDavClient {
    http: Client,
    config: CalDavConfig,
}

impl CalDavClient {
    pub fn new(config: CalDavConfig) -> ProviderResult<Self> {
        Ok(Self {
            http: config.http.build_client()?,
            config,
        })
    }

    pub fn config(&self) -> &CalDavConfig {
        &self.config
    }

    pub fn server_url(&self) -> &Url {
        &self.config.server_url
    }

    /// Resolves an href (absolute or server-relative) against the server URL.
    pub fn resolve(&self, href: &str) -> ProviderResult<Url> {
        if let Ok(url) = Url::parse(href) {
            return Ok(url);
        }
        self.config.server_url.join(href).map_err(|e| {
            ProviderError::invalid_response(format!("invalid href '{href}': {e}")).with_source(e)
        })
    }

    fn request(&self, method: &str, url: &Url, password: &str) -> ProviderResult<RequestBuilder> {
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| ProviderError::internal(format!("invalid HTTP method: {method}")))?;
        Ok(self
            .http
            .request(method, url.clone())
            .header("Authorization", basic_auth(&self.config.username, password)))
    }

    async fn send(request: RequestBuilder) -> ProviderResult<Response> {
        let response = request.send().await.map_err(http::send_error)?;
        http::check(response).await
    }

    async fn xml_request(
        &self,
        method: &str,
        url: &Url,
        password: &str,
        body: String,
        depth: u8,
    ) -> ProviderResult<String> {
        trace!(method, url = %url, depth, "sending WebDAV request");
        let request = self
            .request(method, url, password)?
            .header("Content-Type", XML_CONTENT_TYPE)
            .header("Depth", depth.to_string())
            .body(body);
        http::text(Self::send(request).await?).await
    }

    pub async fn propfind(
        &self,
        url: &Url,
        password: &str,
        body: String,
        depth: u8,
    ) -> ProviderResult<String> {
        self.xml_request("PROPFIND", url, password, body, depth).await
    }

    pub async fn report(
        &self,
        url: &Url,
        password: &str,
        body: String,
        depth: u8,
    ) -> ProviderResult<String> {
        self.xml_request("REPORT", url, password, body, depth).await
    }

    pub async fn mkcalendar(&self, url: &Url, password: &str, body: String) -> ProviderResult<()> {
        debug!(url = %url, "creating calendar collection");
        let request = self
            .request("MKCALENDAR", url, password)?
            .header("Content-Type", XML_CONTENT_TYPE)
            .body(body);
        Self::send(request).await.map(drop)
    }

    /// Stores a calendar resource, returning the new entity tag when the
    /// server reports one.
    pub async fn put(
        &self,
        url: &Url,
        password: &str,
        ics: String,
        precondition: Precondition<'_>,
    ) -> ProviderResult<Option<String>> {
        let mut request = self
            .request("PUT", url, password)?
            .header("Content-Type", ICS_CONTENT_TYPE)
            .body(ics);
        request = match precondition {
            Precondition::CreateOnly => request.header("If-None-Match", "*"),
            Precondition::IfMatch(tag) => request.header("If-Match", quote_etag(tag)),
        };
        let response = Self::send(request).await?;
        Ok(http::header(&response, "ETag"))
    }

    pub async fn delete(
        &self,
        url: &Url,
        password: &str,
        if_match: Option<&str>,
    ) -> ProviderResult<()> {
        let mut request = self.request("DELETE", url, password)?;
        if let Some(tag) = if_match {
            request = request.header("If-Match", quote_etag(tag));
        }
        Self::send(request).await.map(drop)
    }
}
