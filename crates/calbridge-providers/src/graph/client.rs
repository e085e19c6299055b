//! Microsoft Graph calendar client.

use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProviderResult;
use crate::http;

use super::config::GraphConfig;

const PREFER_TEXT_BODY: &str = r#"outlook.body-content-type="text""#;

/// Where a delta request starts.
#[derive(Debug, Clone, Copy)]
pub(crate) enum DeltaRequest<'a> {
    /// Walk the configured window from scratch.
    Window,
    DeltaToken(&'a str),
    /// Absolute `@odata.nextLink`, followed verbatim.
    NextLink(&'a str),
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiCalendar {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeltaPage {
    #[serde(default)]
    pub value: Vec<DeltaEvent>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
    #[serde(rename = "@odata.deltaLink")]
    pub delta_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeltaEvent {
    pub id: String,
    #[serde(rename = "@removed")]
    pub removed: Option<serde_json::Value>,
    pub subject: Option<String>,
    pub body: Option<ItemBody>,
    pub start: Option<DateTimeTimeZone>,
    pub end: Option<DateTimeTimeZone>,
    pub change_key: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ItemBody {
    #[serde(default = "ItemBody::text")]
    pub content_type: String,
    #[serde(default)]
    pub content: String,
}

impl ItemBody {
    fn text() -> String {
        "Text".to_string()
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DateTimeTimeZone {
    pub date_time: String,
    #[serde(default)]
    pub time_zone: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventBody {
    pub subject: String,
    pub body: ItemBody,
    pub start: DateTimeTimeZone,
    pub end: DateTimeTimeZone,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_all_day: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiEvent {
    pub id: String,
    pub change_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct CalendarName<'a> {
    name: &'a str,
}

#[derive(Debug, Clone)]
pub struct GraphClient {
    http: Client,
    config: GraphConfig,
}

impl GraphClient {
    pub fn new(config: GraphConfig) -> ProviderResult<Self> {
        Ok(Self {
            http: config.http.build_client()?,
            config,
        })
    }

    fn calendar_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/me/calendars/{}",
            self.config.api_base,
            urlencoding::encode(calendar_id)
        )
    }

    fn event_url(&self, calendar_id: &str, event_id: &str) -> String {
        format!(
            "{}/events/{}",
            self.calendar_url(calendar_id),
            urlencoding::encode(event_id)
        )
    }

    async fn send(request: RequestBuilder) -> ProviderResult<reqwest::Response> {
        let response = request.send().await.map_err(http::send_error)?;
        http::check(response).await
    }

    pub(crate) async fn create_calendar(
        &self,
        token: &str,
        name: &str,
    ) -> ProviderResult<ApiCalendar> {
        let request = self
            .http
            .post(format!("{}/me/calendars", self.config.api_base))
            .bearer_auth(token)
            .json(&CalendarName { name });
        http::json(Self::send(request).await?).await
    }

    pub(crate) async fn rename_calendar(
        &self,
        token: &str,
        calendar_id: &str,
        name: &str,
    ) -> ProviderResult<()> {
        let request = self
            .http
            .patch(self.calendar_url(calendar_id))
            .bearer_auth(token)
            .json(&CalendarName { name });
        Self::send(request).await.map(drop)
    }

    pub(crate) async fn delete_calendar(
        &self,
        token: &str,
        calendar_id: &str,
    ) -> ProviderResult<()> {
        let request = self
            .http
            .delete(self.calendar_url(calendar_id))
            .bearer_auth(token);
        Self::send(request).await.map(drop)
    }

    pub(crate) async fn delta_page(
        &self,
        token: &str,
        calendar_id: &str,
        delta: DeltaRequest<'_>,
    ) -> ProviderResult<DeltaPage> {
        let feed = format!("{}/calendarView/delta", self.calendar_url(calendar_id));
        let mut request = match delta {
            DeltaRequest::Window => self.http.get(feed).query(&[
                ("startDateTime", self.config.window_start.as_str()),
                ("endDateTime", self.config.window_end.as_str()),
            ]),
            DeltaRequest::DeltaToken(delta_token) => {
                self.http.get(feed).query(&[("$deltatoken", delta_token)])
            }
            DeltaRequest::NextLink(link) => self.http.get(link),
        };
        request = request.bearer_auth(token).header("Prefer", PREFER_TEXT_BODY);
        if let Some(size) = self.config.page_size {
            request = request.header("Prefer", format!("odata.maxpagesize={size}"));
        }

        debug!(calendar = calendar_id, request = ?delta_kind(&delta), "fetching delta page");
        http::json(Self::send(request).await?).await
    }

    pub(crate) async fn create_event(
        &self,
        token: &str,
        calendar_id: &str,
        body: &EventBody,
    ) -> ProviderResult<ApiEvent> {
        let request = self
            .http
            .post(format!("{}/events", self.calendar_url(calendar_id)))
            .bearer_auth(token)
            .json(body);
        http::json(Self::send(request).await?).await
    }

    /// Conditional update: the change key travels as a weak `If-Match` tag.
    pub(crate) async fn update_event(
        &self,
        token: &str,
        calendar_id: &str,
        event_id: &str,
        change_key: &str,
        body: &EventBody,
    ) -> ProviderResult<ApiEvent> {
        let request = self
            .http
            .patch(self.event_url(calendar_id, event_id))
            .bearer_auth(token)
            .header("If-Match", format!("W/\"{change_key}\""))
            .json(body);
        http::json(Self::send(request).await?).await
    }

    pub(crate) async fn delete_event(
        &self,
        token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> ProviderResult<()> {
        let request = self
            .http
            .delete(self.event_url(calendar_id, event_id))
            .bearer_auth(token);
        Self::send(request).await.map(drop)
    }

    pub(crate) async fn get_event(
        &self,
        token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> ProviderResult<ApiEvent> {
        let request = self
            .http
            .get(self.event_url(calendar_id, event_id))
            .bearer_auth(token)
            .query(&[("$select", "id,changeKey")]);
        http::json(Self::send(request).await?).await
    }
}

// Tokens and links stay out of logs.
fn delta_kind(delta: &DeltaRequest<'_>) -> &'static str {
    match delta {
        DeltaRequest::Window => "window",
        DeltaRequest::DeltaToken(_) => "delta_token",
        DeltaRequest::NextLink(_) => "next_link",
    }
}
