//! Google Calendar API client.
//!
//! Thin request layer: every method takes the access token for the call and
//! returns the decoded API shape. Status handling lives in [`crate::http`].

use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProviderResult;
use crate::http;

use super::config::GoogleConfig;

/// Where an events listing starts.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ListOrigin<'a> {
    SyncToken(&'a str),
    /// Everything from `time_min` on, including cancelled events.
    Baseline { time_min: &'a str },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiCalendar {
    pub id: String,
    #[serde(default)]
    pub time_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventsPage {
    #[serde(default)]
    pub items: Vec<ApiEvent>,
    pub next_page_token: Option<String>,
    pub next_sync_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiEvent {
    pub id: Option<String>,
    pub status: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub start: Option<ApiEventTime>,
    pub end: Option<ApiEventTime>,
    pub etag: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiEventTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl ApiEventTime {
    /// The populated time value, preferring `dateTime` over `date`.
    pub fn value(&self) -> Option<&str> {
        self.date_time.as_deref().or(self.date.as_deref())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct EventBody {
    pub summary: String,
    pub description: String,
    pub start: ApiEventTime,
    pub end: ApiEventTime,
}

#[derive(Debug, Serialize)]
struct CalendarBody<'a> {
    summary: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    description: &'a str,
}

/// Google Calendar API client.
#[derive(Debug, Clone)]
pub struct GoogleCalendarClient {
    http: Client,
    api_base: String,
    page_size: Option<u32>,
}

impl GoogleCalendarClient {
    pub fn new(config: &GoogleConfig) -> ProviderResult<Self> {
        Ok(Self {
            http: config.http.build_client()?,
            api_base: config.api_base.clone(),
            page_size: config.page_size,
        })
    }

    fn calendar_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}",
            self.api_base,
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

    pub(crate) async fn insert_calendar(
        &self,
        token: &str,
        summary: &str,
        description: &str,
    ) -> ProviderResult<ApiCalendar> {
        let request = self
            .http
            .post(format!("{}/calendars", self.api_base))
            .bearer_auth(token)
            .json(&CalendarBody {
                summary,
                description,
            });
        http::json(Self::send(request).await?).await
    }

    pub(crate) async fn get_calendar(
        &self,
        token: &str,
        calendar_id: &str,
    ) -> ProviderResult<ApiCalendar> {
        let request = self
            .http
            .get(self.calendar_url(calendar_id))
            .bearer_auth(token);
        http::json(Self::send(request).await?).await
    }

    pub(crate) async fn rename_calendar(
        &self,
        token: &str,
        calendar_id: &str,
        summary: &str,
    ) -> ProviderResult<()> {
        let request = self
            .http
            .patch(self.calendar_url(calendar_id))
            .bearer_auth(token)
            .json(&CalendarBody {
                summary,
                description: "",
            });
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

    pub(crate) async fn list_events_page(
        &self,
        token: &str,
        calendar_id: &str,
        origin: ListOrigin<'_>,
        page_token: Option<&str>,
    ) -> ProviderResult<EventsPage> {
        let mut request = self
            .http
            .get(format!("{}/events", self.calendar_url(calendar_id)))
            .bearer_auth(token);

        request = match origin {
            ListOrigin::SyncToken(sync_token) => request.query(&[("syncToken", sync_token)]),
            ListOrigin::Baseline { time_min } => {
                request.query(&[("showDeleted", "true"), ("timeMin", time_min)])
            }
        };
        if let Some(size) = self.page_size {
            request = request.query(&[("maxResults", size.to_string())]);
        }
        if let Some(page_token) = page_token {
            request = request.query(&[("pageToken", page_token)]);
        }

        debug!(calendar = calendar_id, paged = page_token.is_some(), "listing events");
        http::json(Self::send(request).await?).await
    }

    pub(crate) async fn insert_event(
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

    /// Full replacement, rejected with 412 when `etag` is stale.
    pub(crate) async fn update_event(
        &self,
        token: &str,
        calendar_id: &str,
        event_id: &str,
        etag: &str,
        body: &EventBody,
    ) -> ProviderResult<ApiEvent> {
        let request = self
            .http
            .put(self.event_url(calendar_id, event_id))
            .bearer_auth(token)
            .header("If-Match", etag)
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
            .bearer_auth(token);
        http::json(Self::send(request).await?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calendar_ids_are_path_encoded() {
        let client = GoogleCalendarClient::new(&GoogleConfig::new()).unwrap();
        assert_eq!(
            client.event_url("team@group.calendar.google.com", "evt 1"),
            concat!(
                "https://www.googleapis.com/calendar/v3/calendars/",
                "team%40group.calendar.google.com/events/evt%201"
            )
        );
    }

    #[test]
    fn event_time_prefers_date_time() {
        let time = ApiEventTime {
            date: Some("2024-03-15".into()),
            date_time: Some("2024-03-15T10:00:00Z".into()),
            time_zone: None,
        };
        assert_eq!(time.value(), Some("2024-03-15T10:00:00Z"));
        assert_eq!(ApiEventTime::default().value(), None);
    }

    #[test]
    fn parses_events_page() {
        let json = r#"{
            "kind": "calendar#events",
            "items": [
                {"id": "a", "status": "confirmed", "etag": "\"1\"",
                 "start": {"dateTime": "2024-03-15T10:00:00+01:00"},
                 "end": {"dateTime": "2024-03-15T11:00:00+01:00"}},
                {"id": "b", "status": "cancelled"}
            ],
            "nextSyncToken": "CPDAlvWDx70CEPDAlvWDx70CGAU="
        }"#;
        let page: EventsPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.next_page_token.is_none());
        assert_eq!(page.items[1].status.as_deref(), Some("cancelled"));
    }
}
