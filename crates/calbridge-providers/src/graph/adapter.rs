//! [`ProviderAdapter`] implementation for Microsoft Graph.

use calbridge_core::{EventDraft, EventProperties, EventRecord, EventRef, ProviderTime, SyncCursor};
use tracing::{debug, info};
use url::Url;

use crate::adapter::{
    BoxFuture, CreatedCalendar, NewCalendar, PageMarker, PageRequest, ProviderAdapter, RawChange,
    RawPage, SyncSession, SyncStart, disposable_calendar_name,
};
use crate::error::{ProviderError, ProviderResult};
use crate::normalize::{known_zone, render_time};

use super::client::{
    ApiEvent, DateTimeTimeZone, DeltaEvent, DeltaRequest, EventBody, GraphClient, ItemBody,
};
use super::config::GraphConfig;

const PROVIDER: &str = "graph";

pub struct GraphAdapter {
    client: GraphClient,
}

impl GraphAdapter {
    pub fn new(config: GraphConfig) -> ProviderResult<Self> {
        Ok(Self {
            client: GraphClient::new(config)?,
        })
    }

    async fn fetch_page(
        &self,
        token: &str,
        session: &SyncSession,
        request: PageRequest<'_>,
    ) -> ProviderResult<RawPage> {
        let delta = match (request.continuation, request.start) {
            (Some(link), _) => DeltaRequest::NextLink(link),
            (None, SyncStart::Since(cursor)) => DeltaRequest::DeltaToken(cursor.as_str()),
            (None, SyncStart::Baseline) => DeltaRequest::Window,
        };
        let page = self
            .client
            .delta_page(token, &session.calendar_id, delta)
            .await?;

        let changes = page
            .value
            .into_iter()
            .map(|event| classify(event, session))
            .collect::<ProviderResult<Vec<_>>>()?;

        let marker = match (page.next_link, page.delta_link) {
            (Some(next), _) => PageMarker::More(next),
            (None, Some(delta_link)) => PageMarker::Done(delta_token(&delta_link)?),
            (None, None) => {
                return Err(ProviderError::invalid_response(
                    "delta page carried neither @odata.nextLink nor @odata.deltaLink",
                ));
            }
        };
        Ok(RawPage { changes, marker })
    }
}

/// Extracts the cursor from an `@odata.deltaLink`.
///
/// Prefers the `$deltatoken` pair and falls back to the first query value.
fn delta_token(delta_link: &str) -> ProviderResult<SyncCursor> {
    let url = Url::parse(delta_link).map_err(|e| {
        ProviderError::invalid_response(format!("invalid delta link: {e}")).with_source(e)
    })?;
    let mut first = None;
    for (key, value) in url.query_pairs() {
        if key == "$deltatoken" {
            return Ok(SyncCursor::new(value.into_owned()));
        }
        first.get_or_insert(value);
    }
    first
        .map(|value| SyncCursor::new(value.into_owned()))
        .ok_or_else(|| ProviderError::invalid_response("delta link carries no token"))
}

fn classify(event: DeltaEvent, session: &SyncSession) -> ProviderResult<RawChange> {
    if event.removed.is_some() {
        return Ok(RawChange::Removed(event.id));
    }

    let render = |time: Option<&DateTimeTimeZone>| -> ProviderResult<String> {
        match time {
            Some(t) => render_time(&t.date_time, known_zone(t.time_zone.as_deref()), session),
            None => Ok(String::new()),
        }
    };

    Ok(RawChange::Updated(EventRecord {
        properties: EventProperties {
            start_time: render(event.start.as_ref())?,
            end_time: render(event.end.as_ref())?,
            id: event.id,
            summary: event.subject.unwrap_or_default(),
            description: event.body.map(|b| b.content).unwrap_or_default(),
        },
        concurrency_tag: event.change_key.unwrap_or_default(),
    }))
}

fn event_body(draft: &EventDraft, change_key: Option<&str>) -> EventBody {
    let zone = draft.time_zone.clone().unwrap_or_else(|| "UTC".to_string());
    let all_day = matches!(ProviderTime::parse(&draft.start_time), Ok(ProviderTime::Date(_)));
    let time = |value: &str| DateTimeTimeZone {
        date_time: match ProviderTime::parse(value) {
            Ok(ProviderTime::Date(date)) => format!("{}T00:00:00", date.format("%Y-%m-%d")),
            _ => value.to_string(),
        },
        time_zone: Some(zone.clone()),
    };

    EventBody {
        subject: draft.summary.clone(),
        body: ItemBody {
            content_type: "Text".to_string(),
            content: draft.description.clone(),
        },
        start: time(&draft.start_time),
        end: time(&draft.end_time),
        is_all_day: all_day,
        change_key: change_key.map(str::to_string),
    }
}

fn event_ref(event: ApiEvent) -> ProviderResult<EventRef> {
    let concurrency_tag = event
        .change_key
        .ok_or_else(|| ProviderError::invalid_response("event response is missing changeKey"))?;
    Ok(EventRef {
        id: event.id,
        concurrency_tag,
    })
}

impl ProviderAdapter for GraphAdapter {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn create_calendar<'a>(
        &'a self,
        access_token: &'a str,
        calendar: &'a NewCalendar,
    ) -> BoxFuture<'a, ProviderResult<CreatedCalendar>> {
        Box::pin(async move {
            if !calendar.description.is_empty() {
                debug!("graph calendars have no description, ignoring it");
            }
            let created = self
                .client
                .create_calendar(access_token, &calendar.name)
                .await
                .map_err(|e| e.with_provider(PROVIDER))?;
            info!(calendar = %created.id, "created calendar");
            Ok(CreatedCalendar {
                id: created.id,
                cursor: None,
            })
        })
    }

    fn delete_calendar<'a>(
        &'a self,
        access_token: &'a str,
        calendar_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            let placeholder = disposable_calendar_name();
            self.client
                .rename_calendar(access_token, calendar_id, &placeholder)
                .await
                .map_err(|e| e.with_provider(PROVIDER))?;
            self.client
                .delete_calendar(access_token, calendar_id)
                .await
                .map_err(|e| e.with_provider(PROVIDER))?;
            info!(calendar = calendar_id, "deleted calendar");
            Ok(())
        })
    }

    fn create_event<'a>(
        &'a self,
        access_token: &'a str,
        calendar_id: &'a str,
        draft: &'a EventDraft,
    ) -> BoxFuture<'a, ProviderResult<EventRef>> {
        Box::pin(async move {
            let event = self
                .client
                .create_event(access_token, calendar_id, &event_body(draft, None))
                .await
                .and_then(event_ref);
            event.map_err(|e| e.with_provider(PROVIDER))
        })
    }

    fn update_event<'a>(
        &'a self,
        access_token: &'a str,
        calendar_id: &'a str,
        event_id: &'a str,
        concurrency_tag: &'a str,
        draft: &'a EventDraft,
    ) -> BoxFuture<'a, ProviderResult<EventRef>> {
        Box::pin(async move {
            let body = event_body(draft, Some(concurrency_tag));
            let event = self
                .client
                .update_event(access_token, calendar_id, event_id, concurrency_tag, &body)
                .await
                .and_then(event_ref);
            event.map_err(|e| e.with_provider(PROVIDER))
        })
    }

    fn delete_event<'a>(
        &'a self,
        access_token: &'a str,
        calendar_id: &'a str,
        event_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            self.client
                .delete_event(access_token, calendar_id, event_id)
                .await
                .map_err(|e| e.with_provider(PROVIDER))
        })
    }

    fn event_tag<'a>(
        &'a self,
        access_token: &'a str,
        calendar_id: &'a str,
        event_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<EventRef>> {
        Box::pin(async move {
            self.client
                .get_event(access_token, calendar_id, event_id)
                .await
                .and_then(event_ref)
                .map_err(|e| e.with_provider(PROVIDER))
        })
    }

    fn fetch_changes_page<'a>(
        &'a self,
        access_token: &'a str,
        session: &'a SyncSession,
        request: PageRequest<'a>,
    ) -> BoxFuture<'a, ProviderResult<RawPage>> {
        Box::pin(async move {
            self.fetch_page(access_token, session, request)
                .await
                .map_err(|e| e.with_provider(PROVIDER))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_token_prefers_named_pair() {
        let link = "https://graph.microsoft.com/v1.0/me/calendarView/delta\
                    ?$skiptoken=zz&$deltatoken=R0usmci39OQ";
        let cursor = delta_token(link).unwrap();
        assert_eq!(cursor.as_str(), "R0usmci39OQ");
    }

    #[test]
    fn delta_token_falls_back_to_first_value() {
        let link = "https://outlook.office.com/api/v2.0/me/calendarview/delta?%24deltatoken=abc%3D";
        let cursor = delta_token(link).unwrap();
        assert_eq!(cursor.as_str(), "abc=");

        let cursor = delta_token("https://graph.example/delta?token=first&other=second").unwrap();
        assert_eq!(cursor.as_str(), "first");
    }

    #[test]
    fn delta_link_without_query_is_invalid() {
        assert!(delta_token("https://graph.example/delta").is_err());
        assert!(delta_token("not a url").is_err());
    }

    #[test]
    fn removed_marker_classifies_as_removal() {
        let removed = serde_json::json!({"id": "x", "@removed": {"reason": "deleted"}});
        let event: DeltaEvent = serde_json::from_value(removed).unwrap();
        let change = classify(event, &SyncSession::new("cal", None)).unwrap();
        assert_eq!(change, RawChange::Removed("x".into()));
    }

    #[test]
    fn body_content_becomes_description() {
        let event: DeltaEvent = serde_json::from_value(serde_json::json!({
            "id": "x", "subject": "Review", "changeKey": "ck",
            "body": {"contentType": "text", "content": "notes"},
            "start": {"dateTime": "2024-03-15T10:00:00.0000000", "timeZone": "UTC"},
            "end": {"dateTime": "2024-03-15T11:00:00.0000000", "timeZone": "UTC"}
        }))
        .unwrap();
        let session = SyncSession::new("cal", Some(chrono_tz::Europe::Paris));

        let RawChange::Updated(record) = classify(event, &session).unwrap() else {
            panic!("expected update");
        };
        assert_eq!(record.properties.summary, "Review");
        assert_eq!(record.properties.description, "notes");
        assert_eq!(record.properties.start_time, "2024-03-15T11:00:00");
        assert_eq!(record.concurrency_tag, "ck");
    }

    #[test]
    fn update_body_carries_change_key() {
        let draft = EventDraft::new("Offsite", "2024-06-01", "2024-06-02");
        let body = event_body(&draft, Some("ck7"));
        assert!(body.is_all_day);
        assert_eq!(body.start.date_time, "2024-06-01T00:00:00");
        assert_eq!(body.change_key.as_deref(), Some("ck7"));
        assert_eq!(body.start.time_zone.as_deref(), Some("UTC"));
    }
}
