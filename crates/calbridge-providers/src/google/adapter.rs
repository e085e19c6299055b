//! [`ProviderAdapter`] implementation for Google Calendar.

use calbridge_core::time::rfc3339_in;
use calbridge_core::{EventDraft, EventProperties, EventRecord, EventRef, ProviderTime, SyncCursor};
use chrono::Utc;
use chrono_tz::Tz;
use tracing::{debug, info};

use crate::adapter::{
    BoxFuture, CreatedCalendar, NewCalendar, PageMarker, PageRequest, ProviderAdapter, RawChange,
    RawPage, SyncSession, SyncStart, disposable_calendar_name,
};
use crate::error::{ProviderError, ProviderResult};
use crate::normalize::{clean_cursor, known_zone, render_time};

use super::client::{ApiEvent, ApiEventTime, EventBody, GoogleCalendarClient, ListOrigin};
use super::config::GoogleConfig;

const PROVIDER: &str = "google";

pub struct GoogleAdapter {
    client: GoogleCalendarClient,
}

impl GoogleAdapter {
    pub fn new(config: GoogleConfig) -> ProviderResult<Self> {
        Ok(Self {
            client: GoogleCalendarClient::new(&config)?,
        })
    }

    async fn delete_calendar_inner(&self, token: &str, calendar_id: &str) -> ProviderResult<()> {
        let placeholder = disposable_calendar_name();
        debug!(calendar = calendar_id, "renaming calendar before delete");
        self.client
            .rename_calendar(token, calendar_id, &placeholder)
            .await?;
        self.client.delete_calendar(token, calendar_id).await?;
        info!(calendar = calendar_id, "deleted calendar");
        Ok(())
    }

    async fn fetch_page(
        &self,
        token: &str,
        session: &SyncSession,
        request: PageRequest<'_>,
    ) -> ProviderResult<RawPage> {
        let time_min;
        let origin = match request.start {
            SyncStart::Since(cursor) => ListOrigin::SyncToken(clean_cursor(cursor.as_str())),
            SyncStart::Baseline => {
                let zone = session.source_zone.unwrap_or(chrono_tz::UTC);
                time_min = rfc3339_in(Utc::now(), zone);
                ListOrigin::Baseline {
                    time_min: &time_min,
                }
            }
        };

        let page = self
            .client
            .list_events_page(token, &session.calendar_id, origin, request.continuation)
            .await?;

        let mut changes = Vec::with_capacity(page.items.len());
        for event in page.items {
            if let Some(change) = classify(event, session)? {
                changes.push(change);
            }
        }

        let marker = match (page.next_page_token, page.next_sync_token) {
            (Some(next), _) => PageMarker::More(next),
            (None, Some(sync)) => PageMarker::Done(SyncCursor::new(clean_cursor(&sync))),
            (None, None) => {
                return Err(ProviderError::invalid_response(
                    "events page carried neither nextPageToken nor nextSyncToken",
                ));
            }
        };
        Ok(RawPage { changes, marker })
    }
}

/// Turns one listed event into a change; events without an id are skipped.
fn classify(event: ApiEvent, session: &SyncSession) -> ProviderResult<Option<RawChange>> {
    let Some(id) = event.id else {
        return Ok(None);
    };
    if event.status.as_deref() == Some("cancelled") {
        return Ok(Some(RawChange::Removed(id)));
    }

    let render = |time: Option<&ApiEventTime>| -> ProviderResult<String> {
        match time.and_then(|t| t.value().map(|v| (v, t.time_zone.as_deref()))) {
            Some((value, zone)) => render_time(value, known_zone(zone), session),
            None => Ok(String::new()),
        }
    };

    Ok(Some(RawChange::Updated(EventRecord {
        properties: EventProperties {
            start_time: render(event.start.as_ref())?,
            end_time: render(event.end.as_ref())?,
            id,
            summary: event.summary.unwrap_or_default(),
            description: event.description.unwrap_or_default(),
        },
        concurrency_tag: event.etag.unwrap_or_default(),
    })))
}

fn event_time(value: &str, zone: Option<&str>) -> ApiEventTime {
    if let Ok(ProviderTime::Date(date)) = ProviderTime::parse(value) {
        return ApiEventTime {
            date: Some(date.format("%Y-%m-%d").to_string()),
            ..Default::default()
        };
    }
    ApiEventTime {
        date: None,
        date_time: Some(value.to_string()),
        time_zone: Some(zone.unwrap_or("UTC").to_string()),
    }
}

fn event_body(draft: &EventDraft) -> EventBody {
    let zone = draft.time_zone.as_deref();
    EventBody {
        summary: draft.summary.clone(),
        description: draft.description.clone(),
        start: event_time(&draft.start_time, zone),
        end: event_time(&draft.end_time, zone),
    }
}

fn event_ref(event: ApiEvent) -> ProviderResult<EventRef> {
    match (event.id, event.etag) {
        (Some(id), Some(concurrency_tag)) => Ok(EventRef { id, concurrency_tag }),
        _ => Err(ProviderError::invalid_response(
            "event response is missing id or etag",
        )),
    }
}

impl ProviderAdapter for GoogleAdapter {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn create_calendar<'a>(
        &'a self,
        access_token: &'a str,
        calendar: &'a NewCalendar,
    ) -> BoxFuture<'a, ProviderResult<CreatedCalendar>> {
        Box::pin(async move {
            let created = self
                .client
                .insert_calendar(access_token, &calendar.name, &calendar.description)
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
            self.delete_calendar_inner(access_token, calendar_id)
                .await
                .map_err(|e| e.with_provider(PROVIDER))
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
                .insert_event(access_token, calendar_id, &event_body(draft))
                .await
                .map_err(|e| e.with_provider(PROVIDER))?;
            event_ref(event).map_err(|e| e.with_provider(PROVIDER))
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
            let event = self
                .client
                .update_event(
                    access_token,
                    calendar_id,
                    event_id,
                    concurrency_tag,
                    &event_body(draft),
                )
                .await
                .map_err(|e| e.with_provider(PROVIDER))?;
            event_ref(event).map_err(|e| e.with_provider(PROVIDER))
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
            let event = self
                .client
                .get_event(access_token, calendar_id, event_id)
                .await
                .map_err(|e| e.with_provider(PROVIDER))?;
            event_ref(event).map_err(|e| e.with_provider(PROVIDER))
        })
    }

    fn begin_sync<'a>(
        &'a self,
        access_token: &'a str,
        calendar_id: &'a str,
        local_zone: Option<Tz>,
    ) -> BoxFuture<'a, ProviderResult<SyncSession>> {
        Box::pin(async move {
            let calendar = self
                .client
                .get_calendar(access_token, calendar_id)
                .await
                .map_err(|e| e.with_provider(PROVIDER))?;
            Ok(SyncSession::new(calendar_id, local_zone)
                .with_source_zone(known_zone(calendar.time_zone.as_deref())))
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
