//! [`ProviderAdapter`] implementation for CalDAV servers (iCloud and others).
//!
//! Calendars are collection URLs and events are resource hrefs. The
//! credential access token is the account's (app-specific) password.

use std::collections::HashMap;

use calbridge_core::{EventDraft, EventProperties, EventRecord, EventRef, SyncCursor};
use chrono_tz::Tz;
use tracing::{debug, info, warn};
use url::Url;

use crate::adapter::{
    BoxFuture, CreatedCalendar, NewCalendar, PageMarker, PageRequest, ProviderAdapter, RawChange,
    RawPage, SyncSession, SyncStart,
};
use crate::error::{ProviderError, ProviderResult};
use crate::normalize::{known_zone, render_ical_time};

use super::client::{CalDavClient, Precondition};
use super::config::CalDavConfig;
use super::ics::{self, IcsTime};
use super::xml::{self, MultigetEntry, SyncMember};

const PROVIDER: &str = "caldav";

pub struct CalDavAdapter {
    client: CalDavClient,
}

/// Reduces an href to its path so server-relative and absolute forms match.
fn href_key(href: &str) -> String {
    match Url::parse(href) {
        Ok(url) => url.path().to_string(),
        Err(_) => href.to_string(),
    }
}

fn collection_url(mut url: Url) -> Url {
    if url.path().ends_with('/') {
        return url;
    }
    let path = format!("{}/", url.path());
    url.set_path(&path);
    url
}

impl CalDavAdapter {
    pub fn new(config: CalDavConfig) -> ProviderResult<Self> {
        Ok(Self {
            client: CalDavClient::new(config)?,
        })
    }

    /// Checks that the server speaks CalDAV for this account and returns
    /// the principal href.
    async fn probe(&self, password: &str) -> ProviderResult<String> {
        let body = xml::propfind_body(&["d:current-user-principal"])?;
        let response = self
            .client
            .propfind(self.client.server_url(), password, body, 0)
            .await?;
        xml::parse_property_href(&response, "current-user-principal")?.ok_or_else(|| {
            ProviderError::invalid_response(format!(
                "{} did not report a current-user-principal",
                self.client.server_url()
            ))
        })
    }

    async fn calendar_home(&self, password: &str, principal: &str) -> ProviderResult<Url> {
        let body = xml::propfind_body(&["c:calendar-home-set"])?;
        let response = self
            .client
            .propfind(&self.client.resolve(principal)?, password, body, 0)
            .await?;
        let home = xml::parse_property_href(&response, "calendar-home-set")?.ok_or_else(|| {
            ProviderError::invalid_response("principal has no calendar-home-set")
        })?;
        Ok(collection_url(self.client.resolve(&home)?))
    }

    async fn collection_props(
        &self,
        password: &str,
        calendar: &Url,
    ) -> ProviderResult<xml::CollectionProps> {
        let body = xml::propfind_body(&["d:displayname", "d:sync-token", "c:calendar-timezone"])?;
        let response = self.client.propfind(calendar, password, body, 0).await?;
        xml::parse_collection_props(&response)
    }

    async fn multiget(
        &self,
        password: &str,
        calendar: &Url,
        hrefs: &[&str],
    ) -> ProviderResult<Vec<MultigetEntry>> {
        let body = xml::calendar_multiget_body(hrefs)?;
        let response = self.client.report(calendar, password, body, 1).await?;
        xml::parse_multiget(&response)
    }

    async fn create_calendar_inner(
        &self,
        password: &str,
        calendar: &NewCalendar,
    ) -> ProviderResult<CreatedCalendar> {
        let principal = self.probe(password).await?;
        let home = self.calendar_home(password, &principal).await?;
        let url = home
            .join(&format!("{}/", uuid::Uuid::new_v4()))
            .map_err(|e| ProviderError::internal(format!("invalid calendar URL: {e}")))?;

        let body = xml::mkcalendar_body(&calendar.name, &calendar.description)?;
        self.client.mkcalendar(&url, password, body).await?;

        let props = self.collection_props(password, &url).await?;
        let cursor = props.sync_token.map(SyncCursor::new);
        if cursor.is_none() {
            warn!(calendar = %url, "new collection reported no sync-token");
        }
        info!(calendar = %url, "created calendar");
        Ok(CreatedCalendar {
            id: url.to_string(),
            cursor,
        })
    }

    async fn delete_calendar_inner(&self, password: &str, calendar_id: &str) -> ProviderResult<()> {
        self.probe(password).await?;
        let url = collection_url(self.client.resolve(calendar_id)?);
        self.client.delete(&url, password, None).await?;
        info!(calendar = calendar_id, "deleted calendar");
        Ok(())
    }

    /// Looks up the current entity tag (and data) of one resource.
    async fn fetch_event(
        &self,
        password: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> ProviderResult<MultigetEntry> {
        let calendar = collection_url(self.client.resolve(calendar_id)?);
        let key = href_key(event_id);
        self.multiget(password, &calendar, &[event_id])
            .await?
            .into_iter()
            .find(|entry| href_key(&entry.href) == key && entry.etag.is_some())
            .ok_or_else(|| ProviderError::not_found(format!("event {event_id} not found")))
    }

    async fn tag_after_write(
        &self,
        password: &str,
        calendar_id: &str,
        event_id: &str,
        etag: Option<String>,
    ) -> ProviderResult<EventRef> {
        let concurrency_tag = match etag {
            Some(tag) => tag,
            None => {
                debug!(event = event_id, "no ETag on write response, fetching it");
                self.fetch_event(password, calendar_id, event_id)
                    .await?
                    .etag
                    .unwrap_or_default()
            }
        };
        Ok(EventRef {
            id: event_id.to_string(),
            concurrency_tag,
        })
    }

    async fn create_event_inner(
        &self,
        password: &str,
        calendar_id: &str,
        draft: &EventDraft,
    ) -> ProviderResult<EventRef> {
        self.probe(password).await?;
        let uid = uuid::Uuid::new_v4().to_string();
        let calendar = collection_url(self.client.resolve(calendar_id)?);
        let url = calendar
            .join(&format!("{uid}.ics"))
            .map_err(|e| ProviderError::internal(format!("invalid event URL: {e}")))?;

        let etag = self
            .client
            .put(&url, password, ics::build_event(&uid, draft)?, Precondition::CreateOnly)
            .await?;
        debug!(event = url.path(), "created event");
        self.tag_after_write(password, calendar_id, url.path(), etag)
            .await
    }

    async fn update_event_inner(
        &self,
        password: &str,
        calendar_id: &str,
        event_id: &str,
        concurrency_tag: &str,
        draft: &EventDraft,
    ) -> ProviderResult<EventRef> {
        self.probe(password).await?;
        let current = self.fetch_event(password, calendar_id, event_id).await?;
        let uid = current
            .data
            .as_deref()
            .and_then(|data| ics::parse_event(data).ok().flatten())
            .and_then(|event| event.uid)
            .unwrap_or_else(|| resource_stem(event_id));

        let url = self.client.resolve(event_id)?;
        let etag = self
            .client
            .put(
                &url,
                password,
                ics::build_event(&uid, draft)?,
                Precondition::IfMatch(concurrency_tag),
            )
            .await?;
        self.tag_after_write(password, calendar_id, event_id, etag)
            .await
    }

    async fn delete_event_inner(&self, password: &str, event_id: &str) -> ProviderResult<()> {
        self.probe(password).await?;
        let url = self.client.resolve(event_id)?;
        self.client.delete(&url, password, None).await?;
        debug!(event = event_id, "deleted event");
        Ok(())
    }

    async fn event_tag_inner(
        &self,
        password: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> ProviderResult<EventRef> {
        self.probe(password).await?;
        let entry = self.fetch_event(password, calendar_id, event_id).await?;
        Ok(EventRef {
            id: event_id.to_string(),
            concurrency_tag: entry.etag.unwrap_or_default(),
        })
    }

    async fn begin_sync_inner(
        &self,
        password: &str,
        calendar_id: &str,
        local_zone: Option<Tz>,
    ) -> ProviderResult<SyncSession> {
        self.probe(password).await?;
        let url = collection_url(self.client.resolve(calendar_id)?);
        let props = self.collection_props(password, &url).await?;
        let zone = props
            .calendar_timezone
            .as_deref()
            .and_then(ics::timezone_id);
        Ok(SyncSession::new(calendar_id, local_zone).with_source_zone(known_zone(zone.as_deref())))
    }

    async fn fetch_page(
        &self,
        password: &str,
        session: &SyncSession,
        request: PageRequest<'_>,
    ) -> ProviderResult<RawPage> {
        let token = match (request.continuation, request.start) {
            (Some(continuation), _) => continuation,
            (None, SyncStart::Since(cursor)) => cursor.as_str(),
            (None, SyncStart::Baseline) => "",
        };
        let calendar = collection_url(self.client.resolve(&session.calendar_id)?);
        let body = xml::sync_collection_body(token)?;
        let response = self.client.report(&calendar, password, body, 1).await?;
        let report = xml::parse_sync_report(&response)?;

        let changed: Vec<&str> = report
            .members
            .iter()
            .filter_map(|member| match member {
                SyncMember::Changed { href, .. } => Some(href.as_str()),
                SyncMember::Removed { .. } => None,
            })
            .collect();
        let mut fetched: HashMap<String, MultigetEntry> = if changed.is_empty() {
            HashMap::new()
        } else {
            self.multiget(password, &calendar, &changed)
                .await?
                .into_iter()
                .map(|entry| (href_key(&entry.href), entry))
                .collect()
        };

        let mut changes = Vec::with_capacity(report.members.len());
        for member in report.members {
            match member {
                SyncMember::Removed { href } => changes.push(RawChange::Removed(href)),
                SyncMember::Changed { href, etag } => {
                    let entry = fetched.remove(&href_key(&href));
                    if let Some(change) = classify(href, etag, entry, session)? {
                        changes.push(change);
                    }
                }
            }
        }

        let Some(sync_token) = report.sync_token else {
            return Err(ProviderError::invalid_response(
                "sync-collection response carried no sync-token",
            ));
        };
        let marker = if report.truncated {
            PageMarker::More(sync_token)
        } else {
            PageMarker::Done(SyncCursor::new(sync_token))
        };
        Ok(RawPage { changes, marker })
    }
}

fn resource_stem(href: &str) -> String {
    let name = href.trim_end_matches('/').rsplit('/').next().unwrap_or(href);
    name.strip_suffix(".ics").unwrap_or(name).to_string()
}

/// Turns one changed member into a change. Members without usable calendar
/// data are discarded.
fn classify(
    href: String,
    sync_etag: Option<String>,
    entry: Option<MultigetEntry>,
    session: &SyncSession,
) -> ProviderResult<Option<RawChange>> {
    let Some(entry) = entry else {
        debug!(href = %href, "changed member missing from multiget response");
        return Ok(None);
    };
    let Some(data) = entry.data else {
        debug!(href = %href, "changed member has no calendar data");
        return Ok(None);
    };
    let event = match ics::parse_event(&data) {
        Ok(Some(event)) => event,
        Ok(None) => return Ok(None),
        Err(e) => {
            warn!(href = %href, error = %e, "discarding unparsable calendar resource");
            return Ok(None);
        }
    };
    if event.cancelled {
        return Ok(Some(RawChange::Removed(href)));
    }

    let render = |time: Option<&IcsTime>| -> ProviderResult<String> {
        match time {
            Some(t) => render_ical_time(&t.raw, known_zone(t.tzid.as_deref()), session),
            None => Ok(String::new()),
        }
    };

    let start = render(event.start.as_ref());
    let end = render(event.end.as_ref());
    let (start_time, end_time) = match (start, end) {
        (Ok(start), Ok(end)) => (start, end),
        (Err(e), _) | (_, Err(e)) => {
            warn!(href = %href, error = %e, "discarding calendar resource with unusable times");
            return Ok(None);
        }
    };

    Ok(Some(RawChange::Updated(EventRecord {
        properties: EventProperties {
            start_time,
            end_time,
            summary: event.summary.unwrap_or_default(),
            description: event.description.unwrap_or_default(),
            id: href,
        },
        concurrency_tag: entry.etag.or(sync_etag).unwrap_or_default(),
    })))
}

impl ProviderAdapter for CalDavAdapter {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn create_calendar<'a>(
        &'a self,
        access_token: &'a str,
        calendar: &'a NewCalendar,
    ) -> BoxFuture<'a, ProviderResult<CreatedCalendar>> {
        Box::pin(async move {
            self.create_calendar_inner(access_token, calendar)
                .await
                .map_err(|e| e.with_provider(PROVIDER))
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
            self.create_event_inner(access_token, calendar_id, draft)
                .await
                .map_err(|e| e.with_provider(PROVIDER))
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
            self.update_event_inner(access_token, calendar_id, event_id, concurrency_tag, draft)
                .await
                .map_err(|e| e.with_provider(PROVIDER))
        })
    }

    fn delete_event<'a>(
        &'a self,
        access_token: &'a str,
        _calendar_id: &'a str,
        event_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            self.delete_event_inner(access_token, event_id)
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
            self.event_tag_inner(access_token, calendar_id, event_id)
                .await
                .map_err(|e| e.with_provider(PROVIDER))
        })
    }

    fn begin_sync<'a>(
        &'a self,
        access_token: &'a str,
        calendar_id: &'a str,
        local_zone: Option<Tz>,
    ) -> BoxFuture<'a, ProviderResult<SyncSession>> {
        Box::pin(async move {
            self.begin_sync_inner(access_token, calendar_id, local_zone)
                .await
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

    fn entry(href: &str, data: Option<&str>) -> MultigetEntry {
        MultigetEntry {
            href: href.into(),
            etag: Some("\"7\"".into()),
            data: data.map(str::to_string),
        }
    }

    const STANDUP: &str = "BEGIN:VCALENDAR\r\n\
        VERSION:2.0\r\n\
        BEGIN:VEVENT\r\n\
        UID:standup\r\n\
        DTSTART;TZID=Europe/Paris:20240315T100000\r\n\
        DTEND;TZID=Europe/Paris:20240315T103000\r\n\
        SUMMARY:Standup\r\n\
        END:VEVENT\r\n\
        END:VCALENDAR\r\n";

    #[test]
    fn href_keys_ignore_host() {
        assert_eq!(href_key("https://caldav.example.com/cal/a.ics"), "/cal/a.ics");
        assert_eq!(href_key("/cal/a.ics"), "/cal/a.ics");
    }

    #[test]
    fn collection_urls_end_with_slash() {
        let url = Url::parse("https://caldav.example.com/123/calendars/work").unwrap();
        assert_eq!(collection_url(url).path(), "/123/calendars/work/");
    }

    #[test]
    fn resource_stem_strips_extension() {
        assert_eq!(resource_stem("/cal/abc-123.ics"), "abc-123");
        assert_eq!(resource_stem("abc"), "abc");
    }

    #[test]
    fn classify_converts_to_local_zone() {
        let session = SyncSession::new("/cal/", Some(chrono_tz::UTC));
        let change = classify(
            "/cal/standup.ics".into(),
            None,
            Some(entry("/cal/standup.ics", Some(STANDUP))),
            &session,
        )
        .unwrap();
        let Some(RawChange::Updated(record)) = change else {
            panic!("expected update");
        };
        assert_eq!(record.id(), "/cal/standup.ics");
        assert_eq!(record.properties.summary, "Standup");
        assert_eq!(record.properties.start_time, "2024-03-15T09:00:00");
        assert_eq!(record.properties.end_time, "2024-03-15T09:30:00");
        assert_eq!(record.concurrency_tag, "\"7\"");
    }

    #[test]
    fn classify_keeps_event_zone_without_local() {
        let session = SyncSession::new("/cal/", None);
        let change = classify(
            "/cal/standup.ics".into(),
            None,
            Some(entry("/cal/standup.ics", Some(STANDUP))),
            &session,
        )
        .unwrap();
        let Some(RawChange::Updated(record)) = change else {
            panic!("expected update");
        };
        assert_eq!(record.properties.start_time, "2024-03-15T10:00:00");
    }

    #[test]
    fn classify_discards_missing_and_broken_data() {
        let session = SyncSession::new("/cal/", None);
        assert_eq!(
            classify("/cal/a.ics".into(), None, Some(entry("/cal/a.ics", None)), &session).unwrap(),
            None
        );
        assert_eq!(classify("/cal/a.ics".into(), None, None, &session).unwrap(), None);
    }

    #[test]
    fn cancelled_resource_is_removal() {
        let session = SyncSession::new("/cal/", None);
        let cancelled = STANDUP.replace("SUMMARY:Standup\r\n", "STATUS:CANCELLED\r\n");
        let change = classify(
            "/cal/standup.ics".into(),
            None,
            Some(entry("/cal/standup.ics", Some(&cancelled))),
            &session,
        )
        .unwrap();
        assert_eq!(change, Some(RawChange::Removed("/cal/standup.ics".into())));
    }
}
