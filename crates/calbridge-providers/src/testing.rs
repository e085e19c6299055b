//! In-memory fakes for exercising the gateway without a network.
//!
//! [`FakeCalendarService`] keeps calendars and events in memory and exposes
//! a paginated changes feed driven by a global change sequence; cursors are
//! `seq-N`. [`FakeTokenProvider`] issues numbered token pairs and can rotate
//! the refresh token on every refresh.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use calbridge_core::{EventDraft, EventProperties, EventRecord, EventRef, SyncCursor};
use chrono_tz::Tz;

use crate::adapter::{
    BoxFuture, CreatedCalendar, NewCalendar, PageMarker, PageRequest, ProviderAdapter, RawChange,
    RawPage, SyncSession, SyncStart,
};
use crate::credentials::{TokenPair, TokenProvider};
use crate::error::{ProviderError, ProviderResult};
use crate::normalize::render_time;

const PROVIDER: &str = "fake";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
struct StoredEvent {
    draft: EventDraft,
    tag: String,
}

#[derive(Debug, Default)]
struct FakeCalendar {
    name: String,
    /// Event ids in creation order.
    order: Vec<String>,
    events: HashMap<String, StoredEvent>,
    /// `(sequence, event id)` for every mutation.
    log: Vec<(u64, String)>,
}

#[derive(Debug, Default)]
struct ServiceState {
    seq: u64,
    next_id: u64,
    calendars: HashMap<String, FakeCalendar>,
    page_fetches: usize,
    tokens_seen: Vec<String>,
}

impl ServiceState {
    fn bump(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn calendar(&mut self, id: &str) -> ProviderResult<&mut FakeCalendar> {
        self.calendars
            .get_mut(id)
            .ok_or_else(|| ProviderError::not_found(format!("calendar {id} not found")))
    }
}

/// A calendar backend held in memory.
#[derive(Debug)]
pub struct FakeCalendarService {
    state: Mutex<ServiceState>,
    page_size: usize,
    fail_on_page: Option<usize>,
    rejected_tokens: Mutex<HashSet<String>>,
    token_allowance: Mutex<HashMap<String, usize>>,
}

impl Default for FakeCalendarService {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCalendarService {
    pub const DEFAULT_PAGE_SIZE: usize = 3;

    pub fn new() -> Self {
        Self {
            state: Mutex::default(),
            page_size: Self::DEFAULT_PAGE_SIZE,
            fail_on_page: None,
            rejected_tokens: Mutex::default(),
            token_allowance: Mutex::default(),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Makes the given 1-based page of every sync fail with a server error.
    pub fn with_failure_on_page(mut self, page: usize) -> Self {
        self.fail_on_page = Some(page);
        self
    }

    /// Answers requests made with `token` as if it had been revoked.
    pub fn reject_token(&self, token: impl Into<String>) {
        lock(&self.rejected_tokens).insert(token.into());
    }

    /// Accepts `token` for the next `uses` requests, then rejects it.
    pub fn reject_token_after(&self, token: impl Into<String>, uses: usize) {
        lock(&self.token_allowance).insert(token.into(), uses);
    }

    /// Access tokens used so far, in call order.
    pub fn tokens_seen(&self) -> Vec<String> {
        lock(&self.state).tokens_seen.clone()
    }

    /// Number of page fetches served (including failed ones).
    pub fn page_fetches(&self) -> usize {
        lock(&self.state).page_fetches
    }

    pub fn has_calendar(&self, id: &str) -> bool {
        lock(&self.state).calendars.contains_key(id)
    }

    pub fn calendar_count(&self) -> usize {
        lock(&self.state).calendars.len()
    }

    pub fn calendar_name(&self, id: &str) -> Option<String> {
        lock(&self.state).calendars.get(id).map(|c| c.name.clone())
    }

    pub fn event_count(&self, calendar_id: &str) -> usize {
        lock(&self.state)
            .calendars
            .get(calendar_id)
            .map_or(0, |c| c.events.len())
    }

    fn authorize(&self, token: &str) -> ProviderResult<()> {
        lock(&self.state).tokens_seen.push(token.to_string());
        if lock(&self.rejected_tokens).contains(token) {
            return Err(ProviderError::authentication("access token revoked"));
        }
        if let Some(remaining) = lock(&self.token_allowance).get_mut(token) {
            if *remaining == 0 {
                return Err(ProviderError::authentication("access token expired"));
            }
            *remaining -= 1;
        }
        Ok(())
    }

    fn record(
        id: &str,
        stored: &StoredEvent,
        session: &SyncSession,
    ) -> ProviderResult<EventRecord> {
        Ok(EventRecord {
            properties: EventProperties {
                id: id.to_string(),
                summary: stored.draft.summary.clone(),
                start_time: render_time(&stored.draft.start_time, None, session)?,
                end_time: render_time(&stored.draft.end_time, None, session)?,
                description: stored.draft.description.clone(),
            },
            concurrency_tag: stored.tag.clone(),
        })
    }

    fn page(&self, session: &SyncSession, request: PageRequest<'_>) -> ProviderResult<RawPage> {
        let mut state = lock(&self.state);
        state.page_fetches += 1;
        let current_seq = state.seq;

        // Continuations are `offset:upto`, pinning the snapshot of the first page.
        let (offset, upto) = match request.continuation {
            Some(handle) => {
                let parsed = handle.split_once(':').and_then(|(o, u)| {
                    Some((o.parse::<usize>().ok()?, u.parse::<u64>().ok()?))
                });
                parsed.ok_or_else(|| {
                    ProviderError::bad_request(format!("unknown page handle {handle}"))
                })?
            }
            None => (0, current_seq),
        };
        let page_number = offset / self.page_size + 1;
        if self.fail_on_page == Some(page_number) {
            return Err(ProviderError::server(format!("injected failure on page {page_number}")));
        }

        let since = match request.start {
            SyncStart::Baseline => None,
            SyncStart::Since(cursor) => {
                let seq = cursor
                    .as_str()
                    .strip_prefix("seq-")
                    .and_then(|n| n.parse::<u64>().ok())
                    .filter(|n| *n <= current_seq)
                    .ok_or_else(|| ProviderError::gone(format!("sync token {cursor} is invalid")))?;
                Some(seq)
            }
        };

        let calendar = state.calendar(&session.calendar_id)?;
        let ids: Vec<String> = match since {
            None => calendar.order.clone(),
            Some(since) => {
                // Latest mutation per event, ordered by when it happened.
                let mut latest: Vec<(u64, String)> = Vec::new();
                for (seq, id) in calendar.log.iter().filter(|(s, _)| *s > since && *s <= upto) {
                    latest.retain(|(_, seen)| seen != id);
                    latest.push((*seq, id.clone()));
                }
                latest.into_iter().map(|(_, id)| id).collect()
            }
        };

        let mut changes = Vec::new();
        for id in ids.iter().skip(offset).take(self.page_size) {
            match calendar.events.get(id) {
                Some(stored) => {
                    changes.push(RawChange::Updated(Self::record(id, stored, session)?));
                }
                None => changes.push(RawChange::Removed(id.clone())),
            }
        }

        let next = offset + self.page_size;
        let marker = if next < ids.len() {
            PageMarker::More(format!("{next}:{upto}"))
        } else {
            PageMarker::Done(SyncCursor::new(format!("seq-{upto}")))
        };
        Ok(RawPage { changes, marker })
    }

    fn write_event(
        &self,
        calendar_id: &str,
        event_id: Option<&str>,
        expected_tag: Option<&str>,
        draft: &EventDraft,
    ) -> ProviderResult<EventRef> {
        let mut state = lock(&self.state);
        let seq = state.bump();
        let id = match event_id {
            Some(id) => id.to_string(),
            None => {
                state.next_id += 1;
                format!("evt-{}", state.next_id)
            }
        };
        let calendar = state.calendar(calendar_id)?;

        match (event_id, calendar.events.get(&id)) {
            (Some(_), None) => {
                return Err(ProviderError::not_found(format!("event {id} not found")));
            }
            (Some(_), Some(stored)) if Some(stored.tag.as_str()) != expected_tag => {
                return Err(ProviderError::conflict(format!(
                    "event {id} was modified (current tag {})",
                    stored.tag
                )));
            }
            (None, _) => calendar.order.push(id.clone()),
            _ => {}
        }

        let tag = format!("v{seq}");
        calendar.events.insert(
            id.clone(),
            StoredEvent {
                draft: draft.clone(),
                tag: tag.clone(),
            },
        );
        calendar.log.push((seq, id.clone()));
        Ok(EventRef {
            id,
            concurrency_tag: tag,
        })
    }
}

fn ready<'a, T: Send + 'a>(result: ProviderResult<T>) -> BoxFuture<'a, ProviderResult<T>> {
    let result = result.map_err(|e| e.with_provider(PROVIDER));
    Box::pin(async move { result })
}

impl ProviderAdapter for FakeCalendarService {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn create_calendar<'a>(
        &'a self,
        access_token: &'a str,
        calendar: &'a NewCalendar,
    ) -> BoxFuture<'a, ProviderResult<CreatedCalendar>> {
        let result = self.authorize(access_token).map(|()| {
            let mut state = lock(&self.state);
            state.next_id += 1;
            let id = format!("cal-{}", state.next_id);
            state.calendars.insert(
                id.clone(),
                FakeCalendar {
                    name: calendar.name.clone(),
                    ..Default::default()
                },
            );
            CreatedCalendar { id, cursor: None }
        });
        ready(result)
    }

    fn delete_calendar<'a>(
        &'a self,
        access_token: &'a str,
        calendar_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        let result = self.authorize(access_token).and_then(|()| {
            lock(&self.state)
                .calendars
                .remove(calendar_id)
                .map(drop)
                .ok_or_else(|| {
                    ProviderError::not_found(format!("calendar {calendar_id} not found"))
                })
        });
        ready(result)
    }

    fn create_event<'a>(
        &'a self,
        access_token: &'a str,
        calendar_id: &'a str,
        draft: &'a EventDraft,
    ) -> BoxFuture<'a, ProviderResult<EventRef>> {
        let result = self
            .authorize(access_token)
            .and_then(|()| self.write_event(calendar_id, None, None, draft));
        ready(result)
    }

    fn update_event<'a>(
        &'a self,
        access_token: &'a str,
        calendar_id: &'a str,
        event_id: &'a str,
        concurrency_tag: &'a str,
        draft: &'a EventDraft,
    ) -> BoxFuture<'a, ProviderResult<EventRef>> {
        let result = self.authorize(access_token).and_then(|()| {
            self.write_event(calendar_id, Some(event_id), Some(concurrency_tag), draft)
        });
        ready(result)
    }

    fn delete_event<'a>(
        &'a self,
        access_token: &'a str,
        calendar_id: &'a str,
        event_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        let result = self.authorize(access_token).and_then(|()| {
            let mut state = lock(&self.state);
            let seq = state.bump();
            let calendar = state.calendar(calendar_id)?;
            if calendar.events.remove(event_id).is_none() {
                return Err(ProviderError::not_found(format!("event {event_id} not found")));
            }
            calendar.order.retain(|id| id != event_id);
            calendar.log.push((seq, event_id.to_string()));
            Ok(())
        });
        ready(result)
    }

    fn event_tag<'a>(
        &'a self,
        access_token: &'a str,
        calendar_id: &'a str,
        event_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<EventRef>> {
        let result = self.authorize(access_token).and_then(|()| {
            let mut state = lock(&self.state);
            let calendar = state.calendar(calendar_id)?;
            calendar
                .events
                .get(event_id)
                .map(|stored| EventRef {
                    id: event_id.to_string(),
                    concurrency_tag: stored.tag.clone(),
                })
                .ok_or_else(|| ProviderError::not_found(format!("event {event_id} not found")))
        });
        ready(result)
    }

    fn begin_sync<'a>(
        &'a self,
        access_token: &'a str,
        calendar_id: &'a str,
        local_zone: Option<Tz>,
    ) -> BoxFuture<'a, ProviderResult<SyncSession>> {
        let result = self.authorize(access_token).and_then(|()| {
            lock(&self.state).calendar(calendar_id)?;
            Ok(SyncSession::new(calendar_id, local_zone).with_source_zone(Some(chrono_tz::UTC)))
        });
        ready(result)
    }

    fn fetch_changes_page<'a>(
        &'a self,
        access_token: &'a str,
        session: &'a SyncSession,
        request: PageRequest<'a>,
    ) -> BoxFuture<'a, ProviderResult<RawPage>> {
        let result = self
            .authorize(access_token)
            .and_then(|()| self.page(session, request));
        ready(result)
    }
}

#[derive(Debug, Default)]
struct TokenState {
    issued: u32,
    refresh_calls: u32,
    /// Only the most recently issued refresh token is accepted.
    valid_refresh: Option<String>,
}

/// Token endpoint fake issuing `access-N` / `refresh-N`.
#[derive(Debug)]
pub struct FakeTokenProvider {
    state: Mutex<TokenState>,
    expires_in: Option<i64>,
    rotate: bool,
}

impl FakeTokenProvider {
    /// `expires_in` is the lifetime reported for every access token.
    pub fn new(expires_in: Option<i64>) -> Self {
        Self {
            state: Mutex::default(),
            expires_in,
            rotate: false,
        }
    }

    /// Issues a new refresh token on every refresh and revokes the old one.
    pub fn rotating(mut self) -> Self {
        self.rotate = true;
        self
    }

    /// Makes `token` the currently valid refresh token.
    pub fn accept_refresh_token(&self, token: impl Into<String>) {
        lock(&self.state).valid_refresh = Some(token.into());
    }

    pub fn refresh_calls(&self) -> u32 {
        lock(&self.state).refresh_calls
    }

    fn issue(&self, state: &mut TokenState, with_refresh: bool) -> TokenPair {
        state.issued += 1;
        let refresh_token = with_refresh.then(|| format!("refresh-{}", state.issued));
        if let Some(token) = &refresh_token {
            state.valid_refresh = Some(token.clone());
        }
        TokenPair {
            access_token: format!("access-{}", state.issued),
            refresh_token,
            expires_in: self.expires_in,
        }
    }
}

impl TokenProvider for FakeTokenProvider {
    fn authorization_url(&self) -> ProviderResult<String> {
        Ok("https://auth.example.com/authorize?client_id=fake&response_type=code".into())
    }

    fn exchange_code<'a>(&'a self, code: &'a str) -> BoxFuture<'a, ProviderResult<TokenPair>> {
        let result = if code.is_empty() || code == "invalid" {
            Err(ProviderError::authentication("invalid_grant: unknown authorization code"))
        } else {
            let mut state = lock(&self.state);
            Ok(self.issue(&mut state, true))
        };
        Box::pin(async move { result })
    }

    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, ProviderResult<TokenPair>> {
        let mut state = lock(&self.state);
        state.refresh_calls += 1;
        let revoked = state
            .valid_refresh
            .as_deref()
            .is_some_and(|valid| valid != refresh_token);
        let result = if revoked {
            Err(ProviderError::authentication("invalid_grant: refresh token revoked"))
        } else {
            Ok(self.issue(&mut state, self.rotate))
        };
        drop(state);
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use crate::reconcile::Reconciler;

    fn draft(summary: &str) -> EventDraft {
        EventDraft::new(summary, "2024-03-15T10:00:00Z", "2024-03-15T11:00:00Z")
    }

    async fn calendar(service: &FakeCalendarService) -> String {
        service
            .create_calendar("t", &NewCalendar::new("Work"))
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn stale_tag_conflicts() {
        let service = FakeCalendarService::new();
        let cal = calendar(&service).await;
        let created = service.create_event("t", &cal, &draft("a")).await.unwrap();
        let updated = service
            .update_event("t", &cal, &created.id, &created.concurrency_tag, &draft("b"))
            .await
            .unwrap();
        assert_ne!(updated.concurrency_tag, created.concurrency_tag);

        let err = service
            .update_event("t", &cal, &created.id, &created.concurrency_tag, &draft("c"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::Conflict);
        assert_eq!(err.provider(), Some("fake"));
    }

    #[tokio::test]
    async fn feed_reports_latest_state_per_event() {
        let service = FakeCalendarService::new().with_page_size(10);
        let cal = calendar(&service).await;
        let reconciler = Reconciler::new(&service);
        let cursor = reconciler.establish_cursor("t", &cal).await.unwrap();

        let a = service.create_event("t", &cal, &draft("a")).await.unwrap();
        let b = service.create_event("t", &cal, &draft("b")).await.unwrap();
        service.delete_event("t", &cal, &a.id).await.unwrap();
        service
            .update_event("t", &cal, &b.id, &b.concurrency_tag, &draft("b2"))
            .await
            .unwrap();

        let result = reconciler
            .sync("t", &cal, &SyncStart::Since(cursor), None)
            .await
            .unwrap();
        assert_eq!(result.deleted_event_ids, vec![a.id]);
        assert_eq!(result.updated_events.len(), 1);
        assert_eq!(result.updated_events[0].properties.summary, "b2");
    }

    #[tokio::test]
    async fn unknown_cursor_is_gone() {
        let service = FakeCalendarService::new();
        let cal = calendar(&service).await;
        let err = Reconciler::new(&service)
            .sync("t", &cal, &SyncStart::Since(SyncCursor::new("seq-99")), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::Gone);
    }

    #[tokio::test]
    async fn rejected_tokens_fail_authentication() {
        let service = FakeCalendarService::new();
        service.reject_token("old");
        let err = service
            .create_calendar("old", &NewCalendar::new("x"))
            .await
            .unwrap_err();
        assert!(err.is_auth_rejection());
        assert_eq!(service.tokens_seen(), vec!["old".to_string()]);
    }

    #[tokio::test]
    async fn token_allowance_runs_out() {
        let service = FakeCalendarService::new();
        service.reject_token_after("short", 1);
        let created = service
            .create_calendar("short", &NewCalendar::new("x"))
            .await
            .unwrap();
        let err = service.delete_calendar("short", &created.id).await.unwrap_err();
        assert!(err.is_auth_rejection());
        assert_eq!(service.calendar_count(), 1);
    }

    #[tokio::test]
    async fn token_provider_revokes_rotated_refresh_tokens() {
        let provider = FakeTokenProvider::new(Some(3600)).rotating();
        let first = provider.exchange_code("code").await.unwrap();
        assert_eq!(first.refresh_token.as_deref(), Some("refresh-1"));

        let second = provider.refresh("refresh-1").await.unwrap();
        assert_eq!(second.refresh_token.as_deref(), Some("refresh-2"));
        assert!(provider.refresh("refresh-1").await.is_err());
        assert_eq!(provider.refresh_calls(), 2);
    }
}
