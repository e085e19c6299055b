//! The capability set every provider backend implements.
//!
//! Adapters translate the uniform calendar/event operations into provider
//! wire calls and report sync progress one page at a time; the
//! [`Reconciler`](crate::reconcile::Reconciler) drives the pages. Adapters
//! hold no per-call state, and every call receives the access token to use.

use std::future::Future;
use std::pin::Pin;

use calbridge_core::{EventDraft, EventRecord, EventRef, SyncCursor};
use chrono_tz::Tz;

use crate::error::ProviderResult;

/// A boxed future for async trait methods, keeping the trait object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Parameters for a new calendar.
#[derive(Debug, Clone, Default)]
pub struct NewCalendar {
    pub name: String,
    pub description: String,
}

impl NewCalendar {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// What the provider returned when creating a calendar.
#[derive(Debug, Clone)]
pub struct CreatedCalendar {
    pub id: String,
    /// Initial cursor when the provider hands one out directly (CalDAV).
    /// Otherwise the gateway establishes it by draining a baseline sync.
    pub cursor: Option<SyncCursor>,
}

/// Per-call sync context established before the first page.
#[derive(Debug, Clone)]
pub struct SyncSession {
    pub calendar_id: String,
    /// Zone of the provider calendar, when known.
    pub source_zone: Option<Tz>,
    /// Zone the caller wants times rendered in. `None` keeps provider times.
    pub local_zone: Option<Tz>,
}

impl SyncSession {
    pub fn new(calendar_id: impl Into<String>, local_zone: Option<Tz>) -> Self {
        Self {
            calendar_id: calendar_id.into(),
            source_zone: None,
            local_zone,
        }
    }

    pub fn with_source_zone(mut self, zone: Option<Tz>) -> Self {
        self.source_zone = zone;
        self
    }
}

/// Where a sync starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStart {
    /// Changes after a previously issued cursor.
    Since(SyncCursor),
    /// Full listing used to obtain a first cursor for a new calendar.
    Baseline,
}

/// One page request: the sync origin plus the continuation handle from the
/// previous page, if any.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    pub start: &'a SyncStart,
    pub continuation: Option<&'a str>,
}

impl<'a> PageRequest<'a> {
    pub fn first(start: &'a SyncStart) -> Self {
        Self {
            start,
            continuation: None,
        }
    }

    pub fn next(start: &'a SyncStart, continuation: &'a str) -> Self {
        Self {
            start,
            continuation: Some(continuation),
        }
    }
}

/// A single classified item from a changes page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawChange {
    Updated(EventRecord),
    /// Cancelled or removed; carries the event id.
    Removed(String),
}

/// How a page ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageMarker {
    /// More pages follow; the handle is opaque to everything but the adapter.
    More(String),
    /// Caught up; the cursor for the next sync.
    Done(SyncCursor),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    pub changes: Vec<RawChange>,
    pub marker: PageMarker,
}

/// A calendar backend.
///
/// Implementations must be `Send + Sync` and keep no state between calls
/// other than configuration and the HTTP client.
pub trait ProviderAdapter: Send + Sync {
    /// Short provider name used in errors and logs ("google", "graph", "caldav").
    fn name(&self) -> &str;

    fn create_calendar<'a>(
        &'a self,
        access_token: &'a str,
        calendar: &'a NewCalendar,
    ) -> BoxFuture<'a, ProviderResult<CreatedCalendar>>;

    fn delete_calendar<'a>(
        &'a self,
        access_token: &'a str,
        calendar_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>>;

    fn create_event<'a>(
        &'a self,
        access_token: &'a str,
        calendar_id: &'a str,
        draft: &'a EventDraft,
    ) -> BoxFuture<'a, ProviderResult<EventRef>>;

    /// Replaces an event, conditional on `concurrency_tag` still being current.
    fn update_event<'a>(
        &'a self,
        access_token: &'a str,
        calendar_id: &'a str,
        event_id: &'a str,
        concurrency_tag: &'a str,
        draft: &'a EventDraft,
    ) -> BoxFuture<'a, ProviderResult<EventRef>>;

    fn delete_event<'a>(
        &'a self,
        access_token: &'a str,
        calendar_id: &'a str,
        event_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>>;

    /// Reads the current concurrency tag of an event.
    fn event_tag<'a>(
        &'a self,
        access_token: &'a str,
        calendar_id: &'a str,
        event_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<EventRef>>;

    /// Prepares a sync call: reachability checks and calendar metadata.
    ///
    /// The default assumes reachability and lets the first page fail instead.
    fn begin_sync<'a>(
        &'a self,
        _access_token: &'a str,
        calendar_id: &'a str,
        local_zone: Option<Tz>,
    ) -> BoxFuture<'a, ProviderResult<SyncSession>> {
        let session = SyncSession::new(calendar_id, local_zone);
        Box::pin(async move { Ok(session) })
    }

    /// Fetches one page of changes.
    fn fetch_changes_page<'a>(
        &'a self,
        access_token: &'a str,
        session: &'a SyncSession,
        request: PageRequest<'a>,
    ) -> BoxFuture<'a, ProviderResult<RawPage>>;
}

/// Random calendar name used before deleting a calendar.
///
/// Renaming first lets a calendar with the old name be recreated right away.
/// This relies on observed provider behavior rather than documented API.
#[cfg(any(feature = "google", feature = "graph"))]
pub(crate) fn disposable_calendar_name() -> String {
    use rand::Rng;
    use rand::distr::Alphanumeric;

    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(13)
        .map(char::from)
        .collect()
}
