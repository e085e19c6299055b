//! Drives an adapter's changes feed to completion.
//!
//! One sync call walks `Start -> FetchingPage -> (More | Done)`: the adapter
//! prepares a [`SyncSession`], pages are fetched strictly one after another
//! (each continuation comes from the previous response), and the result is
//! only returned once the adapter reports a terminal cursor. Any error
//! discards the pages gathered so far.

use calbridge_core::{ChangeSet, SyncCursor, SyncResult};
use chrono_tz::Tz;
use tracing::{debug, info};

use crate::adapter::{PageMarker, PageRequest, ProviderAdapter, RawChange, SyncSession, SyncStart};
use crate::error::{ProviderError, ProviderResult};

#[derive(Clone, Copy)]
pub struct Reconciler<'a> {
    adapter: &'a dyn ProviderAdapter,
}

impl<'a> Reconciler<'a> {
    pub fn new(adapter: &'a dyn ProviderAdapter) -> Self {
        Self { adapter }
    }

    /// Full sync call: prepare the session, then drain every page.
    pub async fn sync(
        &self,
        access_token: &str,
        calendar_id: &str,
        start: &SyncStart,
        local_zone: Option<Tz>,
    ) -> ProviderResult<SyncResult> {
        let session = self
            .adapter
            .begin_sync(access_token, calendar_id, local_zone)
            .await?;
        self.drain(access_token, &session, start).await
    }

    /// Obtains the first cursor of a freshly created calendar by draining a
    /// baseline listing.
    pub async fn establish_cursor(
        &self,
        access_token: &str,
        calendar_id: &str,
    ) -> ProviderResult<SyncCursor> {
        let result = self
            .sync(access_token, calendar_id, &SyncStart::Baseline, None)
            .await?;
        debug!(
            provider = self.adapter.name(),
            calendar = calendar_id,
            skipped = result.updated_events.len() + result.deleted_event_ids.len(),
            "established initial cursor"
        );
        Ok(result.new_cursor)
    }

    /// Fetches pages until the adapter yields a terminal cursor.
    pub async fn drain(
        &self,
        access_token: &str,
        session: &SyncSession,
        start: &SyncStart,
    ) -> ProviderResult<SyncResult> {
        let provider = self.adapter.name();
        let mut changes = ChangeSet::new();
        let mut continuation: Option<String> = None;
        let mut page = 0usize;

        loop {
            page += 1;
            let request = match continuation.as_deref() {
                Some(handle) => PageRequest::next(start, handle),
                None => PageRequest::first(start),
            };
            let raw = self
                .adapter
                .fetch_changes_page(access_token, session, request)
                .await?;

            debug!(
                provider,
                calendar = %session.calendar_id,
                page,
                items = raw.changes.len(),
                "fetched changes page"
            );

            for change in raw.changes {
                match change {
                    RawChange::Updated(record) => changes.record_update(record),
                    RawChange::Removed(id) => changes.record_removal(id),
                }
            }

            match raw.marker {
                PageMarker::More(handle) => {
                    if continuation.as_deref() == Some(handle.as_str()) {
                        return Err(ProviderError::invalid_response(format!(
                            "provider repeated continuation handle on page {page}"
                        ))
                        .with_provider(provider));
                    }
                    continuation = Some(handle);
                }
                PageMarker::Done(cursor) => {
                    info!(
                        provider,
                        calendar = %session.calendar_id,
                        pages = page,
                        updates = changes.update_count(),
                        deletes = changes.removal_count(),
                        "sync complete"
                    );
                    return Ok(changes.finish(cursor));
                }
            }
        }
    }
}
