//! Google Calendar API v3 adapter.
//!
//! Incremental sync uses `nextSyncToken` / `nextPageToken` on the events
//! list endpoint. A new calendar gets its first cursor from a baseline
//! listing (`showDeleted=true`, `timeMin=now` in the calendar's zone).
//! Writes are conditional on the event ETag.

mod adapter;
mod client;
mod config;

pub use adapter::GoogleAdapter;
pub use client::GoogleCalendarClient;
pub use config::GoogleConfig;
