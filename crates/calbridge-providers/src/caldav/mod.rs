//! CalDAV adapter (iCloud by default).
//!
//! Calendars are collection URLs and events are resource hrefs. Sync uses
//! RFC 6578 `sync-collection` reports, fetching changed resources with
//! `calendar-multiget`; event data is parsed from raw iCalendar property
//! text. The app password travels as the credential's access token and is
//! sent with HTTP Basic authentication.

mod adapter;
mod client;
mod config;
pub mod ics;
pub mod xml;

pub use adapter::CalDavAdapter;
pub use client::{CalDavClient, Precondition};
pub use config::CalDavConfig;
