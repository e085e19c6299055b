//! Microsoft Graph calendar adapter.
//!
//! Sync walks `calendarView/delta`: pages link to each other through
//! `@odata.nextLink`, and the final page carries an `@odata.deltaLink` whose
//! `$deltatoken` query value becomes the cursor. A new calendar gets its
//! first cursor by walking the delta feed over a fixed wide window. Removed
//! events arrive in-band with an `@removed` marker.

mod adapter;
mod client;
mod config;

pub use adapter::GraphAdapter;
pub use client::GraphClient;
pub use config::GraphConfig;
