//! Core types shared by every calbridge provider: credentials, sync cursors,
//! normalized events and the timezone conversion chain.

pub mod credentials;
pub mod event;
pub mod sync;
pub mod time;
pub mod tracing;

pub use credentials::Credentials;
pub use event::{CalendarRef, EventDraft, EventProperties, EventRecord, EventRef};
pub use sync::{ChangeSet, SyncCursor, SyncResult};
pub use time::{LOCAL_FORMAT, ProviderTime, TimeError, parse_zone};
pub use tracing::{LogFormat, TracingConfig, TracingError, init_tracing};
