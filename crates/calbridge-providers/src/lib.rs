//! Provider adapters, credential refresh, and sync reconciliation.
//!
//! - [`ProviderAdapter`] - the capability set every calendar backend implements
//! - [`CredentialManager`] - keeps access tokens fresh around each operation
//! - [`Reconciler`] - drains a paginated changes feed into one [`SyncResult`]
//! - [`ProviderError`] - categorized failures shared by every adapter
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │ Google REST  │  │ CalDAV server│  │ Graph delta  │
//! └──────┬───────┘  └──────┬───────┘  └──────┬───────┘
//!        ▼                 ▼                 ▼
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │GoogleAdapter │  │CalDavAdapter │  │ GraphAdapter │
//! └──────┬───────┘  └──────┬───────┘  └──────┬───────┘
//!        └──────── ProviderAdapter ──────────┘
//!                          │ RawPage, one at a time
//!                          ▼
//!                   ┌─────────────┐
//!                   │ Reconciler  │
//!                   └──────┬──────┘
//!                          ▼
//!                     SyncResult
//! ```
//!
//! [`SyncResult`]: calbridge_core::SyncResult

pub mod adapter;
#[cfg(feature = "caldav")]
pub mod caldav;
pub mod credentials;
pub mod error;
#[cfg(feature = "google")]
pub mod google;
#[cfg(feature = "graph")]
pub mod graph;
pub mod http;
pub mod normalize;
pub mod oauth;
pub mod reconcile;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use adapter::{
    BoxFuture, CreatedCalendar, NewCalendar, PageMarker, PageRequest, ProviderAdapter, RawChange,
    RawPage, SyncSession, SyncStart,
};
pub use credentials::{CredentialManager, DEFAULT_SKEW_SECS, TokenPair, TokenProvider};
pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use http::HttpSettings;
pub use oauth::{OAuthClientConfig, OAuthFlavor, OAuthTokenProvider};
pub use reconcile::Reconciler;
