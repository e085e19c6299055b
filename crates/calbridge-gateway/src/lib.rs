//! Gateway facade and CLI for calbridge.
//!
//! [`Gateway`] exposes the calendar operations of one provider account as
//! plain functions: credentials in, [`Envelope`] out. The `calbridge` binary
//! wraps it for scripting.

pub mod cli;
pub mod commands;
pub mod config;
pub mod credentials_file;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod secret;

pub use config::GatewaySettings;
pub use envelope::{
    AuthUrlPayload, CalendarPayload, Envelope, ErrorDetail, EventPayload, NoPayload, SyncPayload,
};
pub use error::{GatewayError, GatewayResult};
pub use gateway::{Gateway, ProviderKind};
