//! Command-line interface definition.

use std::path::{Path, PathBuf};

use calbridge_core::EventDraft;
use clap::{Args, Parser, Subcommand};

use crate::credentials_file::STDIN;
use crate::gateway::ProviderKind;

/// calbridge - one interface over Google, Microsoft Graph and CalDAV calendars
#[derive(Debug, Parser)]
#[command(name = "calbridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the settings file
    #[arg(long, short, env = "CALBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Google Calendar
    Google(ProviderArgs),

    /// Microsoft Graph (Outlook / Microsoft 365)
    Graph(ProviderArgs),

    /// CalDAV servers (iCloud unless configured otherwise)
    Caldav(ProviderArgs),

    /// Inspect the settings file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

impl Command {
    /// The selected provider and its arguments, for provider commands.
    pub fn provider(self) -> Option<(ProviderKind, ProviderArgs)> {
        match self {
            Self::Google(args) => Some((ProviderKind::Google, args)),
            Self::Graph(args) => Some((ProviderKind::Graph, args)),
            Self::Caldav(args) => Some((ProviderKind::CalDav, args)),
            Self::Config { .. } => None,
        }
    }
}

#[derive(Debug, Args)]
pub struct ProviderArgs {
    /// Client config JSON: a file path, inline JSON, `env::VAR` or `pass::path`
    #[arg(long, env = "CALBRIDGE_CLIENT_CONFIG")]
    pub client_config: String,

    #[command(subcommand)]
    pub operation: Operation,
}

#[derive(Debug, Subcommand)]
pub enum Operation {
    /// Print the consent URL to visit
    AuthUrl,

    /// Exchange an authorization code for credentials
    AuthTokens {
        /// Authorization code from the consent redirect
        code: String,

        /// Also write the new credentials to this file
        #[arg(long, value_name = "FILE")]
        write_credentials: Option<PathBuf>,
    },

    /// Create a calendar and print its initial sync token
    CreateCalendar {
        #[command(flatten)]
        credentials: CredentialArgs,

        name: String,

        #[arg(long, default_value = "")]
        description: String,
    },

    DeleteCalendar {
        #[command(flatten)]
        credentials: CredentialArgs,

        calendar_id: String,
    },

    /// Fetch every change since a sync token
    Sync {
        #[command(flatten)]
        credentials: CredentialArgs,

        calendar_id: String,

        /// Token from the previous sync; empty lists everything
        #[arg(long, default_value = "")]
        sync_token: String,

        /// Render event times in this IANA zone
        #[arg(long)]
        local_time_zone: Option<String>,
    },

    CreateEvent {
        #[command(flatten)]
        credentials: CredentialArgs,

        calendar_id: String,

        #[command(flatten)]
        event: EventArgs,
    },

    /// Replace an event if it has not changed since its tag was read
    UpdateEvent {
        #[command(flatten)]
        credentials: CredentialArgs,

        calendar_id: String,

        event_id: String,

        #[arg(long)]
        concurrency_tag: String,

        #[command(flatten)]
        event: EventArgs,
    },

    DeleteEvent {
        #[command(flatten)]
        credentials: CredentialArgs,

        calendar_id: String,

        event_id: String,
    },

    /// Print the current concurrency tag of an event
    EventTag {
        #[command(flatten)]
        credentials: CredentialArgs,

        calendar_id: String,

        event_id: String,
    },
}

#[derive(Debug, Args)]
pub struct CredentialArgs {
    /// Credentials JSON file, or `-` for stdin
    #[arg(long, value_name = "FILE")]
    pub credentials: PathBuf,

    /// Write the returned (possibly refreshed) credentials back to the file
    #[arg(long)]
    pub save_credentials: bool,
}

impl CredentialArgs {
    /// Where returned credentials should be written, if anywhere.
    pub fn save_target(&self) -> Option<&Path> {
        (self.save_credentials && self.credentials.as_os_str() != STDIN)
            .then_some(self.credentials.as_path())
    }
}

#[derive(Debug, Args)]
pub struct EventArgs {
    #[arg(long)]
    pub summary: String,

    /// Start time (RFC 3339, or wall-clock with --time-zone)
    #[arg(long)]
    pub start: String,

    #[arg(long)]
    pub end: String,

    #[arg(long, default_value = "")]
    pub description: String,

    /// IANA zone for wall-clock start/end times
    #[arg(long)]
    pub time_zone: Option<String>,
}

impl EventArgs {
    pub fn to_draft(&self) -> EventDraft {
        let draft = EventDraft::new(&self.summary, &self.start, &self.end)
            .with_description(&self.description);
        match self.time_zone {
            Some(ref zone) => draft.with_time_zone(zone),
            None => draft,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Show the settings file path
    Path,

    /// Print the effective settings as TOML
    Dump,
}
