//! Gateway settings.
//!
//! Settings live in `~/.config/calbridge/config.toml` by default. Every
//! section is optional; a missing file means defaults everywhere. Provider
//! client configs (OAuth client ids, CalDAV usernames) are not stored here,
//! they are passed per invocation.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use calbridge_core::{LogFormat, TracingConfig};
use calbridge_providers::{DEFAULT_SKEW_SECS, HttpSettings};
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::error::{GatewayError, GatewayResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub http: HttpSection,
    pub credentials: CredentialSection,
    pub google: ApiSection,
    pub graph: ApiSection,
    pub caldav: CalDavSection,
    pub logging: LoggingSection,
}

/// Transport settings shared by all providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    pub user_agent: Option<String>,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialSection {
    /// Refresh access tokens this many seconds before they expire.
    pub refresh_skew_secs: i64,
}

impl Default for CredentialSection {
    fn default() -> Self {
        Self {
            refresh_skew_secs: DEFAULT_SKEW_SECS,
        }
    }
}

/// Override for a REST provider's API root (mock servers, sovereign clouds).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalDavSection {
    /// Server used when the client config does not name one.
    pub server_url: Option<String>,
    /// Turn off to accept self-signed certificates.
    pub verify_tls: bool,
}

impl Default for CalDavSection {
    fn default() -> Self {
        Self {
            server_url: None,
            verify_tls: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `error`, `warn`, `info`, `debug` or `trace`.
    pub level: Option<String>,
    pub format: LogFormat,
}

impl GatewaySettings {
    /// Loads settings from the default path, or defaults when it is absent.
    pub fn load() -> GatewayResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads settings from a specific path.
    pub fn load_from(path: &Path) -> GatewayResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&content).map_err(|e| {
            GatewayError::config(format!("failed to parse {}: {e}", path.display()))
        })
    }

    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calbridge")
    }

    pub fn http_settings(&self) -> HttpSettings {
        let mut http =
            HttpSettings::default().with_timeout(Duration::from_secs(self.http.timeout_secs));
        if let Some(ref agent) = self.http.user_agent {
            http = http.with_user_agent(agent);
        }
        http
    }

    /// Tracing setup for the CLI; `--debug` overrides the configured level.
    pub fn tracing_config(&self, debug: bool) -> GatewayResult<TracingConfig> {
        if debug {
            return Ok(TracingConfig::cli_debug());
        }
        let mut config = TracingConfig::default().with_format(self.logging.format);
        if let Some(ref level) = self.logging.level {
            let level = Level::from_str(level)
                .map_err(|_| GatewayError::config(format!("invalid log level '{level}'")))?;
            config = config.with_level(level);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let settings: GatewaySettings = toml::from_str("").unwrap();
        assert_eq!(settings.http.timeout_secs, 30);
        assert_eq!(settings.credentials.refresh_skew_secs, 300);
        assert!(settings.caldav.verify_tls);
        assert!(settings.google.api_base.is_none());
        assert_eq!(settings.logging.format, LogFormat::Compact);
    }

    #[test]
    fn partial_sections() {
        let settings: GatewaySettings = toml::from_str(
            r#"
            [credentials]
            refresh_skew_secs = 60

            [graph]
            api_base = "http://127.0.0.1:8080/v1.0"

            [caldav]
            server_url = "https://dav.example.com"
            verify_tls = false

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(settings.credentials.refresh_skew_secs, 60);
        assert_eq!(
            settings.graph.api_base.as_deref(),
            Some("http://127.0.0.1:8080/v1.0")
        );
        assert!(!settings.caldav.verify_tls);
        assert_eq!(settings.http.timeout_secs, 30);

        let tracing = settings.tracing_config(false).unwrap();
        assert_eq!(tracing.default_level, Level::DEBUG);
        assert_eq!(tracing.format, LogFormat::Json);
    }

    #[test]
    fn http_settings_from_section() {
        let mut settings = GatewaySettings::default();
        settings.http.timeout_secs = 5;
        settings.http.user_agent = Some("sync-bot/2".into());

        let http = settings.http_settings();
        assert_eq!(http.timeout, Duration::from_secs(5));
        assert_eq!(http.user_agent, "sync-bot/2");
        assert!(http.verify_tls);
    }

    #[test]
    fn invalid_level_is_config_error() {
        let mut settings = GatewaySettings::default();
        settings.logging.level = Some("loud".into());
        assert!(matches!(
            settings.tracing_config(false),
            Err(GatewayError::Config(_))
        ));
        assert!(settings.tracing_config(true).is_ok());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[http]\ntimeout_secs = 12").unwrap();

        let settings = GatewaySettings::load_from(file.path()).unwrap();
        assert_eq!(settings.http.timeout_secs, 12);
    }

    #[test]
    fn malformed_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[http\ntimeout_secs = ").unwrap();

        let err = GatewaySettings::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn settings_dump_round_trips() {
        let dumped = toml::to_string_pretty(&GatewaySettings::default()).unwrap();
        let parsed: GatewaySettings = toml::from_str(&dumped).unwrap();
        assert_eq!(parsed.http.timeout_secs, 30);
        assert_eq!(parsed.logging.format, LogFormat::Compact);
    }

    #[test]
    fn default_path_ends_with_calbridge() {
        assert!(GatewaySettings::default_path().ends_with("calbridge/config.toml"));
    }
}
