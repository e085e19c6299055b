//! Settings commands.

use std::path::Path;

use crate::config::GatewaySettings;
use crate::error::{GatewayError, GatewayResult};

/// Dump the effective settings to stdout.
pub fn dump(settings: &GatewaySettings, source: &Path) -> GatewayResult<()> {
    let toml_str = toml::to_string_pretty(settings)
        .map_err(|e| GatewayError::config(format!("failed to serialize settings: {e}")))?;
    println!("# config.toml ({})", source.display());
    println!("{toml_str}");
    Ok(())
}

/// Show the settings file path.
pub fn path(source: &Path) -> GatewayResult<()> {
    let marker = if source.exists() { "" } else { " (not present)" };
    println!("config: {}{marker}", source.display());
    Ok(())
}
