//! Secret reference resolver.
//!
//! Client configs hold OAuth client secrets, so the CLI accepts them from
//! outside the command line:
//!
//! - `pass::path/in/store`: runs `pass show path/in/store`, returns its output
//! - `env::VAR_NAME`: reads `$VAR_NAME` from the environment
//! - an inline JSON object
//! - anything else: a path to a JSON file

use std::path::Path;

use crate::error::{GatewayError, GatewayResult};

/// Resolves a value that may contain a secret reference prefix.
///
/// Returns `Ok(None)` for plain values.
pub fn resolve(value: &str) -> GatewayResult<Option<String>> {
    if let Some(path) = value.strip_prefix("pass::") {
        resolve_pass(path).map(Some)
    } else if let Some(var) = value.strip_prefix("env::") {
        resolve_env(var).map(Some)
    } else {
        Ok(None)
    }
}

/// Returns the client config JSON named by a CLI argument.
pub fn read_client_config(value: &str) -> GatewayResult<String> {
    if let Some(resolved) = resolve(value)? {
        return Ok(resolved);
    }
    if value.trim_start().starts_with('{') {
        return Ok(value.to_string());
    }
    let path = Path::new(value);
    std::fs::read_to_string(path).map_err(|e| {
        GatewayError::config(format!(
            "failed to read client config {}: {e}",
            path.display()
        ))
    })
}

/// Runs `pass show <path>` and returns its stdout.
///
/// Unlike a password entry, a client config spans several lines, so the
/// whole output is kept.
fn resolve_pass(path: &str) -> GatewayResult<String> {
    let output = std::process::Command::new("pass")
        .arg("show")
        .arg(path)
        .output()
        .map_err(|e| GatewayError::config(format!("failed to run `pass show {path}`: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GatewayError::config(format!(
            "`pass show {path}` failed (exit {}): {}",
            output.status,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() {
        return Err(GatewayError::config(format!(
            "`pass show {path}` produced no output"
        )));
    }
    Ok(stdout)
}

fn resolve_env(var: &str) -> GatewayResult<String> {
    std::env::var(var)
        .map_err(|_| GatewayError::config(format!("environment variable `{var}` is not set")))
}
