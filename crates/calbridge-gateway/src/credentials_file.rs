//! Reading and writing caller-held credential records for the CLI.
//!
//! The library never stores credentials; the CLI keeps them in a JSON file
//! with the same camelCase shape the envelope uses.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use calbridge_core::Credentials;
use tracing::debug;

use crate::error::{GatewayError, GatewayResult};

/// Path that means "read from stdin".
pub const STDIN: &str = "-";

pub fn read(source: &Path) -> GatewayResult<Credentials> {
    let content = if source.as_os_str() == STDIN {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(source).map_err(|e| {
            GatewayError::config(format!(
                "failed to read credentials {}: {e}",
                source.display()
            ))
        })?
    };
    Ok(serde_json::from_str(&content)?)
}

/// Writes credentials through a temp file and restricts permissions on Unix.
pub fn write(path: &Path, credentials: &Credentials) -> GatewayResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("json.tmp");
    let content = serde_json::to_string_pretty(credentials)?;
    let mut file = open_private(&temp_path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    drop(file);
    fs::rename(&temp_path, path)?;

    debug!("saved credentials to {:?}", path);
    Ok(())
}

/// Opens `path` for writing, readable by the owner only.
fn open_private(path: &Path) -> GatewayResult<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let file = options.open(path)?;

    // `mode` only applies when the file is created; a leftover temp file
    // keeps its old bits.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    Ok(file)
}
