//! The credentials file kept between invocations.

use std::{
    fs::File,
    io::{ErrorKind, Write},
    path::Path,
};

use anyhow::{Context, Result};
use stsfs_broker::CredentialRecord;
use tempfile::NamedTempFile;
use tracing::warn;

/// Read the record at `path`.
///
/// A missing file means no credentials are held. So does an unreadable
/// record: the broker then issues a new one and it is written back.
pub fn load(path: &Path) -> Result<Option<CredentialRecord>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(error) => {
            return Err(error).with_context(|| format!("reading {}", path.display()));
        }
    };

    match serde_json::from_str(&text) {
        Ok(record) => Ok(Some(record)),
        Err(error) => {
            warn!(path = %path.display(), %error, "ignoring unreadable credentials");
            Ok(None)
        }
    }
}

/// Write `record` to `path`, replacing what was there.
///
/// The record is written to a file only its owner can read, next to
/// `path`, and then renamed over it.
pub fn save(path: &Path, record: &CredentialRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record)?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(directory)
        .with_context(|| format!("creating a file in {}", directory.display()))?;
    owner_only(file.as_file())?;
    file.write_all(json.as_bytes())?;
    file.as_file().sync_all()?;
    file.persist(path)
        .with_context(|| format!("writing {}", path.display()))?;

    Ok(())
}

#[cfg(unix)]
fn owner_only(file: &File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn owner_only(_file: &File) -> std::io::Result<()> {
    Ok(())
}
