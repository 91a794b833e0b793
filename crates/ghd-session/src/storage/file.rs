//! JSON persistence for session records.

use std::{fs, io, path::Path};

use ghd_core::{StoreError, fs::write_atomic};

use crate::{RegistryError, Session};

/// Read a session record, or `None` if it does not exist.
///
/// # Errors
/// Returns error if the file exists but cannot be read or parsed.
pub fn load(path: &Path) -> Result<Option<Session>, RegistryError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(StoreError::io("reading session", path, source).into()),
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| RegistryError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

/// Write a session record atomically.
///
/// # Errors
/// Returns error if the record cannot be serialized or written.
pub fn save(path: &Path, session: &Session) -> Result<(), RegistryError> {
    let mut json = serde_json::to_string_pretty(session).map_err(|source| {
        RegistryError::Corrupt {
            path: path.to_path_buf(),
            source,
        }
    })?;
    json.push('\n');
    write_atomic(path, json.as_bytes())
        .map_err(|source| StoreError::io("writing session", path, source).into())
}
