//! Persistence of stage outputs.
//!
//! Every write goes to a temporary file in the destination directory and is
//! then renamed over the target, so a reader never observes a half-written
//! file. Concurrent writers are not coordinated: the last rename wins.

use crate::error::ExtractError;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Atomically replace `path` with `bytes`, creating parent directories.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ExtractError> {
    let fail = |source: std::io::Error| ExtractError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(fail)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(fail)?;
    tmp.write_all(bytes).map_err(fail)?;
    tmp.flush().map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;
    Ok(())
}

/// Serialise `value` as pretty JSON and persist it.
///
/// Returns the bytes written so the next stage can reuse them without
/// reading the file back.
pub fn save_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<Vec<u8>, ExtractError> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| ExtractError::Internal(format!("JSON serialisation: {e}")))?;
    write_atomic(path, &bytes)?;
    info!("Saved {} bytes to {}", bytes.len(), path.display());
    Ok(bytes)
}

/// Read and parse a persisted JSON file.
pub fn load_json(path: &Path) -> Result<serde_json::Value, ExtractError> {
    let text = std::fs::read_to_string(path).map_err(|e| ExtractError::from_read(path, e))?;
    serde_json::from_str(&text).map_err(|e| ExtractError::InvalidJson {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}
