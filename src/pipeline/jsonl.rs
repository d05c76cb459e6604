//! JSON Lines flattening of extraction results.
//!
//! One compact JSON object per line, `\n`-terminated, in the order of the
//! source `metrics` array.

use crate::error::ExtractError;
use crate::pipeline::store;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Render records as JSON Lines.
pub fn to_jsonl<T: Serialize>(records: &[T]) -> Result<String, ExtractError> {
    let mut out = String::new();
    for record in records {
        let line = serde_json::to_string(record)
            .map_err(|e| ExtractError::Internal(format!("JSON serialisation: {e}")))?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

/// Write records to `path`, one per line, replacing any previous file.
pub fn write_jsonl<T: Serialize>(records: &[T], path: &Path) -> Result<(), ExtractError> {
    let text = to_jsonl(records)?;
    store::write_atomic(path, text.as_bytes())?;
    info!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

/// Flatten the `metrics` array of a persisted extraction result into JSONL.
///
/// Records are copied verbatim, so fields this crate does not model survive
/// the conversion. Returns the number of lines written.
pub fn convert_json_to_jsonl(input_file: &Path, output_file: &Path) -> Result<usize, ExtractError> {
    let data = store::load_json(input_file)?;
    let metrics = data
        .get("metrics")
        .and_then(|m| m.as_array())
        .ok_or_else(|| ExtractError::InvalidJson {
            path: input_file.to_path_buf(),
            detail: "missing 'metrics' array".into(),
        })?;
    write_jsonl(metrics, output_file)?;
    Ok(metrics.len())
}

/// Parse a JSONL file, skipping blank lines.
///
/// The first malformed line fails the whole file; the error names the
/// 1-based line number.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, ExtractError> {
    let text = std::fs::read_to_string(path).map_err(|e| ExtractError::from_read(path, e))?;
    parse_jsonl(&text).map_err(|(line, e)| ExtractError::InvalidJson {
        path: path.to_path_buf(),
        detail: format!("line {line}: {e}"),
    })
}

fn parse_jsonl<T: DeserializeOwned>(text: &str) -> Result<Vec<T>, (usize, serde_json::Error)> {
    text.lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| serde_json::from_str(l).map_err(|e| (i + 1, e)))
        .collect()
}
