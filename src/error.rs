//! Error types for the energy-extract library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`]: **Fatal** for the current operation. The document
//!   cannot be read, a template is missing, no generation service is
//!   configured, or a stage failed and the chain stopped. Returned as
//!   `Err(ExtractError)` from the top-level entry points.
//!
//! * [`StageError`]: **Non-fatal** record of why one model call produced no
//!   usable output. Stored inside [`crate::output::StageResult`] so callers
//!   can inspect the finish reason, token usage and the failure together.
//!   The chain turns it into [`ExtractError::StageFailed`] and stops; the
//!   batch runner logs it and moves on to the next PDF.

use crate::output::StageKind;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the energy-extract library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file or directory was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// A system-instruction template is missing.
    #[error("Instruction template not found: '{path}'")]
    TemplateNotFound { path: PathBuf },

    /// A persisted JSON document could not be parsed into the expected shape.
    #[error("Invalid JSON in '{path}': {detail}")]
    InvalidJson { path: PathBuf, detail: String },

    // ── Generation errors ─────────────────────────────────────────────────
    /// No generation service could be built (missing API key etc.).
    #[error("Generation service '{service}' is not configured.\n{hint}")]
    ServiceNotConfigured { service: String, hint: String },

    /// A pipeline stage produced no usable output; later stages were skipped.
    #[error("Stage {stage} failed: {source}")]
    StageFailed {
        stage: StageKind,
        #[source]
        source: StageError,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other I/O failure while reading inputs.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// Map an `std::io::Error` raised while reading `path` to the closest variant.
    pub fn from_read(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            std::io::ErrorKind::NotFound => ExtractError::FileNotFound { path },
            std::io::ErrorKind::PermissionDenied => ExtractError::PermissionDenied { path },
            _ => ExtractError::Io { path, source: err },
        }
    }
}

/// Failure reported by a [`crate::service::GenerationService`].
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ServiceError {
    /// Connection, TLS or timeout failure before a response arrived.
    #[error("transport error: {0}")]
    Transport(String),

    /// The API answered 401/403.
    #[error("authentication rejected by '{service}': {detail}")]
    Auth { service: String, detail: String },

    /// The API answered 429.
    #[error("rate limit exceeded for '{service}'")]
    RateLimited { service: String },

    /// Any other non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// The prompt was blocked before generation.
    #[error("request blocked: {reason}")]
    Blocked { reason: String },

    /// The response carried no candidate text.
    #[error("response contained no candidates")]
    EmptyResponse,
}

/// A non-fatal error for a single stage.
///
/// Stored alongside [`crate::output::StageResult`] when a stage fails.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum StageError {
    /// The generation service call failed.
    #[error("generation failed: {0}")]
    Service(#[from] ServiceError),

    /// The response text was not valid JSON.
    #[error("response is not valid JSON: {detail}")]
    MalformedJson { detail: String },

    /// The response JSON violated the stage schema.
    #[error("response violates schema ({} violation(s)): {}", .violations.len(), .violations.join("; "))]
    SchemaViolation { violations: Vec<String> },

    /// The returned list does not line up with the stage input list.
    #[error("expected {expected} metrics in input order, got {actual}{}",
        .divergence.as_ref().map(|d| format!(" (first divergence: {d})")).unwrap_or_default())]
    Misaligned {
        expected: usize,
        actual: usize,
        divergence: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_failed_display_names_stage() {
        let e = ExtractError::StageFailed {
            stage: StageKind::Extract,
            source: StageError::MalformedJson {
                detail: "EOF while parsing".into(),
            },
        };
        let msg = e.to_string();
        assert!(msg.contains("2 (extract)"), "got: {msg}");
        assert!(msg.contains("EOF while parsing"), "got: {msg}");
    }

    #[test]
    fn misaligned_display_with_divergence() {
        let e = StageError::Misaligned {
            expected: 3,
            actual: 3,
            divergence: Some("index 1: expected 'E2', got 'E9'".into()),
        };
        let msg = e.to_string();
        assert!(msg.contains("expected 3"));
        assert!(msg.contains("index 1"));
    }

    #[test]
    fn misaligned_display_without_divergence() {
        let e = StageError::Misaligned {
            expected: 4,
            actual: 2,
            divergence: None,
        };
        assert_eq!(e.to_string(), "expected 4 metrics in input order, got 2");
    }

    #[test]
    fn schema_violation_counts() {
        let e = StageError::SchemaViolation {
            violations: vec!["$[0].code: missing".into(), "$[1].year: 1800 < 1900".into()],
        };
        assert!(e.to_string().contains("2 violation(s)"));
    }

    #[test]
    fn from_read_maps_not_found() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(
            ExtractError::from_read("x.pdf", err),
            ExtractError::FileNotFound { .. }
        ));
    }

    #[test]
    fn rate_limit_display() {
        let e = ServiceError::RateLimited {
            service: "gemini".into(),
        };
        assert!(e.to_string().contains("gemini"));
    }
}
