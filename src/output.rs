//! Result types produced by the extraction entry points.
//!
//! [`StageResult`] is the per-call record (the extraction analogue of a
//! per-page result): it always comes back, successful or not, so the caller
//! sees token usage and the finish reason even for a stage that failed.

use crate::error::{ExtractError, StageError};
use crate::model::{ExtractionResult, MetricRecord};
use crate::service::SafetyRating;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One of the model calls the pipelines are built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Stage 1: enumerate `{code, item}` for every energy metric.
    Identify,
    /// Stage 2: fill value, unit, page number and snippet.
    Extract,
    /// Stage 3: assign year, scope, flag and consumption type.
    Classify,
    /// All-in-one call producing `{year, metrics, metadata}`.
    SingleShot,
}

impl StageKind {
    /// The three chained stages, in execution order.
    pub const CHAIN: [StageKind; 3] = [StageKind::Identify, StageKind::Extract, StageKind::Classify];

    /// Stage number as used in template and output file names.
    pub fn number(self) -> Option<u8> {
        match self {
            StageKind::Identify => Some(1),
            StageKind::Extract => Some(2),
            StageKind::Classify => Some(3),
            StageKind::SingleShot => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StageKind::Identify => "identify",
            StageKind::Extract => "extract",
            StageKind::Classify => "classify",
            StageKind::SingleShot => "single-shot",
        }
    }

    /// File name of the system-instruction template under `templates/`.
    pub fn template_file(self) -> String {
        match self.number() {
            Some(n) => format!("system_instructions_step_{n}.txt"),
            None => "system_instructions.txt".to_string(),
        }
    }

    /// File name of the persisted stage output.
    pub fn output_file(self) -> String {
        match self.number() {
            Some(n) => format!("out_step_{n}.txt"),
            None => "out_step.txt".to_string(),
        }
    }

    /// The stage preceding this one in the chain, if any.
    pub fn previous(self) -> Option<StageKind> {
        match self {
            StageKind::Extract => Some(StageKind::Identify),
            StageKind::Classify => Some(StageKind::Extract),
            _ => None,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.number() {
            Some(n) => write!(f, "{} ({})", n, self.name()),
            None => f.write_str(self.name()),
        }
    }
}

impl std::str::FromStr for StageKind {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "identify" => Ok(StageKind::Identify),
            "2" | "extract" => Ok(StageKind::Extract),
            "3" | "classify" => Ok(StageKind::Classify),
            "all" | "single" | "single-shot" | "all-in-one" => Ok(StageKind::SingleShot),
            other => Err(ExtractError::InvalidConfig(format!(
                "unknown stage '{other}' (expected 1, 2, 3 or single-shot)"
            ))),
        }
    }
}

/// Outcome of one model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: StageKind,
    /// Parsed, schema-valid response. `None` when `error` is set.
    pub output: Option<serde_json::Value>,
    pub finish_reason: Option<String>,
    pub safety_ratings: Vec<SafetyRating>,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub duration_ms: u64,
    pub error: Option<StageError>,
}

impl StageResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.output.is_some()
    }

    /// Turn the record into the explicit success/failure the callers branch on.
    pub fn into_output(self) -> Result<serde_json::Value, StageError> {
        match (self.error, self.output) {
            (Some(e), _) => Err(e),
            (None, Some(v)) => Ok(v),
            (None, None) => Err(StageError::MalformedJson {
                detail: "stage produced no output".into(),
            }),
        }
    }
}

/// Result of a three-stage chain run over one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainOutput {
    pub document: PathBuf,
    /// Final (stage 3) records.
    pub metrics: Vec<MetricRecord>,
    /// One entry per executed stage, in order.
    pub stages: Vec<StageResult>,
    /// Where each stage output was persisted, in order.
    pub written: Vec<PathBuf>,
    pub total_duration_ms: u64,
}

impl ChainOutput {
    pub fn total_input_tokens(&self) -> u64 {
        self.stages.iter().map(|s| s.input_tokens as u64).sum()
    }

    pub fn total_output_tokens(&self) -> u64 {
        self.stages.iter().map(|s| s.output_tokens as u64).sum()
    }
}

/// Per-PDF outcome of a single-shot batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentOutcome {
    pub document: PathBuf,
    pub result: Option<ExtractionResult>,
    /// Line-delimited output written for this document.
    pub jsonl_path: Option<PathBuf>,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub duration_ms: u64,
    /// Rendered error when the document failed.
    pub error: Option<String>,
}

/// Aggregate statistics for a batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_documents: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_metrics: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
}

/// Everything a batch run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutput {
    pub documents: Vec<DocumentOutcome>,
    pub stats: BatchStats,
}
