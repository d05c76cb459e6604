//! # energy-extract
//!
//! Extract energy-consumption metrics from PDF sustainability reports with a
//! hosted generative model, then score the results against expected data.
//!
//! The PDF goes to the model as-is (an inline `application/pdf` part); every
//! call forces JSON output against a stage schema, and every response is
//! re-validated locally before it is accepted.
//!
//! ## Pipelines
//!
//! ```text
//! Three-stage chain (one document)          Single-shot batch (a directory)
//!
//! PDF ─▶ 1 identify  {code, item}           PDF ─▶ {year, metrics, metadata}
//!     ─▶ 2 extract   + value/unit/page/…          │
//!     ─▶ 3 classify  + year/scope/flag/…          ├─▶ out_step.txt
//!          │                                      └─▶ <stem>.jsonl
//!          └─▶ out_step_{1,2,3}.txt
//!
//! generated/*.jsonl + expected/*.jsonl ─▶ compare ─▶ matches.jsonl, accuracy.txt
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use energy_extract::{run_chain, ExtractionConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key read from GEMINI_API_KEY / GOOGLE_API_KEY
//!     let config = ExtractionConfig::builder().data_dir("./data").build()?;
//!     let output = run_chain(config.layout.test_document(), &config).await?;
//!     for m in &output.metrics {
//!         println!("{} {}: {:?} {:?}", m.code, m.item, m.value, m.unit);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `energy-extract` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod chain;
pub mod compare;
pub mod config;
pub mod error;
pub mod ingredients;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod schema;
pub mod service;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{extract_document, run_batch, run_batch_dir};
pub use chain::{run_chain, run_chain_from};
pub use compare::{compare_directories, CompareOptions, ComparisonReport, MatchStrategy};
pub use config::{DataLayout, ExtractionConfig, ExtractionConfigBuilder, GenerationSettings};
pub use error::{ExtractError, ServiceError, StageError};
pub use ingredients::{load_ingredients, EnergyCategory, EnergyData, EnergyItem};
pub use model::{DocumentMetadata, ExtractionResult, MetricRecord};
pub use output::{BatchOutput, BatchStats, ChainOutput, DocumentOutcome, StageKind, StageResult};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use service::{GeminiClient, GenerationService, ScriptedReply, ScriptedService};
