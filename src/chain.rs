//! Three-stage extraction over a single document.
//!
//! ```text
//! PDF ──▶ 1 identify ──▶ out_step_1.txt
//!     ──▶ 2 extract  (+ out_step_1 as text/plain) ──▶ out_step_2.txt
//!     ──▶ 3 classify (+ out_step_2 as text/plain) ──▶ out_step_3.txt
//! ```
//!
//! Stages run strictly in order. The first stage that fails stops the chain
//! with [`ExtractError::StageFailed`]; nothing is written for the failed
//! stage or any stage after it, and files from earlier stages stay on disk.

use crate::config::ExtractionConfig;
use crate::error::{ExtractError, StageError};
use crate::model::{records_from_value, MetricRecord};
use crate::output::{ChainOutput, StageKind};
use crate::pipeline::{input, stage, store};
use crate::service::{resolve_service, Part};
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

/// Run all three stages over `pdf`.
///
/// # Errors
/// - the document or a template cannot be read
/// - no generation service is configured
/// - a stage fails ([`ExtractError::StageFailed`])
/// - an output file cannot be written
pub async fn run_chain(
    pdf: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ChainOutput, ExtractError> {
    run_chain_from(pdf, StageKind::Identify, config).await
}

/// Run the chain starting at `first`, reading the preceding stage's output
/// from its persisted file.
///
/// Useful to re-run stage 3 after editing its instructions without paying
/// for stages 1 and 2 again.
pub async fn run_chain_from(
    pdf: impl AsRef<Path>,
    first: StageKind,
    config: &ExtractionConfig,
) -> Result<ChainOutput, ExtractError> {
    let total_start = Instant::now();
    let pdf = pdf.as_ref();
    let Some(first_index) = StageKind::CHAIN.iter().position(|s| *s == first) else {
        return Err(ExtractError::InvalidConfig(format!(
            "stage {first} is not part of the three-stage chain"
        )));
    };
    let stages: Vec<StageKind> = StageKind::CHAIN[first_index..].to_vec();
    info!("Starting chain on {} from stage {}", pdf.display(), first);

    if let Some(ref cb) = config.progress_callback {
        cb.on_document_start(0, 1, pdf);
    }

    let document = input::load_document(pdf).await?;

    // Load every template before the first call so a missing file costs nothing.
    let mut templates = Vec::with_capacity(stages.len());
    for s in &stages {
        templates.push(input::load_template(config.layout.template(*s)).await?);
    }

    let mut previous = match first.previous() {
        Some(prev) => Some(load_previous(config, prev)?),
        None => None,
    };

    let service = resolve_service(config)?;
    let mut output = ChainOutput {
        document: pdf.to_path_buf(),
        metrics: Vec::new(),
        stages: Vec::with_capacity(stages.len()),
        written: Vec::with_capacity(stages.len()),
        total_duration_ms: 0,
    };

    for (s, system_instruction) in stages.iter().copied().zip(&templates) {
        if let Some(ref cb) = config.progress_callback {
            cb.on_stage_start(s);
        }

        let mut parts = vec![Part::pdf(document.bytes.clone())];
        if let Some((ref bytes, _)) = previous {
            parts.push(Part::plain_text(bytes.clone()));
        }

        let mut result = stage::run_stage(
            service.as_ref(),
            s,
            system_instruction,
            parts,
            &config.generation,
        )
        .await;

        let accepted = result
            .output
            .take()
            .ok_or_else(|| {
                result.error.clone().unwrap_or(StageError::MalformedJson {
                    detail: "stage produced no output".into(),
                })
            })
            .and_then(|value| {
                let records = records_from_value(&value).map_err(|e| StageError::MalformedJson {
                    detail: e.to_string(),
                })?;
                if config.verify_alignment {
                    if let Some((_, ref before)) = previous {
                        stage::verify_alignment(before, &records)?;
                    }
                }
                Ok((value, records))
            });

        let (value, records) = match accepted {
            Ok(ok) => ok,
            Err(e) => {
                warn!("Chain stopped at stage {}: {}", s, e);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_stage_error(s, &e.to_string());
                }
                return Err(ExtractError::StageFailed { stage: s, source: e });
            }
        };

        let path = config.layout.stage_output(s);
        let bytes = store::save_json(&value, &path)?;
        info!("Stage {} produced {} metrics", s, records.len());
        if let Some(ref cb) = config.progress_callback {
            cb.on_stage_complete(s, records.len());
        }

        result.output = Some(value);
        output.stages.push(result);
        output.written.push(path);
        previous = Some((bytes, records));
    }

    output.metrics = previous.map(|(_, records)| records).unwrap_or_default();
    output.total_duration_ms = total_start.elapsed().as_millis() as u64;
    info!(
        "Chain complete: {} metrics, {} input / {} output tokens, {}ms",
        output.metrics.len(),
        output.total_input_tokens(),
        output.total_output_tokens(),
        output.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_document_complete(0, 1, output.metrics.len());
    }
    Ok(output)
}

/// Read a persisted stage output back as (raw bytes, records).
fn load_previous(
    config: &ExtractionConfig,
    stage: StageKind,
) -> Result<(Vec<u8>, Vec<MetricRecord>), ExtractError> {
    let path = config.layout.stage_output(stage);
    let bytes = std::fs::read(&path).map_err(|e| ExtractError::from_read(&path, e))?;
    let records = serde_json::from_slice::<serde_json::Value>(&bytes)
        .and_then(|v| records_from_value(&v))
        .map_err(|e| ExtractError::InvalidJson {
            path: path.clone(),
            detail: e.to_string(),
        })?;
    info!("Resuming from {} ({} metrics)", path.display(), records.len());
    Ok((bytes, records))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn single_shot_is_not_a_chain_stage() {
        let config = ExtractionConfig::default();
        let err = run_chain_from("x.pdf", StageKind::SingleShot, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn missing_document_fails_before_any_call() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExtractionConfig::builder()
            .data_dir(dir.path())
            .build()
            .unwrap();
        let err = run_chain(dir.path().join("absent.pdf"), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::FileNotFound { .. }));
    }
}
