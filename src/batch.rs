//! Single-shot extraction: one call per document, over a whole directory.
//!
//! Each PDF produces `{year, metrics, metadata}` in one request. The result
//! is persisted to `output_all_in_one/out_step.txt` (overwritten per
//! document) and flattened to `generated_all_in_one/<stem>.jsonl`.
//!
//! A failing document is logged and recorded in its [`DocumentOutcome`];
//! the batch carries on with the next file. Only problems that would fail
//! every document (missing directory, missing template, no service) abort
//! the run.

use crate::config::ExtractionConfig;
use crate::error::{ExtractError, StageError};
use crate::model::ExtractionResult;
use crate::output::{BatchOutput, BatchStats, DocumentOutcome, StageKind, StageResult};
use crate::pipeline::{input, jsonl, stage, store};
use crate::service::{resolve_service, GenerationService, Part};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

/// Extract one document with the single-shot schema.
///
/// Persists the result to `output_all_in_one/out_step.txt`.
pub async fn extract_document(
    pdf: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, ExtractError> {
    let document = input::load_document(pdf.as_ref()).await?;
    let template = input::load_template(config.layout.template(StageKind::SingleShot)).await?;
    let service = resolve_service(config)?;

    let (_, result) = single_shot(service.as_ref(), &template, &document.bytes, config).await;
    let result = result.map_err(|source| ExtractError::StageFailed {
        stage: StageKind::SingleShot,
        source,
    })?;
    store::save_json(&result, &config.layout.stage_output(StageKind::SingleShot))?;
    Ok(result)
}

/// Extract every PDF under the configured `pdfs/` directory.
pub async fn run_batch(config: &ExtractionConfig) -> Result<BatchOutput, ExtractError> {
    run_batch_dir(config.layout.pdf_dir(), config).await
}

/// Extract every PDF in `dir`, in file-name order.
pub async fn run_batch_dir(
    dir: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<BatchOutput, ExtractError> {
    let total_start = Instant::now();
    let pdfs = input::list_pdfs(dir.as_ref()).await?;
    let template = input::load_template(config.layout.template(StageKind::SingleShot)).await?;
    let service = resolve_service(config)?;
    let total = pdfs.len();
    info!("Batch: {} PDFs in {}", total, dir.as_ref().display());
    for (first, later) in shared_outputs(&pdfs, config) {
        warn!(
            "{} and {} both write {}; the later one overwrites it",
            first.display(),
            later.display(),
            config.layout.generated_jsonl(later).display()
        );
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let mut documents = Vec::with_capacity(total);
    for (index, pdf) in pdfs.into_iter().enumerate() {
        if let Some(ref cb) = config.progress_callback {
            cb.on_document_start(index, total, &pdf);
        }

        let outcome = process_document(service.as_ref(), &template, pdf, config).await;

        if let Some(ref cb) = config.progress_callback {
            match (&outcome.error, &outcome.result) {
                (None, Some(r)) => cb.on_document_complete(index, total, r.metrics.len()),
                (Some(e), _) => cb.on_document_error(index, total, e),
                (None, None) => {}
            }
        }
        documents.push(outcome);
    }

    let succeeded = documents.iter().filter(|d| d.error.is_none()).count();
    let stats = BatchStats {
        total_documents: total,
        succeeded,
        failed: total - succeeded,
        total_metrics: documents
            .iter()
            .filter_map(|d| d.result.as_ref())
            .map(|r| r.metrics.len())
            .sum(),
        total_input_tokens: documents.iter().map(|d| d.input_tokens as u64).sum(),
        total_output_tokens: documents.iter().map(|d| d.output_tokens as u64).sum(),
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Batch complete: {}/{} documents, {} metrics, {}ms",
        stats.succeeded, stats.total_documents, stats.total_metrics, stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, succeeded);
    }

    Ok(BatchOutput { documents, stats })
}

/// Pairs of PDFs (earlier, later) that map to the same JSONL file.
fn shared_outputs<'a>(pdfs: &'a [PathBuf], config: &ExtractionConfig) -> Vec<(&'a Path, &'a Path)> {
    let mut seen: HashMap<PathBuf, &Path> = HashMap::new();
    let mut clashes = Vec::new();
    for pdf in pdfs {
        let target = config.layout.generated_jsonl(pdf);
        match seen.get(&target) {
            Some(first) => clashes.push((*first, pdf.as_path())),
            None => {
                seen.insert(target, pdf.as_path());
            }
        }
    }
    clashes
}

/// Load, extract, persist and flatten one PDF. Never fails: errors are
/// recorded in the outcome.
async fn process_document(
    service: &dyn GenerationService,
    template: &str,
    pdf: PathBuf,
    config: &ExtractionConfig,
) -> DocumentOutcome {
    let start = Instant::now();
    info!("Processing {}", pdf.display());

    let mut outcome = DocumentOutcome {
        document: pdf.clone(),
        result: None,
        jsonl_path: None,
        input_tokens: 0,
        output_tokens: 0,
        duration_ms: 0,
        error: None,
    };

    let document = match input::load_document(&pdf).await {
        Ok(d) => d,
        Err(e) => {
            error!("Skipping {}: {}", pdf.display(), e);
            outcome.error = Some(e.to_string());
            outcome.duration_ms = start.elapsed().as_millis() as u64;
            return outcome;
        }
    };

    let (stage_result, result) = single_shot(service, template, &document.bytes, config).await;
    outcome.input_tokens = stage_result.input_tokens;
    outcome.output_tokens = stage_result.output_tokens;

    let finished = match result {
        Ok(result) => persist(&result, &pdf, config).map(|path| (result, path)),
        Err(source) => Err(ExtractError::StageFailed {
            stage: StageKind::SingleShot,
            source,
        }),
    };

    match finished {
        Ok((result, path)) => {
            info!(
                "{}: {} metrics → {}",
                pdf.display(),
                result.metrics.len(),
                path.display()
            );
            outcome.result = Some(result);
            outcome.jsonl_path = Some(path);
        }
        Err(e) => {
            error!("{}: {}", pdf.display(), e);
            outcome.error = Some(e.to_string());
        }
    }
    outcome.duration_ms = start.elapsed().as_millis() as u64;
    outcome
}

/// Write `out_step.txt`, then flatten it into the document's JSONL file.
fn persist(
    result: &ExtractionResult,
    pdf: &Path,
    config: &ExtractionConfig,
) -> Result<PathBuf, ExtractError> {
    let out_step = config.layout.stage_output(StageKind::SingleShot);
    store::save_json(result, &out_step)?;
    let jsonl_path = config.layout.generated_jsonl(pdf);
    jsonl::convert_json_to_jsonl(&out_step, &jsonl_path)?;
    Ok(jsonl_path)
}

async fn single_shot(
    service: &dyn GenerationService,
    template: &str,
    pdf_bytes: &[u8],
    config: &ExtractionConfig,
) -> (StageResult, Result<ExtractionResult, StageError>) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_start(StageKind::SingleShot);
    }

    let mut stage_result = stage::run_stage(
        service,
        StageKind::SingleShot,
        template,
        vec![Part::pdf(pdf_bytes.to_vec())],
        &config.generation,
    )
    .await;

    let parsed = match (stage_result.error.clone(), stage_result.output.take()) {
        (Some(e), _) => Err(e),
        (None, None) => Err(StageError::MalformedJson {
            detail: "stage produced no output".into(),
        }),
        (None, Some(value)) => {
            let parsed = serde_json::from_value::<ExtractionResult>(value.clone()).map_err(|e| {
                StageError::MalformedJson {
                    detail: e.to_string(),
                }
            });
            stage_result.output = Some(value);
            parsed
        }
    };

    if let Some(ref cb) = config.progress_callback {
        match &parsed {
            Ok(r) => cb.on_stage_complete(StageKind::SingleShot, r.metrics.len()),
            Err(e) => cb.on_stage_error(StageKind::SingleShot, &e.to_string()),
        }
    }
    (stage_result, parsed)
}
