//! Integration tests for the chain and batch pipelines.
//!
//! Every test runs against a [`ScriptedService`] in a temporary data
//! directory; nothing touches the network.

use energy_extract::pipeline::jsonl::read_jsonl;
use energy_extract::{
    extract_document, run_batch, run_chain, run_chain_from, ExtractError, ExtractionConfig,
    ExtractionProgressCallback, GenerationService, MetricRecord, ScriptedReply, ScriptedService,
    ServiceError, StageError, StageKind,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

const FAKE_PDF: &[u8] = b"%PDF-1.7\n% fake report body\n%%EOF\n";

/// Lay out templates and a test document under `root`.
fn seed_data_dir(root: &Path) {
    let templates = root.join("templates");
    std::fs::create_dir_all(&templates).unwrap();
    for stage in StageKind::CHAIN.into_iter().chain([StageKind::SingleShot]) {
        std::fs::write(
            templates.join(stage.template_file()),
            format!("instructions for {}", stage.name()),
        )
        .unwrap();
    }
    std::fs::write(root.join("test_doc.pdf"), FAKE_PDF).unwrap();
}

fn config_with(root: &Path, service: Arc<ScriptedService>) -> ExtractionConfig {
    ExtractionConfig::builder()
        .data_dir(root)
        .service(service as Arc<dyn GenerationService>)
        .build()
        .unwrap()
}

fn identified() -> Value {
    json!([
        {"code": "E1", "item": "Grid electricity"},
        {"code": "E2", "item": "Natural gas"}
    ])
}

fn extracted() -> Value {
    json!([
        {"code": "E1", "item": "Grid electricity", "value": 1520.5, "unit": "MWh",
         "page_number": 12, "snippet": "Grid electricity use totalled 1,520.5 MWh"},
        {"code": "E2", "item": "Natural gas", "value": null, "unit": null,
         "page_number": null, "snippet": null}
    ])
}

fn classified(year: i64) -> Value {
    json!([
        {"code": "E1", "item": "Grid electricity", "value": 1520.5, "unit": "MWh",
         "page_number": 12, "snippet": "Grid electricity use totalled 1,520.5 MWh",
         "year": year, "scope": "Global", "flag": "Full",
         "flag_reasoning": "Covers all sites for the full year",
         "consumption_type": "Operational Consumption"},
        {"code": "E2", "item": "Natural gas", "value": null, "unit": null,
         "page_number": null, "snippet": null,
         "year": year, "scope": "Global", "flag": "Partial",
         "flag_reasoning": "No figure reported",
         "consumption_type": "Operational Consumption"}
    ])
}

fn single_shot(org: &str) -> Value {
    json!({
        "year": 2023,
        "metrics": [
            {"code": "772", "item": "Solar", "scope": "Country Specific", "flag": "Full",
             "value": 12.0, "unit": "GWh", "page_number": 4,
             "snippet": "Solar generation reached 12 GWh",
             "relevant_information": "Own rooftop installations",
             "flag_reasoning": "All plants covered",
             "consumption_type": "Operational Consumption"},
            {"code": "785", "item": "Diesel", "scope": "Global", "flag": "Partial",
             "value": 40, "unit": "kL", "page_number": 7,
             "snippet": "Fleet diesel consumption of 40 kL",
             "flag_reasoning": "Excludes leased vehicles",
             "consumption_type": "Supply Chain Consumption"}
        ],
        "metadata": {
            "data_sources": "Annual report 2023",
            "data_collector": "Sustainability office",
            "fiscal_year_end": "12/31/2023",
            "geographical_scope": "Global",
            "country": "France",
            "organization_name": org
        }
    })
}

fn codes(records: &[MetricRecord]) -> Vec<&str> {
    records.iter().map(|r| r.code.as_str()).collect()
}

// ── Three-stage chain ────────────────────────────────────────────────────────

#[tokio::test]
async fn chain_runs_three_stages_and_preserves_order() {
    let dir = tempfile::tempdir().unwrap();
    seed_data_dir(dir.path());
    let svc = Arc::new(ScriptedService::with_json(vec![
        identified(),
        extracted(),
        classified(2023),
    ]));
    let config = config_with(dir.path(), svc.clone());

    let output = run_chain(config.layout.test_document(), &config).await.unwrap();

    assert_eq!(codes(&output.metrics), vec!["E1", "E2"]);
    assert_eq!(output.metrics[0].year, Some(2023));
    assert_eq!(output.metrics[1].value, None);
    assert_eq!(output.stages.len(), 3);
    assert!(output.stages.iter().all(|s| s.is_success()));
    assert_eq!(output.total_input_tokens(), 300);

    for stage in StageKind::CHAIN {
        assert!(config.layout.stage_output(stage).is_file(), "{stage} not persisted");
    }
    assert_eq!(output.written.len(), 3);
}

#[tokio::test]
async fn each_stage_receives_the_previous_output_as_text_part() {
    let dir = tempfile::tempdir().unwrap();
    seed_data_dir(dir.path());
    let svc = Arc::new(ScriptedService::with_json(vec![
        identified(),
        extracted(),
        classified(2023),
    ]));
    let config = config_with(dir.path(), svc.clone());
    run_chain(config.layout.test_document(), &config).await.unwrap();

    let requests = svc.requests();
    assert_eq!(requests.len(), 3);

    assert_eq!(requests[0].inline_mime_types, vec!["application/pdf"]);
    assert!(requests[0].context.is_none());
    assert_eq!(requests[0].system_instruction, "instructions for identify");

    let step1 = std::fs::read_to_string(config.layout.stage_output(StageKind::Identify)).unwrap();
    assert_eq!(requests[1].inline_mime_types, vec!["application/pdf", "text/plain"]);
    assert_eq!(requests[1].context.as_deref(), Some(step1.as_str()));

    let step2 = std::fs::read_to_string(config.layout.stage_output(StageKind::Extract)).unwrap();
    assert_eq!(requests[2].context.as_deref(), Some(step2.as_str()));
    assert_eq!(requests[2].stage, StageKind::Classify);
}

#[tokio::test]
async fn misaligned_stage_two_stops_the_chain() {
    let dir = tempfile::tempdir().unwrap();
    seed_data_dir(dir.path());
    let mut short = extracted();
    short.as_array_mut().unwrap().remove(1);
    let svc = Arc::new(ScriptedService::with_json(vec![identified(), short, classified(2023)]));
    let config = config_with(dir.path(), svc.clone());

    let err = run_chain(config.layout.test_document(), &config)
        .await
        .unwrap_err();

    match err {
        ExtractError::StageFailed {
            stage: StageKind::Extract,
            source: StageError::Misaligned { expected, actual, .. },
        } => assert_eq!((expected, actual), (2, 1)),
        other => panic!("unexpected error: {other}"),
    }
    assert!(config.layout.stage_output(StageKind::Identify).is_file());
    assert!(!config.layout.stage_output(StageKind::Extract).exists());
    assert!(!config.layout.stage_output(StageKind::Classify).exists());
    assert_eq!(svc.call_count(), 2, "stage 3 must not be called");
}

#[tokio::test]
async fn reordered_codes_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    seed_data_dir(dir.path());
    let mut swapped = extracted();
    swapped.as_array_mut().unwrap().reverse();
    let svc = Arc::new(ScriptedService::with_json(vec![identified(), swapped]));
    let config = config_with(dir.path(), svc);

    let err = run_chain(config.layout.test_document(), &config)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ExtractError::StageFailed {
            source: StageError::Misaligned { divergence: Some(_), .. },
            ..
        }
    ));
}

#[tokio::test]
async fn alignment_check_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    seed_data_dir(dir.path());
    let mut short = extracted();
    short.as_array_mut().unwrap().remove(1);
    let mut short_classified = classified(2023);
    short_classified.as_array_mut().unwrap().remove(1);
    let svc = Arc::new(ScriptedService::with_json(vec![identified(), short, short_classified]));
    let mut config = config_with(dir.path(), svc);
    config.verify_alignment = false;

    let output = run_chain(config.layout.test_document(), &config).await.unwrap();
    assert_eq!(codes(&output.metrics), vec!["E1"]);
}

#[tokio::test]
async fn year_out_of_range_fails_schema_validation() {
    let dir = tempfile::tempdir().unwrap();
    seed_data_dir(dir.path());
    let svc = Arc::new(ScriptedService::with_json(vec![
        identified(),
        extracted(),
        classified(1850),
    ]));
    let config = config_with(dir.path(), svc);

    let err = run_chain(config.layout.test_document(), &config)
        .await
        .unwrap_err();
    match err {
        ExtractError::StageFailed {
            stage: StageKind::Classify,
            source: StageError::SchemaViolation { violations },
        } => assert!(violations.iter().any(|v| v.contains(".year")), "{violations:?}"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!config.layout.stage_output(StageKind::Classify).exists());
}

#[tokio::test]
async fn service_failure_short_circuits_at_stage_one() {
    let dir = tempfile::tempdir().unwrap();
    seed_data_dir(dir.path());
    let svc = Arc::new(ScriptedService::new(vec![
        ScriptedReply::Error(ServiceError::RateLimited {
            service: "scripted".into(),
        }),
        ScriptedReply::Json(extracted()),
    ]));
    let config = config_with(dir.path(), svc.clone());

    let err = run_chain(config.layout.test_document(), &config)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ExtractError::StageFailed {
            stage: StageKind::Identify,
            source: StageError::Service(ServiceError::RateLimited { .. })
        }
    ));
    assert_eq!(svc.call_count(), 1);
    assert!(!config.layout.chain_output_dir().exists());
}

#[tokio::test]
async fn malformed_json_reply_is_a_stage_failure() {
    let dir = tempfile::tempdir().unwrap();
    seed_data_dir(dir.path());
    let svc = Arc::new(ScriptedService::new(vec![ScriptedReply::Text(
        "Here are the metrics: E1, E2".into(),
    )]));
    let config = config_with(dir.path(), svc);

    let err = run_chain(config.layout.test_document(), &config)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ExtractError::StageFailed {
            source: StageError::MalformedJson { .. },
            ..
        }
    ));
}

#[tokio::test]
async fn missing_template_fails_before_any_call() {
    let dir = tempfile::tempdir().unwrap();
    seed_data_dir(dir.path());
    std::fs::remove_file(dir.path().join("templates/system_instructions_step_3.txt")).unwrap();
    let svc = Arc::new(ScriptedService::with_json(vec![identified()]));
    let config = config_with(dir.path(), svc.clone());

    let err = run_chain(config.layout.test_document(), &config)
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::TemplateNotFound { .. }));
    assert_eq!(svc.call_count(), 0);
}

#[tokio::test]
async fn chain_resumes_from_persisted_stage_output() {
    let dir = tempfile::tempdir().unwrap();
    seed_data_dir(dir.path());
    let out = dir.path().join("output");
    std::fs::create_dir_all(&out).unwrap();
    let step2 = serde_json::to_string_pretty(&extracted()).unwrap();
    std::fs::write(out.join("out_step_2.txt"), &step2).unwrap();

    let svc = Arc::new(ScriptedService::with_json(vec![classified(2022)]));
    let config = config_with(dir.path(), svc.clone());

    let output = run_chain_from(config.layout.test_document(), StageKind::Classify, &config)
        .await
        .unwrap();
    assert_eq!(output.stages.len(), 1);
    assert_eq!(output.metrics[1].year, Some(2022));
    assert_eq!(svc.requests()[0].context.as_deref(), Some(step2.as_str()));
}

// ── Single-shot batch ────────────────────────────────────────────────────────

#[derive(Default)]
struct EventLog(Mutex<Vec<String>>);

impl EventLog {
    fn push(&self, e: String) {
        self.0.lock().unwrap().push(e);
    }
}

impl ExtractionProgressCallback for EventLog {
    fn on_batch_start(&self, total: usize) {
        self.push(format!("batch_start {total}"));
    }
    fn on_document_complete(&self, index: usize, _total: usize, metrics: usize) {
        self.push(format!("done {index} {metrics}"));
    }
    fn on_document_error(&self, index: usize, _total: usize, _error: &str) {
        self.push(format!("error {index}"));
    }
    fn on_batch_complete(&self, total: usize, succeeded: usize) {
        self.push(format!("batch_complete {total} {succeeded}"));
    }
}

#[tokio::test]
async fn batch_continues_past_failed_documents() {
    let dir = tempfile::tempdir().unwrap();
    seed_data_dir(dir.path());
    let pdfs = dir.path().join("pdfs");
    std::fs::create_dir_all(&pdfs).unwrap();
    std::fs::write(pdfs.join("a_report.pdf"), FAKE_PDF).unwrap();
    std::fs::write(pdfs.join("b_report.pdf"), FAKE_PDF).unwrap();
    std::fs::write(pdfs.join("c_report.pdf"), b"<html>not a pdf</html>").unwrap();
    std::fs::write(pdfs.join("d_report.pdf"), FAKE_PDF).unwrap();
    std::fs::write(pdfs.join("notes.txt"), "ignored").unwrap();

    let svc = Arc::new(ScriptedService::new(vec![
        ScriptedReply::Json(single_shot("Acme SA")),
        ScriptedReply::Text("{\"year\": 2023, \"metrics\": [".into()),
        // c_report.pdf never reaches the service.
        ScriptedReply::Json(single_shot("Delta Corp")),
    ]));
    let events = Arc::new(EventLog::default());
    let config = ExtractionConfig::builder()
        .data_dir(dir.path())
        .service(svc.clone() as Arc<dyn GenerationService>)
        .progress_callback(events.clone() as Arc<dyn ExtractionProgressCallback>)
        .build()
        .unwrap();

    let output = run_batch(&config).await.unwrap();

    assert_eq!(output.stats.total_documents, 4);
    assert_eq!(output.stats.succeeded, 2);
    assert_eq!(output.stats.failed, 2);
    assert_eq!(output.stats.total_metrics, 4);
    assert_eq!(svc.call_count(), 3);

    let names: Vec<_> = output
        .documents
        .iter()
        .map(|d| d.document.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["a_report.pdf", "b_report.pdf", "c_report.pdf", "d_report.pdf"]);
    assert!(output.documents[1].error.as_deref().unwrap().contains("single-shot"));
    assert!(output.documents[2].error.as_deref().unwrap().contains("not a valid PDF"));

    let generated = config.layout.generated_dir();
    assert!(generated.join("a_report.jsonl").is_file());
    assert!(!generated.join("b_report.jsonl").exists());
    assert!(!generated.join("c_report.jsonl").exists());
    assert!(generated.join("d_report.jsonl").is_file());

    // Last write wins: out_step.txt holds the final successful document.
    let last: Value = serde_json::from_str(
        &std::fs::read_to_string(config.layout.stage_output(StageKind::SingleShot)).unwrap(),
    )
    .unwrap();
    assert_eq!(last["metadata"]["organization_name"], "Delta Corp");

    assert_eq!(
        *events.0.lock().unwrap(),
        vec![
            "batch_start 4",
            "done 0 2",
            "error 1",
            "error 2",
            "done 3 2",
            "batch_complete 4 2",
        ]
    );
}

#[tokio::test]
async fn batch_jsonl_reproduces_metrics() {
    let dir = tempfile::tempdir().unwrap();
    seed_data_dir(dir.path());
    let pdfs = dir.path().join("pdfs");
    std::fs::create_dir_all(&pdfs).unwrap();
    std::fs::write(pdfs.join("acme.pdf"), FAKE_PDF).unwrap();

    let svc = Arc::new(ScriptedService::with_json(vec![single_shot("Acme SA")]));
    let config = config_with(dir.path(), svc);
    let output = run_batch(&config).await.unwrap();

    let outcome = &output.documents[0];
    let result = outcome.result.as_ref().unwrap();
    let path = outcome.jsonl_path.as_ref().unwrap();
    assert_eq!(path, &config.layout.generated_jsonl(Path::new("acme.pdf")));

    let lines: Vec<MetricRecord> = read_jsonl(path).unwrap();
    assert_eq!(lines, result.metrics);
    assert_eq!(std::fs::read_to_string(path).unwrap().lines().count(), 2);
}

#[tokio::test]
async fn extract_document_persists_single_shot_result() {
    let dir = tempfile::tempdir().unwrap();
    seed_data_dir(dir.path());
    let svc = Arc::new(ScriptedService::with_json(vec![single_shot("Acme SA")]));
    let config = config_with(dir.path(), svc.clone());

    let result = extract_document(config.layout.test_document(), &config)
        .await
        .unwrap();
    assert_eq!(result.year, 2023);
    assert_eq!(result.metadata.country, "France");
    assert_eq!(result.metrics[1].value, Some(40.0));
    assert!(config.layout.stage_output(StageKind::SingleShot).is_file());
    assert_eq!(
        svc.requests()[0].system_instruction,
        "instructions for single-shot"
    );
}
