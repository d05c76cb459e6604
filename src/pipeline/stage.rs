//! One model call: request assembly, response cleanup, parse, validate.
//!
//! [`run_stage`] never returns an error. Whatever goes wrong (transport,
//! refusal, unparseable or non-conforming JSON) ends up in
//! [`StageResult::error`], and the orchestrator decides whether to stop.

use crate::config::GenerationSettings;
use crate::error::StageError;
use crate::model::MetricRecord;
use crate::output::{StageKind, StageResult};
use crate::pipeline::postprocess::clean_json_text;
use crate::prompts;
use crate::schema;
use crate::service::{GenerationRequest, GenerationService, Part};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Run `stage` against `service`.
///
/// `parts` carries the document and, for stages 2 and 3, the previous
/// stage's output; the stage's fixed instruction is appended after them.
pub async fn run_stage(
    service: &dyn GenerationService,
    stage: StageKind,
    system_instruction: &str,
    mut parts: Vec<Part>,
    settings: &GenerationSettings,
) -> StageResult {
    let start = Instant::now();
    parts.push(Part::text(prompts::user_prompt(stage)));

    let request = GenerationRequest {
        stage,
        system_instruction: system_instruction.to_string(),
        parts,
        response_schema: schema::for_stage(stage),
        settings: *settings,
    };

    info!("Stage {}: calling {}", stage, service.name());
    let mut result = StageResult {
        stage,
        output: None,
        finish_reason: None,
        safety_ratings: Vec::new(),
        input_tokens: 0,
        output_tokens: 0,
        duration_ms: 0,
        error: None,
    };

    let response = match service.generate(&request).await {
        Ok(r) => r,
        Err(e) => {
            warn!("Stage {}: generation failed: {}", stage, e);
            result.duration_ms = start.elapsed().as_millis() as u64;
            result.error = Some(StageError::Service(e));
            return result;
        }
    };

    debug!("Stage {}: raw response: {}", stage, response.text);
    info!(
        "Stage {}: finish reason {}",
        stage,
        response.finish_reason.as_deref().unwrap_or("<none>")
    );
    for rating in &response.safety_ratings {
        info!(
            "Stage {}: safety {} = {}{}",
            stage,
            rating.category,
            rating.probability.as_deref().unwrap_or("?"),
            if rating.blocked { " (blocked)" } else { "" }
        );
    }
    if response
        .finish_reason
        .as_deref()
        .is_some_and(|r| r != "STOP")
    {
        warn!(
            "Stage {}: response may be incomplete (finish reason {:?})",
            stage, response.finish_reason
        );
    }

    result.finish_reason = response.finish_reason;
    result.safety_ratings = response.safety_ratings;
    result.input_tokens = response.prompt_tokens;
    result.output_tokens = response.completion_tokens;

    result.error = match parse_and_validate(stage, &response.text) {
        Ok(value) => {
            result.output = Some(value);
            None
        }
        Err(e) => {
            warn!("Stage {}: {}", stage, e);
            Some(e)
        }
    };
    result.duration_ms = start.elapsed().as_millis() as u64;
    result
}

/// Clean the response text, parse it, and check it against the stage schema.
pub fn parse_and_validate(stage: StageKind, text: &str) -> Result<serde_json::Value, StageError> {
    let cleaned = clean_json_text(text);
    let value: serde_json::Value =
        serde_json::from_str(&cleaned).map_err(|e| StageError::MalformedJson {
            detail: e.to_string(),
        })?;
    schema::validate(&value, &schema::for_stage(stage))
        .map_err(|violations| StageError::SchemaViolation { violations })?;
    Ok(value)
}

/// Check that `output` lists the same codes as `input`, in the same order.
pub fn verify_alignment(input: &[MetricRecord], output: &[MetricRecord]) -> Result<(), StageError> {
    let divergence = input
        .iter()
        .zip(output)
        .enumerate()
        .find(|(_, (a, b))| a.code != b.code)
        .map(|(i, (a, b))| format!("index {i}: expected '{}', got '{}'", a.code, b.code));

    if input.len() != output.len() || divergence.is_some() {
        return Err(StageError::Misaligned {
            expected: input.len(),
            actual: output.len(),
            divergence,
        });
    }
    Ok(())
}
