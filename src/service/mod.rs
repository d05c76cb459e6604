//! The seam between the pipelines and the hosted generation model.
//!
//! Every model call goes through [`GenerationService`]. Two implementations
//! ship with the crate:
//!
//! * [`gemini::GeminiClient`]: `generateContent` over HTTPS.
//! * [`scripted::ScriptedService`]: replays canned replies in order and
//!   records what it was sent; used by the test-suite.

pub mod gemini;
pub mod scripted;

use crate::config::{ExtractionConfig, GenerationSettings};
use crate::error::{ExtractError, ServiceError};
use crate::output::StageKind;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use gemini::GeminiClient;
pub use scripted::{ScriptedReply, ScriptedService};

/// MIME type of the source document part.
pub const PDF_MIME: &str = "application/pdf";

/// MIME type of the prior-stage context part.
pub const TEXT_MIME: &str = "text/plain";

/// One piece of request content.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    /// Binary payload sent inline with its MIME type.
    Inline { mime_type: String, data: Vec<u8> },
    /// Natural-language instruction.
    Text(String),
}

impl Part {
    pub fn pdf(data: Vec<u8>) -> Self {
        Part::Inline {
            mime_type: PDF_MIME.to_string(),
            data,
        }
    }

    /// Prior-stage output re-embedded as a file part.
    pub fn plain_text(data: Vec<u8>) -> Self {
        Part::Inline {
            mime_type: TEXT_MIME.to_string(),
            data,
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        Part::Text(s.into())
    }

    pub fn mime_type(&self) -> Option<&str> {
        match self {
            Part::Inline { mime_type, .. } => Some(mime_type),
            Part::Text(_) => None,
        }
    }
}

/// Everything needed for one structured-output call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub stage: StageKind,
    pub system_instruction: String,
    /// Document, optional prior-stage context, then the instruction.
    pub parts: Vec<Part>,
    /// Schema the JSON response must satisfy.
    pub response_schema: serde_json::Value,
    pub settings: GenerationSettings,
}

/// Per-category safety assessment attached to a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyRating {
    pub category: String,
    #[serde(default)]
    pub probability: Option<String>,
    #[serde(default)]
    pub blocked: bool,
}

/// Raw reply from the service, before JSON parsing and validation.
#[derive(Debug, Clone, Default)]
pub struct GenerationResponse {
    pub text: String,
    pub finish_reason: Option<String>,
    pub safety_ratings: Vec<SafetyRating>,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A hosted model that answers structured-output requests.
///
/// Calls block the pipeline until they resolve; there is no retry layer, so
/// an implementation reports every failure as a [`ServiceError`].
pub trait GenerationService: Send + Sync {
    /// Short identifier used in logs and error messages.
    fn name(&self) -> &str;

    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> BoxFuture<'a, Result<GenerationResponse, ServiceError>>;
}

/// Resolve the generation service, from most-specific to least-specific.
///
/// 1. **Pre-built service** (`config.service`) is used as-is.
/// 2. Otherwise a [`GeminiClient`] is built from the configured key, or from
///    `GEMINI_API_KEY` / `GOOGLE_API_KEY` in the environment.
pub fn resolve_service(config: &ExtractionConfig) -> Result<Arc<dyn GenerationService>, ExtractError> {
    if let Some(ref service) = config.service {
        return Ok(Arc::clone(service));
    }
    let client = GeminiClient::from_config(config)?;
    Ok(Arc::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_constructors_tag_mime_types() {
        assert_eq!(Part::pdf(vec![1]).mime_type(), Some("application/pdf"));
        assert_eq!(Part::plain_text(vec![1]).mime_type(), Some("text/plain"));
        assert_eq!(Part::text("hi").mime_type(), None);
    }

    #[test]
    fn resolve_prefers_prebuilt_service() {
        let scripted: Arc<dyn GenerationService> = Arc::new(ScriptedService::new(vec![]));
        let config = ExtractionConfig::builder()
            .service(Arc::clone(&scripted))
            .build()
            .unwrap();
        let resolved = resolve_service(&config).unwrap();
        assert_eq!(resolved.name(), "scripted");
    }

    #[test]
    fn safety_rating_parses_api_shape() {
        let r: SafetyRating = serde_json::from_value(serde_json::json!({
            "category": "HARM_CATEGORY_HATE_SPEECH",
            "probability": "NEGLIGIBLE"
        }))
        .unwrap();
        assert_eq!(r.category, "HARM_CATEGORY_HATE_SPEECH");
        assert!(!r.blocked);
    }
}
