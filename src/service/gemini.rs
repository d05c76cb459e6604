//! `generateContent` client for the Gemini REST API.
//!
//! The request forces JSON output against the stage schema, uses the
//! configured sampling parameters, and sets every adjustable harm category
//! to `BLOCK_NONE`: sustainability reports routinely mention fuels,
//! explosives and hazardous sites, and a blocked response would silently
//! drop metrics.

use super::{GenerationRequest, GenerationResponse, GenerationService, SafetyRating};
use crate::config::{ExtractionConfig, DEFAULT_BASE_URL};
use crate::error::{ExtractError, ServiceError};
use crate::pipeline::encode::encode_part;
use crate::schema;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Harm categories the API lets callers adjust.
pub const HARM_CATEGORIES: [&str; 5] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
    "HARM_CATEGORY_CIVIC_INTEGRITY",
];

/// Environment variables checked for an API key, in order.
pub const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_API_KEY"];

const SERVICE_NAME: &str = "gemini";

/// HTTPS client for one model.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout_secs: Option<u64>,
    ) -> Result<Self, ExtractError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .map_err(|e| ExtractError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    /// Build a client from the config, falling back to the environment for the key.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        let api_key = match config.api_key.clone() {
            Some(key) if !key.is_empty() => key,
            _ => API_KEY_VARS
                .iter()
                .filter_map(|var| std::env::var(var).ok())
                .find(|v| !v.is_empty())
                .ok_or_else(|| ExtractError::ServiceNotConfigured {
                    service: SERVICE_NAME.to_string(),
                    hint: format!(
                        "No API key found. Set {} or pass --api-key.",
                        API_KEY_VARS.join(" or ")
                    ),
                })?,
        };

        Self::new(
            api_key,
            config.model_name(),
            config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL),
            config.api_timeout_secs,
        )
    }

    pub fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

impl GenerationService for GeminiClient {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> BoxFuture<'a, Result<GenerationResponse, ServiceError>> {
        Box::pin(async move {
            let body = build_request_body(request);
            debug!("POST {} (stage {})", self.endpoint(), request.stage);

            let resp = self
                .http
                .post(self.endpoint())
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| ServiceError::Transport(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(match status.as_u16() {
                    401 | 403 => ServiceError::Auth {
                        service: SERVICE_NAME.to_string(),
                        detail: text,
                    },
                    429 => ServiceError::RateLimited {
                        service: SERVICE_NAME.to_string(),
                    },
                    code => ServiceError::Api {
                        status: code,
                        body: text,
                    },
                });
            }

            let data: Value = resp
                .json()
                .await
                .map_err(|e| ServiceError::Transport(e.to_string()))?;
            parse_response_body(data)
        })
    }
}

/// Assemble the JSON body of a `generateContent` call.
pub fn build_request_body(request: &GenerationRequest) -> Value {
    let s = &request.settings;
    let parts: Vec<Value> = request.parts.iter().map(encode_part).collect();
    let safety: Vec<Value> = HARM_CATEGORIES
        .iter()
        .map(|c| json!({"category": c, "threshold": "BLOCK_NONE"}))
        .collect();

    json!({
        "systemInstruction": {"parts": [{"text": request.system_instruction}]},
        "contents": [{"role": "user", "parts": parts}],
        "generationConfig": {
            "temperature": s.temperature,
            "topP": s.top_p,
            "topK": s.top_k,
            "candidateCount": s.candidate_count,
            "maxOutputTokens": s.max_output_tokens,
            "responseMimeType": "application/json",
            "responseSchema": schema::to_wire(&request.response_schema),
        },
        "safetySettings": safety,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    #[serde(default)]
    prompt_feedback: Option<WirePromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCandidate {
    #[serde(default)]
    content: Option<WireContent>,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    safety_ratings: Vec<SafetyRating>,
}

#[derive(Debug, Deserialize)]
struct WireContent {
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Deserialize)]
struct WirePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

/// Extract the first candidate's text, finish reason and ratings.
pub fn parse_response_body(data: Value) -> Result<GenerationResponse, ServiceError> {
    let wire: WireResponse = serde_json::from_value(data)
        .map_err(|e| ServiceError::Transport(format!("unexpected response shape: {e}")))?;

    let (prompt_tokens, completion_tokens) = wire
        .usage_metadata
        .map(|u| (u.prompt_token_count, u.candidates_token_count))
        .unwrap_or((0, 0));

    let Some(candidate) = wire.candidates.into_iter().next() else {
        if let Some(reason) = wire.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ServiceError::Blocked { reason });
        }
        return Err(ServiceError::EmptyResponse);
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    Ok(GenerationResponse {
        text,
        finish_reason: candidate.finish_reason,
        safety_ratings: candidate.safety_ratings,
        prompt_tokens,
        completion_tokens,
    })
}
