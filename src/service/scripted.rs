//! In-process [`GenerationService`] that replays canned replies.
//!
//! Replies are consumed one per call in the order given; once the script is
//! exhausted every further call fails with [`ServiceError::EmptyResponse`].
//! Each request is recorded so tests can assert on what a stage sent.

use super::{GenerationRequest, GenerationResponse, GenerationService, Part};
use crate::error::ServiceError;
use crate::output::StageKind;
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A configurable reply for [`ScriptedService`].
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Respond with this JSON, serialised as the candidate text.
    Json(serde_json::Value),
    /// Respond with raw candidate text (for malformed-output cases).
    Text(String),
    /// Fail the call.
    Error(ServiceError),
}

/// What a stage sent, as seen by the service.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub stage: StageKind,
    pub system_instruction: String,
    /// MIME type of every inline part, in order.
    pub inline_mime_types: Vec<String>,
    /// The `text/plain` context part, decoded, if one was sent.
    pub context: Option<String>,
    /// The natural-language instruction part(s), joined.
    pub instruction: String,
}

pub struct ScriptedService {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedService {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Convenience: every reply is a JSON value.
    pub fn with_json(replies: Vec<serde_json::Value>) -> Self {
        Self::new(replies.into_iter().map(ScriptedReply::Json).collect())
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn record(&self, request: &GenerationRequest) {
        let mut inline_mime_types = Vec::new();
        let mut context = None;
        let mut instruction = Vec::new();
        for part in &request.parts {
            match part {
                Part::Inline { mime_type, data } => {
                    if mime_type == super::TEXT_MIME {
                        context = Some(String::from_utf8_lossy(data).into_owned());
                    }
                    inline_mime_types.push(mime_type.clone());
                }
                Part::Text(t) => instruction.push(t.as_str()),
            }
        }
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedRequest {
                stage: request.stage,
                system_instruction: request.system_instruction.clone(),
                inline_mime_types,
                context,
                instruction: instruction.join("\n"),
            });
    }
}

impl GenerationService for ScriptedService {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> BoxFuture<'a, Result<GenerationResponse, ServiceError>> {
        self.record(request);
        let next = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        Box::pin(async move {
            let text = match next {
                Some(ScriptedReply::Json(v)) => v.to_string(),
                Some(ScriptedReply::Text(t)) => t,
                Some(ScriptedReply::Error(e)) => return Err(e),
                None => return Err(ServiceError::EmptyResponse),
            };
            Ok(GenerationResponse {
                prompt_tokens: 100,
                completion_tokens: (text.len() / 4) as u32,
                text,
                finish_reason: Some("STOP".to_string()),
                safety_ratings: Vec::new(),
            })
        })
    }
}
