//! Deterministic model that replays a queued script.
//!
//! Used by tests and local runs without network access. Each `plan` call
//! pops the next scripted step; an exhausted script is a malformed response.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::LlmError;

use super::{LanguageModel, ModelAction, PlanningRequest, ToolCallRequest};

/// What the model saw on one planning step.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub user_text: String,
    pub history_len: usize,
    pub steps_seen: usize,
    pub tool_names: Vec<String>,
}

#[derive(Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<ModelAction, LlmError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a single tool call.
    pub fn then_call(self, tool: &str, input: Value) -> Self {
        let id = format!("call_{}", self.queued());
        self.then_calls(vec![ToolCallRequest {
            id,
            name: tool.to_string(),
            input,
        }])
    }

    /// Queue several tool calls made in the same step.
    pub fn then_calls(self, calls: Vec<ToolCallRequest>) -> Self {
        self.push(Ok(ModelAction::CallTools(calls)))
    }

    pub fn then_respond(self, text: &str) -> Self {
        self.push(Ok(ModelAction::Respond(text.to_string())))
    }

    pub fn then_fail(self, error: LlmError) -> Self {
        self.push(Err(error))
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Steps still queued.
    pub fn remaining(&self) -> usize {
        self.queued()
    }

    fn queued(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn push(self, step: Result<ModelAction, LlmError>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(step);
        }
        self
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn plan(&self, request: &PlanningRequest<'_>) -> Result<ModelAction, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                user_text: request.user_text.to_string(),
                history_len: request.history.len(),
                steps_seen: request.steps.len(),
                tool_names: request.tools.iter().map(|t| t.name.to_string()).collect(),
            });
        }
        let next = self
            .script
            .lock()
            .map_err(|e| LlmError::MalformedResponse(format!("script lock poisoned: {}", e)))?
            .pop_front();
        next.unwrap_or_else(|| Err(LlmError::MalformedResponse("script exhausted".to_string())))
    }
}
