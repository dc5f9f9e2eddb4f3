//! OpenAI-compatible chat-completions model with native tool calling.
//!
//! Works against any endpoint that speaks the `/chat/completions` wire
//! format, including Gemini's OpenAI-compatible surface.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use storey_core::config::LlmConfig;

use crate::agent::ToolInvocation;
use crate::error::{ChatError, LlmError};

use super::{LanguageModel, ModelAction, PlanningRequest, ToolCallRequest};

pub struct OpenAiCompatibleModel {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiCompatibleModel {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self, ChatError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn plan(&self, request: &PlanningRequest<'_>) -> Result<ModelAction, LlmError> {
        let body = build_request_body(&self.model, self.temperature, self.max_tokens, request);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(LlmError::RateLimited);
            }
            warn!(status = status.as_u16(), "Model request rejected");
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        let action = parse_completion(&json)?;
        debug!(
            model = %self.model,
            tool_calls = matches!(action, ModelAction::CallTools(_)),
            "Model planning step complete"
        );
        Ok(action)
    }
}

/// Chat-completions request for one planning step.
pub fn build_request_body(
    model: &str,
    temperature: f32,
    max_tokens: u32,
    request: &PlanningRequest<'_>,
) -> Value {
    let mut messages = vec![json!({"role": "system", "content": request.system_prompt})];
    for exchange in request.history {
        messages.push(json!({"role": "user", "content": exchange.user}));
        messages.push(json!({"role": "assistant", "content": exchange.assistant}));
    }
    messages.push(json!({"role": "user", "content": request.user_text}));
    append_tool_steps(&mut messages, request.steps);

    let tools: Vec<Value> = request
        .tools
        .iter()
        .map(|def| {
            json!({
                "type": "function",
                "function": {
                    "name": def.name.as_str(),
                    "description": def.description,
                    "parameters": def.parameters,
                }
            })
        })
        .collect();

    let mut body = json!({
        "model": model,
        "messages": messages,
        "temperature": temperature,
        "max_tokens": max_tokens,
    });
    if !tools.is_empty() {
        body["tools"] = Value::Array(tools);
    }
    body
}

/// Replay earlier tool calls: one assistant message per planning step
/// followed by one tool message per call.
fn append_tool_steps(messages: &mut Vec<Value>, steps: &[ToolInvocation]) {
    let mut start = 0;
    while start < steps.len() {
        let step = steps[start].step;
        let end = steps[start..]
            .iter()
            .position(|inv| inv.step != step)
            .map_or(steps.len(), |offset| start + offset);
        let group = &steps[start..end];

        let calls: Vec<Value> = group
            .iter()
            .map(|inv| {
                json!({
                    "id": inv.call_id,
                    "type": "function",
                    "function": {
                        "name": inv.tool.as_str(),
                        "arguments": inv.input.to_string(),
                    }
                })
            })
            .collect();
        messages.push(json!({"role": "assistant", "content": Value::Null, "tool_calls": calls}));
        for inv in group {
            messages.push(json!({
                "role": "tool",
                "tool_call_id": inv.call_id,
                "content": inv.output.content,
            }));
        }
        start = end;
    }
}

/// Interpret a chat-completions response.
pub fn parse_completion(json: &Value) -> Result<ModelAction, LlmError> {
    let message = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| LlmError::MalformedResponse("response has no choices".to_string()))?;

    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        if !calls.is_empty() {
            let requests = calls
                .iter()
                .enumerate()
                .map(|(i, call)| parse_tool_call(i, call))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(ModelAction::CallTools(requests));
        }
    }

    message
        .get("content")
        .and_then(Value::as_str)
        .map(|text| ModelAction::Respond(text.to_string()))
        .ok_or_else(|| LlmError::MalformedResponse("message has neither content nor tool calls".to_string()))
}

fn parse_tool_call(index: usize, call: &Value) -> Result<ToolCallRequest, LlmError> {
    let function = call
        .get("function")
        .ok_or_else(|| LlmError::MalformedResponse("tool call without function".to_string()))?;
    let name = function
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| LlmError::MalformedResponse("tool call without name".to_string()))?;
    let id = call
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("call_{}", index));

    // Arguments arrive as a JSON string; keep the raw text if it does not parse.
    let input = match function.get("arguments") {
        Some(Value::String(raw)) => {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
        }
        Some(other) => other.clone(),
        None => Value::Object(Default::default()),
    };

    Ok(ToolCallRequest {
        id,
        name: name.to_string(),
        input,
    })
}
