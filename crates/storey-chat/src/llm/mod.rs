//! Language model seam for the conversation agent.
//!
//! A model sees the system prompt, the session's memory window, the new
//! utterance, the tool definitions, and every tool call made so far this
//! turn. It answers with either more tool calls or the final reply.

pub mod openai;
pub mod scripted;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use storey_core::config::LlmConfig;

use crate::agent::ToolInvocation;
use crate::error::{ChatError, LlmError};
use crate::memory::Exchange;
use crate::tools::ToolDefinition;

pub use openai::OpenAiCompatibleModel;
pub use scripted::ScriptedModel;

/// Everything a model needs for one planning step.
#[derive(Debug, Clone, Copy)]
pub struct PlanningRequest<'a> {
    pub system_prompt: &'a str,
    pub history: &'a [Exchange],
    pub user_text: &'a str,
    pub tools: &'a [ToolDefinition],
    /// Tool calls already made this turn, in order.
    pub steps: &'a [ToolInvocation],
}

/// One tool call requested by the model. The name is unvalidated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// What the model decided to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelAction {
    CallTools(Vec<ToolCallRequest>),
    Respond(String),
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    async fn plan(&self, request: &PlanningRequest<'_>) -> Result<ModelAction, LlmError>;
}

/// Build the model named by the configuration.
pub fn build_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>, ChatError> {
    match config.provider.as_str() {
        "openai" => {
            let api_key = config.resolve_api_key().ok_or_else(|| {
                ChatError::Config(format!(
                    "no API key configured; set llm.api_key or the {} environment variable",
                    config.api_key_env
                ))
            })?;
            let model = OpenAiCompatibleModel::new(config, api_key)?;
            info!(model = %config.model, api_base = %config.api_base, "Language model configured");
            Ok(Arc::new(model))
        }
        other => Err(ChatError::Config(format!("unsupported llm provider: {}", other))),
    }
}
