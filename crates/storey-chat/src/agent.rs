//! Conversation agent: the per-turn planning loop.
//!
//! Each run walks a small state machine:
//! Idle -> Planning -> ToolCall (0..n) -> Responding -> Done, with Error
//! reachable from every state. The model is asked to plan repeatedly; each
//! requested tool call is validated against `ToolName` and executed, and
//! its output becomes visible to the next planning step. The loop ends
//! when the model answers or the tool-call budget runs out.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ChatError, LlmError};
use crate::llm::{LanguageModel, ModelAction, PlanningRequest};
use crate::memory::Exchange;
use crate::resolution::{ProductResolver, ResolutionTier};
use crate::tools::{ToolContext, ToolDefinition, ToolName, ToolOutput, ToolRegistry};

/// Agent lifecycle states within one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Idle,
    Planning,
    ToolCall,
    Responding,
    Done,
    Error,
}

/// Validate that a state transition is allowed.
///
/// Valid transitions:
/// - Idle -> Planning
/// - Planning -> ToolCall
/// - Planning -> Responding
/// - ToolCall -> ToolCall (several calls in one step)
/// - ToolCall -> Planning
/// - Responding -> Done
/// - any state except Error -> Error
pub fn validate_transition(from: AgentState, to: AgentState) -> Result<(), ChatError> {
    let valid = matches!(
        (from, to),
        (AgentState::Idle, AgentState::Planning)
            | (AgentState::Planning, AgentState::ToolCall)
            | (AgentState::Planning, AgentState::Responding)
            | (AgentState::ToolCall, AgentState::ToolCall)
            | (AgentState::ToolCall, AgentState::Planning)
            | (AgentState::Responding, AgentState::Done)
    ) || (to == AgentState::Error && from != AgentState::Error);

    if valid {
        Ok(())
    } else {
        Err(ChatError::InvalidTransition(from, to))
    }
}

/// One executed tool call. Lives only for the duration of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    /// Planning step that requested the call.
    pub step: usize,
    pub call_id: String,
    pub tool: ToolName,
    pub input: Value,
    pub output: ToolOutput,
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub reply: String,
    pub product_ids: Vec<String>,
    pub resolved_by: Option<ResolutionTier>,
    pub trace: Vec<ToolInvocation>,
}

/// Tracks the current state and enforces legal transitions.
struct Run {
    state: AgentState,
}

impl Run {
    fn new() -> Self {
        Self {
            state: AgentState::Idle,
        }
    }

    fn advance(&mut self, to: AgentState) -> Result<(), ChatError> {
        validate_transition(self.state, to)?;
        debug!(from = ?self.state, to = ?to, "Agent transition");
        self.state = to;
        Ok(())
    }
}

pub struct ConversationAgent {
    model: Arc<dyn LanguageModel>,
    tools: Arc<ToolRegistry>,
    resolver: ProductResolver,
    system_prompt: String,
    tool_call_budget: usize,
}

impl ConversationAgent {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        tools: Arc<ToolRegistry>,
        resolver: ProductResolver,
        system_prompt: impl Into<String>,
        tool_call_budget: usize,
    ) -> Self {
        Self {
            model,
            tools,
            resolver,
            system_prompt: system_prompt.into(),
            tool_call_budget,
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Run one turn. Any error means the run ended in `Error` and nothing
    /// it produced should be trusted.
    pub async fn run(
        &self,
        history: &[Exchange],
        user_text: &str,
        ctx: &ToolContext,
    ) -> Result<AgentOutcome, ChatError> {
        let mut run = Run::new();
        match self.drive(&mut run, history, user_text, ctx).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let _ = run.advance(AgentState::Error);
                warn!(state = ?run.state, error = %e, "Agent run failed");
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        run: &mut Run,
        history: &[Exchange],
        user_text: &str,
        ctx: &ToolContext,
    ) -> Result<AgentOutcome, ChatError> {
        let definitions: Vec<ToolDefinition> = self.tools.definitions();
        let mut trace: Vec<ToolInvocation> = Vec::new();
        let mut step = 0usize;

        run.advance(AgentState::Planning)?;
        let reply = loop {
            let request = PlanningRequest {
                system_prompt: &self.system_prompt,
                history,
                user_text,
                tools: &definitions,
                steps: &trace,
            };
            let calls = match self.model.plan(&request).await? {
                ModelAction::Respond(text) => break text,
                ModelAction::CallTools(calls) => calls,
            };
            if calls.is_empty() {
                return Err(LlmError::MalformedResponse("tool call step without calls".to_string()).into());
            }

            for call in calls {
                if trace.len() >= self.tool_call_budget {
                    return Err(ChatError::ToolBudgetExhausted(self.tool_call_budget));
                }
                run.advance(AgentState::ToolCall)?;
                let (tool, output) = self.tools.dispatch(&call.name, &call.input, ctx).await?;
                trace.push(ToolInvocation {
                    step,
                    call_id: call.id,
                    tool,
                    input: call.input,
                    output,
                });
            }
            run.advance(AgentState::Planning)?;
            step += 1;
        };

        run.advance(AgentState::Responding)?;
        let resolution = self.resolver.resolve(&reply, &trace);
        run.advance(AgentState::Done)?;

        info!(
            tool_calls = trace.len(),
            products = resolution.product_ids.len(),
            "Agent run complete"
        );
        Ok(AgentOutcome {
            reply: resolution.reply,
            product_ids: resolution.product_ids,
            resolved_by: resolution.tier,
            trace,
        })
    }
}
