//! Conversational core for Storey.
//!
//! Runs chat turns: keeps a bounded memory window per session, lets a
//! language model call the shopping tools, attributes each reply to the
//! products it is about, and persists every message.

pub mod agent;
pub mod error;
pub mod llm;
pub mod memory;
pub mod orchestrator;
pub mod prompt;
pub mod resolution;
pub mod tools;

pub use agent::{AgentOutcome, AgentState, ConversationAgent, ToolInvocation};
pub use error::{ChatError, LlmError};
pub use llm::{build_model, LanguageModel, ModelAction, OpenAiCompatibleModel, PlanningRequest, ScriptedModel, ToolCallRequest};
pub use memory::{Exchange, MemoryWindow, SessionMemoryStore};
pub use orchestrator::{ChatOrchestrator, HistoryEntry, SessionSummary, TurnResult, APOLOGY_TEXT};
pub use prompt::SYSTEM_PROMPT;
pub use resolution::{ProductResolver, Resolution, ResolutionTier};
pub use tools::{ProductTool, ToolContext, ToolDefinition, ToolName, ToolOutput, ToolRegistry};
