//! Error types for the chat core.

use storey_core::error::StoreyError;

use crate::agent::AgentState;

/// Errors from a language model round trip.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(String),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("rate limited by model provider")]
    RateLimited,
    #[error("malformed model response: {0}")]
    MalformedResponse(String),
}

/// Errors from the chat core.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("tool call budget of {0} exhausted")]
    ToolBudgetExhausted(usize),
    #[error("invalid agent transition: {0:?} -> {1:?}")]
    InvalidTransition(AgentState, AgentState),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl ChatError {
    /// True for failures of the agent run itself. These are answered with
    /// the fixed apology rather than surfaced to the caller.
    pub fn is_agent_failure(&self) -> bool {
        matches!(
            self,
            ChatError::Llm(_)
                | ChatError::UnknownTool(_)
                | ChatError::ToolBudgetExhausted(_)
                | ChatError::InvalidTransition(..)
        )
    }
}

impl From<StoreyError> for ChatError {
    fn from(err: StoreyError) -> Self {
        match err {
            StoreyError::Config(msg) => ChatError::Config(msg),
            other => ChatError::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_error_display() {
        assert_eq!(ChatError::EmptyMessage.to_string(), "message cannot be empty");
        assert_eq!(
            ChatError::MessageTooLong(4000).to_string(),
            "message exceeds maximum length of 4000 characters"
        );
        assert_eq!(
            ChatError::SessionNotFound("abc".to_string()).to_string(),
            "session not found: abc"
        );
        assert_eq!(
            ChatError::UnknownTool("launch_rocket".to_string()).to_string(),
            "unknown tool: launch_rocket"
        );
        assert_eq!(
            ChatError::ToolBudgetExhausted(6).to_string(),
            "tool call budget of 6 exhausted"
        );
        assert_eq!(
            ChatError::Storage("disk full".to_string()).to_string(),
            "storage error: disk full"
        );
    }

    #[test]
    fn test_llm_error_display() {
        assert_eq!(
            LlmError::Api {
                status: 401,
                message: "bad key".to_string()
            }
            .to_string(),
            "API error (401): bad key"
        );
        assert_eq!(LlmError::RateLimited.to_string(), "rate limited by model provider");

        let err: ChatError = LlmError::Network("timeout".to_string()).into();
        assert_eq!(err.to_string(), "LLM error: network error: timeout");
    }

    #[test]
    fn test_agent_failure_classification() {
        assert!(ChatError::Llm(LlmError::RateLimited).is_agent_failure());
        assert!(ChatError::UnknownTool("x".to_string()).is_agent_failure());
        assert!(ChatError::ToolBudgetExhausted(1).is_agent_failure());
        assert!(ChatError::InvalidTransition(AgentState::Done, AgentState::Planning).is_agent_failure());
        assert!(!ChatError::Storage("x".to_string()).is_agent_failure());
        assert!(!ChatError::EmptyMessage.is_agent_failure());
    }

    #[test]
    fn test_from_storey_error() {
        let err: ChatError = StoreyError::Storage("connection lost".to_string()).into();
        assert!(matches!(err, ChatError::Storage(_)));
        assert!(err.to_string().contains("connection lost"));

        let err: ChatError = StoreyError::Config("bad provider".to_string()).into();
        assert!(matches!(err, ChatError::Config(_)));
    }
}
