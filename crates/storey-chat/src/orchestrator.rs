//! Chat orchestrator: runs one conversational turn end to end.
//!
//! Ties the memory store, the agent and the message store together. The
//! user message is persisted before the agent runs, so it survives any
//! agent failure. Agent failures are answered with a fixed apology;
//! persistence failures propagate to the caller.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info, instrument};

use storey_core::config::ChatConfig;
use storey_core::error::StoreyError;
use storey_core::types::{ChatMessage, MessageType, Product};
use storey_storage::{Catalog, Database, MessageRepository, SessionRepository};

use crate::agent::ConversationAgent;
use crate::error::ChatError;
use crate::memory::SessionMemoryStore;
use crate::tools::ToolContext;

/// Reply persisted when the agent cannot produce one.
pub const APOLOGY_TEXT: &str = "I'm sorry, I encountered an error. Please try again.";

/// Longest accepted session identifier.
const MAX_SESSION_ID_LEN: usize = 128;

/// A persisted message with its referenced products expanded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnResult {
    #[serde(rename = "id")]
    pub message_id: String,
    pub content: String,
    pub is_bot: bool,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    pub products: Vec<Product>,
    #[serde(rename = "type")]
    pub message_type: MessageType,
}

/// History rows share the turn result's shape.
pub type HistoryEntry = TurnResult;

impl TurnResult {
    fn from_message(message: ChatMessage, products: Vec<Product>) -> Self {
        Self {
            message_id: message.id,
            content: message.content,
            is_bot: message.is_bot,
            created_at: message.created_at,
            products,
            message_type: message.message_type,
        }
    }
}

/// A session's persisted record plus whether it has a live memory window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    #[serde(rename = "id")]
    pub session_id: String,
    pub user_id: Option<String>,
    pub is_active: bool,
    pub state: Map<String, Value>,
    pub message_count: u64,
    pub live_memory: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct ChatOrchestrator {
    agent: ConversationAgent,
    memory: SessionMemoryStore,
    sessions: SessionRepository,
    messages: MessageRepository,
    catalog: Arc<dyn Catalog>,
    config: ChatConfig,
}

impl ChatOrchestrator {
    pub fn new(
        config: ChatConfig,
        db: Arc<Database>,
        catalog: Arc<dyn Catalog>,
        agent: ConversationAgent,
    ) -> Self {
        let memory = SessionMemoryStore::new(
            config.memory_window,
            config.max_sessions,
            Duration::from_secs(config.session_idle_minutes.saturating_mul(60)),
        );
        Self {
            agent,
            memory,
            sessions: SessionRepository::new(db.clone()),
            messages: MessageRepository::new(db),
            catalog,
            config,
        }
    }

    pub fn memory(&self) -> &SessionMemoryStore {
        &self.memory
    }

    /// Handle one user message.
    ///
    /// Turns on the same session run one at a time: the session's memory
    /// window stays locked until the turn has been persisted.
    #[instrument(skip(self, text), fields(model = %self.agent.model_name()))]
    pub async fn process_turn(
        &self,
        session_id: &str,
        text: &str,
        user_id: Option<&str>,
    ) -> Result<TurnResult, ChatError> {
        self.validate(session_id, text)?;

        let handle = self.memory.get_or_create(session_id)?;
        let mut window = handle.lock().await;

        let session = self.sessions.get_or_create(session_id, user_id)?;
        if !session.is_active {
            debug!(session_id, "Turn on a deactivated session");
        }
        let user_message = ChatMessage::user(session_id, text);
        self.messages.insert(&user_message)?;

        let ctx = ToolContext {
            user_id: user_id.map(str::to_string).or(session.user_id),
        };
        let history = window.exchanges();

        match self.agent.run(&history, text, &ctx).await {
            Ok(outcome) => {
                let reply = ChatMessage::assistant(session_id, &outcome.reply, outcome.product_ids);
                self.messages.insert(&reply)?;
                let products = self.catalog.find_many(&reply.product_ids)?;
                window.push(text, &reply.content);
                info!(
                    message_id = %reply.id,
                    message_type = %reply.message_type,
                    products = products.len(),
                    "Turn complete"
                );
                Ok(TurnResult::from_message(reply, products))
            }
            Err(e) => {
                error!(
                    error = %e,
                    agent_failure = e.is_agent_failure(),
                    "Turn failed, replying with apology"
                );
                let apology = ChatMessage::assistant(session_id, APOLOGY_TEXT, Vec::new());
                self.messages.insert(&apology)?;
                Ok(TurnResult::from_message(apology, Vec::new()))
            }
        }
    }

    /// Past messages oldest first, capped at `limit` (the configured
    /// history limit when unset). Unknown sessions have no history.
    pub fn get_history(
        &self,
        session_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryEntry>, ChatError> {
        let limit = limit.unwrap_or(self.config.history_limit);
        let messages = self.messages.history(session_id, limit)?;
        messages
            .into_iter()
            .map(|message| -> Result<HistoryEntry, ChatError> {
                let products = if message.product_ids.is_empty() {
                    Vec::new()
                } else {
                    self.catalog.find_many(&message.product_ids)?
                };
                Ok(TurnResult::from_message(message, products))
            })
            .collect()
    }

    /// Empty the session's in-memory window, waiting for a running turn
    /// on it to finish first. Persisted history is untouched.
    pub async fn clear_session_memory(&self, session_id: &str) -> Result<bool, ChatError> {
        let cleared = self.memory.forget(session_id).await?;
        info!(session_id, cleared, "Session memory cleared");
        Ok(cleared)
    }

    /// Mark a session inactive and drop its memory. Returns false if it
    /// was already inactive.
    pub async fn deactivate_session(&self, session_id: &str) -> Result<bool, ChatError> {
        if self.sessions.find(session_id)?.is_none() {
            return Err(ChatError::SessionNotFound(session_id.to_string()));
        }
        let changed = self.sessions.deactivate(session_id)?;
        self.memory.forget(session_id).await?;
        info!(session_id, changed, "Session deactivated");
        Ok(changed)
    }

    pub fn session_summary(&self, session_id: &str) -> Result<SessionSummary, ChatError> {
        let session = self
            .sessions
            .find(session_id)?
            .ok_or_else(|| ChatError::SessionNotFound(session_id.to_string()))?;
        let message_count = self.messages.count_for_session(session_id)?;
        Ok(SessionSummary {
            live_memory: self.memory.contains(session_id),
            session_id: session.id,
            user_id: session.user_id,
            is_active: session.is_active,
            state: session.session_data,
            message_count,
            created_at: session.created_at,
            updated_at: session.updated_at,
        })
    }

    /// Replace the session's opaque state map. The chat core never reads it.
    pub fn set_session_state(&self, session_id: &str, state: &Map<String, Value>) -> Result<(), ChatError> {
        match self.sessions.set_state(session_id, state) {
            Err(StoreyError::NotFound(_)) => Err(ChatError::SessionNotFound(session_id.to_string())),
            other => Ok(other?),
        }
    }

    fn validate(&self, session_id: &str, text: &str) -> Result<(), ChatError> {
        let sid = session_id.trim();
        if sid.is_empty() || sid.len() != session_id.len() || session_id.len() > MAX_SESSION_ID_LEN {
            return Err(ChatError::InvalidSessionId(session_id.to_string()));
        }
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if text.chars().count() > self.config.max_message_length {
            return Err(ChatError::MessageTooLong(self.config.max_message_length));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
