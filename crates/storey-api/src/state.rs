//! Application state shared across all route handlers.
//!
//! AppState is the composition of the chat core: it wires the catalog,
//! cart, semantic index and language model into a `ChatOrchestrator`.
//! It is passed to handlers via axum's State extractor.

use std::sync::Arc;
use std::time::Instant;

use storey_chat::{
    ChatOrchestrator, ConversationAgent, LanguageModel, ProductResolver, ToolRegistry, SYSTEM_PROMPT,
};
use storey_core::config::StoreyConfig;
use storey_storage::{CartRepository, Database, ProductRepository};
use storey_vector::SemanticIndex;

/// Shared application state. All fields are `Arc` for cheap cloning
/// across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<StoreyConfig>,
    /// Turn processing and history.
    pub orchestrator: Arc<ChatOrchestrator>,
    /// Product catalog, for health reporting and cart expansion.
    pub catalog: Arc<ProductRepository>,
    /// Shopping carts, shared with the `add_to_cart` tool.
    pub cart: Arc<CartRepository>,
    /// Semantic product index.
    pub index: Arc<dyn SemanticIndex>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: StoreyConfig,
        database: Arc<Database>,
        index: Arc<dyn SemanticIndex>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        let catalog = Arc::new(ProductRepository::new(database.clone()));
        let cart = Arc::new(CartRepository::new(database.clone()));
        let tools = ToolRegistry::standard(catalog.clone(), index.clone(), cart.clone(), &config.search);
        let agent = ConversationAgent::new(
            model,
            Arc::new(tools),
            ProductResolver::new(catalog.clone()),
            SYSTEM_PROMPT,
            config.chat.tool_call_budget,
        );
        let orchestrator =
            ChatOrchestrator::new(config.chat.clone(), database, catalog.clone(), agent);

        Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            catalog,
            cart,
            index,
            start_time: Instant::now(),
        }
    }
}
