//! Route handler functions for all API endpoints.
//!
//! Each handler extracts path/query/body via axum extractors, calls the
//! chat orchestrator or the cart, and returns JSON responses.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use storey_chat::{HistoryEntry, SessionSummary, TurnResult};
use storey_core::types::{CartItem, Product};
use storey_storage::{CartService, Catalog};

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request / query types
// =============================================================================

/// Body for POST /chat/sessions/{session_id}/messages.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

/// Body for PUT /chat/sessions/{session_id}/state.
#[derive(Debug, Deserialize)]
pub struct SessionStateRequest {
    pub state: Map<String, Value>,
}

/// Body for POST /cart/add.
#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub product_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

/// Body for PUT /cart/{user_id}/items/{product_id}.
#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i64,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub model: String,
    pub products: u64,
    pub indexed_products: u64,
    pub live_sessions: u64,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub messages: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MemoryClearedResponse {
    pub session_id: String,
    pub cleared: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeactivatedResponse {
    pub session_id: String,
    pub deactivated: bool,
}

/// A cart line with its product expanded. `product` is null when the
/// product has since been deleted from the catalog.
#[derive(Debug, Serialize)]
pub struct CartLine {
    #[serde(flatten)]
    pub item: CartItem,
    pub product: Option<Product>,
}

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub user_id: String,
    pub items: Vec<CartLine>,
    pub total_quantity: u64,
    pub subtotal: f64,
}

#[derive(Debug, Serialize)]
pub struct CartUpdateResponse {
    pub item: Option<CartLine>,
    pub removed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CartRemovedResponse {
    pub user_id: String,
    pub removed: u64,
}

// =============================================================================
// Handler functions
// =============================================================================

/// GET /health - liveness plus catalog and index sizes.
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let products = state.catalog.count()?;
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        model: state.config.llm.model.clone(),
        products,
        indexed_products: state.index.len() as u64,
        live_sessions: state.orchestrator.memory().len() as u64,
    }))
}

/// POST /chat/sessions/{session_id}/messages - run one chat turn.
pub async fn send_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<TurnResult>, ApiError> {
    let user_id = body.user_id.as_deref().map(str::trim).filter(|u| !u.is_empty());
    let result = state
        .orchestrator
        .process_turn(&session_id, &body.message, user_id)
        .await?;
    Ok(Json(result))
}

/// GET /chat/sessions/{session_id}/history - past messages, oldest first.
pub async fn history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    if params.limit == Some(0) {
        return Err(ApiError::BadRequest("limit must be at least 1".to_string()));
    }
    let messages = state.orchestrator.get_history(&session_id, params.limit)?;
    debug!(session_id = %session_id, count = messages.len(), "History served");
    Ok(Json(HistoryResponse {
        session_id,
        messages,
    }))
}

/// DELETE /chat/sessions/{session_id}/memory - forget the memory window.
pub async fn clear_memory(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<MemoryClearedResponse>, ApiError> {
    let cleared = state.orchestrator.clear_session_memory(&session_id).await?;
    Ok(Json(MemoryClearedResponse {
        session_id,
        cleared,
    }))
}

/// DELETE /chat/sessions/{session_id} - deactivate the session.
pub async fn deactivate_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<DeactivatedResponse>, ApiError> {
    let deactivated = state.orchestrator.deactivate_session(&session_id).await?;
    Ok(Json(DeactivatedResponse {
        session_id,
        deactivated,
    }))
}

/// GET /chat/sessions/{session_id} - session record and message count.
pub async fn session_summary(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSummary>, ApiError> {
    Ok(Json(state.orchestrator.session_summary(&session_id)?))
}

/// PUT /chat/sessions/{session_id}/state - replace the opaque state map.
pub async fn set_session_state(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<SessionStateRequest>,
) -> Result<Json<SessionSummary>, ApiError> {
    state.orchestrator.set_session_state(&session_id, &body.state)?;
    Ok(Json(state.orchestrator.session_summary(&session_id)?))
}

// =============================================================================
// Cart
// =============================================================================

fn expand_line(state: &AppState, item: CartItem) -> Result<CartLine, ApiError> {
    let product = state.catalog.find_one(&item.product_id)?;
    Ok(CartLine { item, product })
}

/// GET /cart/{user_id} - the user's cart with products expanded.
pub async fn get_cart(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let items = state
        .cart
        .items(&user_id)?
        .into_iter()
        .map(|item| expand_line(&state, item))
        .collect::<Result<Vec<_>, _>>()?;

    let total_quantity = items.iter().map(|l| l.item.quantity as u64).sum();
    let subtotal = items
        .iter()
        .filter_map(|l| l.product.as_ref().map(|p| p.price * l.item.quantity as f64))
        .sum();
    debug!(user_id = %user_id, lines = items.len(), "Cart served");
    Ok(Json(CartResponse {
        user_id,
        items,
        total_quantity,
        subtotal,
    }))
}

/// POST /cart/add - add a product to a user's cart.
pub async fn add_to_cart(
    State(state): State<AppState>,
    Json(body): Json<AddToCartRequest>,
) -> Result<Json<CartLine>, ApiError> {
    let user_id = body.user_id.trim();
    let product_id = body.product_id.trim();
    if user_id.is_empty() || product_id.is_empty() {
        return Err(ApiError::BadRequest(
            "user_id and product_id are required".to_string(),
        ));
    }
    let item = state.cart.add(user_id, product_id, body.quantity)?;
    Ok(Json(expand_line(&state, item)?))
}

/// PUT /cart/{user_id}/items/{product_id} - set a line's quantity; zero
/// or less removes the line.
pub async fn update_cart_item(
    State(state): State<AppState>,
    Path((user_id, product_id)): Path<(String, String)>,
    Json(body): Json<UpdateQuantityRequest>,
) -> Result<Json<CartUpdateResponse>, ApiError> {
    let item = match state.cart.update_quantity(&user_id, &product_id, body.quantity)? {
        Some(item) => Some(expand_line(&state, item)?),
        None => None,
    };
    Ok(Json(CartUpdateResponse {
        removed: item.is_none(),
        item,
    }))
}

/// DELETE /cart/{user_id}/items/{product_id} - drop one line.
pub async fn remove_cart_item(
    State(state): State<AppState>,
    Path((user_id, product_id)): Path<(String, String)>,
) -> Result<Json<CartRemovedResponse>, ApiError> {
    let removed = state.cart.remove(&user_id, &product_id)?;
    Ok(Json(CartRemovedResponse {
        user_id,
        removed: removed as u64,
    }))
}

/// DELETE /cart/{user_id} - empty the cart.
pub async fn clear_cart(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<CartRemovedResponse>, ApiError> {
    let removed = state.cart.clear(&user_id)?;
    Ok(Json(CartRemovedResponse { user_id, removed }))
}
