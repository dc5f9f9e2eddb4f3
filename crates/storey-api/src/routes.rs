//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, compression,
//! and all endpoint handlers.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use storey_core::config::StoreyConfig;
use storey_core::error::StoreyError;

use crate::handlers;
use crate::state::AppState;

/// Largest accepted request body.
const BODY_LIMIT: usize = 64 * 1024;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // Allow the storefront served from localhost on the API port and the
    // dev server on the next one.
    let port = state.config.general.port;
    let origins: Vec<HeaderValue> = [port, port.saturating_add(1)]
        .iter()
        .flat_map(|p| [format!("http://127.0.0.1:{}", p), format!("http://localhost:{}", p)])
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    let chat_routes = Router::new()
        .route("/chat/sessions/{session_id}/messages", post(handlers::send_message))
        .route("/chat/sessions/{session_id}/history", get(handlers::history))
        .route("/chat/sessions/{session_id}/memory", delete(handlers::clear_memory))
        .route("/chat/sessions/{session_id}/state", put(handlers::set_session_state))
        .route(
            "/chat/sessions/{session_id}",
            get(handlers::session_summary).delete(handlers::deactivate_session),
        );

    let cart_routes = Router::new()
        .route("/cart/add", post(handlers::add_to_cart))
        .route("/cart/{user_id}", get(handlers::get_cart).delete(handlers::clear_cart))
        .route(
            "/cart/{user_id}/items/{product_id}",
            put(handlers::update_cart_item).delete(handlers::remove_cart_item),
        );

    Router::new()
        .route("/health", get(handlers::health))
        .merge(chat_routes)
        .merge(cart_routes)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the configured port.
///
/// Binds to 127.0.0.1 (localhost only).
pub async fn start_server(config: &StoreyConfig, state: AppState) -> Result<(), StoreyError> {
    let addr = format!("127.0.0.1:{}", config.general.port);
    let router = create_router(state);

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| StoreyError::Api(format!("Failed to bind: {}", e)))?;

    axum::serve(listener, router)
        .await
        .map_err(|e| StoreyError::Api(format!("Server error: {}", e)))?;

    Ok(())
}
