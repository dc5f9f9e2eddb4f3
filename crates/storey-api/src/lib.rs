//! Storey API crate - thin axum HTTP layer over the chat core.
//!
//! Exposes chat turns, session history, memory and session lifecycle
//! endpoints, plus a health check.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
