//! Storey Storage crate - SQLite persistence for the catalog, chat history
//! and carts.
//!
//! Provides a WAL-mode SQLite database with migrations and repository
//! implementations for products, chat sessions, messages and cart lines.

pub mod cart;
pub mod catalog;
pub mod db;
pub mod messages;
pub mod migrations;
pub mod sessions;

pub use cart::{CartRepository, CartService};
pub use catalog::{Catalog, ProductRepository};
pub use db::Database;
pub use messages::MessageRepository;
pub use sessions::SessionRepository;
