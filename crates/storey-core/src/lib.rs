pub mod config;
pub mod error;
pub mod types;

pub use config::StoreyConfig;
pub use error::{Result, StoreyError};
pub use types::*;
