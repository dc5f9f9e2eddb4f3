//! CLI argument definitions for the Storey binary.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Storey - a conversational shopping assistant over a product catalog.
#[derive(Parser, Debug)]
#[command(name = "storey", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// API server port.
    #[arg(short = 'p', long = "port", global = true)]
    pub port: Option<u16>,

    /// Data directory holding the SQLite database.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP API (default).
    Serve,
    /// Create products from a JSON array file and index them.
    Import {
        /// JSON file containing an array of products.
        file: PathBuf,
    },
    /// Rebuild the semantic index from the catalog.
    Reindex,
}

impl CliArgs {
    /// The subcommand to run; `serve` when none was given.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }

    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > STOREY_CONFIG env var > ~/.storey/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("STOREY_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the API server port.
    ///
    /// Priority: --port flag > STOREY_PORT env var > config file value > 5000.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        if let Some(p) = self.port {
            return p;
        }
        if let Ok(val) = std::env::var("STOREY_PORT") {
            if let Ok(p) = val.parse::<u16>() {
                return p;
            }
        }
        if config_port != 0 {
            return config_port;
        }
        5000
    }

    /// Data directory override from --data-dir, if given.
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    /// Log level override from --log-level, if given.
    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".storey").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".storey").join("config.toml");
    }
    PathBuf::from("config.toml")
}
