//! Storey application binary - composition root.
//!
//! Ties together all Storey crates into a single executable:
//! 1. Parse the CLI and load configuration from TOML
//! 2. Open the SQLite catalog and build the in-memory product index
//! 3. Run the requested command: serve the chat API, import a catalog
//!    file, or rebuild the index

mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;

use storey_api::state::AppState;
use storey_chat::build_model;
use storey_core::config::StoreyConfig;
use storey_core::types::Product;
use storey_storage::{Database, ProductRepository};
use storey_vector::{CatalogIndexer, HashingEmbedding, ProductIndex, SemanticIndex};

use cli::{CliArgs, Command};

/// Expand a leading `~` to the user's home directory.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if data_dir.starts_with("~/") || data_dir.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&data_dir[2..])
    } else {
        PathBuf::from(data_dir)
    }
}

/// Create every product in a JSON array file. Products that fail
/// validation are skipped and logged; the rest are still imported.
async fn import_catalog(indexer: &CatalogIndexer, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(file)?;
    let products: Vec<Product> = serde_json::from_str(&content)?;
    tracing::info!(path = %file.display(), count = products.len(), "Importing products");

    let mut created = 0usize;
    let mut skipped = 0usize;
    for product in products {
        let name = product.name.clone();
        match indexer.create_product(product).await {
            Ok(_) => created += 1,
            Err(e) => {
                skipped += 1;
                tracing::warn!(name = %name, error = %e, "Product skipped");
            }
        }
    }

    tracing::info!(created, skipped, "Import finished");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config is read before tracing starts so its log level can seed the
    // filter; a load failure is reported once the subscriber is up.
    let config_file = args.resolve_config_path();
    let (mut config, load_error) = if config_file.exists() {
        match StoreyConfig::load(&config_file) {
            Ok(config) => (config, None),
            Err(e) => (StoreyConfig::default(), Some(e)),
        }
    } else {
        (StoreyConfig::default(), None)
    };

    if let Some(data_dir) = args.resolve_data_dir() {
        config.general.data_dir = data_dir;
    }
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }
    config.general.port = args.resolve_port(config.general.port);

    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting Storey v{}", env!("CARGO_PKG_VERSION"));
    match load_error {
        Some(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load config, using defaults"
        ),
        None => tracing::info!(path = %config_file.display(), "Configuration resolved"),
    }
    config.validate()?;

    // Storage.
    let data_dir = resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    let db_path = data_dir.join("storey.db");
    let db = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    // Product index (single shared instance).
    let embedder = Arc::new(HashingEmbedding::new(config.search.embedding_dimensions));
    let index: Arc<dyn SemanticIndex> = Arc::new(ProductIndex::new(embedder));
    let catalog = Arc::new(ProductRepository::new(db.clone()));
    let indexer = CatalogIndexer::new(catalog, index.clone());
    tracing::info!(dimensions = config.search.embedding_dimensions, "Product index initialized");

    match args.command() {
        Command::Import { file } => import_catalog(&indexer, &file).await,
        Command::Reindex => {
            let report = indexer.reindex_all().await?;
            tracing::info!(indexed = report.indexed, failed = report.failed, "Reindex finished");
            Ok(())
        }
        Command::Serve => {
            let report = indexer.reindex_all().await?;
            tracing::info!(indexed = report.indexed, failed = report.failed, "Catalog indexed");

            let model = build_model(&config.llm)?;
            tracing::info!(provider = %config.llm.provider, model = %model.name(), "Language model ready");

            let state = AppState::new(config.clone(), db, index, model);
            storey_api::start_server(&config, state).await?;
            Ok(())
        }
    }
}
