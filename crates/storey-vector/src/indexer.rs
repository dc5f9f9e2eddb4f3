//! Keeps the catalog and the semantic index in step.
//!
//! Product writes that affect search go through `CatalogIndexer` so the
//! vector for a product always reflects its current text.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use storey_core::error::StoreyError;
use storey_core::types::Product;
use storey_storage::Catalog;

use crate::product_index::{product_metadata, SemanticIndex};

/// Outcome of a full reindex.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReindexReport {
    pub indexed: usize,
    pub failed: usize,
}

pub struct CatalogIndexer {
    catalog: Arc<dyn Catalog>,
    index: Arc<dyn SemanticIndex>,
}

impl CatalogIndexer {
    pub fn new(catalog: Arc<dyn Catalog>, index: Arc<dyn SemanticIndex>) -> Self {
        Self { catalog, index }
    }

    /// Embed and store a new product. The vector is written first so a
    /// product never lands in the catalog unsearchable; if the catalog
    /// insert then fails the vector is removed again.
    pub async fn create_product(&self, mut product: Product) -> Result<Product, StoreyError> {
        if product.name.trim().is_empty() {
            return Err(StoreyError::InvalidInput("product name is required".to_string()));
        }
        if product.price < 0.0 {
            return Err(StoreyError::InvalidInput("price must not be negative".to_string()));
        }
        if self.catalog.find_one(&product.id)?.is_some() {
            return Err(StoreyError::InvalidInput(format!(
                "product {} already exists",
                product.id
            )));
        }

        if product.is_active {
            self.index
                .upsert(&product.id, &product.search_text(), product_metadata(&product))
                .await?;
            product.embedding_id = Some(product.id.clone());
        }

        if let Err(e) = self.catalog.insert(&product) {
            if let Err(cleanup) = self.index.delete(&product.id).await {
                warn!(product_id = %product.id, error = %cleanup, "Failed to roll back vector");
            }
            return Err(e);
        }

        info!(product_id = %product.id, name = %product.name, "Product created");
        Ok(product)
    }

    /// Replace a product. The vector is recomputed only when text that
    /// feeds the embedding changed; otherwise just its metadata is
    /// refreshed. Deactivated products leave the index.
    pub async fn update_product(&self, mut product: Product) -> Result<Product, StoreyError> {
        let existing = self
            .catalog
            .find_one(&product.id)?
            .ok_or_else(|| StoreyError::NotFound(format!("product {}", product.id)))?;

        product.created_at = existing.created_at;
        product.updated_at = Utc::now();

        if !product.is_active {
            self.index.delete(&product.id).await?;
            product.embedding_id = None;
        } else if existing.content_differs(&product) || !existing.is_active {
            debug!(product_id = %product.id, "Product text changed, re-embedding");
            self.index
                .upsert(&product.id, &product.search_text(), product_metadata(&product))
                .await?;
            product.embedding_id = Some(product.id.clone());
        } else if !self
            .index
            .update_metadata(&product.id, product_metadata(&product))
            .await?
        {
            // Never embedded (e.g. imported straight into the catalog).
            self.index
                .upsert(&product.id, &product.search_text(), product_metadata(&product))
                .await?;
            product.embedding_id = Some(product.id.clone());
        }

        self.catalog.replace(&product)?;
        info!(product_id = %product.id, "Product updated");
        Ok(product)
    }

    /// Remove a product from the index, then from the catalog.
    pub async fn delete_product(&self, id: &str) -> Result<bool, StoreyError> {
        self.index.delete(id).await?;
        let removed = self.catalog.delete(id)?;
        if removed {
            info!(product_id = %id, "Product deleted");
        }
        Ok(removed)
    }

    /// Embed every active product. Used at startup since the index lives
    /// in memory. A product that fails to embed is logged and skipped.
    pub async fn reindex_all(&self) -> Result<ReindexReport, StoreyError> {
        let products = self.catalog.active_products()?;
        let mut report = ReindexReport::default();

        for product in &products {
            match self
                .index
                .upsert(&product.id, &product.search_text(), product_metadata(product))
                .await
            {
                Ok(()) => report.indexed += 1,
                Err(e) => {
                    warn!(product_id = %product.id, error = %e, "Failed to index product");
                    report.failed += 1;
                }
            }
        }

        info!(
            indexed = report.indexed,
            failed = report.failed,
            "Catalog reindex complete"
        );
        Ok(report)
    }
}
