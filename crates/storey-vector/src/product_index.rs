//! Text-level semantic index over catalog products.
//!
//! `SemanticIndex` is the interface the chat tools search through: callers
//! hand it text, never vectors. `ProductIndex` pairs an embedder with a
//! `VectorIndex` to implement it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use storey_core::error::StoreyError;
use storey_core::types::Product;

use crate::embedding::DynEmbeddingService;
use crate::index::VectorIndex;

/// A ranked match from a semantic query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredId {
    pub id: String,
    pub score: f64,
}

/// Embeds text and answers nearest-neighbour queries by id.
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Embed `text` and store it under `id`, replacing any previous entry.
    async fn upsert(&self, id: &str, text: &str, metadata: Value) -> Result<(), StoreyError>;

    /// Replace the metadata of an existing entry without re-embedding.
    /// Returns false if there is no entry for `id`.
    async fn update_metadata(&self, id: &str, metadata: Value) -> Result<bool, StoreyError>;

    /// Returns whether an entry was removed.
    async fn delete(&self, id: &str) -> Result<bool, StoreyError>;

    /// The `k` entries most similar to `text`, best first. Entries with no
    /// positive similarity are not matches and are left out.
    async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredId>, StoreyError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Metadata stored alongside each product vector.
pub fn product_metadata(product: &Product) -> Value {
    json!({
        "category": product.category,
        "subcategory": product.subcategory,
        "brand": product.brand,
        "price": product.price,
        "rating": product.rating,
        "in_stock": product.is_in_stock(),
    })
}

/// `SemanticIndex` backed by an embedder and the in-memory vector index.
pub struct ProductIndex {
    embedder: Arc<dyn DynEmbeddingService>,
    index: VectorIndex,
}

impl ProductIndex {
    pub fn new(embedder: Arc<dyn DynEmbeddingService>) -> Self {
        Self {
            embedder,
            index: VectorIndex::new(),
        }
    }

    /// Underlying vector store, for inspection.
    pub fn vectors(&self) -> &VectorIndex {
        &self.index
    }
}

#[async_trait]
impl SemanticIndex for ProductIndex {
    async fn upsert(&self, id: &str, text: &str, metadata: Value) -> Result<(), StoreyError> {
        let embedding = self.embedder.embed_boxed(text).await?;
        self.index.insert(id, embedding, metadata)?;
        debug!(id, "Vector upserted");
        Ok(())
    }

    async fn update_metadata(&self, id: &str, metadata: Value) -> Result<bool, StoreyError> {
        self.index.set_metadata(id, metadata)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreyError> {
        self.index.delete(id)
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredId>, StoreyError> {
        if k == 0 || self.index.is_empty() {
            return Ok(Vec::new());
        }
        let embedding = self.embedder.embed_boxed(text).await?;
        let hits = self.index.search(&embedding, k)?;
        debug!(k, hits = hits.len(), "Semantic query");
        Ok(hits
            .into_iter()
            .filter(|h| h.score > 0.0)
            .map(|h| ScoredId {
                id: h.id,
                score: h.score,
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}
