//! Storey Vector crate - embeddings, the in-memory vector index, and the
//! product semantic index kept in sync with the catalog.

pub mod embedding;
pub mod index;
pub mod indexer;
pub mod product_index;

pub use embedding::{DynEmbeddingService, EmbeddingService, HashingEmbedding};
pub use index::{SearchHit, VectorIndex};
pub use indexer::{CatalogIndexer, ReindexReport};
pub use product_index::{product_metadata, ProductIndex, ScoredId, SemanticIndex};
