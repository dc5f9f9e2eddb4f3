//! Embedding service trait and the built-in hashing embedder.
//!
//! `HashingEmbedding` folds lower-cased word tokens into a fixed number of
//! buckets (feature hashing), so texts sharing vocabulary land close
//! together under cosine similarity. It needs no model files and is
//! deterministic within a process, which matches the in-memory index that
//! is rebuilt from the catalog on every start.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use storey_core::error::StoreyError;

/// Service for generating text embeddings.
///
/// Implementations convert text into fixed-dimensional vectors. Used for
/// both indexing products and embedding queries.
pub trait EmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Vec<f32>, StoreyError>> + Send;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

/// Object-safe version of [`EmbeddingService`] for dynamic dispatch.
///
/// `EmbeddingService::embed` returns `impl Future`, so it is not
/// object-safe. This trait boxes the future instead; the blanket impl
/// below covers every `EmbeddingService`.
pub trait DynEmbeddingService: Send + Sync {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>, StoreyError>> + Send + 'a>>;

    fn dimensions(&self) -> usize;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>, StoreyError>> + Send + 'a>> {
        Box::pin(self.embed(text))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

// ---------------------------------------------------------------------------
// HashingEmbedding - bag-of-words feature hashing
// ---------------------------------------------------------------------------

/// Bag-of-words embedder using the hashing trick.
///
/// Each token adds `±1` to one bucket (the sign comes from a second hash to
/// keep collisions from always reinforcing each other). The result is
/// L2-normalised.
#[derive(Debug, Clone)]
pub struct HashingEmbedding {
    dimensions: usize,
}

impl HashingEmbedding {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        let h = hasher.finish();
        let idx = (h % self.dimensions as u64) as usize;
        let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
        (idx, sign)
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in Self::tokens(text) {
            let (idx, sign) = self.bucket(&token);
            vector[idx] += sign;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut vector {
                *val /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbedding {
    fn default() -> Self {
        Self::new(384)
    }
}

impl EmbeddingService for HashingEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreyError> {
        if text.trim().is_empty() {
            return Err(StoreyError::Embedding("Cannot embed empty text".to_string()));
        }
        Ok(self.vectorize(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
