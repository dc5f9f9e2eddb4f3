//! In-memory vector index with brute-force cosine similarity search.
//!
//! All searches are O(n), which is fine for a catalog-sized collection.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use storey_core::error::StoreyError;

/// A single hit returned from a vector search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    /// Cosine similarity score in `[-1.0, 1.0]`.
    pub score: f64,
    pub metadata: Value,
}

#[derive(Debug, Clone)]
struct VectorEntry {
    embedding: Vec<f32>,
    metadata: Value,
}

/// In-memory vector index using brute-force cosine similarity.
///
/// Thread-safe via interior RwLock. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    entries: Arc<RwLock<HashMap<String, VectorEntry>>>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a vector with metadata, overwriting any entry with the same id.
    pub fn insert(&self, id: &str, embedding: Vec<f32>, metadata: Value) -> Result<(), StoreyError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| StoreyError::Search(format!("Lock poisoned: {}", e)))?;
        entries.insert(id.to_string(), VectorEntry { embedding, metadata });
        Ok(())
    }

    /// The k nearest entries to `query`, best first. Ties are broken by id
    /// so results are stable.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, StoreyError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| StoreyError::Search(format!("Lock poisoned: {}", e)))?;

        let mut scored: Vec<SearchHit> = entries
            .iter()
            .map(|(id, entry)| SearchHit {
                id: id.clone(),
                score: cosine_similarity(query, &entry.embedding),
                metadata: entry.metadata.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(k);

        Ok(scored)
    }

    /// Replace an entry's metadata, keeping its vector. Returns whether the
    /// entry existed.
    pub fn set_metadata(&self, id: &str, metadata: Value) -> Result<bool, StoreyError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| StoreyError::Search(format!("Lock poisoned: {}", e)))?;
        match entries.get_mut(id) {
            Some(entry) => {
                entry.metadata = metadata;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove an entry. Returns whether it existed.
    pub fn delete(&self, id: &str) -> Result<bool, StoreyError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| StoreyError::Search(format!("Lock poisoned: {}", e)))?;
        Ok(entries.remove(id).is_some())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().map(|e| e.contains_key(id)).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cosine similarity between two vectors; 0.0 if either is zero or the
/// lengths differ.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
