//! Vector index over the record store.
//!
//! Storage is delegated to `RecordStore`; similarity search is derived, not
//! stored: a brute-force cosine scan over every unit. O(N*d) per query,
//! which is the accepted cost for a corpus sized to one user's documents.

use std::sync::Arc;

use crate::core::config::RetrievalConfig;
use crate::core::errors::ApiError;
use crate::store::{RecordStore, StoredUnit};
use crate::vector_math::cosine_similarity;

/// A unit scored against one query vector. Derived, never persisted.
#[derive(Debug, Clone)]
pub struct RetrievalCandidate {
    pub unit: StoredUnit,
    pub score: f32,
}

#[derive(Clone)]
pub struct VectorIndex {
    store: Arc<dyn RecordStore>,
}

impl VectorIndex {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn insert(&self, text: &str, vector: &[f32]) -> Result<String, ApiError> {
        self.store.put_unit(text, vector).await
    }

    pub async fn all(&self) -> Result<Vec<StoredUnit>, ApiError> {
        self.store.list_units().await
    }

    pub async fn delete(&self, id: &str) -> Result<bool, ApiError> {
        self.store.delete_unit(id).await
    }

    pub async fn clear(&self) -> Result<usize, ApiError> {
        self.store.clear_units().await
    }

    /// Top-k units by cosine similarity, filtered by the optional minimum
    /// score. Ties are broken most-recently-inserted first.
    pub async fn search(
        &self,
        query: &[f32],
        options: &RetrievalConfig,
    ) -> Result<Vec<RetrievalCandidate>, ApiError> {
        let units = self.store.list_units().await?;

        let mut scored: Vec<RetrievalCandidate> = units
            .into_iter()
            .map(|unit| RetrievalCandidate {
                score: cosine_similarity(query, &unit.vector),
                unit,
            })
            .filter(|candidate| match options.min_score {
                Some(min) => candidate.score >= min,
                None => true,
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.unit.seq.cmp(&a.unit.seq))
        });
        scored.truncate(options.top_k);

        Ok(scored)
    }
}
