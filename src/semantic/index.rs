//! In-memory vector index with cosine similarity search.
//!
//! Vectors are addressed by their insertion ordinal, which is also the
//! position of the matching post in the store's document list.

use rayon::prelude::*;

/// In-memory vector index for semantic search.
///
/// Supports:
/// - Append-only inserts (the store is rebuilt, never patched)
/// - Cosine similarity search with a pre-filter on ordinals
pub struct VectorIndex {
    /// Ordinal -> embedding
    entries: Vec<Vec<f32>>,
    /// Expected embedding dimensions
    dimensions: usize,
}

/// Search result from the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Insertion ordinal
    pub ordinal: u64,
    /// Cosine similarity (-1.0 to 1.0)
    pub cosine: f32,
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cannot store or search with zero-norm vector")]
    ZeroNormVector,
}

impl VectorIndex {
    /// Create a new empty vector index with specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self {
            entries: Vec::new(),
            dimensions,
        }
    }

    /// Create an index with pre-allocated capacity.
    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an embedding and return its ordinal.
    ///
    /// Returns an error if the embedding has the wrong length or zero norm.
    pub fn push(&mut self, embedding: Vec<f32>) -> Result<u64, IndexError> {
        self.check_dimensions(&embedding)?;

        if Self::l2_norm(&embedding) < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        self.entries.push(embedding);
        Ok(self.entries.len() as u64 - 1)
    }

    #[cfg(test)]
    pub fn get(&self, ordinal: u64) -> Option<&[f32]> {
        self.entries.get(ordinal as usize).map(Vec::as_slice)
    }

    /// Iterate over all entries in ordinal order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &[f32])> {
        self.entries
            .iter()
            .enumerate()
            .map(|(ordinal, embedding)| (ordinal as u64, embedding.as_slice()))
    }

    /// Search for similar vectors using cosine similarity.
    ///
    /// # Arguments
    /// * `query` - The query embedding vector
    /// * `accept` - Pre-filter; only ordinals it accepts are scored
    /// * `limit` - Maximum number of results to return
    ///
    /// # Returns
    /// Results sorted by similarity, highest first. Equal scores keep
    /// insertion order.
    pub fn search<F>(
        &self,
        query: &[f32],
        accept: F,
        limit: usize,
    ) -> Result<Vec<SearchResult>, IndexError>
    where
        F: Fn(u64) -> bool + Sync,
    {
        self.check_dimensions(query)?;

        let query_norm = Self::l2_norm(query);
        if query_norm < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        let mut results: Vec<SearchResult> = self
            .entries
            .par_iter()
            .enumerate()
            .filter(|(ordinal, _)| accept(*ordinal as u64))
            .map(|(ordinal, embedding)| SearchResult {
                ordinal: ordinal as u64,
                cosine: Self::cosine_similarity(query, embedding, query_norm),
            })
            .collect();

        // stable: ties stay in ordinal order
        results.sort_by(|a, b| b.cosine.total_cmp(&a.cosine));
        results.truncate(limit);

        Ok(results)
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }
        Ok(())
    }

    fn l2_norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// Cosine similarity with a precomputed query norm.
    fn cosine_similarity(query: &[f32], target: &[f32], query_norm: f32) -> f32 {
        let target_norm = Self::l2_norm(target);
        if target_norm < f32::EPSILON {
            return 0.0;
        }

        let dot_product: f32 = query.iter().zip(target.iter()).map(|(a, b)| a * b).sum();
        dot_product / (query_norm * target_norm)
    }
}
