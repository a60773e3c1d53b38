//! Query-time ranking: similarity search plus optional engagement boost.
//!
//! With boosting enabled the engine pulls `top_k * OVERSAMPLE_FACTOR`
//! candidates and re-ranks them by
//!
//!   hybrid = SIMILARITY_WEIGHT * similarity + INTERACTION_WEIGHT * engagement
//!
//! where `engagement` is `ln(1 + interactions)` min-max normalized over the
//! candidate pool. The weights are fixed; callers only switch boosting on.

use serde::Serialize;

use crate::posts::PostRecord;
use crate::semantic::embeddings::{Embedder, EmbeddingError};
use crate::semantic::store::{PostStore, StoreError, StoreFilter};

/// Default number of results.
pub const DEFAULT_TOP_K: usize = 5;

/// Candidate pool multiplier when boosting.
const OVERSAMPLE_FACTOR: usize = 3;

const SIMILARITY_WEIGHT: f32 = 0.7;
const INTERACTION_WEIGHT: f32 = 0.3;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to embed query: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("{0}")]
    Store(#[from] StoreError),
}

/// A search as issued by the CLI or the web feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub profile: Option<String>,
    pub min_interactions: Option<u64>,
    pub top_k: usize,
    pub boost_interactions: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            profile: None,
            min_interactions: None,
            top_k: DEFAULT_TOP_K,
            boost_interactions: false,
        }
    }

    fn validate(&self) -> Result<&str, QueryError> {
        let query = self.query.trim();
        if query.is_empty() {
            return Err(QueryError::InvalidInput("query must not be empty".to_string()));
        }
        if self.top_k == 0 {
            return Err(QueryError::InvalidInput("top_k must be at least 1".to_string()));
        }
        Ok(query)
    }
}

/// One ranked result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub post: PostRecord,
    /// Similarity in [0, 1]: `(1 + cosine) / 2`.
    pub similarity: f32,
    /// Blended score, present only when boosting re-ranked the pool.
    pub hybrid_score: Option<f32>,
}

impl SearchHit {
    /// The score the hit was ranked by.
    pub fn score(&self) -> f32 {
        self.hybrid_score.unwrap_or(self.similarity)
    }
}

/// Runs searches against one store with the embedder it was built with.
pub struct QueryEngine<'a> {
    embedder: &'a dyn Embedder,
    store: &'a PostStore,
}

impl<'a> QueryEngine<'a> {
    pub fn new(embedder: &'a dyn Embedder, store: &'a PostStore) -> Self {
        Self { embedder, store }
    }

    pub fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, QueryError> {
        let query = request.validate()?;

        let embedding = self.embedder.embed(query)?;
        if embedding.len() != self.store.dimensions() {
            return Err(StoreError::DimensionMismatch {
                expected: embedding.len(),
                got: self.store.dimensions(),
            }
            .into());
        }

        let profile = request
            .profile
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());
        let filter = StoreFilter {
            profile,
            min_interactions: request.min_interactions,
        };

        let fetch_k = if request.boost_interactions {
            request.top_k.saturating_mul(OVERSAMPLE_FACTOR)
        } else {
            request.top_k
        };

        let mut hits: Vec<SearchHit> = self
            .store
            .query(&embedding, &filter, fetch_k)?
            .into_iter()
            .map(|hit| SearchHit {
                post: hit.post.clone(),
                similarity: ((1.0 + hit.cosine) / 2.0).clamp(0.0, 1.0),
                hybrid_score: None,
            })
            .collect();

        if request.boost_interactions {
            boost(&mut hits);
        }
        hits.truncate(request.top_k);

        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "query={query:?} profile={profile:?} min_interactions={:?} boost={} matching={} hits={}",
                request.min_interactions,
                request.boost_interactions,
                self.store.count_matching(&filter),
                hits.len()
            );
        }

        Ok(hits)
    }
}

/// Blend similarity with normalized engagement and re-sort the pool.
///
/// A pool where every post has the same interaction count carries no
/// engagement signal and is left ordered by similarity.
fn boost(hits: &mut [SearchHit]) {
    let scaled: Vec<f32> = hits
        .iter()
        .map(|hit| (hit.post.interactions as f64).ln_1p() as f32)
        .collect();

    let min = scaled.iter().copied().fold(f32::INFINITY, f32::min);
    let max = scaled.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let spread = max - min;
    if spread.is_nan() || spread <= f32::EPSILON {
        return;
    }

    for (hit, value) in hits.iter_mut().zip(scaled) {
        let engagement = (value - min) / spread;
        hit.hybrid_score = Some(SIMILARITY_WEIGHT * hit.similarity + INTERACTION_WEIGHT * engagement);
    }

    // stable: equal scores keep similarity order
    hits.sort_by(|a, b| b.score().total_cmp(&a.score()));
}
