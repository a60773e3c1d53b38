//! Semantic search over post embeddings.
//!
//! Uses fastembed-rs for embeddings and an in-memory vector index loaded
//! from a rebuilt-from-scratch on-disk store.
//!
//! # Architecture
//!
//! - `embeddings`: Wraps fastembed behind the [`Embedder`] trait
//! - `index`: In-memory vector index with cosine similarity search
//! - `storage`: Binary file I/O for vectors.bin persistence
//! - `store`: Vectors and their posts as one directory, staged writes
//! - `builder`: CSV to store in embedding batches
//! - `query`: Filtered similarity search with the interaction boost
//! - `service`: Lazily loaded model and store shared by CLI and web

pub mod builder;
pub mod embeddings;
mod index;
pub mod query;
mod service;
mod storage;
pub mod store;

pub use builder::{IndexBuilder, DEFAULT_BATCH_SIZE};
pub use embeddings::{Embedder, EmbeddingError, EmbeddingModel};
pub use query::{QueryEngine, QueryError, SearchHit, SearchRequest, DEFAULT_TOP_K};
pub use service::{SearchService, ServiceError, StoreSummary};
pub use store::{PostStore, StoreError, StoreWriter};

/// Default embedding model name. Multilingual, the posts are mostly Danish.
pub const DEFAULT_MODEL: &str = "paraphrase-multilingual-MiniLM-L12-v2";
