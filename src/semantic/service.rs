//! Search service shared by the CLI and the web feed.
//!
//! - Lazy-loads the embedding model and the post store on first use
//! - Hands out cheap `Arc` handles so concurrent searches do not serialize
//! - Rebuilds the store and drops the stale handle afterwards

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::config::{Config, ConfigError};
use crate::posts::RecordLoader;
use crate::semantic::builder::{BuildError, BuildReport, IndexBuilder};
use crate::semantic::embeddings::{Embedder, EmbeddingError, EmbeddingModel};
use crate::semantic::query::{QueryEngine, QueryError, SearchHit, SearchRequest};
use crate::semantic::store::{PostStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Query(#[from] QueryError),

    #[error("Build failed: {0}")]
    Build(#[from] BuildError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Where the embedder comes from.
enum EmbedderSource {
    Model {
        name: String,
        cache_dir: PathBuf,
        download_timeout: Duration,
    },
    Ready(Arc<dyn Embedder>),
}

/// Store facts for the stats endpoint and the `profiles` command.
#[derive(Debug, Clone, Serialize)]
pub struct StoreSummary {
    pub posts: usize,
    pub profiles: usize,
    pub model: String,
    pub dimensions: usize,
}

pub struct SearchService {
    source: EmbedderSource,
    store_dir: PathBuf,
    default_top_k: usize,
    /// Mutex<Option<_>> instead of OnceLock because get_or_try_init is unstable.
    embedder: Mutex<Option<Arc<dyn Embedder>>>,
    store: Mutex<Option<Arc<PostStore>>>,
}

impl SearchService {
    /// Service backed by the configured fastembed model.
    ///
    /// Nothing is loaded until the first search.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            source: EmbedderSource::Model {
                name: config.embedding.model.clone(),
                cache_dir: config.base_path().to_path_buf(),
                download_timeout: Duration::from_secs(config.embedding.download_timeout_secs),
            },
            store_dir: config.store_dir()?,
            default_top_k: config.search.top_k,
            embedder: Mutex::new(None),
            store: Mutex::new(None),
        })
    }

    /// Service around an already constructed embedder.
    pub fn with_embedder(
        embedder: Arc<dyn Embedder>,
        store_dir: impl Into<PathBuf>,
        default_top_k: usize,
    ) -> Self {
        Self {
            source: EmbedderSource::Ready(embedder),
            store_dir: store_dir.into(),
            default_top_k,
            embedder: Mutex::new(None),
            store: Mutex::new(None),
        }
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    /// Check if the store has been opened.
    #[cfg(test)]
    pub fn is_initialized(&self) -> bool {
        self.store
            .lock()
            .ok()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Eagerly load the model and open the store.
    pub fn initialize(&self) -> Result<(), ServiceError> {
        self.store_handle().map(|_| ())
    }

    pub fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, ServiceError> {
        let embedder = self.embedder_handle()?;
        let store = self.store_handle()?;
        let hits = QueryEngine::new(embedder.as_ref(), &store).search(request)?;
        Ok(hits)
    }

    /// Sorted distinct profile names in the store.
    ///
    /// Reads the posts file directly until a search has opened the store,
    /// so listing profiles never loads the model.
    pub fn profiles(&self) -> Result<Vec<String>, ServiceError> {
        if let Some(store) = self.lock_store()?.as_ref() {
            return Ok(store.profiles());
        }
        Ok(PostStore::read_profiles(&self.store_dir)?)
    }

    pub fn summary(&self) -> Result<StoreSummary, ServiceError> {
        let embedder = self.embedder_handle()?;
        let store = self.store_handle()?;
        Ok(StoreSummary {
            posts: store.len(),
            profiles: store.profiles().len(),
            model: embedder.model_name().to_string(),
            dimensions: store.dimensions(),
        })
    }

    /// Rebuild the store from `loader`. The next search reopens it.
    pub fn rebuild(
        &self,
        loader: &RecordLoader,
        builder: &IndexBuilder,
    ) -> Result<BuildReport, ServiceError> {
        let embedder = self.embedder_handle()?;

        // readers holding the old Arc keep their snapshot
        *self.lock_store()? = None;

        let report = builder.build(loader, embedder.as_ref(), &self.store_dir)?;
        Ok(report)
    }

    fn embedder_handle(&self) -> Result<Arc<dyn Embedder>, ServiceError> {
        let mut guard = self
            .embedder
            .lock()
            .map_err(|e| ServiceError::Internal(format!("Lock poisoned: {}", e)))?;

        if let Some(embedder) = guard.as_ref() {
            return Ok(Arc::clone(embedder));
        }

        let embedder: Arc<dyn Embedder> = match &self.source {
            EmbedderSource::Model {
                name,
                cache_dir,
                download_timeout,
            } => {
                log::info!("Initializing search with model '{}'", name);
                let model = EmbeddingModel::new(name, cache_dir.clone(), Some(*download_timeout))?;
                Arc::new(model)
            }
            EmbedderSource::Ready(embedder) => Arc::clone(embedder),
        };

        *guard = Some(Arc::clone(&embedder));
        Ok(embedder)
    }

    fn store_handle(&self) -> Result<Arc<PostStore>, ServiceError> {
        let embedder = self.embedder_handle()?;
        let mut guard = self.lock_store()?;

        if let Some(store) = guard.as_ref() {
            return Ok(Arc::clone(store));
        }

        let store = Arc::new(PostStore::open(&self.store_dir, embedder.as_ref())?);
        *guard = Some(Arc::clone(&store));
        Ok(store)
    }

    fn lock_store(&self) -> Result<std::sync::MutexGuard<'_, Option<Arc<PostStore>>>, ServiceError> {
        self.store
            .lock()
            .map_err(|e| ServiceError::Internal(format!("Lock poisoned: {}", e)))
    }
}
