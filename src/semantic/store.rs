//! On-disk post store: vectors plus the posts they were computed from.
//!
//! A store is a directory holding two files written in the same order:
//! - `vectors.bin`: embeddings, see [`VectorStorage`]
//! - `posts.jsonl`: one JSON [`PostRecord`] per line
//!
//! The only way to change a store is to rebuild it. [`StoreWriter`] removes
//! the old directory, writes the new one next to it under a staging name and
//! renames it into place on [`StoreWriter::commit`]. A writer dropped before
//! committing deletes its staging directory, so readers never see a
//! half-written store.

use std::collections::{BTreeSet, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::posts::PostRecord;
use crate::semantic::embeddings::Embedder;
use crate::semantic::index::{IndexError, VectorIndex};
use crate::semantic::storage::{VectorStorage, VectorStorageError};

pub const VECTORS_FILE: &str = "vectors.bin";
pub const POSTS_FILE: &str = "posts.jsonl";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no post store at {0}, run `postsearch build` first")]
    Missing(PathBuf),

    #[error("store was built with {got}-dimensional vectors but the model produces {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("store was built with a different embedding model than '{0}'")]
    ModelMismatch(String),

    #[error("store is corrupt: {0}")]
    Corrupt(String),

    #[error("vector storage error: {0}")]
    Storage(VectorStorageError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("post serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    fn from_storage(err: VectorStorageError, model_name: &str) -> Self {
        match err {
            VectorStorageError::DimensionMismatch { expected, got } => {
                Self::DimensionMismatch { expected, got }
            }
            VectorStorageError::ModelMismatch => Self::ModelMismatch(model_name.to_string()),
            VectorStorageError::ChecksumMismatch
            | VectorStorageError::InvalidFormat(_)
            | VectorStorageError::VersionMismatch(..) => Self::Corrupt(err.to_string()),
            other => Self::Storage(other),
        }
    }
}

/// Metadata pre-filter applied before similarity ranking.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreFilter<'a> {
    /// Exact profile name.
    pub profile: Option<&'a str>,
    /// Inclusive lower bound on interactions.
    pub min_interactions: Option<u64>,
}

impl StoreFilter<'_> {
    pub fn matches(&self, post: &PostRecord) -> bool {
        self.profile.map_or(true, |profile| post.profile == profile)
            && self
                .min_interactions
                .map_or(true, |min| post.interactions >= min)
    }
}

/// A nearest-neighbor candidate.
#[derive(Debug, Clone)]
pub struct StoreHit<'a> {
    pub post: &'a PostRecord,
    /// Cosine similarity between the query and the post vector.
    pub cosine: f32,
}

/// Read-only handle on a built store.
pub struct PostStore {
    index: VectorIndex,
    posts: Vec<PostRecord>,
}

impl PostStore {
    /// Open the store in `dir` for queries embedded by `embedder`.
    ///
    /// Fails when the store was built with another model or dimensionality.
    pub fn open(dir: impl AsRef<Path>, embedder: &dyn Embedder) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        let storage = VectorStorage::new(dir.join(VECTORS_FILE));
        let posts_path = dir.join(POSTS_FILE);

        if !storage.exists() || !posts_path.exists() {
            return Err(StoreError::Missing(dir));
        }

        let index = storage
            .load(&embedder.model_id_hash(), embedder.dimensions())
            .map_err(|e| StoreError::from_storage(e, embedder.model_name()))?;

        let posts = read_posts(&posts_path)?;

        if posts.len() != index.len() {
            return Err(StoreError::Corrupt(format!(
                "{} vectors but {} posts",
                index.len(),
                posts.len()
            )));
        }

        log::info!("Opened post store at {} ({} posts)", dir.display(), posts.len());

        Ok(Self { index, posts })
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.index.dimensions()
    }

    /// All posts in insertion order.
    #[cfg(test)]
    pub fn posts(&self) -> &[PostRecord] {
        &self.posts
    }

    /// Distinct profile names, sorted.
    pub fn profiles(&self) -> Vec<String> {
        distinct_profiles(&self.posts)
    }

    /// Distinct profile names of the store in `dir`, read from the posts
    /// file alone. Needs no embedder, so no model is loaded.
    pub fn read_profiles(dir: impl AsRef<Path>) -> Result<Vec<String>, StoreError> {
        let dir = dir.as_ref();
        let posts_path = dir.join(POSTS_FILE);
        if !dir.join(VECTORS_FILE).exists() || !posts_path.exists() {
            return Err(StoreError::Missing(dir.to_path_buf()));
        }
        Ok(distinct_profiles(&read_posts(&posts_path)?))
    }

    /// Number of posts passing `filter`.
    pub fn count_matching(&self, filter: &StoreFilter<'_>) -> usize {
        self.posts.iter().filter(|post| filter.matches(post)).count()
    }

    /// Nearest neighbors of `embedding` among posts passing `filter`.
    pub fn query(
        &self,
        embedding: &[f32],
        filter: &StoreFilter<'_>,
        limit: usize,
    ) -> Result<Vec<StoreHit<'_>>, StoreError> {
        let results = self.index.search(
            embedding,
            |ordinal| {
                self.posts
                    .get(ordinal as usize)
                    .is_some_and(|post| filter.matches(post))
            },
            limit,
        )?;

        results
            .into_iter()
            .map(|result| {
                let post = self.posts.get(result.ordinal as usize).ok_or_else(|| {
                    StoreError::Corrupt(format!("vector {} has no post", result.ordinal))
                })?;
                Ok(StoreHit {
                    post,
                    cosine: result.cosine,
                })
            })
            .collect()
    }
}

fn read_posts(path: &Path) -> Result<Vec<PostRecord>, StoreError> {
    let mut posts = Vec::new();
    for (line_no, line) in BufReader::new(File::open(path)?).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let post: PostRecord = serde_json::from_str(&line).map_err(|e| {
            StoreError::Corrupt(format!("{POSTS_FILE} line {}: {e}", line_no + 1))
        })?;
        posts.push(post);
    }
    Ok(posts)
}

fn distinct_profiles(posts: &[PostRecord]) -> Vec<String> {
    posts
        .iter()
        .map(|post| post.profile.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Writes a fresh store, replacing whatever was at the target directory.
pub struct StoreWriter {
    target: PathBuf,
    staging: PathBuf,
    model_id: [u8; 32],
    index: VectorIndex,
    posts: BufWriter<File>,
    seen: HashSet<String>,
    committed: bool,
}

impl StoreWriter {
    /// Delete the store at `target` and start writing a new one.
    pub fn create(target: impl AsRef<Path>, embedder: &dyn Embedder) -> Result<Self, StoreError> {
        let target = target.as_ref().to_path_buf();
        let staging = staging_dir(&target);

        if target.exists() {
            log::info!("Removing existing store at {}", target.display());
            std::fs::remove_dir_all(&target)?;
        }
        if staging.exists() {
            log::warn!("Removing leftover staging directory {}", staging.display());
            std::fs::remove_dir_all(&staging)?;
        }
        std::fs::create_dir_all(&staging)?;

        let posts = match File::create(staging.join(POSTS_FILE)) {
            Ok(file) => BufWriter::new(file),
            Err(e) => {
                let _ = std::fs::remove_dir_all(&staging);
                return Err(e.into());
            }
        };

        Ok(Self {
            target,
            staging,
            model_id: embedder.model_id_hash(),
            index: VectorIndex::new(embedder.dimensions()),
            posts,
            seen: HashSet::new(),
            committed: false,
        })
    }

    /// Append a post with its embedding.
    ///
    /// Returns `false` without writing when a post with the same id is
    /// already in the store.
    pub fn add(&mut self, post: &PostRecord, embedding: Vec<f32>) -> Result<bool, StoreError> {
        if self.seen.contains(&post.id) {
            return Ok(false);
        }

        self.index.push(embedding)?;
        serde_json::to_writer(&mut self.posts, post)?;
        self.posts.write_all(b"\n")?;
        self.seen.insert(post.id.clone());

        Ok(true)
    }

    /// Flush everything to disk and move the store into place.
    pub fn commit(mut self) -> Result<usize, StoreError> {
        self.posts.flush()?;
        self.posts.get_ref().sync_all()?;

        VectorStorage::new(self.staging.join(VECTORS_FILE))
            .save(&self.index, &self.model_id)
            .map_err(StoreError::Storage)?;

        std::fs::rename(&self.staging, &self.target)?;
        self.committed = true;

        Ok(self.index.len())
    }
}

impl Drop for StoreWriter {
    fn drop(&mut self) {
        if !self.committed && self.staging.exists() {
            log::warn!("Discarding incomplete store at {}", self.staging.display());
            let _ = std::fs::remove_dir_all(&self.staging);
        }
    }
}

fn staging_dir(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "store".into());
    name.push(".staging");
    target.with_file_name(name)
}
