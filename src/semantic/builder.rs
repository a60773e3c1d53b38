//! One-shot index build: CSV → embeddings → post store.

use std::path::Path;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use crate::posts::{LoadError, LoadStats, PostRecord, RecordLoader};
use crate::semantic::embeddings::{Embedder, EmbeddingError};
use crate::semantic::store::{StoreError, StoreWriter};

/// Default number of posts embedded per model call.
pub const DEFAULT_BATCH_SIZE: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("failed to load posts: {0}")]
    Load(#[from] LoadError),

    #[error("failed to embed batch starting at post {offset}: {source}")]
    Embedding {
        offset: usize,
        #[source]
        source: EmbeddingError,
    },

    #[error("embedder returned {got} vectors for a batch of {expected}")]
    BatchSize { expected: usize, got: usize },

    #[error("failed to write store: {0}")]
    Store(#[from] StoreError),
}

/// Summary of a finished build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildReport {
    pub indexed: usize,
    pub duplicates: usize,
    pub batches: usize,
    pub load: LoadStats,
    pub elapsed: Duration,
}

/// Drives the loader through the embedder into a fresh store.
pub struct IndexBuilder {
    batch_size: usize,
    show_progress: bool,
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl IndexBuilder {
    /// A batch size of 0 is treated as 1.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Rebuild the store at `store_dir` from every record of `loader`.
    ///
    /// Any error aborts the build and leaves no store behind.
    pub fn build(
        &self,
        loader: &RecordLoader,
        embedder: &dyn Embedder,
        store_dir: &Path,
    ) -> Result<BuildReport, BuildError> {
        let started = Instant::now();
        log::info!(
            "Building post store at {} from {} (model '{}', batch size {})",
            store_dir.display(),
            loader.path().display(),
            embedder.model_name(),
            self.batch_size
        );

        let mut writer = StoreWriter::create(store_dir, embedder)?;
        let progress = self.progress_bar();

        let mut records = loader.records()?;
        let mut batch: Vec<PostRecord> = Vec::with_capacity(self.batch_size);
        let mut duplicates = 0;
        let mut batches = 0;
        let mut offset = 0;

        loop {
            let next = records.next().transpose()?;
            let done = next.is_none();
            if let Some(record) = next {
                batch.push(record);
            }

            if batch.len() == self.batch_size || (done && !batch.is_empty()) {
                duplicates += self.write_batch(&mut writer, embedder, &batch, offset)?;
                offset += batch.len();
                batches += 1;
                progress.inc(batch.len() as u64);
                batch.clear();
            }

            if done {
                break;
            }
        }

        let load = records.stats();
        let indexed = writer.commit()?;
        progress.finish_and_clear();

        let report = BuildReport {
            indexed,
            duplicates,
            batches,
            load,
            elapsed: started.elapsed(),
        };

        log::info!(
            "Indexed {} posts in {:.1}s ({} batches, {} duplicate ids skipped)",
            report.indexed,
            report.elapsed.as_secs_f64(),
            report.batches,
            report.duplicates
        );
        log::info!(
            "Skipped {} posts without text and {} without a recoverable profile",
            load.skipped_text,
            load.skipped_profile
        );
        log::info!(
            "Recovered {} profiles via page id and {} via URL slug",
            load.recovered_page_id,
            load.recovered_url
        );

        Ok(report)
    }

    /// Embed one batch and append it. Returns the number of duplicates.
    fn write_batch(
        &self,
        writer: &mut StoreWriter,
        embedder: &dyn Embedder,
        batch: &[PostRecord],
        offset: usize,
    ) -> Result<usize, BuildError> {
        let texts: Vec<String> = batch.iter().map(|post| post.text.clone()).collect();
        let embeddings = embedder
            .embed_batch(&texts)
            .map_err(|source| BuildError::Embedding { offset, source })?;

        if embeddings.len() != batch.len() {
            return Err(BuildError::BatchSize {
                expected: batch.len(),
                got: embeddings.len(),
            });
        }

        let mut duplicates = 0;
        for (post, embedding) in batch.iter().zip(embeddings) {
            if !writer.add(post, embedding)? {
                log::debug!("skipping duplicate post id {}", post.id);
                duplicates += 1;
            }
        }

        Ok(duplicates)
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {pos} posts embedded ({per_sec}) {elapsed}") {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(200));
        bar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posts::LoaderOptions;
    use crate::semantic::store::PostStore;
    use crate::tests::support::{write_posts_csv, FailingEmbedder, KeywordEmbedder};

    const ROWS: &[&str] = &[
        "1;p1;A;2024-01-01;100;https://fb.com/1;;klima politik;;",
        "2;p1;A;2024-01-02;5000;https://fb.com/2;;sundhedsreform;;",
        "3;p2;;2024-01-03;7;https://fb.com/3;https://www.facebook.com/bo-berg;skat og skole;;",
        "4;p3;;2024-01-04;7;https://fb.com/4;https://www.facebook.com/123;ingen profil;;",
        "5;p5;B;2024-01-05;9;https://fb.com/5;;   ;;",
    ];

    #[test]
    fn test_build_indexes_clean_records() {
        let tmp = tempfile::tempdir().unwrap();
        let csv = write_posts_csv(tmp.path(), ROWS);
        let store_dir = tmp.path().join("store");
        let embedder = KeywordEmbedder::new();
        let loader = RecordLoader::open(&csv, LoaderOptions::default()).unwrap();

        let report = IndexBuilder::new(2).build(&loader, &embedder, &store_dir).unwrap();

        assert_eq!(report.indexed, 3);
        assert_eq!(report.batches, 2);
        assert_eq!(report.load.skipped_profile, 1);
        assert_eq!(report.load.skipped_text, 1);
        assert_eq!(report.load.recovered_url, 1);

        let store = PostStore::open(&store_dir, &embedder).unwrap();
        let ids: Vec<&str> = store.posts().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(store.posts()[2].profile, "Bo Berg");
    }

    #[test]
    fn test_rebuild_keeps_same_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let csv = write_posts_csv(tmp.path(), ROWS);
        let store_dir = tmp.path().join("store");
        let embedder = KeywordEmbedder::new();
        let loader = RecordLoader::open(&csv, LoaderOptions::default()).unwrap();

        IndexBuilder::new(1).build(&loader, &embedder, &store_dir).unwrap();
        let first: Vec<String> = PostStore::open(&store_dir, &embedder)
            .unwrap()
            .posts()
            .iter()
            .map(|p| p.id.clone())
            .collect();

        IndexBuilder::new(3).build(&loader, &embedder, &store_dir).unwrap();
        let second: Vec<String> = PostStore::open(&store_dir, &embedder)
            .unwrap()
            .posts()
            .iter()
            .map(|p| p.id.clone())
            .collect();

        assert_eq!(first, second);
    }

    #[test]
    fn test_embedding_failure_leaves_no_store() {
        let tmp = tempfile::tempdir().unwrap();
        let csv = write_posts_csv(tmp.path(), ROWS);
        let store_dir = tmp.path().join("store");
        let loader = RecordLoader::open(&csv, LoaderOptions::default()).unwrap();

        IndexBuilder::new(1)
            .build(&loader, &KeywordEmbedder::new(), &store_dir)
            .unwrap();
        assert!(store_dir.exists());

        let failing = FailingEmbedder::failing_on_call(2);
        let result = IndexBuilder::new(1).build(&loader, &failing, &store_dir);

        assert!(matches!(result, Err(BuildError::Embedding { offset: 1, .. })));
        assert!(!store_dir.exists());
        assert!(std::fs::read_dir(tmp.path())
            .unwrap()
            .all(|entry| !entry.unwrap().file_name().to_string_lossy().ends_with(".staging")));
    }

    #[test]
    fn test_empty_input_builds_empty_store() {
        let tmp = tempfile::tempdir().unwrap();
        let csv = write_posts_csv(tmp.path(), &[]);
        let store_dir = tmp.path().join("store");
        let embedder = KeywordEmbedder::new();
        let loader = RecordLoader::open(&csv, LoaderOptions::default()).unwrap();

        let report = IndexBuilder::default().build(&loader, &embedder, &store_dir).unwrap();

        assert_eq!(report.indexed, 0);
        assert_eq!(report.batches, 0);
        assert!(PostStore::open(&store_dir, &embedder).unwrap().is_empty());
    }
}
