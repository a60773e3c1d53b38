//! Deterministic fakes shared by unit and pipeline tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::posts::PostRecord;
use crate::semantic::{Embedder, EmbeddingError, StoreWriter};

pub const CSV_HEADER: &str =
    "ccpost_id;ccpageid;profile;date;total_interactions;post_url;facebook_url;post_text;country;category";

const DEFAULT_DIMENSIONS: usize = 256;

/// Hashes character trigrams into a fixed number of buckets.
///
/// Texts sharing words land close together, which is enough to make
/// ranking assertions without a real model.
pub struct KeywordEmbedder {
    name: String,
    dimensions: usize,
    overrides: HashMap<String, Vec<f32>>,
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self::named("keyword-test")
    }

    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dimensions: DEFAULT_DIMENSIONS,
            overrides: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions,
            ..Self::new()
        }
    }

    /// Pin the vector returned for an exact text.
    pub fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        assert_eq!(vector.len(), self.dimensions, "override has wrong length");
        self.overrides.insert(text.to_string(), vector);
        self
    }

    /// Number of `embed_batch` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        if let Some(vector) = self.overrides.get(text) {
            return vector.clone();
        }

        let mut vector = vec![0.0; self.dimensions];
        for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
            let chars: Vec<char> = word.chars().collect();
            if chars.is_empty() {
                continue;
            }
            if chars.len() < 3 {
                vector[self.bucket(word)] += 1.0;
                continue;
            }
            for gram in chars.windows(3) {
                let gram: String = gram.iter().collect();
                vector[self.bucket(&gram)] += 1.0;
            }
        }

        // keep every vector non-zero so cosine is defined
        if vector.iter().all(|v| *v == 0.0) {
            vector[0] = 1.0;
        }
        vector
    }

    fn bucket(&self, token: &str) -> usize {
        // FNV-1a
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in token.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x100000001b3);
        }
        (hash % self.dimensions as u64) as usize
    }
}

impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|text| self.vectorize(text)).collect())
    }
}

/// Behaves like [`KeywordEmbedder`] until the n-th batch call (1-based).
pub struct FailingEmbedder {
    inner: KeywordEmbedder,
    fail_on: usize,
}

impl FailingEmbedder {
    pub fn failing_on_call(fail_on: usize) -> Self {
        Self {
            inner: KeywordEmbedder::new(),
            fail_on,
        }
    }
}

impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if self.inner.calls() + 1 == self.fail_on {
            self.inner.calls.fetch_add(1, Ordering::SeqCst);
            return Err(EmbeddingError::EmbeddingFailed("injected failure".to_string()));
        }
        self.inner.embed_batch(texts)
    }
}

pub fn post(id: &str, profile: &str, text: &str, interactions: u64) -> PostRecord {
    PostRecord {
        id: id.to_string(),
        page_id: format!("page-{profile}"),
        profile: profile.to_string(),
        date: "2024-03-01 12:00:00".to_string(),
        interactions,
        facebook_url: String::new(),
        post_url: format!("https://www.facebook.com/posts/{id}"),
        country: "DK".to_string(),
        category: String::new(),
        text: text.to_string(),
    }
}

/// Write `rows` under the export header to `dir/posts.csv`.
pub fn write_posts_csv(dir: &Path, rows: &[&str]) -> PathBuf {
    let path = dir.join("posts.csv");
    let mut content = String::from(CSV_HEADER);
    content.push('\n');
    for row in rows {
        content.push_str(row);
        content.push('\n');
    }
    std::fs::write(&path, content).unwrap();
    path
}

/// Build a store directly from records, bypassing the CSV loader.
pub fn build_store(dir: &Path, embedder: &dyn Embedder, posts: &[PostRecord]) {
    let mut writer = StoreWriter::create(dir, embedder).unwrap();
    for post in posts {
        let embedding = embedder.embed(&post.text).unwrap();
        writer.add(post, embedding).unwrap();
    }
    writer.commit().unwrap();
}
