//! Streaming loader for the semicolon-delimited post export.
//!
//! Rows pass through three checks before they become a [`PostRecord`]:
//! 1. The post text must be non-empty after trimming (and, optionally,
//!    contain enough real characters once emoji and punctuation are gone)
//! 2. A missing profile is filled from another row of the same page,
//!    then from the page URL slug
//! 3. Rows that still have no profile are dropped
//!
//! Dropped rows are counted in [`LoadStats`], never reported as errors.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::posts::profile::recover_profile;
use crate::posts::PostRecord;

/// Field delimiter of the export.
const DELIMITER: u8 = b';';

/// Placeholder some exports write instead of leaving the profile empty.
const MISSING_PROFILE: &str = "None";

static EMOJI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\x{1F000}-\x{1FFFF}\x{2600}-\x{27BF}\x{FE00}-\x{FEFF}\x{200D}\x{20E3}]")
        .expect("emoji pattern is valid")
});

static FILLER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[\s.,!?:;\-—–'"()\[\]{}]+"#).expect("filler pattern is valid")
});

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("malformed csv: {0}")]
    Csv(#[from] csv::Error),
}

/// Knobs for the data-quality filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoaderOptions {
    /// Drop posts with fewer real characters than this once emoji,
    /// whitespace and punctuation are removed. 0 disables the check.
    pub min_meaningful_chars: usize,
}

/// Counters describing what the loader kept and dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub loaded: usize,
    pub skipped_text: usize,
    pub skipped_profile: usize,
    pub recovered_page_id: usize,
    pub recovered_url: usize,
}

/// Raw row as it appears in the export. Unknown columns are ignored.
#[derive(Debug, Default, Deserialize)]
struct RawRow {
    #[serde(default)]
    ccpost_id: Option<String>,
    #[serde(default)]
    ccpageid: Option<String>,
    #[serde(default)]
    profile: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    total_interactions: Option<String>,
    #[serde(default)]
    post_url: Option<String>,
    #[serde(default)]
    facebook_url: Option<String>,
    #[serde(default)]
    post_text: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

/// Loader over one export file.
///
/// Opening the loader reads the file once to learn which profile each page
/// id belongs to. Every call to [`RecordLoader::records`] re-reads the file
/// from the start, so the sequence can be replayed.
pub struct RecordLoader {
    path: PathBuf,
    options: LoaderOptions,
    page_profiles: HashMap<String, String>,
}

impl RecordLoader {
    pub fn open(path: impl AsRef<Path>, options: LoaderOptions) -> Result<Self, LoadError> {
        let path = path.as_ref().to_path_buf();
        let mut page_profiles = HashMap::new();

        for row in Self::reader(&path)?.into_deserialize::<RawRow>() {
            let row = row?;
            let (Some(profile), Some(page_id)) =
                (explicit_profile(&row), non_empty(row.ccpageid.as_deref()))
            else {
                continue;
            };
            page_profiles.insert(page_id.to_string(), profile.to_string());
        }

        log::debug!(
            "mapped {} page ids to profiles from {}",
            page_profiles.len(),
            path.display()
        );

        Ok(Self {
            path,
            options,
            page_profiles,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start a fresh pass over the file.
    pub fn records(&self) -> Result<Records<'_>, LoadError> {
        Ok(Records {
            rows: Self::reader(&self.path)?.into_deserialize(),
            loader: self,
            stats: LoadStats::default(),
        })
    }

    fn reader(path: &Path) -> Result<csv::Reader<File>, LoadError> {
        csv::ReaderBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(|source| LoadError::Open {
                path: path.to_path_buf(),
                source,
            })
    }

    fn clean(&self, row: RawRow, stats: &mut LoadStats) -> Option<PostRecord> {
        let text = row.post_text.as_deref().unwrap_or_default().trim();
        if text.is_empty() || !is_meaningful(text, self.options.min_meaningful_chars) {
            stats.skipped_text += 1;
            return None;
        }

        let profile = match explicit_profile(&row) {
            Some(profile) => profile.to_string(),
            None => {
                let by_page = non_empty(row.ccpageid.as_deref())
                    .and_then(|page_id| self.page_profiles.get(page_id));

                if let Some(profile) = by_page {
                    stats.recovered_page_id += 1;
                    profile.clone()
                } else if let Some(profile) = recover_profile(row.facebook_url.as_deref()) {
                    stats.recovered_url += 1;
                    profile
                } else {
                    log::debug!(
                        "dropping post {:?}: no recoverable profile",
                        row.ccpost_id.as_deref().unwrap_or_default()
                    );
                    stats.skipped_profile += 1;
                    return None;
                }
            }
        };

        stats.loaded += 1;

        Some(PostRecord {
            id: trimmed(row.ccpost_id),
            page_id: trimmed(row.ccpageid),
            profile,
            date: trimmed(row.date),
            interactions: parse_interactions(row.total_interactions.as_deref().unwrap_or_default()),
            facebook_url: trimmed(row.facebook_url),
            post_url: trimmed(row.post_url),
            country: trimmed(row.country),
            category: trimmed(row.category),
            text: text.to_string(),
        })
    }
}

/// Lazy pass over the cleaned records of one file, in file order.
pub struct Records<'a> {
    rows: csv::DeserializeRecordsIntoIter<File, RawRow>,
    loader: &'a RecordLoader,
    stats: LoadStats,
}

impl Records<'_> {
    /// Counters for the rows consumed so far.
    pub fn stats(&self) -> LoadStats {
        self.stats
    }
}

impl Iterator for Records<'_> {
    type Item = Result<PostRecord, LoadError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let row = match self.rows.next()? {
                Ok(row) => row,
                Err(e) => return Some(Err(e.into())),
            };

            if let Some(record) = self.loader.clean(row, &mut self.stats) {
                return Some(Ok(record));
            }
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn explicit_profile(row: &RawRow) -> Option<&str> {
    non_empty(row.profile.as_deref()).filter(|p| *p != MISSING_PROFILE)
}

fn trimmed(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

/// Coerce an engagement count to a non-negative integer, 0 when unusable.
pub fn parse_interactions(raw: &str) -> u64 {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<u64>() {
        return n;
    }

    // "12,345" / "12.345" / "12 345"
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, ',' | '_' | ' ' | '\u{a0}'))
        .collect();
    if let Ok(n) = digits.parse::<u64>() {
        return n;
    }
    if let Ok(n) = digits.replace('.', "").parse::<u64>() {
        if raw.matches('.').count() > 1 || raw.rsplit('.').next().map(str::len) == Some(3) {
            return n;
        }
    }

    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() && n > 0.0 => n as u64,
        _ => 0,
    }
}

fn is_meaningful(text: &str, min_chars: usize) -> bool {
    if min_chars == 0 {
        return true;
    }
    let stripped = EMOJI.replace_all(text, "");
    let stripped = FILLER.replace_all(&stripped, "");
    stripped.chars().count() >= min_chars
}
