//! Source post records and the CSV loading pipeline.
//!
//! - `profile`: recovers author names from Facebook URL slugs
//! - `loader`: streams cleaned records out of the semicolon-delimited export

mod loader;
mod profile;

pub use loader::{LoadError, LoadStats, LoaderOptions, RecordLoader};

use serde::{Deserialize, Serialize};

/// One cleaned post, ready to be embedded.
///
/// `text` and `profile` are never empty for a record produced by the loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: String,
    #[serde(default)]
    pub page_id: String,
    pub profile: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub interactions: u64,
    #[serde(default)]
    pub facebook_url: String,
    #[serde(default)]
    pub post_url: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub category: String,
    pub text: String,
}
