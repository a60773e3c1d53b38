use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use homedir::my_home;
use serde::{Deserialize, Serialize};

use crate::semantic::{DEFAULT_BATCH_SIZE, DEFAULT_MODEL, DEFAULT_TOP_K};

const CONFIG_FILE: &str = "config.yaml";

/// Environment variable overriding the base directory.
pub const BASE_PATH_ENV: &str = "POSTSEARCH_BASE_PATH";

const DEFAULT_CSV_PATH: &str = "data/all_politics.csv";
const DEFAULT_STORE_DIR: &str = "post_index";
/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;
const DEFAULT_LISTEN: &str = "127.0.0.1:8080";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine home directory: {0}")]
    HomeDir(String),

    #[error("config io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config is malformed: {0}")]
    Parse(#[from] serde_yml::Error),

    #[error("invalid config: {0}")]
    Validation(String),
}

/// Source data settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Semicolon-delimited post export. Relative paths resolve against the base path.
    #[serde(default = "default_csv_path")]
    pub csv_path: String,

    /// Drop posts with fewer real characters than this (0 keeps everything non-empty)
    #[serde(default)]
    pub min_meaningful_chars: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            csv_path: default_csv_path(),
            min_meaningful_chars: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_dir")]
    pub dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
        }
    }
}

/// Configuration for the embedding model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name for embeddings (e.g., "paraphrase-multilingual-MiniLM-L12-v2")
    #[serde(default = "default_model")]
    pub model: String,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Results returned when the caller gives no count
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_csv_path() -> String {
    DEFAULT_CSV_PATH.to_string()
}

fn default_store_dir() -> String {
    DEFAULT_STORE_DIR.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub web: WebConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.build.batch_size == 0 {
            return Err(ConfigError::Validation(
                "build.batch_size must be greater than 0".to_string(),
            ));
        }

        if self.search.top_k == 0 {
            return Err(ConfigError::Validation(
                "search.top_k must be greater than 0".to_string(),
            ));
        }

        if self.embedding.model.trim().is_empty() {
            return Err(ConfigError::Validation(
                "embedding.model must not be empty".to_string(),
            ));
        }

        if self.embedding.download_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "embedding.download_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.store.dir.trim().is_empty() {
            return Err(ConfigError::Validation("store.dir must not be empty".to_string()));
        }

        self.listen_addr()?;

        Ok(())
    }

    /// Base directory from `POSTSEARCH_BASE_PATH`, else `~/.local/share/postsearch`.
    pub fn default_base_path() -> Result<PathBuf, ConfigError> {
        if let Ok(path) = std::env::var(BASE_PATH_ENV) {
            return expand_home(&path);
        }

        let home = my_home()
            .map_err(|e| ConfigError::HomeDir(e.to_string()))?
            .ok_or_else(|| ConfigError::HomeDir("home directory path is empty".to_string()))?;
        Ok(home.join(".local/share/postsearch"))
    }

    /// Load `config.yaml` from `base_path`, writing the defaults when absent.
    pub fn load_with(base_path: &Path) -> Result<Self, ConfigError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ConfigError::Io { path, source }
        };

        std::fs::create_dir_all(base_path).map_err(io_err(base_path))?;

        let config_path = base_path.join(CONFIG_FILE);
        if !config_path.exists() {
            log::info!("Writing default config to {}", config_path.display());
            let defaults = serde_yml::to_string(&Self::default())?;
            std::fs::write(&config_path, defaults).map_err(io_err(&config_path))?;
        }

        let config_str = std::fs::read_to_string(&config_path).map_err(io_err(&config_path))?;
        let mut config: Self = serde_yml::from_str(&config_str)?;
        config.base_path = base_path.to_path_buf();

        config.validate()?;

        Ok(config)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn csv_path(&self) -> Result<PathBuf, ConfigError> {
        self.resolve(&self.data.csv_path)
    }

    pub fn store_dir(&self) -> Result<PathBuf, ConfigError> {
        self.resolve(&self.store.dir)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.web.listen.parse().map_err(|_| {
            ConfigError::Validation(format!(
                "web.listen must be a socket address, got '{}'",
                self.web.listen
            ))
        })
    }

    /// Relative paths hang off the base path; `~/` expands to the home dir.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, ConfigError> {
        let path = expand_home(path)?;
        if path.is_absolute() {
            Ok(path)
        } else {
            Ok(self.base_path.join(path))
        }
    }
}

fn expand_home(path: &str) -> Result<PathBuf, ConfigError> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = my_home()
                .map_err(|e| ConfigError::HomeDir(e.to_string()))?
                .ok_or_else(|| ConfigError::HomeDir("home directory path is empty".to_string()))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}
