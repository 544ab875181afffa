//! Configuration for the question catalog.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::catalog::core::errors::{CatalogError, CatalogResult};

/// Environment variable naming an optional JSON config file.
pub const CONFIG_PATH_ENV: &str = "LISTENING_COMP_CONFIG";

/// Top-level configuration for the catalog.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Collection settings.
    pub collection: CollectionConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Embedding model settings.
    pub embedding: EmbeddingConfig,
    /// Extraction model settings.
    pub llm: LlmConfig,
    /// Query settings.
    pub retrieval: RetrievalConfig,
    /// Deadlines for external calls.
    pub timeouts: TimeoutConfig,
}

impl CatalogConfig {
    /// Load defaults, an optional JSON file named by `LISTENING_COMP_CONFIG`,
    /// then environment overrides, and validate the result.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or validation fails.
    pub fn load() -> CatalogResult<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_json_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON config file. Missing sections take their defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn from_json_file(path: &Path) -> CatalogResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Apply `LISTENING_COMP_*` overrides using the given lookup.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("LISTENING_COMP_DB") {
            self.storage.sqlite_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("LISTENING_COMP_ARTIFACTS_DIR") {
            self.storage.artifacts_dir = if dir.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(dir))
            };
        }
        if let Some(url) = lookup("LISTENING_COMP_OLLAMA_URL") {
            self.embedding.base_url = Some(url.clone());
            self.llm.base_url = Some(url);
        }
        if let Some(model) = lookup("LISTENING_COMP_EMBED_MODEL") {
            self.embedding.model = model;
        }
        if let Some(model) = lookup("LISTENING_COMP_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(name) = lookup("LISTENING_COMP_COLLECTION") {
            self.collection.name = name;
        }
        if let Some(flag) = lookup("LISTENING_COMP_RESET_ON_START") {
            self.collection.reset_on_start = matches!(
                flag.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> CatalogResult<()> {
        let name_pattern = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,63}$")
            .map_err(|err| CatalogError::InvalidConfig(format!("invalid regex: {err}")))?;
        if !name_pattern.is_match(&self.collection.name) {
            return Err(CatalogError::InvalidConfig(format!(
                "collection.name {:?} must be a plain SQL identifier",
                self.collection.name
            )));
        }

        if self.embedding.ndims == 0 {
            return Err(CatalogError::InvalidConfig(
                "embedding.ndims must be > 0".to_string(),
            ));
        }

        if self.retrieval.default_top_k == 0 {
            return Err(CatalogError::InvalidConfig(
                "retrieval.default_top_k must be > 0".to_string(),
            ));
        }

        if self.retrieval.max_top_k < self.retrieval.default_top_k {
            return Err(CatalogError::InvalidConfig(
                "retrieval.max_top_k must be >= retrieval.default_top_k".to_string(),
            ));
        }

        if self.timeouts.extraction_seconds == 0 || self.timeouts.embedding_seconds == 0 {
            return Err(CatalogError::InvalidConfig(
                "timeouts must be > 0 seconds".to_string(),
            ));
        }

        if let Some(base_url) = &self.embedding.base_url {
            Url::parse(base_url)?;
        }

        if let Some(base_url) = &self.llm.base_url {
            Url::parse(base_url)?;
        }

        Ok(())
    }
}

/// Distance metric used to rank query results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Cosine distance (`1 - cosine similarity`).
    #[default]
    Cosine,
    /// Euclidean distance.
    L2,
}

impl DistanceMetric {
    /// Name of the sqlite-vec scalar function computing this distance.
    #[must_use]
    pub const fn sql_function(self) -> &'static str {
        match self {
            Self::Cosine => "vec_distance_cosine",
            Self::L2 => "vec_distance_l2",
        }
    }
}

/// Collection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Table name of the collection.
    pub name: String,
    /// Ranking metric.
    pub distance: DistanceMetric,
    /// Drop and recreate the collection when the process starts.
    pub reset_on_start: bool,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            name: "listening_questions".to_string(),
            distance: DistanceMetric::Cosine,
            reset_on_start: true,
        }
    }
}

/// Storage configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `SQLite` database path.
    pub sqlite_path: PathBuf,
    /// Directory for saved transcripts and LLM output; `None` disables saving.
    pub artifacts_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/listening.sqlite"),
            artifacts_dir: Some(PathBuf::from("data")),
        }
    }
}

/// Embedding model settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Ollama embedding model name.
    pub model: String,
    /// Embedding vector dimensions.
    pub ndims: usize,
    /// Optional custom base URL.
    pub base_url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "nomic-embed-text".to_string(),
            ndims: 768,
            base_url: None,
        }
    }
}

/// Completion model settings for item extraction.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama completion model name.
    pub model: String,
    /// Temperature for generation.
    pub temperature: f64,
    /// Optional max tokens.
    pub max_tokens: Option<u64>,
    /// Optional custom base URL.
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "ministral-3:8b-instruct-2512-q8_0".to_string(),
            temperature: 0.7,
            max_tokens: Some(2048),
            base_url: None,
        }
    }
}

/// Query settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of matches when the caller does not ask for a specific count.
    pub default_top_k: usize,
    /// Upper bound on requested matches.
    pub max_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            max_top_k: 50,
        }
    }
}

/// Deadlines for external calls.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// LLM extraction deadline.
    pub extraction_seconds: u64,
    /// Per-text embedding deadline.
    pub embedding_seconds: u64,
}

impl TimeoutConfig {
    /// Extraction deadline as a duration.
    #[must_use]
    pub const fn extraction(&self) -> Duration {
        Duration::from_secs(self.extraction_seconds)
    }

    /// Embedding deadline as a duration.
    #[must_use]
    pub const fn embedding(&self) -> Duration {
        Duration::from_secs(self.embedding_seconds)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            extraction_seconds: 120,
            embedding_seconds: 30,
        }
    }
}
