//! Configuration
//!
//! Built-in defaults, overlaid by an optional JSON file, overlaid by environment
//! variables. Every section is `#[serde(default)]` so partial files are fine.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::llm::LlmError;

/// Environment variable pointing at an explicit config file
pub const CONFIG_PATH_ENV: &str = "BOOKMIND_CONFIG";

/// Most inputs sent in one embedding request
pub const MAX_EMBEDDING_BATCH: usize = 20;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config file {path}: {message}")]
    Parse { path: String, message: String },
    #[error("Invalid setting: {0}")]
    Invalid(String),
}

impl Serialize for ConfigError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub openai: OpenAiConfig,
    pub chunking: ChunkingConfig,
    pub summary: SummaryConfig,
    pub retrieval: RetrievalConfig,
    pub miro: MiroConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OpenAiConfig {
    /// Never serialized back out
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub completion_model: String,
    /// Used by the workbook generator when the primary model is refused
    pub fallback_model: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            completion_model: "gpt-4o-mini".to_string(),
            fallback_model: "gpt-4".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimensions: 1536,
            timeout_secs: 120,
        }
    }
}

/// Window sizing for the chunker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChunkingConfig {
    /// Tokens per window before adaptive widening
    pub max_tokens: usize,
    /// Tokens shared by adjacent windows
    pub overlap: usize,
    /// Upper bound on the chunk count; `None` disables combination
    pub max_chunks: Option<usize>,
    /// Widen windows for very large documents
    pub adaptive: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: 2000,
            overlap: 100,
            max_chunks: Some(50),
            adaptive: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SummaryConfig {
    /// Per-chunk extraction pass
    pub map_temperature: f32,
    /// Final organizing pass
    pub reduce_temperature: f32,
    pub workbook_temperature: f32,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            map_temperature: 0.5,
            reduce_temperature: 0.7,
            workbook_temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetrievalConfig {
    /// Chunks beyond this are down-sampled before embedding
    pub max_indexed_chunks: usize,
    pub batch_size: usize,
    /// Prefix length (characters) used as the embedding cache key
    pub cache_key_chars: usize,
    pub top_k: usize,
    pub context_char_budget: usize,
    /// Smallest truncated chunk worth including when the budget runs out
    pub min_partial_chars: usize,
    pub chat_temperature: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_indexed_chunks: 200,
            batch_size: MAX_EMBEDDING_BATCH,
            cache_key_chars: 100,
            top_k: 3,
            context_char_budget: 8000,
            min_partial_chars: 500,
            chat_temperature: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MiroConfig {
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    pub base_url: String,
}

impl Default for MiroConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            base_url: "https://api.miro.com/v2".to_string(),
        }
    }
}

impl Config {
    /// Defaults, then the config file (if any), then the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::base(explicit_config_path())?;
        config.apply_env(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// An explicitly named file must exist; the default location is optional.
    fn base(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(&path);
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        info!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Overlay values from an environment lookup. Blank values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("OPENAI_API_KEY") {
            self.openai.api_key = Some(key);
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            self.openai.base_url = url;
        }
        if let Some(model) = get("BOOKMIND_COMPLETION_MODEL") {
            self.openai.completion_model = model;
        }
        if let Some(model) = get("BOOKMIND_EMBEDDING_MODEL") {
            self.openai.embedding_model = model;
        }
        if let Some(token) = get("MIRO_ACCESS_TOKEN") {
            self.miro.access_token = Some(token);
        }
        debug!(
            completion_model = %self.openai.completion_model,
            embedding_model = %self.openai.embedding_model,
            "Applied environment overrides"
        );
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let chunking = &self.chunking;
        if chunking.max_tokens == 0 {
            return Err(ConfigError::Invalid("chunking.maxTokens must be positive".to_string()));
        }
        if chunking.overlap >= chunking.max_tokens {
            return Err(ConfigError::Invalid(format!(
                "chunking.overlap ({}) must be smaller than chunking.maxTokens ({})",
                chunking.overlap, chunking.max_tokens
            )));
        }
        if chunking.max_chunks == Some(0) {
            return Err(ConfigError::Invalid("chunking.maxChunks must be positive".to_string()));
        }
        if self.retrieval.batch_size == 0 || self.retrieval.batch_size > MAX_EMBEDDING_BATCH {
            return Err(ConfigError::Invalid(format!(
                "retrieval.batchSize must be between 1 and {}",
                MAX_EMBEDDING_BATCH
            )));
        }
        if self.retrieval.max_indexed_chunks == 0 {
            return Err(ConfigError::Invalid(
                "retrieval.maxIndexedChunks must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// The OpenAI key, checked before any network call is attempted.
    pub fn api_key(&self) -> Result<&str, LlmError> {
        self.openai
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(LlmError::MissingApiKey)
    }
}

/// `$BOOKMIND_CONFIG`, else `<config dir>/bookmind/config.json`.
pub fn config_file_path() -> Option<PathBuf> {
    explicit_config_path().or_else(default_config_path)
}

fn explicit_config_path() -> Option<PathBuf> {
    env::var(CONFIG_PATH_ENV)
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("bookmind").join("config.json"))
}
