//! Typed application configuration, loaded from `moneta.toml` over defaults.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::defaults;
use super::paths::AppPaths;
use crate::core::errors::ApiError;
use crate::prompt::PromptFormat;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub system_instructions: String,
    pub prompt_format: PromptFormat,
    pub engine: EngineConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub rewrite: RewriteConfig,
    pub generation: GenerationConfig,
    pub chat: ChatConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            system_instructions: defaults::default_system_instructions(),
            prompt_format: PromptFormat::Gemma,
            engine: EngineConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            rewrite: RewriteConfig::default(),
            generation: GenerationConfig::default(),
            chat: ChatConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the local llama.cpp-compatible inference server.
    pub base_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::DEFAULT_ENGINE_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window size, in characters, for the fixed-width splitter.
    pub fixed_width_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            fixed_width_chars: defaults::DEFAULT_FIXED_WIDTH_CHARS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Minimum cosine score a candidate must reach. `None` disables the
    /// threshold and relies on `top_k` alone.
    pub min_score: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: defaults::DEFAULT_TOP_K,
            min_score: Some(defaults::DEFAULT_MIN_SCORE),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Whole words that mark a query as anaphoric.
    pub trigger_words: Vec<String>,
    /// Queries shorter than this are treated as under-specified.
    pub min_query_chars: usize,
    /// Rewrites at or below this length are rejected as degenerate.
    pub min_rewrite_chars: usize,
    /// How many recent turns the rewrite prompt may see.
    pub history_window: usize,
    pub max_tokens: u32,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            trigger_words: defaults::default_trigger_words(),
            min_query_chars: defaults::DEFAULT_MIN_QUERY_CHARS,
            min_rewrite_chars: defaults::DEFAULT_MIN_REWRITE_CHARS,
            history_window: defaults::DEFAULT_REWRITE_HISTORY_WINDOW,
            max_tokens: defaults::DEFAULT_REWRITE_MAX_TOKENS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub top_k: Option<i32>,
    /// Flush partial output to the caller after this many tokens.
    pub flush_every_tokens: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: defaults::DEFAULT_GENERATION_MAX_TOKENS,
            temperature: defaults::DEFAULT_GENERATION_TEMPERATURE,
            top_p: None,
            top_k: None,
            flush_every_tokens: defaults::DEFAULT_FLUSH_EVERY_TOKENS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// How many recent turns are replayed into each prompt.
    pub history_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: defaults::DEFAULT_HISTORY_LIMIT,
        }
    }
}

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    /// Loads `moneta.toml` if present, otherwise returns defaults.
    ///
    /// A missing file is normal (first run); an unreadable or invalid file is
    /// an error rather than a silent fallback.
    pub fn load(&self) -> Result<AppConfig, ApiError> {
        let path = &self.paths.config_path;
        if !path.exists() {
            return Ok(AppConfig::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|e| ApiError::internal(format!("failed to read {}: {}", path.display(), e)))?;
        toml::from_str(&raw)
            .map_err(|e| ApiError::internal(format!("invalid config {}: {}", path.display(), e)))
    }
}
