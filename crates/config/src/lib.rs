//! Configuration loading and validation for Kindred.
//!
//! Loads `~/.kindred/config.toml` with environment variable overrides and
//! validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.kindred/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model provider and endpoint settings
    #[serde(default)]
    pub model: ModelConfig,

    /// Affinity persistence settings
    #[serde(default)]
    pub affinity: AffinityConfig,

    /// Memory backend and promotion thresholds
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Tool loop limits and confirmation behavior
    #[serde(default)]
    pub turn: TurnConfig,

    /// Context assembly budgets
    #[serde(default)]
    pub context: ContextConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// "openrouter", "openai", or "ollama"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Override the provider's default base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_embedding_model() -> String {
    "none".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: None,
            api_key: None,
            model: default_model(),
            embedding_model: default_embedding_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("model", &self.model)
            .field("affinity", &self.affinity)
            .field("memory", &self.memory)
            .field("turn", &self.turn)
            .field("context", &self.context)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffinityConfig {
    /// Directory holding one relationship snapshot file per conversation
    #[serde(default = "default_affinity_dir")]
    pub dir: PathBuf,
}

fn default_affinity_dir() -> PathBuf {
    AppConfig::config_dir().join("relationships")
}

impl Default for AffinityConfig {
    fn default() -> Self {
        Self {
            dir: default_affinity_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "sqlite", "file", or "memory"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// Database or JSONL path; defaults under the config dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Short-tier record count that triggers promotion
    #[serde(default = "default_max_short_records")]
    pub max_short_records: usize,

    /// Short-tier token total that triggers promotion
    #[serde(default = "default_max_short_tokens")]
    pub max_short_tokens: usize,

    /// Oldest records folded into one summary per promotion
    #[serde(default = "default_promote_batch")]
    pub promote_batch: usize,
}

fn default_memory_backend() -> String {
    "sqlite".into()
}
fn default_max_short_records() -> usize {
    20
}
fn default_max_short_tokens() -> usize {
    2000
}
fn default_promote_batch() -> usize {
    10
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            path: None,
            max_short_records: default_max_short_records(),
            max_short_tokens: default_max_short_tokens(),
            promote_batch: default_promote_batch(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Model calls per turn before the loop aborts
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Failures per tool before the loop answers degraded
    #[serde(default = "default_max_tool_retries")]
    pub max_tool_retries: u32,

    /// Seconds to wait on a sensitive-tool confirmation before treating
    /// silence as a refusal
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
}

fn default_max_steps() -> u32 {
    8
}
fn default_max_tool_retries() -> u32 {
    2
}
fn default_confirmation_timeout() -> u64 {
    30
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_tool_retries: default_max_tool_retries(),
            confirmation_timeout_secs: default_confirmation_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Token budget for the assembled system prompt
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// Memories retrieved per turn
    #[serde(default = "default_retrieve_k")]
    pub retrieve_k: usize,

    /// Token budget for the retrieved-memory section
    #[serde(default = "default_memory_token_budget")]
    pub memory_token_budget: usize,

    /// Prior exchanges kept in the live transcript
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_token_budget() -> usize {
    4096
}
fn default_retrieve_k() -> usize {
    5
}
fn default_memory_token_budget() -> usize {
    1024
}
fn default_history_limit() -> usize {
    10
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            retrieve_k: default_retrieve_k(),
            memory_token_budget: default_memory_token_budget(),
            history_limit: default_history_limit(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.kindred/config.toml).
    ///
    /// Environment overrides, highest priority first:
    /// - `KINDRED_API_KEY`, then `OPENROUTER_API_KEY`, then `OPENAI_API_KEY`
    /// - `KINDRED_PROVIDER`
    /// - `KINDRED_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.model.api_key.is_none() {
            config.model.api_key = std::env::var("KINDRED_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }
        if let Ok(provider) = std::env::var("KINDRED_PROVIDER") {
            config.model.provider = provider;
        }
        if let Ok(model) = std::env::var("KINDRED_MODEL") {
            config.model.model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("no config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// The kindred configuration directory.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".kindred")
    }

    /// Resolved memory storage path for file-backed backends.
    pub fn memory_path(&self) -> PathBuf {
        self.memory.path.clone().unwrap_or_else(|| {
            let name = match self.memory.backend.as_str() {
                "file" => "memory/records.jsonl",
                _ => "memory/records.db",
            };
            Self::config_dir().join(name)
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if !matches!(self.memory.backend.as_str(), "sqlite" | "file" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "memory.backend must be sqlite, file, or memory (got {})",
                self.memory.backend
            )));
        }
        if self.memory.promote_batch == 0 {
            return Err(ConfigError::ValidationError(
                "memory.promote_batch must be at least 1".into(),
            ));
        }
        if self.turn.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "turn.max_steps must be at least 1".into(),
            ));
        }
        if self.context.token_budget < 256 {
            return Err(ConfigError::ValidationError(
                "context.token_budget must be at least 256".into(),
            ));
        }
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.model.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            affinity: AffinityConfig::default(),
            memory: MemoryConfig::default(),
            turn: TurnConfig::default(),
            context: ContextConfig::default(),
        }
    }
}

fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
