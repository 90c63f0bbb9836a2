//! Builds the engine from an [`AppConfig`].

use std::sync::Arc;

use kindred_affinity::FileAffinityStore;
use kindred_agent::{ConfirmationGate, SessionConfig, SessionDeps, TurnLoopConfig};
use kindred_config::AppConfig;
use kindred_core::memory::{Embedder, MemoryBackend, Summarizer};
use kindred_core::model::ModelClient;
use kindred_memory::embed::{HashEmbedder, ModelEmbedder};
use kindred_memory::file_backend::FileBackend;
use kindred_memory::in_memory::InMemoryBackend;
use kindred_memory::sqlite::SqliteBackend;
use kindred_memory::store::{MemoryConfig, MemoryStore};
use kindred_memory::summarize::ModelSummarizer;
use kindred_providers::OpenAiCompatClient;
use kindred_tools::{default_registry, ToolSinks};

pub fn build_model(config: &AppConfig) -> Result<Arc<dyn ModelClient>, Box<dyn std::error::Error>> {
    let model = &config.model;
    let client: Arc<dyn ModelClient> = match model.provider.as_str() {
        "ollama" => Arc::new(OpenAiCompatClient::ollama(model.base_url.as_deref())?),
        "openai" => {
            let key = require_api_key(config)?;
            let base = model
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".into());
            Arc::new(OpenAiCompatClient::new("openai", base, key)?)
        }
        _ => {
            let key = require_api_key(config)?;
            Arc::new(OpenAiCompatClient::openrouter(key)?)
        }
    };
    Ok(client)
}

fn require_api_key(config: &AppConfig) -> Result<String, Box<dyn std::error::Error>> {
    match &config.model.api_key {
        Some(key) => Ok(key.clone()),
        None => {
            eprintln!();
            eprintln!("  ERROR: No API key configured!");
            eprintln!();
            eprintln!("  Set one of these environment variables:");
            eprintln!("    OPENROUTER_API_KEY=sk-or-v1-...   (recommended)");
            eprintln!("    OPENAI_API_KEY=sk-...             (for OpenAI direct)");
            eprintln!("    KINDRED_API_KEY=sk-...            (generic)");
            eprintln!();
            eprintln!("  Or add it to your config file:");
            eprintln!(
                "    {}",
                AppConfig::config_dir().join("config.toml").display()
            );
            eprintln!();
            Err("No API key found. See above for setup instructions.".into())
        }
    }
}

pub async fn build_memory(
    config: &AppConfig,
    model: Arc<dyn ModelClient>,
) -> Result<Arc<MemoryStore>, Box<dyn std::error::Error>> {
    let backend: Arc<dyn MemoryBackend> = match config.memory.backend.as_str() {
        "memory" => Arc::new(InMemoryBackend::new()),
        "file" => {
            let path = config.memory_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Arc::new(FileBackend::new(path))
        }
        _ => {
            let path = config.memory_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Arc::new(SqliteBackend::new(&path.to_string_lossy()).await?)
        }
    };

    let embedder: Arc<dyn Embedder> = if config.model.embedding_model == "none" {
        Arc::new(HashEmbedder::default())
    } else {
        Arc::new(ModelEmbedder::new(
            model.clone(),
            config.model.embedding_model.clone(),
        ))
    };

    // The store falls back to extractive summaries on its own when the
    // model summarizer fails, so the model-backed one is always safe here.
    let summarizer: Arc<dyn Summarizer> =
        Arc::new(ModelSummarizer::new(model, config.model.model.clone()));

    Ok(Arc::new(MemoryStore::new(
        backend,
        embedder,
        summarizer,
        MemoryConfig {
            max_short_records: config.memory.max_short_records,
            max_short_tokens: config.memory.max_short_tokens,
            promote_batch: config.memory.promote_batch,
            retrieve_limit: config.context.retrieve_k,
        },
    )))
}

/// Assemble everything a session needs from the config.
pub async fn build_deps(
    config: &AppConfig,
    gate: Arc<dyn ConfirmationGate>,
) -> Result<(SessionDeps, ToolSinks), Box<dyn std::error::Error>> {
    let model = build_model(config)?;
    let memory = build_memory(config, model.clone()).await?;

    std::fs::create_dir_all(&config.affinity.dir)?;
    let affinity = Arc::new(FileAffinityStore::new(config.affinity.dir.clone()));

    let sinks = ToolSinks::new();
    let tools = Arc::new(default_registry(&sinks));

    let deps = SessionDeps {
        model,
        tools,
        gate,
        affinity,
        memory,
        loop_config: TurnLoopConfig {
            model: config.model.model.clone(),
            temperature: config.model.temperature,
            max_tokens: Some(config.model.max_tokens),
            max_steps: config.turn.max_steps,
            max_tool_retries: config.turn.max_tool_retries,
            confirmation_timeout: std::time::Duration::from_secs(
                config.turn.confirmation_timeout_secs,
            ),
        },
        session_config: SessionConfig {
            retrieve_k: config.context.retrieve_k,
            memory_token_budget: config.context.memory_token_budget,
            context_budget: config.context.token_budget,
            history_limit: config.context.history_limit,
        },
    };

    Ok((deps, sinks))
}
