use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub repositories: BTreeMap<String, RepositoryConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: default_max_chunk_chars(),
        }
    }
}

fn default_max_chunk_chars() -> usize {
    2000
}

/// Retrieval tunables. The similarity threshold and lexical weights have
/// no documented derivation, so they are configuration rather than
/// semantics; the defaults match the original constants.
#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default)]
    pub lexical: LexicalWeights,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            default_limit: default_limit(),
            lexical: LexicalWeights::default(),
        }
    }
}

fn default_similarity_threshold() -> f64 {
    0.7
}
fn default_limit() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct LexicalWeights {
    #[serde(default = "default_title_word")]
    pub title_word: i64,
    #[serde(default = "default_body_occurrence")]
    pub body_occurrence: i64,
    #[serde(default = "default_tech_term")]
    pub tech_term: i64,
    #[serde(default = "default_documentation_boost")]
    pub documentation_boost: i64,
    #[serde(default = "default_error_query_boost")]
    pub error_query_boost: i64,
    #[serde(default = "default_component_query_boost")]
    pub component_query_boost: i64,
}

impl Default for LexicalWeights {
    fn default() -> Self {
        Self {
            title_word: default_title_word(),
            body_occurrence: default_body_occurrence(),
            tech_term: default_tech_term(),
            documentation_boost: default_documentation_boost(),
            error_query_boost: default_error_query_boost(),
            component_query_boost: default_component_query_boost(),
        }
    }
}

fn default_title_word() -> i64 {
    20
}
fn default_body_occurrence() -> i64 {
    10
}
fn default_tech_term() -> i64 {
    15
}
fn default_documentation_boost() -> i64 {
    50
}
fn default_error_query_boost() -> i64 {
    30
}
fn default_component_query_boost() -> i64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            max_retries: 3,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

/// Language-model configuration: an ordered fallback chain. Providers are
/// tried strictly in list order; the deterministic path is the final link
/// and is always available.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LlmConfig {
    #[serde(default)]
    pub providers: Vec<LlmProviderConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmProviderConfig {
    /// Label used in logs and result provenance.
    pub name: String,
    /// Provider kind: `openai` or `anthropic`.
    pub kind: String,
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
}

fn default_llm_max_tokens() -> u32 {
    2048
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepositoryConfig {
    /// API base, e.g. `https://api.github.com`.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Environment variable holding the access token, if any.
    #[serde(default)]
    pub token_env: Option<String>,
    /// Subdirectory to sync from; repository root when empty.
    #[serde(default)]
    pub root: String,
    #[serde(default = "default_sync_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}
fn default_branch() -> String {
    "main".to_string()
}
fn default_sync_timeout_secs() -> u64 {
    30
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_chunk_chars == 0 {
        anyhow::bail!("chunking.max_chunk_chars must be > 0");
    }

    if config.retrieval.default_limit == 0 {
        anyhow::bail!("retrieval.default_limit must be >= 1");
    }

    if !(-1.0..=1.0).contains(&config.retrieval.similarity_threshold) {
        anyhow::bail!("retrieval.similarity_threshold must be in [-1.0, 1.0]");
    }

    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        match config.embedding.provider.as_str() {
            "openai" => {}
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be disabled or openai.",
                other
            ),
        }
    }

    for provider in &config.llm.providers {
        match provider.kind.as_str() {
            "openai" | "anthropic" => {}
            other => anyhow::bail!(
                "Unknown llm provider kind '{}' for '{}'. Must be openai or anthropic.",
                other,
                provider.name
            ),
        }
    }

    Ok(config)
}
