//! TOML configuration.
//!
//! Every section is optional; a missing key takes the default documented on
//! its field. [`load_config`] reads and validates a file, [`parse_config`]
//! does the same for an in-memory string.
//!
//! ```toml
//! [pdf]
//! resolve_timeout_ms = 5000
//! skip_unreadable = false
//! text_backend = "lopdf"        # or "pdf-extract"
//!
//! [chunking]
//! max_tokens = 256
//! tokenizer = "cl100k"          # or "approx"
//!
//! [retrieval]
//! max_results = 5
//! similarity_threshold = 0.75
//!
//! [embedding]
//! provider = "openai"           # openai | ollama | local | hashing | disabled
//! model = "text-embedding-ada-002"
//! batch_size = 64
//! concurrency = 4
//!
//! [generation]
//! provider = "openai"           # openai | ollama | disabled
//! model = "gpt-4"
//! temperature = 0.0
//!
//! [policy]
//! domain = "Acme Cloud"
//! escalation_url = "https://acme.example/support"
//! ```

use anyhow::{Context, Result};
use pdfqa_core::prompt::AnswerPolicy;
use pdfqa_core::retrieve::RetrievalParams;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub pdf: PdfConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub policy: AnswerPolicy,
}

/// Which renderer produces page text.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TextBackend {
    #[default]
    Lopdf,
    PdfExtract,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PdfConfig {
    /// How long a page waits for one of its images to be decoded.
    #[serde(default = "default_resolve_timeout_ms")]
    pub resolve_timeout_ms: u64,
    /// Log and skip files that fail to load instead of failing the build.
    #[serde(default)]
    pub skip_unreadable: bool,
    #[serde(default)]
    pub text_backend: TextBackend,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            resolve_timeout_ms: default_resolve_timeout_ms(),
            skip_unreadable: false,
            text_backend: TextBackend::default(),
        }
    }
}

impl PdfConfig {
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }
}

fn default_resolve_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_tokenizer")]
    pub tokenizer: String,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            tokenizer: default_tokenizer(),
        }
    }
}

fn default_max_tokens() -> usize {
    256
}
fn default_tokenizer() -> String {
    "cl100k".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

impl RetrievalConfig {
    pub fn params(&self) -> RetrievalParams {
        RetrievalParams {
            max_results: self.max_results,
            similarity_threshold: self.similarity_threshold,
        }
    }
}

fn default_max_results() -> usize {
    5
}
fn default_similarity_threshold() -> f32 {
    0.75
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Provider default when unset (see `embedding::create_embedder`).
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (OpenAI-compatible or Ollama endpoint).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Batches in flight at once during a build.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_concurrency() -> usize {
    4
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default)]
    pub url: Option<String>,
    /// Connect timeout and longest silence between streamed chunks.
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_generation_model(),
            temperature: 0.0,
            url: None,
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn default_generation_model() -> String {
    "gpt-4".to_string()
}
fn default_generation_timeout_secs() -> u64 {
    120
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Invalid config file: {}", path.display()))
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate pdf
    if config.pdf.resolve_timeout_ms == 0 {
        anyhow::bail!("pdf.resolve_timeout_ms must be > 0");
    }

    // Validate chunking
    if config.chunking.max_tokens < 4 {
        anyhow::bail!("chunking.max_tokens must be >= 4");
    }
    match config.chunking.tokenizer.as_str() {
        "cl100k" | "approx" => {}
        other => anyhow::bail!(
            "Unknown tokenizer: '{}'. Must be cl100k or approx.",
            other
        ),
    }

    // Validate retrieval
    if config.retrieval.max_results < 1 {
        anyhow::bail!("retrieval.max_results must be >= 1");
    }
    if !(-1.0..=1.0).contains(&config.retrieval.similarity_threshold) {
        anyhow::bail!("retrieval.similarity_threshold must be in [-1.0, 1.0]");
    }

    // Validate embedding
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.concurrency == 0 {
        anyhow::bail!("embedding.concurrency must be > 0");
    }
    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.timeout_secs == 0 {
        anyhow::bail!("embedding.timeout_secs must be > 0");
    }
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "local" | "hashing" => {}
        "ollama" => {
            if config.embedding.model.is_none() || config.embedding.dims.is_none() {
                anyhow::bail!("embedding.model and embedding.dims must be specified when provider is 'ollama'");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, local, or hashing.",
            other
        ),
    }

    // Validate generation
    match config.generation.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&config.generation.temperature) {
        anyhow::bail!("generation.temperature must be in [0.0, 2.0]");
    }
    if config.generation.timeout_secs == 0 {
        anyhow::bail!("generation.timeout_secs must be > 0");
    }

    Ok(())
}
