//! Embedding providers.
//!
//! Concrete implementations of [`pdfqa_core::embedding::Embedder`]:
//! - **[`DisabledEmbedder`]**: fails every call; used when embeddings are not configured.
//! - **[`OpenAIEmbedder`]**: calls the OpenAI embeddings API with batching, retry, and backoff.
//! - **[`OllamaEmbedder`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`HashingEmbedder`]**: offline feature hashing of words; deterministic, no model.
//! - **`LocalEmbedder`**: runs models locally via fastembed (`local-embeddings-fastembed` feature).
//!
//! # Provider Selection
//!
//! Use [`create_embedder`] to instantiate the provider named in the
//! configuration:
//!
//! ```rust
//! # use pdfqa::config::EmbeddingConfig;
//! # use pdfqa::embedding::create_embedder;
//! # use pdfqa_core::embedding::Embedder;
//! let config = EmbeddingConfig {
//!     provider: "hashing".to_string(),
//!     ..EmbeddingConfig::default()
//! };
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "hashing");
//! ```
//!
//! # Retry Strategy
//!
//! The OpenAI and Ollama providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

#[cfg(feature = "local-embeddings-fastembed")]
mod local;

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalEmbedder;

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use pdfqa_core::embedding::{normalize, Embedder};
use pdfqa_core::{Error, Result};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::config::EmbeddingConfig;

const OPENAI_URL: &str = "https://api.openai.com";
const OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OPENAI_MODEL: &str = "text-embedding-ada-002";
const DEFAULT_HASHING_DIMS: usize = 256;

// ============ Disabled Provider ============

/// An embedder that always fails.
///
/// Used when `embedding.provider = "disabled"`.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(Error::Embedding(
            "embedding provider is disabled".to_string(),
        ))
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls `POST {url}/v1/embeddings`. Requires the `OPENAI_API_KEY`
/// environment variable.
pub struct OpenAIEmbedder {
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());
        let dims = config.dims.unwrap_or(match model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        });

        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(key) => key,
            Err(_) => bail!("OPENAI_API_KEY environment variable not set"),
        };

        Ok(Self {
            model,
            dims,
            url: config.url.clone().unwrap_or_else(|| OPENAI_URL.to_string()),
            api_key,
            client: http_client(config.timeout_secs)?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let request = self
            .client
            .post(format!("{}/v1/embeddings", self.url))
            .bearer_auth(&self.api_key)
            .json(&body);
        let json = send_with_retry(request, self.max_retries, "OpenAI").await?;
        let vectors = parse_openai_response(&json)?;
        expect_count(texts.len(), vectors)
    }
}

/// Extract the `data[].embedding` arrays, ordered by their `index` field.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| invalid("OpenAI", "missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| invalid("OpenAI", "missing embedding"))?;
        indexed.push((index, to_f32_vec(embedding)));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST {url}/api/embed` (default `http://localhost:11434`).
/// Requires an embedding model to be pulled (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;

        Ok(Self {
            model,
            dims,
            url: config.url.clone().unwrap_or_else(|| OLLAMA_URL.to_string()),
            client: http_client(config.timeout_secs)?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let request = self
            .client
            .post(format!("{}/api/embed", self.url))
            .json(&body);
        let json = send_with_retry(request, self.max_retries, "Ollama").await?;
        let vectors = parse_ollama_response(&json)?;
        expect_count(texts.len(), vectors)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| invalid("Ollama", "missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .as_array()
                .map(|values| to_f32_vec(values))
                .ok_or_else(|| invalid("Ollama", "embedding is not an array"))
        })
        .collect()
}

// ============ Hashing Provider ============

/// Deterministic bag-of-words embedder.
///
/// Each lowercased alphanumeric word is hashed (SHA-256) into one of `dims`
/// buckets with a ±1 sign; the summed vector is L2-normalized. Texts that
/// share vocabulary score high under cosine similarity. Needs no network
/// or model files, which makes it suitable for demos and tests.
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let digest = Sha256::digest(word.to_lowercase().as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        normalize(&mut v);
        v
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        "hashing"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

// ============ Shared HTTP plumbing ============

fn http_client(timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Send a JSON request, retrying 429/5xx/network failures with exponential
/// backoff, and return the parsed response body.
async fn send_with_retry(
    request: reqwest::RequestBuilder,
    max_retries: u32,
    provider: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let Some(request) = request.try_clone() else {
            return Err(Error::Embedding(format!(
                "{} request body cannot be retried",
                provider
            )));
        };

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response.json().await.map_err(|e| {
                        Error::Embedding(format!("{} response was not JSON: {}", provider, e))
                    });
                }

                let body_text = response.text().await.unwrap_or_default();
                let message = format!("{} API error {}: {}", provider, status, body_text);

                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    warn!(attempt, status = status.as_u16(), "{} embedding request failed, retrying", provider);
                    last_err = Some(message);
                    continue;
                }

                // Client error (not 429): don't retry
                return Err(Error::Embedding(message));
            }
            Err(e) => {
                warn!(attempt, error = %e, "{} embedding request failed, retrying", provider);
                last_err = Some(format!("{} connection error: {}", provider, e));
            }
        }
    }

    Err(Error::Embedding(last_err.unwrap_or_else(|| {
        format!("{} embedding failed after retries", provider)
    })))
}

fn to_f32_vec(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

fn invalid(provider: &str, what: &str) -> Error {
    Error::Embedding(format!("Invalid {} response: {}", provider, what))
}

fn expect_count(expected: usize, vectors: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>> {
    if vectors.len() != expected {
        return Err(Error::Embedding(format!(
            "expected {} embeddings, provider returned {}",
            expected,
            vectors.len()
        )));
    }
    Ok(vectors)
}

/// Create the [`Embedder`] named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"hashing"` | [`HashingEmbedder`] |
/// | `"local"` | `LocalEmbedder` (requires `local-embeddings-fastembed`) |
pub fn create_embedder(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "hashing" => Ok(Arc::new(HashingEmbedder::new(
            config.dims.unwrap_or(DEFAULT_HASHING_DIMS),
        ))),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdfqa_core::embedding::cosine_similarity;

    #[tokio::test]
    async fn disabled_always_fails() {
        let err = DisabledEmbedder
            .embed(&["hi".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }

    #[test]
    fn openai_response_is_reordered_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]},
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn malformed_responses_are_errors() {
        assert!(parse_openai_response(&serde_json::json!({"error": "x"})).is_err());
        assert!(parse_ollama_response(&serde_json::json!({"embeddings": [1, 2]})).is_err());
    }

    #[test]
    fn ollama_response_parses() {
        let json = serde_json::json!({"embeddings": [[0.5, 0.25], [1.0, 0.0]]});
        assert_eq!(
            parse_ollama_response(&json).unwrap(),
            vec![vec![0.5, 0.25], vec![1.0, 0.0]]
        );
    }

    #[test]
    fn count_mismatch_is_error() {
        assert!(expect_count(2, vec![vec![1.0]]).is_err());
        assert!(expect_count(1, vec![vec![1.0]]).is_ok());
    }

    #[test]
    fn hashing_is_deterministic_and_normalized() {
        let e = HashingEmbedder::new(64);
        let a = e.embed_text("The capital of France is Paris.");
        let b = e.embed_text("the CAPITAL of france, is paris");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn hashing_scores_shared_vocabulary_higher() {
        let e = HashingEmbedder::new(512);
        let doc = e.embed_text("Paris is the capital of France");
        let related = e.embed_text("capital of France");
        let unrelated = e.embed_text("quantum chromodynamics lattice");
        assert!(cosine_similarity(&doc, &related) > cosine_similarity(&doc, &unrelated));
    }

    #[test]
    fn factory_rejects_unknown_and_builds_hashing() {
        let mut config = EmbeddingConfig {
            provider: "hashing".to_string(),
            dims: Some(32),
            ..EmbeddingConfig::default()
        };
        let e = create_embedder(&config).unwrap();
        assert_eq!(e.dims(), 32);

        config.provider = "cohere".to_string();
        assert!(create_embedder(&config).is_err());

        config.provider = "ollama".to_string();
        config.model = None;
        assert!(create_embedder(&config).is_err());
    }
}
