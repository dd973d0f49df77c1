//! Local embeddings via fastembed.
//!
//! The model is downloaded from Hugging Face on first use and cached; after
//! that, embedding runs offline on a blocking thread. The loaded model is
//! kept for the lifetime of the embedder.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pdfqa_core::embedding::Embedder;
use pdfqa_core::{Error, Result};
use tracing::info;

use crate::config::EmbeddingConfig;

pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
}

impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
        // Validate the name up front so a typo fails at startup.
        config_to_fastembed_model(&model_name)?;

        let dims = config.dims.unwrap_or(match model_name.as_str() {
            "bge-base-en-v1.5" => 768,
            "bge-large-en-v1.5" => 1024,
            "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
            "multilingual-e5-base" => 768,
            "multilingual-e5-large" => 1024,
            _ => 384,
        });

        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
            model: Arc::new(Mutex::new(None)),
        })
    }
}

fn config_to_fastembed_model(name: &str) -> anyhow::Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => anyhow::bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ),
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let texts = texts.to_vec();
        let model = self.model.clone();
        let model_name = self.model_name.clone();
        let batch_size = self.batch_size;

        tokio::task::spawn_blocking(move || {
            let mut slot = model.lock().unwrap_or_else(|e| e.into_inner());
            if slot.is_none() {
                let which = config_to_fastembed_model(&model_name)
                    .map_err(|e| Error::Embedding(e.to_string()))?;
                info!(model = %model_name, "loading local embedding model");
                let loaded = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(which).with_show_download_progress(true),
                )
                .map_err(|e| {
                    Error::Embedding(format!("Failed to initialize local embedding model: {}", e))
                })?;
                *slot = Some(loaded);
            }
            let Some(embedder) = slot.as_mut() else {
                return Err(Error::Embedding("local model not loaded".to_string()));
            };
            embedder
                .embed(texts, Some(batch_size))
                .map_err(|e| Error::Embedding(format!("Local embedding failed: {}", e)))
        })
        .await
        .map_err(|e| Error::Embedding(format!("local embedding task failed: {}", e)))?
    }
}
