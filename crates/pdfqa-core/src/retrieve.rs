//! Query-time retrieval policy.
//!
//! A [`Retriever`] embeds the question with the session's [`Embedder`] and
//! asks the [`VectorStore`] for the best matches under [`RetrievalParams`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embedding::Embedder;
use crate::error::Result;
use crate::models::Chunk;
use crate::store::{ScoredChunk, VectorStore};

/// Top-K and threshold applied to every query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalParams {
    pub max_results: usize,
    pub similarity_threshold: f32,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            max_results: 5,
            similarity_threshold: 0.75,
        }
    }
}

/// Embeds a query and returns the most similar stored chunks.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    params: RetrievalParams,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        params: RetrievalParams,
    ) -> Self {
        Self {
            store,
            embedder,
            params,
        }
    }

    pub fn params(&self) -> RetrievalParams {
        self.params
    }

    pub fn store(&self) -> &dyn VectorStore {
        self.store.as_ref()
    }

    /// Relevant chunks for `query`, best first. Empty when nothing clears
    /// the threshold.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Chunk>> {
        Ok(self
            .retrieve_scored(query)
            .await?
            .into_iter()
            .map(|s| s.chunk)
            .collect())
    }

    /// Like [`retrieve`](Self::retrieve) but keeps the similarity scores.
    pub async fn retrieve_scored(&self, query: &str) -> Result<Vec<ScoredChunk>> {
        let embedding = self.embedder.embed_one(query).await?;
        let results = self.store.query(
            &embedding,
            self.params.max_results,
            self.params.similarity_threshold,
        )?;
        debug!(
            hits = results.len(),
            top_score = results.first().map(|r| r.score),
            "retrieved chunks"
        );
        Ok(results)
    }
}
