//! In-memory [`VectorStore`] implementation.
//!
//! Entries live in a `Vec` behind `std::sync::RwLock`, so insertion order is
//! the natural tie-breaker for equal scores. Queries are brute-force cosine
//! similarity over every stored vector: O(n · d) per query.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};
use crate::models::Chunk;

use super::{ScoredChunk, VectorStore};

struct Entry {
    key: String,
    chunk: Chunk,
    embedding: Vec<f32>,
}

#[derive(Default)]
struct Inner {
    dims: Option<usize>,
    entries: Vec<Entry>,
}

impl Inner {
    fn check(&self, expected: Option<usize>, embedding: &[f32]) -> Result<()> {
        if embedding.is_empty() {
            return Err(Error::Embedding("zero-length embedding".to_string()));
        }
        match expected {
            Some(d) if d != embedding.len() => Err(Error::DimensionMismatch {
                expected: d,
                actual: embedding.len(),
            }),
            _ => Ok(()),
        }
    }

    fn push(&mut self, chunk: Chunk, embedding: Vec<f32>) -> String {
        let key = Uuid::new_v4().to_string();
        self.dims.get_or_insert(embedding.len());
        self.entries.push(Entry {
            key: key.clone(),
            chunk,
            embedding,
        });
        key
    }
}

/// Brute-force in-memory vector index.
#[derive(Default)]
pub struct MemoryVectorIndex {
    inner: RwLock<Inner>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up a stored chunk by its entry key.
    pub fn get(&self, key: &str) -> Option<Chunk> {
        self.read()
            .entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.chunk.clone())
    }
}

impl VectorStore for MemoryVectorIndex {
    fn insert(&self, chunk: Chunk, embedding: Vec<f32>) -> Result<String> {
        let mut inner = self.write();
        inner.check(inner.dims, &embedding)?;
        Ok(inner.push(chunk, embedding))
    }

    fn insert_batch(&self, chunks: Vec<Chunk>, embeddings: Vec<Vec<f32>>) -> Result<Vec<String>> {
        if chunks.len() != embeddings.len() {
            return Err(Error::Embedding(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        let mut inner = self.write();
        let mut expected = inner.dims;
        for embedding in &embeddings {
            inner.check(expected, embedding)?;
            expected.get_or_insert(embedding.len());
        }

        Ok(chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| inner.push(chunk, embedding))
            .collect())
    }

    fn query(&self, embedding: &[f32], top_k: usize, threshold: f32) -> Result<Vec<ScoredChunk>> {
        let inner = self.read();
        if let Some(d) = inner.dims {
            if d != embedding.len() {
                return Err(Error::DimensionMismatch {
                    expected: d,
                    actual: embedding.len(),
                });
            }
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, &Entry)> = inner
            .entries
            .iter()
            .map(|e| (cosine_similarity(embedding, &e.embedding), e))
            .filter(|(score, _)| *score >= threshold)
            .collect();

        // sort_by is stable: equal scores keep insertion order.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(score, e)| ScoredChunk {
                chunk: e.chunk.clone(),
                score,
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.read().entries.len()
    }

    fn dims(&self) -> Option<usize> {
        self.read().dims
    }
}
