//! Vector storage abstraction.
//!
//! The [`VectorStore`] trait is the seam between retrieval and the data
//! structure holding chunk embeddings. The only implementation shipped is
//! the brute-force [`memory::MemoryVectorIndex`]; an approximate
//! nearest-neighbour index would implement the same trait.
//!
//! Implementations must be `Send + Sync` so a built session can be shared
//! across tasks.

pub mod memory;

use serde::Serialize;

use crate::error::Result;
use crate::models::Chunk;

/// A chunk returned from a similarity query together with its score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity against the query embedding.
    pub score: f32,
}

/// Storage and similarity search over `(Chunk, embedding)` pairs.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert`](VectorStore::insert) | Add one chunk and its embedding |
/// | [`insert_batch`](VectorStore::insert_batch) | Add many pairs, all or nothing |
/// | [`query`](VectorStore::query) | Top-K chunks at or above a threshold |
pub trait VectorStore: Send + Sync {
    /// Store a chunk with its embedding, returning the entry's key.
    fn insert(&self, chunk: Chunk, embedding: Vec<f32>) -> Result<String>;

    /// Store many chunks. Every pair is validated before any is inserted.
    fn insert_batch(&self, chunks: Vec<Chunk>, embeddings: Vec<Vec<f32>>) -> Result<Vec<String>>;

    /// Rank stored chunks by cosine similarity to `embedding`.
    ///
    /// Returns at most `top_k` results with `score >= threshold`, in
    /// descending score order, ties in insertion order.
    fn query(&self, embedding: &[f32], top_k: usize, threshold: f32) -> Result<Vec<ScoredChunk>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimension established by the first insertion, if any.
    fn dims(&self) -> Option<usize>;
}
