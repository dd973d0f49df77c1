//! Session lifecycle and index building.
//!
//! A [`Session`] moves through `Uninitialized → Building → Ready`. Only a
//! fully successful build reaches `Ready`; a failed or cancelled build
//! (the build future dropped mid-way) leaves the session `Uninitialized`.
//! A build requested while another is running is rejected with
//! [`Error::BuildInProgress`].
//!
//! [`SessionBuilder`] does the work of a build:
//!
//! ```text
//! paths ─► DocumentLoader ─► Vec<Document>
//!                               │
//!                               ▼
//!                         TextChunker ─► Vec<Chunk>
//!                                           │  batches, `concurrency` in flight
//!                                           ▼
//!                                      Embedder ─► MemoryVectorIndex
//! ```

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::stream::{self, StreamExt, TryStreamExt};
use pdfqa_core::chunk::TextChunker;
use pdfqa_core::embedding::Embedder;
use pdfqa_core::models::{Chunk, Document};
use pdfqa_core::retrieve::{RetrievalParams, Retriever};
use pdfqa_core::store::memory::MemoryVectorIndex;
use pdfqa_core::store::VectorStore;
use pdfqa_core::{Error, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::pdf::DocumentLoader;

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Uninitialized,
    Building,
    Ready,
}

/// A fully built, read-only session.
pub struct ReadySession {
    pub documents: Vec<Document>,
    pub retriever: Retriever,
}

impl ReadySession {
    pub fn summary(&self) -> BuildSummary {
        BuildSummary {
            documents: self.documents.len(),
            pages: self.documents.iter().map(|d| d.page_count()).sum(),
            images: self.documents.iter().map(|d| d.image_count()).sum(),
            chunks: self.retriever.store().len(),
        }
    }
}

/// Counts reported after a successful build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuildSummary {
    pub documents: usize,
    pub pages: usize,
    pub images: usize,
    pub chunks: usize,
}

enum State {
    Uninitialized,
    Building,
    Ready(Arc<ReadySession>),
}

/// Holds the state of one question-answering session.
pub struct Session {
    state: Mutex<State>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::Uninitialized),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn status(&self) -> SessionStatus {
        match *self.lock() {
            State::Uninitialized => SessionStatus::Uninitialized,
            State::Building => SessionStatus::Building,
            State::Ready(_) => SessionStatus::Ready,
        }
    }

    /// The built session, or [`Error::SessionNotReady`].
    pub fn ready(&self) -> Result<Arc<ReadySession>> {
        match &*self.lock() {
            State::Ready(ready) => Ok(ready.clone()),
            _ => Err(Error::SessionNotReady),
        }
    }

    /// Enter `Building`. The returned guard resets the session to
    /// `Uninitialized` unless [`BuildGuard::complete`] is called.
    pub fn begin_build(&self) -> Result<BuildGuard<'_>> {
        let mut state = self.lock();
        if matches!(*state, State::Building) {
            return Err(Error::BuildInProgress);
        }
        *state = State::Building;
        Ok(BuildGuard {
            session: self,
            completed: false,
        })
    }
}

/// Marks a session as building for as long as it lives.
pub struct BuildGuard<'a> {
    session: &'a Session,
    completed: bool,
}

impl BuildGuard<'_> {
    pub fn complete(mut self, ready: ReadySession) -> Arc<ReadySession> {
        let ready = Arc::new(ready);
        *self.session.lock() = State::Ready(ready.clone());
        self.completed = true;
        ready
    }
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            *self.session.lock() = State::Uninitialized;
        }
    }
}

/// Build-time settings.
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    pub batch_size: usize,
    pub concurrency: usize,
    pub skip_unreadable: bool,
    pub retrieval: RetrievalParams,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            batch_size: 64,
            concurrency: 4,
            skip_unreadable: false,
            retrieval: RetrievalParams::default(),
        }
    }
}

/// Loads, chunks and indexes a set of PDF files.
#[derive(Clone)]
pub struct SessionBuilder {
    loader: DocumentLoader,
    chunker: TextChunker,
    embedder: Arc<dyn Embedder>,
    options: BuildOptions,
}

impl SessionBuilder {
    pub fn new(
        loader: DocumentLoader,
        chunker: TextChunker,
        embedder: Arc<dyn Embedder>,
        options: BuildOptions,
    ) -> Self {
        Self {
            loader,
            chunker,
            embedder,
            options,
        }
    }

    /// Run a full build. Nothing is shared with any previous build.
    pub async fn build(&self, paths: &[PathBuf]) -> Result<ReadySession> {
        let documents = self
            .loader
            .load_all(paths, self.options.skip_unreadable)
            .await?;
        let chunks = self.chunker.chunk_documents(&documents);
        info!(
            documents = documents.len(),
            chunks = chunks.len(),
            tokenizer = self.chunker.tokenizer().name(),
            "chunked documents"
        );

        let embeddings = self.embed_chunks(&chunks).await?;

        let index = MemoryVectorIndex::new();
        index.insert_batch(chunks, embeddings)?;
        info!(entries = index.len(), model = self.embedder.model_name(), "index built");

        let retriever = Retriever::new(
            Arc::new(index),
            self.embedder.clone(),
            self.options.retrieval,
        );
        Ok(ReadySession {
            documents,
            retriever,
        })
    }

    /// Embed chunk texts in batches, keeping chunk order.
    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let batches: Vec<Vec<String>> = chunks
            .chunks(self.options.batch_size.max(1))
            .map(|batch| batch.iter().map(|c| c.text.clone()).collect())
            .collect();
        let total = batches.len();

        let embedded: Vec<Vec<Vec<f32>>> = stream::iter(batches.into_iter().enumerate())
            .map(|(i, texts)| {
                let embedder = self.embedder.clone();
                async move {
                    let vectors = embedder.embed(&texts).await?;
                    if vectors.len() != texts.len() {
                        return Err(Error::Embedding(format!(
                            "batch {}: expected {} embeddings, got {}",
                            i,
                            texts.len(),
                            vectors.len()
                        )));
                    }
                    debug!(batch = i + 1, total, size = texts.len(), "embedded batch");
                    Ok(vectors)
                }
            })
            .buffered(self.options.concurrency.max(1))
            .try_collect()
            .await?;

        Ok(embedded.into_iter().flatten().collect())
    }
}
