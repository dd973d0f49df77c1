//! Retrieval-augmented answering.
//!
//! [`AnswerPipeline`] owns a [`Session`] and the capabilities needed to
//! build and query it. Several pipelines may coexist; nothing is global.
//!
//! # Answer flow
//!
//! 1. Require a `Ready` session (else [`Error::SessionNotReady`], before the
//!    generator is touched).
//! 2. Retrieve the top chunks for the question.
//! 3. Build the prompt: policy instruction, JSON evidence, question.
//! 4. Stream the generator's fragments; [`AnswerPipeline::ask`]
//!    concatenates them in arrival order.
//!
//! Out-of-domain questions are not errors: with no evidence the model is
//! still asked, and the policy instructs it to refuse.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::{AbortRegistration, Abortable};
use pdfqa_core::chunk::TextChunker;
use pdfqa_core::generate::{collect_fragments, FragmentStream, TextGenerator};
use pdfqa_core::models::Chunk;
use pdfqa_core::prompt::{build_prompt, AnswerPolicy};
use pdfqa_core::store::ScoredChunk;
use pdfqa_core::tokenizer::tokenizer_by_name;
use pdfqa_core::{Error, Result};
use tracing::{debug, info};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::generation::create_generator;
use crate::pdf::DocumentLoader;
use crate::session::{BuildOptions, BuildSummary, Session, SessionBuilder, SessionStatus};

pub struct AnswerPipeline {
    session: Session,
    builder: SessionBuilder,
    generator: Arc<dyn TextGenerator>,
    policy: AnswerPolicy,
}

impl AnswerPipeline {
    pub fn new(
        builder: SessionBuilder,
        generator: Arc<dyn TextGenerator>,
        policy: AnswerPolicy,
    ) -> Self {
        Self {
            session: Session::new(),
            builder,
            generator,
            policy,
        }
    }

    /// Wire up the tokenizer, providers and policy named in `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let tokenizer = tokenizer_by_name(&config.chunking.tokenizer)?;
        let chunker = TextChunker::new(config.chunking.max_tokens, Arc::from(tokenizer));
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;

        let builder = SessionBuilder::new(
            DocumentLoader::new(&config.pdf),
            chunker,
            embedder,
            BuildOptions {
                batch_size: config.embedding.batch_size,
                concurrency: config.embedding.concurrency,
                skip_unreadable: config.pdf.skip_unreadable,
                retrieval: config.retrieval.params(),
            },
        );
        Ok(Self::new(builder, generator, config.policy.clone()))
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Build a fresh session from `paths`, replacing any previous one.
    ///
    /// On failure (or if this future is dropped) the session is left
    /// uninitialized.
    pub async fn build_session(&self, paths: &[PathBuf]) -> Result<BuildSummary> {
        let guard = self.session.begin_build()?;
        info!(files = paths.len(), "building session");
        let ready = self.builder.build(paths).await?;
        let ready = guard.complete(ready);
        let summary = ready.summary();
        info!(
            documents = summary.documents,
            pages = summary.pages,
            chunks = summary.chunks,
            "session ready"
        );
        Ok(summary)
    }

    pub async fn retrieve(&self, question: &str) -> Result<Vec<Chunk>> {
        self.session.ready()?.retriever.retrieve(question).await
    }

    pub async fn retrieve_scored(&self, question: &str) -> Result<Vec<ScoredChunk>> {
        self.session.ready()?.retriever.retrieve_scored(question).await
    }

    /// Start answering and return the raw fragment stream.
    pub async fn answer_stream(&self, question: &str) -> Result<FragmentStream> {
        let ready = self.session.ready()?;
        let evidence = ready.retriever.retrieve(question).await?;
        debug!(evidence = evidence.len(), "assembling prompt");
        let prompt = build_prompt(&self.policy, &evidence, question)?;
        self.generator.generate(&prompt).await
    }

    /// Answer `question` and return the complete text.
    pub async fn ask(&self, question: &str) -> Result<String> {
        let stream = self.answer_stream(question).await?;
        collect_fragments(stream).await
    }

    /// Like [`ask`](Self::ask), but stops as soon as the paired
    /// `AbortHandle` is triggered, dropping the upstream stream.
    pub async fn answer_with_abort(
        &self,
        question: &str,
        registration: AbortRegistration,
    ) -> Result<String> {
        match Abortable::new(self.ask(question), registration).await {
            Ok(answer) => answer,
            Err(_aborted) => Err(Error::Cancelled),
        }
    }
}
