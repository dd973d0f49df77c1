//! Implementations behind the `pdfqa` subcommands.
//!
//! Each `run_*` function owns its output format. Structured results go to
//! stdout as JSON; progress and diagnostics go through `tracing` to stderr.

use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use base64::Engine;
use futures::StreamExt;
use pdfqa_core::chunk::TextChunker;
use pdfqa_core::generate::FragmentStream;
use pdfqa_core::models::{Document, ImageRecord};
use pdfqa_core::tokenizer::tokenizer_by_name;
use pdfqa_core::Error;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::config::Config;
use crate::inputs::collect_pdf_paths;
use crate::pdf::DocumentLoader;
use crate::pipeline::AnswerPipeline;

/// `pdfqa extract <file>`: print the loaded document as JSON.
pub async fn run_extract(config: &Config, path: &Path, include_image_data: bool) -> Result<()> {
    let loader = DocumentLoader::new(&config.pdf);
    let document = loader
        .load(path)
        .await
        .with_context(|| format!("Failed to load {}", path.display()))?;

    let output = document_json(&document, include_image_data);
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn document_json(document: &Document, include_image_data: bool) -> Value {
    let pages: Vec<Value> = document
        .pages
        .iter()
        .map(|page| {
            let images: Vec<Value> = page
                .images
                .iter()
                .map(|image| image_json(image, include_image_data))
                .collect();
            json!({
                "page_number": page.page_number,
                "text": page.text,
                "images": images,
            })
        })
        .collect();

    json!({
        "source": document.source,
        "fingerprint": document.fingerprint,
        "page_count": document.page_count(),
        "pages": pages,
    })
}

fn image_json(image: &ImageRecord, include_data: bool) -> Value {
    let mut value = json!({
        "object_id": image.object_id,
        "width": image.width,
        "height": image.height,
        "color_space": image.color_space,
        "bits_per_component": image.bits_per_component,
        "filters": image.filters,
        "bytes": image.raw_data.len(),
    });
    if include_data {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&image.raw_data);
        value["raw_data"] = Value::String(encoded);
    }
    value
}

/// `pdfqa chunks <paths>`: print every chunk a build would index. Needs no
/// embedding or generation provider.
pub async fn run_chunks(config: &Config, inputs: &[PathBuf]) -> Result<()> {
    let paths = resolve_inputs(inputs)?;
    let loader = DocumentLoader::new(&config.pdf);
    let tokenizer = tokenizer_by_name(&config.chunking.tokenizer)?;
    let chunker = TextChunker::new(config.chunking.max_tokens, Arc::from(tokenizer));

    let documents = loader.load_all(&paths, config.pdf.skip_unreadable).await?;
    let chunks = chunker.chunk_documents(&documents);
    info!(documents = documents.len(), chunks = chunks.len(), "chunked");

    println!("{}", serde_json::to_string_pretty(&chunks)?);
    Ok(())
}

/// `pdfqa search <query>`: build a session and print scored matches.
pub async fn run_search(config: &Config, query: &str, inputs: &[PathBuf]) -> Result<()> {
    let pipeline = build_pipeline(config, inputs).await?;
    let results = pipeline.retrieve_scored(query).await?;

    if results.is_empty() {
        eprintln!("No results above threshold {}.", config.retrieval.similarity_threshold);
    }
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

/// `pdfqa ask <question>`: answer once, streaming fragments to stdout.
pub async fn run_ask(config: &Config, question: &str, inputs: &[PathBuf]) -> Result<()> {
    let pipeline = build_pipeline(config, inputs).await?;
    stream_answer(&pipeline, question).await
}

/// `pdfqa chat`: answer each line read from stdin against one session.
pub async fn run_chat(config: &Config, inputs: &[PathBuf]) -> Result<()> {
    let pipeline = build_pipeline(config, inputs).await?;
    eprintln!("Session ready. Ask a question (Ctrl-D to quit).");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        io::stderr().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        // Ctrl-C ends the current answer, not the chat.
        match stream_answer(&pipeline, question).await {
            Err(e) if is_cancelled(&e) => continue,
            result => result?,
        }
    }
    Ok(())
}

fn is_cancelled(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<Error>(), Some(Error::Cancelled))
}

async fn build_pipeline(config: &Config, inputs: &[PathBuf]) -> Result<AnswerPipeline> {
    let paths = resolve_inputs(inputs)?;
    let pipeline = AnswerPipeline::from_config(config)?;
    let summary = pipeline.build_session(&paths).await?;
    eprintln!(
        "Indexed {} document(s), {} page(s), {} chunk(s).",
        summary.documents, summary.pages, summary.chunks
    );
    Ok(pipeline)
}

fn resolve_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let paths = collect_pdf_paths(inputs)?;
    if paths.is_empty() {
        bail!("No PDF files found in the given inputs");
    }
    Ok(paths)
}

/// Stream an answer to stdout. Ctrl-C stops it with [`Error::Cancelled`].
async fn stream_answer(pipeline: &AnswerPipeline, question: &str) -> Result<()> {
    let fragments = pipeline.answer_stream(question).await?;
    write_fragments(fragments, &mut io::stdout(), tokio::signal::ctrl_c()).await
}

/// Write fragments to `out` as they arrive. If `cancel` completes first the
/// stream, and with it the upstream request, is dropped.
async fn write_fragments<W, C>(
    mut fragments: FragmentStream,
    out: &mut W,
    cancel: C,
) -> Result<()>
where
    W: Write,
    C: Future,
{
    tokio::pin!(cancel);
    loop {
        tokio::select! {
            next = fragments.next() => match next {
                Some(fragment) => {
                    out.write_all(fragment?.as_bytes())?;
                    out.flush()?;
                }
                None => break,
            },
            _ = &mut cancel => {
                eprintln!("\n[cancelled]");
                return Err(Error::Cancelled.into());
            }
        }
    }
    writeln!(out)?;
    Ok(())
}
