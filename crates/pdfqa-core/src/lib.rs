//! # pdfqa core
//!
//! Runtime-agnostic logic for pdfqa: data models, error taxonomy,
//! tokenizers, chunking, the embedding and generation capabilities, the
//! vector store and its in-memory index, retrieval, and prompt assembly.
//!
//! This crate contains no tokio, filesystem I/O, PDF parsing, or network
//! code. Those live in the `pdfqa` application crate, which implements the
//! [`embedding::Embedder`] and [`generate::TextGenerator`] traits for real
//! providers.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod generate;
pub mod models;
pub mod prompt;
pub mod retrieve;
pub mod store;
pub mod tokenizer;

pub use error::{Error, Result};
