//! # pdfqa
//!
//! Question answering over a set of PDF files.
//!
//! PDFs are loaded into per-page text and images, split into token-bounded
//! chunks, embedded into an in-memory vector index, and queried to ground a
//! streaming chat model's answers. The domain-agnostic pieces (chunking,
//! retrieval, prompt assembly) live in the `pdfqa-core` crate; this crate
//! adds PDF parsing, HTTP providers, configuration and the CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌────────────┐
//! │ PDF      │──▶│ Chunker  │──▶│ Embedder  │──▶│ In-memory  │
//! │ loader   │   │ (tokens) │   │ (batched) │   │ index      │
//! └──────────┘   └──────────┘   └───────────┘   └─────┬──────┘
//!                                                     │ top-k
//!                                    ┌────────────────┘
//!                                    ▼
//!                              ┌───────────┐   ┌───────────┐
//!                              │ Prompt    │──▶│ Generator │──▶ fragments
//!                              └───────────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pdfqa extract manual.pdf
//! pdfqa search "reset password" --input docs/
//! pdfqa ask "How do I rotate keys?" --input docs/
//! pdfqa chat --input docs/
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`pdf`] | PDF loading, page rendering, image resolution |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Streaming chat providers |
//! | [`session`] | Session lifecycle and index building |
//! | [`pipeline`] | Retrieval-augmented answering |
//! | [`inputs`] | Input path expansion |
//! | [`commands`] | CLI command implementations |

pub mod commands;
pub mod config;
pub mod embedding;
pub mod generation;
pub mod inputs;
pub mod pdf;
pub mod pipeline;
pub mod session;
