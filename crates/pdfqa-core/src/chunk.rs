//! Token-bounded text chunker.
//!
//! Splits page text into [`Chunk`]s whose token count, as reported by the
//! caller-supplied [`Tokenizer`], never exceeds `max_tokens`. Splitting
//! happens between whitespace-delimited words so sub-word token units are
//! never broken; a single word that alone exceeds the budget is cut at the
//! longest character prefix that fits.
//!
//! # Algorithm
//!
//! 1. Split the page text on whitespace runs.
//! 2. Greedily append words (joined by one space) to a buffer while the
//!    buffer's token count stays within `max_tokens`.
//! 3. When the next word does not fit, flush the buffer as a chunk.
//! 4. An oversized word is hard-split by binary search over its character
//!    boundaries; its tail stays in the buffer so following words can join it.
//!
//! Pages are chunked independently and in order, so every chunk maps back to
//! exactly one page. Empty pages produce no chunks.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use pdfqa_core::chunk::TextChunker;
//! use pdfqa_core::tokenizer::ApproxTokenizer;
//!
//! let chunker = TextChunker::new(4, Arc::new(ApproxTokenizer));
//! let pieces = chunker.split_text("alpha beta gamma delta");
//! assert_eq!(pieces.len(), 2);
//! assert!(pieces.iter().all(|(_, tokens)| *tokens <= 4));
//! ```

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::models::{Chunk, Document, PageRef};
use crate::tokenizer::Tokenizer;

/// Splits document text into token-bounded chunks.
#[derive(Clone)]
pub struct TextChunker {
    max_tokens: usize,
    tokenizer: Arc<dyn Tokenizer>,
}

impl TextChunker {
    /// `max_tokens` is clamped to at least 1.
    pub fn new(max_tokens: usize, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            max_tokens: max_tokens.max(1),
            tokenizer,
        }
    }

    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.tokenizer.as_ref()
    }

    /// Chunk every page of every document, preserving document and page
    /// order.
    ///
    /// `document_index` in each chunk's [`PageRef`] is the position of the
    /// document in `documents`.
    pub fn chunk_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        documents
            .iter()
            .enumerate()
            .flat_map(|(idx, doc)| self.chunk_document(idx, doc))
            .collect()
    }

    /// Chunk one document's pages in order.
    pub fn chunk_document(&self, document_index: usize, document: &Document) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for page in &document.pages {
            let source_ref = PageRef {
                document_index,
                source: document.source.clone(),
                page_number: page.page_number,
            };
            for (chunk_index, (text, token_count)) in
                self.split_text(&page.text).into_iter().enumerate()
            {
                chunks.push(make_chunk(
                    source_ref.clone(),
                    chunk_index,
                    text,
                    token_count,
                ));
            }
        }
        chunks
    }

    /// Split a single text into `(piece, token_count)` pairs.
    ///
    /// Every piece is non-empty and within budget, except a lone character
    /// that by itself costs more than `max_tokens`, which is emitted as its
    /// own piece.
    pub fn split_text(&self, text: &str) -> Vec<(String, usize)> {
        let mut out = Vec::new();
        let mut current = String::new();
        let mut current_tokens = 0usize;

        for word in text.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", current, word)
            };
            let n = self.count(&candidate);
            if n <= self.max_tokens {
                current = candidate;
                current_tokens = n;
                continue;
            }

            if !current.is_empty() {
                out.push((std::mem::take(&mut current), current_tokens));
                current_tokens = 0;
            }

            let n = self.count(word);
            if n <= self.max_tokens {
                current = word.to_string();
                current_tokens = n;
                continue;
            }

            // Oversized word: emit full-budget prefixes, keep the tail open.
            let mut rest = word;
            loop {
                let cut = self.longest_fitting_prefix(rest);
                let piece = &rest[..cut];
                let piece_tokens = self.count(piece);
                if cut == rest.len() {
                    current = piece.to_string();
                    current_tokens = piece_tokens;
                    break;
                }
                out.push((piece.to_string(), piece_tokens));
                rest = &rest[cut..];
            }
        }

        if !current.is_empty() {
            out.push((current, current_tokens));
        }
        out
    }

    fn count(&self, text: &str) -> usize {
        self.tokenizer.count_tokens(text)
    }

    /// Byte length of the longest prefix of `word` (on a char boundary) whose
    /// token count fits the budget. Always at least one character.
    fn longest_fitting_prefix(&self, word: &str) -> usize {
        let boundaries: Vec<usize> = word
            .char_indices()
            .map(|(i, _)| i)
            .skip(1)
            .chain(std::iter::once(word.len()))
            .collect();

        // boundaries[0] is the end of the first character.
        let mut lo = 0usize;
        let mut hi = boundaries.len() - 1;
        if self.count(&word[..boundaries[hi]]) <= self.max_tokens {
            return boundaries[hi];
        }
        while lo < hi {
            let mid = (lo + hi).div_ceil(2);
            if self.count(&word[..boundaries[mid]]) <= self.max_tokens {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        boundaries[lo]
    }
}

fn make_chunk(source_ref: PageRef, chunk_index: usize, text: String, token_count: usize) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        text,
        source_ref,
        chunk_index,
        token_count,
        hash,
    }
}
