//! Token counting for chunk sizing.
//!
//! The chunker only needs to know how many tokens a candidate piece of text
//! would cost, so the seam is a single counting method. Two tokenizers are
//! provided:
//!
//! | Tokenizer | Counting rule |
//! |-----------|---------------|
//! | [`Cl100kTokenizer`] | exact `cl100k_base` BPE count (OpenAI embedding models) |
//! | [`ApproxTokenizer`] | `ceil(chars / 4)` heuristic, no model data needed |

use crate::error::{Error, Result};

/// Maps text to the number of tokens an embedding model would see.
///
/// Implementations must be monotonic with respect to appending text for
/// the chunker's greedy packing to be tight, but the chunker never relies
/// on it for correctness: every emitted chunk is re-counted.
pub trait Tokenizer: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;

    /// Short identifier used in logs (e.g. `"cl100k"`).
    fn name(&self) -> &str;
}

/// Approximate characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Character-count heuristic: 4 characters ≈ 1 token.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxTokenizer;

impl Tokenizer for ApproxTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        let chars = text.chars().count();
        chars.div_ceil(CHARS_PER_TOKEN)
    }

    fn name(&self) -> &str {
        "approx"
    }
}

/// The `cl100k_base` byte-pair encoding used by `text-embedding-ada-002`
/// and the `gpt-4` family.
pub struct Cl100kTokenizer {
    bpe: tiktoken_rs::CoreBPE,
}

impl Cl100kTokenizer {
    pub fn new() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| Error::Embedding(format!("failed to load cl100k_base: {}", e)))?;
        Ok(Self { bpe })
    }
}

impl Tokenizer for Cl100kTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    fn name(&self) -> &str {
        "cl100k"
    }
}

/// Create a tokenizer by configuration name (`"cl100k"` or `"approx"`).
pub fn tokenizer_by_name(name: &str) -> Result<Box<dyn Tokenizer>> {
    match name {
        "cl100k" => Ok(Box::new(Cl100kTokenizer::new()?)),
        "approx" => Ok(Box::new(ApproxTokenizer)),
        other => Err(Error::Embedding(format!(
            "unknown tokenizer '{}': expected cl100k or approx",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approx_rounds_up() {
        let t = ApproxTokenizer;
        assert_eq!(t.count_tokens(""), 0);
        assert_eq!(t.count_tokens("abc"), 1);
        assert_eq!(t.count_tokens("abcd"), 1);
        assert_eq!(t.count_tokens("abcde"), 2);
    }

    #[test]
    fn approx_counts_chars_not_bytes() {
        // 4 two-byte characters
        assert_eq!(ApproxTokenizer.count_tokens("éééé"), 1);
    }

    #[test]
    fn cl100k_counts_words() {
        let t = Cl100kTokenizer::new().unwrap();
        assert_eq!(t.count_tokens(""), 0);
        assert_eq!(t.count_tokens("hello"), 1);
        assert!(t.count_tokens("The capital of France is Paris.") >= 6);
    }

    #[test]
    fn unknown_tokenizer_is_rejected() {
        assert!(tokenizer_by_name("sentencepiece").is_err());
        assert_eq!(tokenizer_by_name("approx").unwrap().name(), "approx");
    }
}
