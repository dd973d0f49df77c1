//! Streaming text-generation capability.
//!
//! A [`TextGenerator`] turns a prompt into a stream of text fragments. The
//! concatenation of all fragments, in arrival order, is the answer.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};

use crate::error::Result;
use crate::prompt::PromptMessage;

/// A stream of answer fragments. An `Err` item aborts the answer.
pub type FragmentStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Model identifier (e.g. `"gpt-4"`).
    fn model_name(&self) -> &str;

    /// Start generating. Errors before the first fragment are returned
    /// directly; errors mid-stream arrive as stream items.
    async fn generate(&self, messages: &[PromptMessage]) -> Result<FragmentStream>;
}

/// Drain a fragment stream into one string, stopping at the first error.
pub async fn collect_fragments(mut stream: FragmentStream) -> Result<String> {
    let mut answer = String::new();
    while let Some(fragment) = stream.next().await {
        answer.push_str(&fragment?);
    }
    Ok(answer)
}
