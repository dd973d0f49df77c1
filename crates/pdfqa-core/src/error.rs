//! Error taxonomy shared by every stage of the pipeline.
//!
//! Library operations return [`Result<T>`]. Configuration parsing and the
//! CLI layer wrap these errors in `anyhow` with additional context.

use std::path::PathBuf;
use std::time::Duration;

/// Structured failure of an extraction, indexing, or answering operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input does not start with the `%PDF-` signature.
    #[error("{input} is not a PDF (missing %PDF- signature)")]
    InvalidFormat { input: String },

    /// The bytes carry a PDF signature but the document or one of its pages
    /// cannot be parsed.
    #[error("failed to parse {input}: {message}")]
    Parse { input: String, message: String },

    /// An embedded object was not materialized before the resolve timeout.
    #[error("object {object_id} did not resolve within {waited:?}")]
    ResolutionTimeout { object_id: String, waited: Duration },

    /// An embedded object was materialized as a failure (undecodable stream,
    /// missing required keys).
    #[error("object {object_id} is unavailable: {reason}")]
    ObjectUnavailable { object_id: String, reason: String },

    /// An embedding's length disagrees with the index dimension.
    #[error("embedding dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A query arrived before a session was successfully built.
    #[error("session not ready: build a session before asking questions")]
    SessionNotReady,

    /// A build was requested while another build is running.
    #[error("a session build is already in progress")]
    BuildInProgress,

    /// The embedding capability failed.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The text-generation capability failed or its stream aborted.
    #[error("generation failed: {0}")]
    Generation(String),

    /// The caller cancelled an in-flight answer.
    #[error("answer cancelled")]
    Cancelled,

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for [`Error::Parse`].
    pub fn parse(input: impl Into<String>, message: impl ToString) -> Self {
        Error::Parse {
            input: input.into(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_input() {
        let err = Error::InvalidFormat {
            input: "notes.txt".to_string(),
        };
        assert!(err.to_string().contains("notes.txt"));

        let err = Error::DimensionMismatch {
            expected: 3,
            actual: 4,
        };
        assert_eq!(
            err.to_string(),
            "embedding dimension mismatch: index has 3, got 4"
        );
    }

    #[test]
    fn timeout_reports_wait() {
        let err = Error::ResolutionTimeout {
            object_id: "Im1".to_string(),
            waited: Duration::from_millis(250),
        };
        assert!(err.to_string().contains("Im1"));
        assert!(err.to_string().contains("250ms"));
    }
}
