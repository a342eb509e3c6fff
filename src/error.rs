//! Error types for the retrieval and agent pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that cross component boundaries inside a conversational turn.
///
/// Collaborator plumbing (HTTP clients, vector stores) reports `anyhow`
/// errors; the vector index and tools translate them into these variants so
/// the agent controller can pick the right user-visible message.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The query was empty after trimming.
    #[error("query must not be empty")]
    EmptyQuery,

    /// The embedding service or the vector store failed or timed out.
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// A text-completion call failed.
    #[error("completion failed: {0}")]
    Completion(String),

    /// Configuration was rejected at startup.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    /// The kind recorded on a [`Response`](crate::models::Response) when this
    /// error ends a turn.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::RetrievalUnavailable(_) => ErrorKind::RetrievalUnavailable,
            _ => ErrorKind::Internal,
        }
    }
}

/// Serializable tag for the failure that shaped a turn's response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RetrievalUnavailable,
    ReasoningExhausted,
    Internal,
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieval_error_maps_to_its_kind() {
        let err = PipelineError::RetrievalUnavailable("store down".into());
        assert_eq!(err.kind(), ErrorKind::RetrievalUnavailable);
    }

    #[test]
    fn test_other_errors_map_to_internal() {
        assert_eq!(PipelineError::EmptyQuery.kind(), ErrorKind::Internal);
        assert_eq!(
            PipelineError::Completion("boom".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_error_kind_serializes_to_snake_case() {
        let json = serde_json::to_value(ErrorKind::ReasoningExhausted).unwrap();
        assert_eq!(json, "reasoning_exhausted");
    }
}
