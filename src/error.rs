//! Error taxonomy surfaced at the service boundary.
//!
//! Component-local failures (one loader, one document's header split) are
//! absorbed inside their component. Everything that reaches the boundary is
//! one of the variants below, and each variant maps to exactly one
//! [`ErrorClass`] so transports can pick a status code without parsing
//! messages.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Boundary class for an error; transports map these 1:1 to status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Wait or run ingestion, then retry (503).
    RetryLater,
    /// The request itself must change (400).
    ClientError,
    /// Temporary admission denial (429).
    TooManyRequests,
    /// A bounded backend call exceeded its budget (504).
    GatewayTimeout,
    /// The corpus has nothing to index (422).
    Unprocessable,
    /// Anything else (500).
    Internal,
}

/// Why the engine cannot serve chat right now.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotReady {
    #[error("Initialization has not started yet. Please wait a moment and try again.")]
    NotStarted,
    #[error("Still initializing. Please wait a moment and try again.")]
    Initializing,
    #[error("Core components are not available. Please wait a moment and try again.")]
    CoreUnavailable,
    #[error("{0}")]
    Failed(String),
}

/// Input rejected by the token budget gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Input exceeds {limit} tokens ({count} tokens)")]
pub struct ExceedsLimit {
    pub count: usize,
    pub limit: usize,
}

/// A dispatched call did not finish within its budget.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{label} timed out after {after:?}")]
pub struct TimedOut {
    pub label: String,
    pub after: Duration,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    NotReady(#[from] NotReady),

    #[error("message must not be empty")]
    EmptyMessage,

    #[error(transparent)]
    ExceedsLimit(#[from] ExceedsLimit),

    #[error("{message}")]
    RateLimited {
        message: String,
        retry_after: Duration,
    },

    #[error("Document retrieval timed out after {0:?}. Please try again.")]
    RetrievalTimeout(Duration),

    #[error("The language model took longer than {0:?} to respond. Please try again.")]
    GenerationTimeout(Duration),

    #[error("No documents found in the vector store. Please ingest documents first.")]
    NoDocumentsRetrieved,

    #[error("Error retrieving documents: {0}")]
    Retrieval(String),

    #[error("Error getting AI response: {0}")]
    Generation(String),
}

impl ChatError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ChatError::NotReady(_) | ChatError::NoDocumentsRetrieved => ErrorClass::RetryLater,
            ChatError::EmptyMessage | ChatError::ExceedsLimit(_) => ErrorClass::ClientError,
            ChatError::RateLimited { .. } => ErrorClass::TooManyRequests,
            ChatError::RetrievalTimeout(_) | ChatError::GenerationTimeout(_) => {
                ErrorClass::GatewayTimeout
            }
            ChatError::Retrieval(_) | ChatError::Generation(_) => ErrorClass::Internal,
        }
    }

    /// Transient failures the caller may simply retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChatError::RetrievalTimeout(_)
                | ChatError::GenerationTimeout(_)
                | ChatError::RateLimited { .. }
                | ChatError::NotReady(NotReady::Initializing)
        )
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Corpus directory not found: {}", .0.display())]
    CorpusNotFound(PathBuf),

    #[error("No documents found in corpus directory")]
    NoDocumentsFound,

    #[error("Document ingestion timed out after {0:?}")]
    IngestionTimeout(Duration),

    #[error("Failed to write batch {batch} of {total}: {reason}")]
    BatchWrite {
        batch: usize,
        total: usize,
        reason: String,
    },

    #[error(transparent)]
    NotReady(#[from] NotReady),

    #[error("{message}")]
    RateLimited {
        message: String,
        retry_after: Duration,
    },
}

impl IngestError {
    pub fn class(&self) -> ErrorClass {
        match self {
            IngestError::CorpusNotFound(_) | IngestError::BatchWrite { .. } => ErrorClass::Internal,
            IngestError::NoDocumentsFound => ErrorClass::Unprocessable,
            IngestError::IngestionTimeout(_) => ErrorClass::GatewayTimeout,
            IngestError::NotReady(_) => ErrorClass::RetryLater,
            IngestError::RateLimited { .. } => ErrorClass::TooManyRequests,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_follow_taxonomy() {
        assert_eq!(
            ChatError::from(NotReady::Initializing).class(),
            ErrorClass::RetryLater
        );
        assert_eq!(
            ChatError::from(ExceedsLimit {
                count: 1501,
                limit: 1500
            })
            .class(),
            ErrorClass::ClientError
        );
        assert_eq!(
            ChatError::RetrievalTimeout(Duration::from_secs(20)).class(),
            ErrorClass::GatewayTimeout
        );
        assert_eq!(
            ChatError::GenerationTimeout(Duration::from_secs(60)).class(),
            ErrorClass::GatewayTimeout
        );
        assert_eq!(IngestError::NoDocumentsFound.class(), ErrorClass::Unprocessable);
        assert_eq!(
            IngestError::IngestionTimeout(Duration::from_secs(900)).class(),
            ErrorClass::GatewayTimeout
        );
    }

    #[test]
    fn exceeds_limit_message_names_both_numbers() {
        let err = ExceedsLimit {
            count: 1600,
            limit: 1500,
        };
        assert_eq!(err.to_string(), "Input exceeds 1500 tokens (1600 tokens)");
    }

    #[test]
    fn timeouts_are_transient_but_missing_documents_are_not() {
        assert!(ChatError::GenerationTimeout(Duration::from_secs(1)).is_transient());
        assert!(!ChatError::NoDocumentsRetrieved.is_transient());
    }
}
