//! Error types for the knowledge base.
//!
//! This module defines a unified error enum that covers every failure
//! category of the indexer and the retriever: configuration, I/O, the
//! embedding service, artifact loading, index construction and
//! cancellation.

use thiserror::Error;

/// Unified error type for the knowledge base crates.
///
/// All fallible functions return `Result<T, AppError>`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Embedding service errors (transport, status, malformed payloads)
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Index artifact missing, unreadable or invalid
    #[error("Artifact error: {0}")]
    Artifact(String),

    /// Index construction and query errors
    #[error("Index error: {0}")]
    Index(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The caller aborted the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
