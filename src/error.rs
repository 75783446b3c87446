//! Error types for the support routing service

use thiserror::Error;

/// Crate-level result alias
pub type Result<T> = std::result::Result<T, SupportError>;

/// Errors raised by the routing core and its collaborators
///
/// Transient capability failures (generation, classification) never surface
/// through this type; they are absorbed by the degrade-not-fail policy in the
/// responder and orchestrator. What remains is configuration and
/// infrastructure trouble.
#[derive(Debug, Error)]
pub enum SupportError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Embedding request failed: {0}")]
    Embedding(String),

    #[error("Similarity search failed: {0}")]
    Search(String),

    #[error("Corpus load failed: {0}")]
    Corpus(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
