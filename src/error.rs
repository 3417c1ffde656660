//! Error types for state containers and their collaborators.

use thiserror::Error;

/// Main error type for container construction and storage access.
///
/// Vetoes are not errors: a handler refusing an update returns
/// [`Flow::Veto`](crate::event::Flow::Veto) and the pipeline reports it
/// through [`Outcome`](crate::state::Outcome).
#[derive(Clone, Debug, Error)]
pub enum Error {
    #[error("Invalid href: {0:?}")]
    InvalidHref(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl Error {
    /// Shorthand for a storage backend failure.
    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage(message.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type for container and storage operations.
pub type Result<T> = std::result::Result<T, Error>;
