//! Error types for fairq.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A distribution pass could not uphold its postcondition. The pass was
    /// aborted before any queue was touched.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
