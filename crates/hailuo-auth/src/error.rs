//! Error types for token renewal and token file storage

use std::time::Duration;

/// Errors from renewal calls and the token store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("renewal timed out after {0:?}")]
    Timeout(Duration),

    #[error("renewal rejected: {0}")]
    Rejected(String),

    #[error("invalid renewal response: {0}")]
    InvalidResponse(String),

    #[error("token cannot be sent as a header: {0}")]
    InvalidToken(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("token file parse error: {0}")]
    Parse(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
