//! Error types for pool operations

/// Errors from pool, session and broker operations.
///
/// Per-token renewal failures never appear here: they are absorbed by the
/// bulk refresh and only show up in `RefreshStatus` counts.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// No tokens to hand out. Fatal to the calling request, not the process.
    #[error("token pool is empty")]
    EmptyPool,

    /// The store rejected a save. In-memory state stays authoritative.
    #[error("token persistence failed: {0}")]
    Persistence(String),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
