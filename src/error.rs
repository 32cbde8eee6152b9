use thiserror::Error;

/// Errors surfaced by pool operations (see spec §7).
///
/// Per-replica failures during read-time self-heal and rebalance eviction are
/// logged and swallowed internally; they never produce one of these.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("path argument was empty or blank")]
    ArgEmpty,

    #[error("invalid relative path: {0}")]
    InvalidPath(String),

    #[error("pool not found: {0}")]
    PoolNotFound(String),

    #[error("insufficient healthy/eligible drives: need {needed}, have {available}")]
    InsufficientReplicas { needed: usize, available: usize },

    #[error("integrity mismatch: {0}")]
    IntegrityMismatch(String),

    #[error("io failure: {0}")]
    IoFailure(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;
