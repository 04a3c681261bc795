//! Error types for the core index crate.

use thiserror::Error;

/// Errors produced by the index, snapshot codec, and snapshot store.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A vector's dimension disagrees with the index dimension.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// A vector with zero (or non-finite) norm cannot be normalized.
    #[error("cannot normalize a zero-norm vector")]
    ZeroNorm,

    /// A snapshot failed to decode or violated internal invariants.
    #[error("corrupt snapshot: {0}")]
    Corrupt(String),

    /// Snapshot serialization failed.
    #[error("snapshot encode failed: {0}")]
    Codec(#[from] serde_json::Error),

    /// Underlying storage failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
