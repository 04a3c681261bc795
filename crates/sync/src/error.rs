//! Error types for the sync layer.

use noteseek_core::IndexError;
use thiserror::Error;

/// Errors surfaced by the sync layer and the control surface.
///
/// None of these abort the orchestrator: reconciliation failures are
/// logged and retried on the next tick, and only the control-surface
/// entry points rethrow to the caller.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The external embedding model failed or returned a malformed batch.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The row store rejected a query or commit.
    #[error("row store error: {0}")]
    Store(String),

    /// A row carried an undecodable or mis-sized vector payload.
    #[error("malformed row '{key}': {reason}")]
    MalformedRow { key: String, reason: String },

    /// Core index failure (dimension mismatch, snapshot corruption, I/O).
    #[error(transparent)]
    Index(#[from] IndexError),

    /// The orchestrator task is gone; the handle is no longer usable.
    #[error("index service is shutting down")]
    ShuttingDown,
}
