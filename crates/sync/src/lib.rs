//! # noteseek-sync
//!
//! Reactive sync layer for the noteseek semantic index. Subscribes to the
//! host's event-sourced row store, keeps the in-memory HNSW index of
//! `noteseek-core` reconciled with the authoritative embedding rows, and
//! maintains a latest+backup snapshot pair on disk.
//!
//! Everything is composed by [`NoteSeekBuilder`]; the row store and the
//! embedding model are injected at construction behind the [`RowStore`]
//! and [`Embedder`] traits. A single orchestrator task owns all index
//! mutations — searches go straight to the engine under a read lock.

/// Query/result LRU caches.
pub mod cache;
/// Embedding model contract.
pub mod embed;
/// Search engine: caches, adaptive beam widening, rerank, fusion.
pub mod engine;
/// Error types for the sync layer.
pub mod error;
/// Sync orchestrator: boot, delta reconciliation, snapshot scheduling.
pub mod orchestrator;
/// Row-store contract: row shapes, wire codec, events, subscriptions.
pub mod rows;
/// In-process control surface: builder and handle.
pub mod service;

pub use embed::{Embedder, EmbeddingBatch};
pub use engine::{EngineConfig, SearchEngine, SearchResult, SparseScorer};
pub use error::SyncError;
pub use orchestrator::{IndexStatus, SyncConfig};
pub use rows::{EmbeddingRow, NoteRow, RowStore, Selector, StoreEvent};
pub use service::{NoteSeek, NoteSeekBuilder};
