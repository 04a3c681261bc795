//! # noteseek-core
//!
//! Embeddable semantic index engine: an HNSW approximate nearest neighbor
//! graph over unit vectors, an external-key index on top of it, a versioned
//! JSON snapshot codec, and a blob-directory snapshot store.
//!
//! This is the core library crate with zero async dependencies — the
//! reactive sync layer lives in `noteseek-sync` and drives everything here
//! from a single coordinator task.

/// Global configuration constants: HNSW defaults, snapshot names, limits.
pub mod config;
/// Error types shared across the core crate.
pub mod error;
/// Chunk-key parsing and dense/sparse score fusion.
pub mod fusion;
/// HNSW approximate nearest neighbor graph: structure, insertion, search.
pub mod hnsw;
/// External-key vector index: id maps, tombstones, display metadata.
pub mod index;
/// Versioned JSON snapshot codec with SHA-256 checksums.
pub mod snapshot;
/// Blob-directory snapshot store: atomic writes, rename, GC.
pub mod store;
/// Vector primitives: L2 normalization, dot product, norm checks.
pub mod vector;

pub use error::IndexError;
pub use hnsw::{HnswConfig, HnswGraph};
pub use index::{NoteMeta, VectorIndex};
pub use store::{GraphStore, SnapshotStore};
