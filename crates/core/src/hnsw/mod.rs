//! Hierarchical Navigable Small World (HNSW) approximate nearest neighbor
//! graph.
//!
//! The graph stores unit vectors in a contiguous f32 arena with a
//! Struct-of-Arrays layout: separate arrays for neighbor lists, layer
//! assignments, and tombstone flags, all indexed by the internal node id.
//! Tombstoned nodes stay in the graph — they keep navigating traffic but
//! are filtered from every result set; compaction happens on full rebuild.

/// Graph structure, configuration, and node storage.
pub mod graph;
/// Insertion with bidirectional linking and heuristic neighbor pruning.
pub mod insert;
/// Best-first layer search and multi-layer k-NN.
pub mod search;
/// Epoch-based visited set for graph traversal.
pub mod visited;

pub use graph::{HnswConfig, HnswGraph};
pub use search::knn_search;
