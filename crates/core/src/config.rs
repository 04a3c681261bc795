//! Global configuration constants for noteseek.
//!
//! Compile-time defaults for HNSW tuning, snapshot naming, and search
//! behavior. Runtime configuration wraps these in `Default` impls on the
//! corresponding config structs.

/// Default number of bidirectional links per HNSW node.
///
/// Higher values improve recall but increase memory and build time.
/// Typical range: 8–64.
pub const HNSW_DEFAULT_M: usize = 16;

/// Default ef parameter during HNSW index construction.
///
/// Size of the dynamic candidate list while inserting. Higher values
/// produce a better graph at the cost of build time.
pub const HNSW_DEFAULT_EF_CONSTRUCTION: usize = 200;

/// Default ef parameter during HNSW search.
///
/// Higher values improve recall at the cost of latency.
pub const HNSW_DEFAULT_EF_SEARCH: usize = 50;

/// Maximum number of layers in the HNSW graph.
pub const HNSW_DEFAULT_MAX_LAYERS: usize = 16;

/// Tolerance for the unit-norm invariant on stored vectors.
pub const UNIT_NORM_EPSILON: f32 = 1e-4;

/// Snapshot wire-format version. A mismatch on load is a warning and the
/// caller falls back to a cold rebuild.
pub const SNAPSHOT_VERSION: &str = "1.0.0";

/// Canonical name of the current snapshot blob.
pub const SNAPSHOT_LATEST: &str = "latest";

/// Canonical name of the rollback snapshot blob.
pub const SNAPSHOT_BACKUP: &str = "backup";

/// File extension for snapshot blobs.
pub const SNAPSHOT_EXT: &str = "json";

/// Hex characters of the SHA-256 digest retained as the snapshot checksum.
pub const SNAPSHOT_CHECKSUM_LEN: usize = 16;

/// Similarity floor below which the engine widens the search beam and
/// retries once.
pub const ADAPTIVE_SCORE_FLOOR: f32 = 0.65;

/// Over-fetch factor for the first adaptive search pass (`K = 5·k`).
pub const ADAPTIVE_K_FACTOR: usize = 5;

/// Over-fetch factor for the retry pass (`K = 10·k`).
pub const ADAPTIVE_RETRY_K_FACTOR: usize = 10;

/// Default bound for the query and result LRU caches.
pub const DEFAULT_CACHE_SIZE: usize = 128;

/// Default weight of the dense score in linear fusion (1.0 = dense only).
pub const DEFAULT_FUSION_ALPHA: f32 = 1.0;
