//! Search engine: the query-side pipeline over the core index.
//!
//! A search embeds the query (with LRU-cached embeddings and results),
//! runs an adaptive HNSW pass that widens the beam once when confidence
//! is low, reranks survivors with exact dot products, optionally blends
//! in sparse lexical scores, and collapses chunk hits onto parent notes.
//!
//! All index mutations flow through this type under a write lock, so a
//! concurrent search observes an upsert fully or not at all.

use crate::cache::LruCache;
use crate::embed::{query_text, Embedder};
use crate::error::SyncError;
use noteseek_core::config as core_config;
use noteseek_core::fusion::{collapse_chunks, linear_fuse, parent_key};
use noteseek_core::hnsw::HnswConfig;
use noteseek_core::vector;
use noteseek_core::{NoteMeta, VectorIndex};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Beam width of the first search pass; doubled on retry.
    pub ef_search: usize,
    /// Beam width during graph construction.
    pub ef_construction: usize,
    /// Dense weight in linear fusion; 1.0 disables the sparse blend.
    pub alpha: f32,
    /// Entry bound for the query and result caches.
    pub cache_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ef_search: core_config::HNSW_DEFAULT_EF_SEARCH,
            ef_construction: core_config::HNSW_DEFAULT_EF_CONSTRUCTION,
            alpha: core_config::DEFAULT_FUSION_ALPHA,
            cache_size: core_config::DEFAULT_CACHE_SIZE,
        }
    }
}

/// One search hit, collapsed to a parent note key.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub key: String,
    /// Exact cosine similarity (or fused score when a sparse provider is
    /// installed), in `[-1, 1]`.
    pub score: f32,
    pub title: Option<String>,
    pub preview: Option<String>,
}

/// Optional sparse (lexical) score provider for hybrid ranking.
///
/// Scores are keyed by parent note id and expected in `[0, 1]`; missing
/// keys contribute zero.
pub trait SparseScorer: Send + Sync {
    fn scores(&self, query: &str, parent_ids: &[String]) -> HashMap<String, f32>;
}

/// The query-side engine. Mutations come from the sync orchestrator;
/// searches can run from any task.
pub struct SearchEngine {
    index: RwLock<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    sparse: Option<Arc<dyn SparseScorer>>,
    config: EngineConfig,
    query_cache: Mutex<LruCache<Arc<Vec<f32>>>>,
    results_cache: Mutex<LruCache<Arc<Vec<SearchResult>>>>,
    adaptive_retries: AtomicU64,
}

impl SearchEngine {
    pub fn new(
        dimension: usize,
        config: EngineConfig,
        embedder: Arc<dyn Embedder>,
        sparse: Option<Arc<dyn SparseScorer>>,
    ) -> Self {
        let hnsw = HnswConfig {
            ef_construction: config.ef_construction,
            ..HnswConfig::default()
        };
        Self {
            index: RwLock::new(VectorIndex::new(dimension, hnsw)),
            embedder,
            sparse,
            query_cache: Mutex::new(LruCache::new(config.cache_size)),
            results_cache: Mutex::new(LruCache::new(config.cache_size)),
            config,
            adaptive_retries: AtomicU64::new(0),
        }
    }

    /// Insert or replace a vector. Invalidates cached results.
    pub fn upsert(&self, key: &str, vec: &[f32], meta: NoteMeta) -> Result<(), SyncError> {
        self.index.write().upsert(key, vec, meta)?;
        self.results_cache.lock().clear();
        Ok(())
    }

    /// Tombstone a key. Invalidates cached results.
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.index.write().remove(key);
        self.results_cache.lock().clear();
        removed
    }

    /// Replace the whole index (warm boot, rebuilds).
    pub fn install(&self, index: VectorIndex) {
        *self.index.write() = index;
        self.results_cache.lock().clear();
    }

    /// Reset graph, maps, tombstones, and both caches.
    pub fn clear(&self) {
        self.index.write().clear();
        self.query_cache.lock().clear();
        self.results_cache.lock().clear();
    }

    pub fn set_meta(&self, key: &str, meta: NoteMeta) {
        self.index.write().set_meta(key, meta);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.read().contains(key)
    }

    /// Run `f` against the index under the read lock. Used for snapshot
    /// encoding so persist sees a quiescent graph.
    pub fn with_index<R>(&self, f: impl FnOnce(&VectorIndex) -> R) -> R {
        f(&self.index.read())
    }

    pub fn dimension(&self) -> usize {
        self.index.read().dimension()
    }

    pub fn live_count(&self) -> usize {
        self.index.read().live_count()
    }

    pub fn node_count(&self) -> usize {
        self.index.read().node_count()
    }

    pub fn tombstone_count(&self) -> usize {
        self.index.read().tombstone_count()
    }

    pub fn tombstone_ratio(&self) -> f32 {
        self.index.read().tombstone_ratio()
    }

    pub fn estimate_memory_bytes(&self) -> usize {
        self.index.read().estimate_memory_bytes()
    }

    /// How many searches widened the beam and retried.
    pub fn adaptive_retries(&self) -> u64 {
        self.adaptive_retries.load(Ordering::Relaxed)
    }

    /// Semantic k-NN search over live notes.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>, SyncError> {
        let query = query.trim();
        if query.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        if let Some(cached) = self.results_cache.lock().get(query) {
            return Ok(cached.iter().take(k).cloned().collect());
        }

        let qvec = self.query_vector(query).await?;

        // Adaptive HNSW pass plus exact rerank under one read lock, so
        // candidates and rerank vectors come from the same index state.
        let (mut scored, retried) = {
            let index = self.index.read();
            let mut hits = index.knn(&qvec, k * core_config::ADAPTIVE_K_FACTOR, self.config.ef_search)?;
            let weak = hits
                .first()
                .map_or(true, |h| h.score < core_config::ADAPTIVE_SCORE_FLOOR)
                || hits.len() < k;
            let mut retried = false;
            if weak && index.live_count() > 0 {
                hits = index.knn(
                    &qvec,
                    k * core_config::ADAPTIVE_RETRY_K_FACTOR,
                    self.config.ef_search * 2,
                )?;
                retried = true;
            }
            let scored: Vec<(String, f32)> = hits
                .into_iter()
                .filter_map(|hit| {
                    index
                        .vector(&hit.key)
                        .map(|v| (hit.key, vector::dot(&qvec, v)))
                })
                .collect();
            (scored, retried)
        };
        if retried {
            self.adaptive_retries.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(query_len = query.len(), "adaptive re-search with widened beam");
        }

        if let Some(sparse) = &self.sparse {
            if self.config.alpha < 1.0 {
                let mut parents: Vec<String> = scored
                    .iter()
                    .map(|(key, _)| parent_key(key).to_string())
                    .collect();
                parents.sort_unstable();
                parents.dedup();
                let sparse_scores = sparse.scores(query, &parents);
                for (key, score) in scored.iter_mut() {
                    let s = sparse_scores.get(parent_key(key)).copied();
                    *score = linear_fuse(*score, s, self.config.alpha);
                }
            }
        }

        let mut collapsed = collapse_chunks(scored);
        collapsed.sort_unstable_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        collapsed.truncate(k);

        let results: Vec<SearchResult> = {
            let index = self.index.read();
            collapsed
                .into_iter()
                .map(|(key, score)| {
                    let meta = index.meta(&key);
                    SearchResult {
                        score,
                        title: meta.map(|m| m.title.clone()),
                        preview: meta.map(|m| m.preview.clone()),
                        key,
                    }
                })
                .collect()
        };

        self.results_cache
            .lock()
            .insert(query.to_string(), Arc::new(results.clone()));
        Ok(results)
    }

    /// Embed a query with the literal `search_query: ` prefix, normalize,
    /// and cache the unit vector.
    async fn query_vector(&self, query: &str) -> Result<Arc<Vec<f32>>, SyncError> {
        if let Some(cached) = self.query_cache.lock().get(query) {
            return Ok(Arc::clone(cached));
        }
        let batch = self.embedder.embed(std::slice::from_ref(&query_text(query))).await?;
        let vecs = batch.vectors(1)?;
        let unit = vector::normalized(vecs[0]).map_err(SyncError::Index)?;
        let unit = Arc::new(unit);
        self.query_cache
            .lock()
            .insert(query.to_string(), Arc::clone(&unit));
        Ok(unit)
    }
}
