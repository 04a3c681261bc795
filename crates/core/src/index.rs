//! External-key vector index.
//!
//! Wraps an [`HnswGraph`] with the bijective external↔internal id maps,
//! the tombstone discipline, and per-key display metadata. External keys
//! are opaque strings chosen by the caller (a note id, or
//! `parentId:chunkIndex` for chunked notes).
//!
//! Removal never unlinks a node — mid-graph deletion in HNSW requires
//! re-wiring and is defect-prone — it only tombstones. Map entries are
//! retained until the next full rebuild so a re-added key simply
//! tombstones its old node and takes a fresh id.

use crate::error::IndexError;
use crate::hnsw::search::knn_search;
use crate::hnsw::{HnswConfig, HnswGraph};
use crate::vector;
use std::collections::HashMap;

/// Display metadata carried alongside an indexed vector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteMeta {
    pub title: String,
    /// First few hundred characters of the note body, for result previews.
    pub preview: String,
}

/// A scored index hit: external key plus cosine similarity in `[-1, 1]`.
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub key: String,
    pub score: f32,
}

/// HNSW graph plus external-key bookkeeping.
#[derive(Debug)]
pub struct VectorIndex {
    graph: HnswGraph,
    ext_to_int: HashMap<String, u32>,
    /// Indexed by internal id. Tombstoned ids loaded from a snapshot have
    /// no key and hold an empty string.
    int_to_ext: Vec<String>,
    meta: HashMap<String, NoteMeta>,
}

impl VectorIndex {
    /// Creates an empty index for vectors of the given dimension.
    pub fn new(dimension: usize, config: HnswConfig) -> Self {
        Self {
            graph: HnswGraph::new(dimension, config),
            ext_to_int: HashMap::new(),
            int_to_ext: Vec::new(),
            meta: HashMap::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.graph.dimension
    }

    /// Live (non-tombstoned) vectors.
    pub fn live_count(&self) -> usize {
        self.graph.live_count()
    }

    /// All nodes, tombstones included.
    pub fn node_count(&self) -> usize {
        self.graph.node_count as usize
    }

    pub fn tombstone_count(&self) -> usize {
        self.graph.tombstone_count()
    }

    /// Fraction of nodes that are tombstones; drives auto-compaction.
    pub fn tombstone_ratio(&self) -> f32 {
        let total = self.graph.node_count;
        if total == 0 {
            return 0.0;
        }
        self.graph.tombstone_count() as f32 / total as f32
    }

    /// Whether `key` currently maps to a live node.
    pub fn contains(&self, key: &str) -> bool {
        self.ext_to_int
            .get(key)
            .is_some_and(|&id| !self.graph.is_deleted(id))
    }

    /// Display metadata for a key, if any.
    pub fn meta(&self, key: &str) -> Option<&NoteMeta> {
        self.meta.get(key)
    }

    pub fn set_meta(&mut self, key: &str, meta: NoteMeta) {
        self.meta.insert(key.to_string(), meta);
    }

    /// The stored unit vector for a live key.
    pub fn vector(&self, key: &str) -> Option<&[f32]> {
        let &id = self.ext_to_int.get(key)?;
        if self.graph.is_deleted(id) {
            return None;
        }
        Some(self.graph.vector(id))
    }

    /// Insert or replace the vector for `key`. Returns the internal id.
    ///
    /// The vector is normalized here; a dimension mismatch fails without
    /// mutating. Re-upserting an unchanged vector is a no-op (the graph
    /// does not grow), which keeps repeated reconciliation passes from
    /// accreting tombstones. A changed vector tombstones the old node and
    /// inserts under a fresh id.
    pub fn upsert(
        &mut self,
        key: &str,
        vector: &[f32],
        meta: NoteMeta,
    ) -> Result<u32, IndexError> {
        if vector.len() != self.graph.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.graph.dimension,
                got: vector.len(),
            });
        }
        let unit = vector::normalized(vector)?;

        if let Some(&existing) = self.ext_to_int.get(key) {
            if !self.graph.is_deleted(existing) {
                if self.graph.vector(existing) == unit.as_slice() {
                    self.meta.insert(key.to_string(), meta);
                    return Ok(existing);
                }
                self.graph.mark_deleted(existing);
            }
        }

        let id = self.graph.insert(&unit);
        self.ext_to_int.insert(key.to_string(), id);
        debug_assert_eq!(id as usize, self.int_to_ext.len());
        self.int_to_ext.push(key.to_string());
        self.meta.insert(key.to_string(), meta);
        Ok(id)
    }

    /// Tombstone the node for `key`. Returns `false` if the key is
    /// unknown or already tombstoned. Map entries survive until the next
    /// full rebuild.
    pub fn remove(&mut self, key: &str) -> bool {
        let Some(&id) = self.ext_to_int.get(key) else {
            return false;
        };
        if self.graph.is_deleted(id) {
            return false;
        }
        self.graph.mark_deleted(id);
        self.meta.remove(key);
        true
    }

    /// k-NN over live nodes with an explicit beam width.
    pub fn knn(&self, query: &[f32], k: usize, ef: usize) -> Result<Vec<IndexHit>, IndexError> {
        if query.len() != self.graph.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.graph.dimension,
                got: query.len(),
            });
        }
        let hits = knn_search(&self.graph, query, k, ef);
        Ok(hits
            .into_iter()
            .map(|(distance, id)| IndexHit {
                key: self.int_to_ext[id as usize].clone(),
                score: 1.0 - distance,
            })
            .collect())
    }

    /// Drop everything: graph, maps, metadata.
    pub fn clear(&mut self) {
        let dim = self.graph.dimension;
        let config = self.graph.config.clone();
        self.graph = HnswGraph::new(dim, config);
        self.ext_to_int.clear();
        self.int_to_ext.clear();
        self.meta.clear();
    }

    /// Live external keys, in no particular order.
    pub fn live_keys(&self) -> impl Iterator<Item = &str> {
        self.ext_to_int
            .iter()
            .filter(|&(_, &id)| !self.graph.is_deleted(id))
            .map(|(k, _)| k.as_str())
    }

    /// Map of live external keys to internal ids, for snapshot headers.
    pub fn live_key_map(&self) -> HashMap<String, u32> {
        self.ext_to_int
            .iter()
            .filter(|&(_, &id)| !self.graph.is_deleted(id))
            .map(|(k, &id)| (k.clone(), id))
            .collect()
    }

    /// Read access to the underlying graph (snapshot codec, tests).
    pub fn graph(&self) -> &HnswGraph {
        &self.graph
    }

    /// Rebuild an index from snapshot parts. Used by the snapshot codec;
    /// `keys` decides which node ids are live, everything else is a
    /// tombstone. Adjacency is trusted as-is.
    pub(crate) fn from_parts(graph: HnswGraph, keys: HashMap<String, u32>) -> Self {
        let node_count = graph.node_count as usize;
        let mut int_to_ext = vec![String::new(); node_count];
        for (key, &id) in &keys {
            int_to_ext[id as usize] = key.clone();
        }
        Self {
            graph,
            ext_to_int: keys,
            int_to_ext,
            meta: HashMap::new(),
        }
    }

    /// Validate internal invariants after deserialization.
    ///
    /// Checks parallel-array lengths, the unit-norm invariant, id-map
    /// symmetry, entry-point sanity, neighbor bounds, and per-layer
    /// degree caps.
    pub fn validate(&self) -> Result<(), String> {
        let g = &self.graph;
        let nc = g.node_count as usize;
        let dim = g.dimension;

        if g.neighbors.len() != nc {
            return Err(format!("neighbors length {} != node_count {nc}", g.neighbors.len()));
        }
        if g.levels.len() != nc {
            return Err(format!("levels length {} != node_count {nc}", g.levels.len()));
        }
        if g.deleted.len() != nc {
            return Err(format!("deleted length {} != node_count {nc}", g.deleted.len()));
        }
        if self.int_to_ext.len() != nc {
            return Err(format!(
                "int_to_ext length {} != node_count {nc}",
                self.int_to_ext.len()
            ));
        }

        for id in 0..nc as u32 {
            let v = g.vector(id);
            if !vector::is_unit(v) {
                return Err(format!("node {id} vector is not unit-norm"));
            }
        }

        for (key, &id) in &self.ext_to_int {
            if id as usize >= nc {
                return Err(format!("key '{key}' maps to out-of-range id {id}"));
            }
            if !g.is_deleted(id) && self.int_to_ext[id as usize] != *key {
                return Err(format!("id maps are not mutual inverses for '{key}'"));
            }
        }

        if let Some(ep) = g.entry_point {
            if ep as usize >= nc {
                return Err(format!("entry point {ep} >= node_count {nc}"));
            }
            let ep_level = g.level(ep);
            for id in 0..nc as u32 {
                if !g.is_deleted(id) && g.level(id) > ep_level {
                    return Err(format!(
                        "entry point {ep} (level {ep_level}) below live node {id} (level {})",
                        g.level(id)
                    ));
                }
            }
        } else if g.live_count() > 0 {
            return Err("live nodes present but no entry point".to_string());
        }

        for (id, node) in g.neighbors.iter().enumerate() {
            for (layer, list) in node.iter().enumerate() {
                if list.len() > g.config.max_degree(layer) {
                    return Err(format!(
                        "node {id} exceeds degree cap at layer {layer}: {}",
                        list.len()
                    ));
                }
                for &n in list {
                    if n as usize >= nc {
                        return Err(format!(
                            "node {id} references out-of-range neighbor {n} at layer {layer}"
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    /// Approximate heap footprint of the index in bytes.
    pub fn estimate_memory_bytes(&self) -> usize {
        let mut total = self.graph.estimate_memory_bytes();
        for (k, _) in &self.ext_to_int {
            total += k.len() + 28;
        }
        for k in &self.int_to_ext {
            total += k.len() + 24;
        }
        for (k, m) in &self.meta {
            total += k.len() + m.title.len() + m.preview.len() + 72;
        }
        total
    }
}
