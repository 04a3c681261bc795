//! HNSW graph structure and configuration.
//!
//! [`HnswConfig`] holds the tuning parameters (M, ef_construction,
//! max_layers). [`HnswGraph`] stores nodes in Struct-of-Arrays layout:
//! one contiguous f32 arena for vectors plus parallel arrays for neighbor
//! lists, layer assignments, and tombstone flags.

use crate::config;
use serde::{Deserialize, Serialize};

/// Tuning parameters for an HNSW graph.
///
/// Controls the trade-off between build speed, search speed, recall, and
/// memory usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Bidirectional links per node on layers above zero.
    pub m: usize,
    /// Maximum links per node at layer 0 (typically `2 * m`).
    pub m_max0: usize,
    /// Candidate list size during construction.
    pub ef_construction: usize,
    /// Cap on the number of layers.
    pub max_layers: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: config::HNSW_DEFAULT_M,
            m_max0: config::HNSW_DEFAULT_M * 2,
            ef_construction: config::HNSW_DEFAULT_EF_CONSTRUCTION,
            max_layers: config::HNSW_DEFAULT_MAX_LAYERS,
        }
    }
}

impl HnswConfig {
    /// Degree cap for a given layer.
    #[inline]
    pub fn max_degree(&self, layer: usize) -> usize {
        if layer == 0 {
            self.m_max0
        } else {
            self.m
        }
    }
}

/// Multi-layer proximity graph over unit vectors, SoA layout.
///
/// All vector bytes live in one append-only arena; a node's vector slice
/// stays valid (pinned) for the node's lifetime. Adjacency lists store
/// internal ids only — never references — so the cyclic undirected graph
/// needs no ownership gymnastics.
#[derive(Debug)]
pub struct HnswGraph {
    pub config: HnswConfig,
    pub dimension: usize,
    /// Vector arena: node `i` owns `vectors[i*dimension..(i+1)*dimension]`.
    vectors: Vec<f32>,
    /// `[node][layer][neighbor ids]`.
    pub neighbors: Vec<Vec<Vec<u32>>>,
    /// Top layer of each node.
    pub levels: Vec<u8>,
    /// Tombstone flags; tombstoned nodes navigate but never match.
    pub deleted: Vec<bool>,
    /// Node searches start from; always on the top occupied layer.
    pub entry_point: Option<u32>,
    /// Highest layer of any node ever inserted.
    pub max_level: usize,
    /// Total nodes including tombstones; also the next internal id.
    pub node_count: u32,
}

impl HnswGraph {
    /// Creates an empty graph for vectors of the given dimension.
    pub fn new(dimension: usize, config: HnswConfig) -> Self {
        Self {
            config,
            dimension,
            vectors: Vec::new(),
            neighbors: Vec::new(),
            levels: Vec::new(),
            deleted: Vec::new(),
            entry_point: None,
            max_level: 0,
            node_count: 0,
        }
    }

    /// Number of live (non-tombstoned) nodes.
    pub fn live_count(&self) -> usize {
        self.deleted.iter().filter(|&&d| !d).count()
    }

    /// Number of tombstoned nodes.
    pub fn tombstone_count(&self) -> usize {
        self.deleted.iter().filter(|&&d| d).count()
    }

    /// `true` when no live nodes remain.
    pub fn is_empty(&self) -> bool {
        self.live_count() == 0
    }

    /// Draw a layer for a new node: `floor(-ln(u) / ln(M))`, capped.
    pub fn random_level(&self) -> usize {
        let ml = 1.0 / (self.config.m as f64).ln();
        let u: f64 = rand::random();
        let level = (-u.ln() * ml).floor() as usize;
        level.min(self.config.max_layers - 1)
    }

    /// Vector slice of a node. O(1) into the arena.
    #[inline]
    pub fn vector(&self, id: u32) -> &[f32] {
        let start = id as usize * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    #[inline]
    pub fn is_deleted(&self, id: u32) -> bool {
        self.deleted[id as usize]
    }

    #[inline]
    pub fn level(&self, id: u32) -> usize {
        self.levels[id as usize] as usize
    }

    /// Tombstone a node. Returns `false` for out-of-range ids.
    ///
    /// If the entry point dies, leadership moves to the highest live node
    /// so searches keep starting from the top layer.
    pub fn mark_deleted(&mut self, id: u32) -> bool {
        if (id as usize) >= self.deleted.len() {
            return false;
        }
        self.deleted[id as usize] = true;
        if self.entry_point == Some(id) {
            self.restore_entry_point();
        }
        true
    }

    /// Re-elect the entry point among live nodes after a tombstone.
    fn restore_entry_point(&mut self) {
        let best = (0..self.node_count)
            .filter(|&i| !self.deleted[i as usize])
            .max_by_key(|&i| self.levels[i as usize]);
        match best {
            Some(id) => {
                self.entry_point = Some(id);
                self.max_level = self.levels[id as usize] as usize;
            }
            None => {
                self.entry_point = None;
                self.max_level = 0;
            }
        }
    }

    /// Append the SoA fields of a new node. Internal helper for insertion
    /// and snapshot reconstruction; `neighbors` must have one list per
    /// layer `0..=level`.
    pub(crate) fn push_node(&mut self, vector: &[f32], level: usize, neighbors: Vec<Vec<u32>>) {
        debug_assert_eq!(vector.len(), self.dimension);
        debug_assert_eq!(neighbors.len(), level + 1);
        self.vectors.extend_from_slice(vector);
        self.neighbors.push(neighbors);
        self.levels.push(level as u8);
        self.deleted.push(false);
        self.node_count += 1;
    }

    /// Approximate heap footprint in bytes.
    pub fn estimate_memory_bytes(&self) -> usize {
        let mut total = self.vectors.len() * 4;
        for node in &self.neighbors {
            for layer in node {
                total += layer.len() * 4 + 24;
            }
            total += 24;
        }
        total += self.levels.len() + self.deleted.len();
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_free_node(g: &mut HnswGraph, v: &[f32], level: usize) -> u32 {
        let id = g.node_count;
        let lists = vec![Vec::new(); level + 1];
        g.push_node(v, level, lists);
        if g.entry_point.is_none() || level > g.max_level {
            g.entry_point = Some(id);
            g.max_level = level;
        }
        id
    }

    #[test]
    fn test_new_graph_is_empty() {
        let g = HnswGraph::new(4, HnswConfig::default());
        assert!(g.is_empty());
        assert_eq!(g.node_count, 0);
        assert!(g.entry_point.is_none());
    }

    #[test]
    fn test_random_level_respects_cap() {
        let g = HnswGraph::new(4, HnswConfig::default());
        for _ in 0..200 {
            assert!(g.random_level() < g.config.max_layers);
        }
    }

    #[test]
    fn test_vector_slice_roundtrip() {
        let mut g = HnswGraph::new(3, HnswConfig::default());
        push_free_node(&mut g, &[1.0, 0.0, 0.0], 0);
        push_free_node(&mut g, &[0.0, 1.0, 0.0], 0);
        assert_eq!(g.vector(0), &[1.0, 0.0, 0.0]);
        assert_eq!(g.vector(1), &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_mark_deleted_counts() {
        let mut g = HnswGraph::new(2, HnswConfig::default());
        push_free_node(&mut g, &[1.0, 0.0], 0);
        push_free_node(&mut g, &[0.0, 1.0], 0);
        assert!(g.mark_deleted(0));
        assert!(g.is_deleted(0));
        assert_eq!(g.live_count(), 1);
        assert_eq!(g.tombstone_count(), 1);
        assert!(!g.mark_deleted(99));
    }

    #[test]
    fn test_entry_point_reelected_on_tombstone() {
        let mut g = HnswGraph::new(2, HnswConfig::default());
        push_free_node(&mut g, &[1.0, 0.0], 3);
        push_free_node(&mut g, &[0.0, 1.0], 1);
        assert_eq!(g.entry_point, Some(0));
        g.mark_deleted(0);
        assert_eq!(g.entry_point, Some(1));
        assert_eq!(g.max_level, 1);
    }

    #[test]
    fn test_entry_point_none_when_all_dead() {
        let mut g = HnswGraph::new(2, HnswConfig::default());
        push_free_node(&mut g, &[1.0, 0.0], 0);
        g.mark_deleted(0);
        assert!(g.entry_point.is_none());
        assert!(g.is_empty());
    }

    #[test]
    fn test_max_degree_per_layer() {
        let c = HnswConfig::default();
        assert_eq!(c.max_degree(0), c.m_max0);
        assert_eq!(c.max_degree(1), c.m);
        assert_eq!(c.max_degree(7), c.m);
    }
}
