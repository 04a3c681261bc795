//! HNSW insertion.
//!
//! Three phases, following Algorithm 1 of the HNSW paper: greedy descent
//! from the entry point to the node's top layer, per-layer beam search
//! with heuristic neighbor selection (Algorithm 4), then bidirectional
//! linking with re-pruning of any neighbor pushed over its degree cap.

use crate::hnsw::graph::HnswGraph;
use crate::hnsw::search::search_layer;
use crate::hnsw::visited::Visited;
use crate::vector::cosine_distance;
use std::cell::RefCell;

thread_local! {
    /// Reused visited set for insert traversals; avoids a per-insert
    /// allocation proportional to the graph size.
    static INSERT_VISITED: RefCell<Visited> = RefCell::new(Visited::default());
}

impl HnswGraph {
    /// Insert a unit vector and return its internal id.
    ///
    /// The caller (the external-key index) is responsible for dimension
    /// checks and normalization; ids are assigned monotonically.
    pub fn insert(&mut self, vector: &[f32]) -> u32 {
        debug_assert_eq!(vector.len(), self.dimension);
        let id = self.node_count;
        let level = self.random_level();

        // First node becomes the entry point outright.
        let Some(entry) = self.entry_point else {
            self.push_node(vector, level, vec![Vec::new(); level + 1]);
            self.entry_point = Some(id);
            self.max_level = level;
            return id;
        };

        let top = level.min(self.max_level);

        let node_neighbors = INSERT_VISITED.with(|cell| {
            let mut visited = cell.borrow_mut();
            visited.grow(self.node_count as usize);

            // Phase 1: greedy descent to layer `level + 1`, beam of one.
            let mut current = entry;
            for layer in (level + 1..=self.max_level).rev() {
                let found = search_layer(
                    self,
                    vector,
                    std::slice::from_ref(&current),
                    1,
                    layer,
                    &mut visited,
                );
                if let Some(&(_, nearest)) = found.first() {
                    current = nearest;
                }
            }

            // Phase 2: beam search each layer from `top` down, selecting
            // M neighbors via the diversity heuristic. Only re-pruning
            // uses the per-layer cap.
            let mut node_neighbors: Vec<Vec<u32>> = vec![Vec::new(); level + 1];
            let mut layer_entries: Vec<u32> = vec![current];
            for layer in (0..=top).rev() {
                let candidates = search_layer(
                    self,
                    vector,
                    &layer_entries,
                    self.config.ef_construction,
                    layer,
                    &mut visited,
                );
                let selected = select_neighbors_heuristic(self, &candidates, self.config.m);
                node_neighbors[layer] = selected.iter().map(|&(_, nid)| nid).collect();

                layer_entries.clear();
                layer_entries.extend(candidates.iter().map(|&(_, nid)| nid));
                if layer_entries.is_empty() {
                    layer_entries.push(entry);
                }
            }
            node_neighbors
        });

        self.push_node(vector, level, node_neighbors);

        // Phase 3: make the new edges undirected and re-prune any neighbor
        // whose list overflowed its cap.
        for layer in 0..=top {
            let cap = self.config.max_degree(layer);
            let linked: Vec<u32> = self.neighbors[id as usize][layer].clone();
            for neighbor in linked {
                let nid = neighbor as usize;
                while self.neighbors[nid].len() <= layer {
                    self.neighbors[nid].push(Vec::new());
                }
                self.neighbors[nid][layer].push(id);

                if self.neighbors[nid][layer].len() > cap {
                    let base = neighbor;
                    let over: Vec<(f32, u32)> = self.neighbors[nid][layer]
                        .iter()
                        .map(|&cid| {
                            (cosine_distance(self.vector(base), self.vector(cid)), cid)
                        })
                        .collect();
                    let pruned = select_neighbors_heuristic(self, &over, cap);
                    self.neighbors[nid][layer] = pruned.iter().map(|&(_, cid)| cid).collect();
                }
            }
        }

        if level > self.max_level {
            self.max_level = level;
            self.entry_point = Some(id);
        }
        id
    }
}

/// Diversity-preserving neighbor selection (Algorithm 4).
///
/// Walking candidates closest-first, a candidate is kept only while it is
/// strictly closer to the base than to every neighbor already kept; this
/// discards redundant near-duplicates in favor of long-range links. Ties
/// on distance resolve to the lower internal id. If fewer than `m`
/// survive, the closest unused candidates fill the remaining slots so the
/// graph stays well-connected.
fn select_neighbors_heuristic(
    graph: &HnswGraph,
    candidates: &[(f32, u32)],
    m: usize,
) -> Vec<(f32, u32)> {
    let mut sorted = candidates.to_vec();
    sorted.sort_unstable_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.cmp(&b.1))
    });

    let mut selected: Vec<(f32, u32)> = Vec::with_capacity(m);
    for &(dist_to_base, cid) in &sorted {
        if selected.len() >= m {
            break;
        }
        let diverse = selected.iter().all(|&(_, sid)| {
            dist_to_base < cosine_distance(graph.vector(cid), graph.vector(sid))
        });
        if diverse {
            selected.push((dist_to_base, cid));
        }
    }

    if selected.len() < m {
        for &(dist, cid) in &sorted {
            if selected.len() >= m {
                break;
            }
            if !selected.iter().any(|&(_, sid)| sid == cid) {
                selected.push((dist, cid));
            }
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hnsw::graph::HnswConfig;
    use crate::hnsw::search::knn_search;
    use crate::vector::normalized;

    fn unit(v: &[f32]) -> Vec<f32> {
        normalized(v).unwrap()
    }

    #[test]
    fn test_first_insert_becomes_entry_point() {
        let mut g = HnswGraph::new(3, HnswConfig::default());
        let id = g.insert(&unit(&[1.0, 0.0, 0.0]));
        assert_eq!(id, 0);
        assert_eq!(g.entry_point, Some(0));
        assert_eq!(g.node_count, 1);
    }

    #[test]
    fn test_edges_are_undirected() {
        let mut g = HnswGraph::new(3, HnswConfig::default());
        for v in [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]] {
            g.insert(&unit(&v));
        }
        for id in 0..g.node_count {
            for (layer, list) in g.neighbors[id as usize].iter().enumerate() {
                for &n in list {
                    assert!(
                        g.neighbors[n as usize][layer].contains(&id),
                        "edge {id}->{n} at layer {layer} not reciprocated"
                    );
                }
            }
        }
    }

    #[test]
    fn test_degree_caps_hold() {
        let cfg = HnswConfig {
            m: 4,
            m_max0: 8,
            ef_construction: 32,
            ..HnswConfig::default()
        };
        let mut g = HnswGraph::new(8, cfg);
        for i in 0..200u32 {
            let v: Vec<f32> = (0..8)
                .map(|j| (((i as usize * 31 + j * 17) % 97) as f32 / 97.0) - 0.5)
                .collect();
            g.insert(&unit(&v));
        }
        for id in 0..g.node_count {
            for (layer, list) in g.neighbors[id as usize].iter().enumerate() {
                assert!(
                    list.len() <= g.config.max_degree(layer),
                    "node {id} over cap at layer {layer}: {}",
                    list.len()
                );
            }
        }
    }

    #[test]
    fn test_heuristic_tie_break_prefers_lower_id() {
        let mut g = HnswGraph::new(2, HnswConfig::default());
        g.insert(&unit(&[1.0, 0.0]));
        g.insert(&unit(&[1.0, 0.0]));
        // Two identical candidates at the same distance: selection must be
        // deterministic, lower id first.
        let picked = select_neighbors_heuristic(&g, &[(0.3, 1), (0.3, 0)], 1);
        assert_eq!(picked[0].1, 0);
    }

    #[test]
    fn test_heuristic_backfills_to_m() {
        let mut g = HnswGraph::new(2, HnswConfig::default());
        // Three co-located points: diversity alone would keep only one.
        for _ in 0..3 {
            g.insert(&unit(&[1.0, 0.0]));
        }
        let cands = vec![(0.1, 0), (0.1, 1), (0.1, 2)];
        let picked = select_neighbors_heuristic(&g, &cands, 3);
        assert_eq!(picked.len(), 3);
    }

    #[test]
    fn test_insert_finds_itself() {
        let mut g = HnswGraph::new(4, HnswConfig::default());
        let vs: Vec<Vec<f32>> = (0..30)
            .map(|i| {
                unit(&[
                    ((i * 7) % 13) as f32 - 6.0,
                    ((i * 11) % 17) as f32 - 8.0,
                    ((i * 3) % 7) as f32 - 3.0,
                    1.0,
                ])
            })
            .collect();
        for v in &vs {
            g.insert(v);
        }
        for (i, v) in vs.iter().enumerate() {
            let hits = knn_search(&g, v, 1, 16);
            assert_eq!(hits[0].1, i as u32, "nearest neighbor of a stored vector is itself");
        }
    }
}
