//! HNSW search: best-first single-layer search and multi-layer k-NN.
//!
//! Tombstoned nodes participate in navigation but are excluded from
//! result sets, so a heavily-deleted graph still routes queries correctly
//! until the next rebuild compacts it.

use crate::hnsw::graph::HnswGraph;
use crate::hnsw::visited::Visited;
use crate::vector::cosine_distance;
use ordered_float::OrderedFloat;
use std::collections::BinaryHeap;

/// Frontier entry: negated distance makes the max-heap pop closest-first.
#[derive(Debug, PartialEq, Eq)]
struct Candidate {
    neg_distance: OrderedFloat<f32>,
    id: u32,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.neg_distance.cmp(&other.neg_distance)
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Result entry: max-heap by distance so the worst result pops first.
#[derive(Debug, PartialEq, Eq)]
struct ResultEntry {
    distance: OrderedFloat<f32>,
    id: u32,
}

impl Ord for ResultEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.distance.cmp(&other.distance)
    }
}

impl PartialOrd for ResultEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Best-first search of a single layer.
///
/// Returns up to `ef` live nodes closest to `query`, sorted by ascending
/// distance. `visited` is reset here and reused across layers by callers.
pub fn search_layer(
    graph: &HnswGraph,
    query: &[f32],
    entry_points: &[u32],
    ef: usize,
    layer: usize,
    visited: &mut Visited,
) -> Vec<(f32, u32)> {
    visited.reset();
    let mut frontier: BinaryHeap<Candidate> = BinaryHeap::with_capacity(ef * 2);
    let mut results: BinaryHeap<ResultEntry> = BinaryHeap::with_capacity(ef + 1);
    let mut worst = f32::MAX;

    for &ep in entry_points {
        if !visited.first_visit(ep) {
            continue;
        }
        let dist = cosine_distance(query, graph.vector(ep));
        frontier.push(Candidate {
            neg_distance: OrderedFloat(-dist),
            id: ep,
        });
        if !graph.is_deleted(ep) {
            results.push(ResultEntry {
                distance: OrderedFloat(dist),
                id: ep,
            });
            if results.len() >= ef {
                worst = results.peek().map_or(f32::MAX, |r| r.distance.0);
            }
        }
    }

    while let Some(candidate) = frontier.pop() {
        let dist = -candidate.neg_distance.0;
        if results.len() >= ef && dist > worst {
            break;
        }

        let node = candidate.id as usize;
        if layer >= graph.neighbors[node].len() {
            continue;
        }
        for &neighbor in &graph.neighbors[node][layer] {
            if !visited.first_visit(neighbor) {
                continue;
            }
            let d = cosine_distance(query, graph.vector(neighbor));
            if results.len() < ef || d < worst {
                frontier.push(Candidate {
                    neg_distance: OrderedFloat(-d),
                    id: neighbor,
                });
                if !graph.is_deleted(neighbor) {
                    results.push(ResultEntry {
                        distance: OrderedFloat(d),
                        id: neighbor,
                    });
                    if results.len() > ef {
                        results.pop();
                    }
                    worst = results.peek().map_or(f32::MAX, |r| r.distance.0);
                }
            }
        }
    }

    results
        .into_sorted_vec()
        .into_iter()
        .map(|r| (r.distance.0, r.id))
        .collect()
}

/// Multi-layer k-NN with an explicit beam width.
///
/// Greedy descent from the entry point to layer 1, then a layer-0 search
/// with budget `ef` (clamped to at least `k`). Returns `(distance, id)`
/// pairs sorted ascending; empty on an empty graph.
pub fn knn_search(graph: &HnswGraph, query: &[f32], k: usize, ef: usize) -> Vec<(f32, u32)> {
    let Some(entry) = graph.entry_point else {
        return Vec::new();
    };

    let mut visited = Visited::with_capacity(graph.node_count as usize);
    let mut current = entry;
    for layer in (1..=graph.max_level).rev() {
        let found = search_layer(
            graph,
            query,
            std::slice::from_ref(&current),
            1,
            layer,
            &mut visited,
        );
        if let Some(&(_, nearest)) = found.first() {
            current = nearest;
        }
    }

    let mut results = search_layer(
        graph,
        query,
        std::slice::from_ref(&current),
        ef.max(k),
        0,
        &mut visited,
    );
    results.truncate(k);
    results
}
