//! Versioned JSON snapshot codec.
//!
//! A snapshot captures the full HNSW graph — vectors, adjacency, layer
//! assignments — plus the external-key map, under a camelCase wire format:
//!
//! ```json
//! { "M": 16, "efConstruction": 200, "levelMax": 2, "entryPointId": 0,
//!   "nodes": [ { "id": 0, "level": 1, "vector": [...],
//!               "neighborsByLayer": [[1], [2]] } ],
//!   "metadata": { "version": "1.0.0", "createdAt": "...",
//!                 "nodeCount": 3, "keys": { "note-1": 0 } } }
//! ```
//!
//! `metadata.keys` holds the live external→internal id map; node ids
//! absent from it are reconstructed as tombstones. Decoding trusts the
//! serialized adjacency — edges are never rebuilt — and a version mismatch
//! is a warning that the caller answers with a cold rebuild.

use crate::config;
use crate::error::IndexError;
use crate::hnsw::{HnswConfig, HnswGraph};
use crate::index::VectorIndex;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// One serialized graph node.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotNode {
    pub id: u32,
    pub level: u8,
    pub vector: Vec<f32>,
    pub neighbors_by_layer: Vec<Vec<u32>>,
}

/// Snapshot header: format version, creation time, and the key map.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub node_count: u32,
    /// Live external key → internal id. Ids not present here are
    /// tombstones.
    #[serde(default)]
    pub keys: HashMap<String, u32>,
}

/// The on-disk snapshot document.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSnapshot {
    #[serde(rename = "M")]
    pub m: usize,
    pub ef_construction: usize,
    pub level_max: usize,
    pub entry_point_id: Option<u32>,
    pub nodes: Vec<SnapshotNode>,
    pub metadata: SnapshotMetadata,
}

/// Serialize an index to snapshot bytes (UTF-8 JSON).
pub fn encode(index: &VectorIndex) -> Result<Vec<u8>, IndexError> {
    let graph = index.graph();
    let nodes: Vec<SnapshotNode> = (0..graph.node_count)
        .map(|id| SnapshotNode {
            id,
            level: graph.level(id) as u8,
            vector: graph.vector(id).to_vec(),
            neighbors_by_layer: graph.neighbors[id as usize].clone(),
        })
        .collect();

    let doc = GraphSnapshot {
        m: graph.config.m,
        ef_construction: graph.config.ef_construction,
        level_max: graph.max_level,
        entry_point_id: graph.entry_point,
        nodes,
        metadata: SnapshotMetadata {
            version: config::SNAPSHOT_VERSION.to_string(),
            created_at: Utc::now(),
            node_count: graph.node_count,
            keys: index.live_key_map(),
        },
    };
    Ok(serde_json::to_vec(&doc)?)
}

/// Decode snapshot bytes back into a [`VectorIndex`].
///
/// Adjacency is trusted as serialized. Structural problems (non-contiguous
/// ids, ragged dimensions, out-of-range references) come back as
/// [`IndexError::Corrupt`]; so does a version mismatch, after a warning —
/// the caller falls back to a cold rebuild either way.
pub fn decode(bytes: &[u8]) -> Result<VectorIndex, IndexError> {
    let doc: GraphSnapshot =
        serde_json::from_slice(bytes).map_err(|e| IndexError::Corrupt(e.to_string()))?;

    if doc.metadata.version != config::SNAPSHOT_VERSION {
        tracing::warn!(
            found = %doc.metadata.version,
            expected = config::SNAPSHOT_VERSION,
            "snapshot version mismatch, a full rebuild is required"
        );
        return Err(IndexError::Corrupt(format!(
            "version mismatch: {}",
            doc.metadata.version
        )));
    }
    if doc.nodes.len() != doc.metadata.node_count as usize {
        return Err(IndexError::Corrupt(format!(
            "node count {} disagrees with metadata {}",
            doc.nodes.len(),
            doc.metadata.node_count
        )));
    }

    let dimension = match doc.nodes.first() {
        Some(n) => n.vector.len(),
        None => {
            // An empty snapshot decodes to an empty index; dimension zero
            // is replaced on the first real install.
            0
        }
    };

    let hnsw_config = HnswConfig {
        m: doc.m,
        m_max0: doc.m * 2,
        ef_construction: doc.ef_construction,
        ..HnswConfig::default()
    };
    let mut graph = HnswGraph::new(dimension, hnsw_config);

    for (expected_id, node) in doc.nodes.iter().enumerate() {
        if node.id as usize != expected_id {
            return Err(IndexError::Corrupt(format!(
                "non-contiguous node id {} at position {expected_id}",
                node.id
            )));
        }
        if node.vector.len() != dimension {
            return Err(IndexError::Corrupt(format!(
                "node {} dimension {} != {dimension}",
                node.id,
                node.vector.len()
            )));
        }
        if node.neighbors_by_layer.len() != node.level as usize + 1 {
            return Err(IndexError::Corrupt(format!(
                "node {} has {} layer lists for level {}",
                node.id,
                node.neighbors_by_layer.len(),
                node.level
            )));
        }
        graph.push_node(
            &node.vector,
            node.level as usize,
            node.neighbors_by_layer.clone(),
        );
    }

    if let Some(ep) = doc.entry_point_id {
        if ep >= graph.node_count {
            return Err(IndexError::Corrupt(format!(
                "entry point {ep} out of range"
            )));
        }
    }
    graph.entry_point = doc.entry_point_id;
    graph.max_level = doc.level_max;

    for (key, &id) in &doc.metadata.keys {
        if id >= graph.node_count {
            return Err(IndexError::Corrupt(format!(
                "key '{key}' maps to out-of-range id {id}"
            )));
        }
    }
    let live: std::collections::HashSet<u32> = doc.metadata.keys.values().copied().collect();
    for id in 0..graph.node_count {
        if !live.contains(&id) {
            graph.deleted[id as usize] = true;
        }
    }
    if let Some(ep) = graph.entry_point {
        if graph.is_deleted(ep) {
            // Re-elect among live nodes; mark_deleted handles the scan.
            graph.mark_deleted(ep);
        }
    }

    Ok(VectorIndex::from_parts(graph, doc.metadata.keys))
}

/// SHA-256 over the payload, truncated to the first
/// [`config::SNAPSHOT_CHECKSUM_LEN`] hex characters. Informational: it is
/// reported in the `snapshotCreated` event and logs, not embedded in the
/// file.
pub fn checksum(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut hex = String::with_capacity(config::SNAPSHOT_CHECKSUM_LEN);
    for byte in digest.iter().take(config::SNAPSHOT_CHECKSUM_LEN / 2) {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::NoteMeta;

    fn meta(title: &str) -> NoteMeta {
        NoteMeta {
            title: title.to_string(),
            preview: String::new(),
        }
    }

    fn sample_index() -> VectorIndex {
        let mut idx = VectorIndex::new(4, HnswConfig::default());
        idx.upsert("a", &[1.0, 0.0, 0.0, 0.0], meta("a")).unwrap();
        idx.upsert("b", &[0.0, 1.0, 0.0, 0.0], meta("b")).unwrap();
        idx.upsert("c", &[0.5, 0.5, 0.5, 0.5], meta("c")).unwrap();
        idx
    }

    #[test]
    fn test_roundtrip_preserves_search() {
        let idx = sample_index();
        let bytes = encode(&idx).unwrap();
        let restored = decode(&bytes).unwrap();
        assert!(restored.validate().is_ok());

        for q in [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.3, 0.3, 0.9, 0.1],
        ] {
            let before = idx.knn(&q, 3, 50).unwrap();
            let after = restored.knn(&q, 3, 50).unwrap();
            assert_eq!(before.len(), after.len());
            for (x, y) in before.iter().zip(after.iter()) {
                assert_eq!(x.key, y.key);
                assert_eq!(x.score, y.score, "scores must round-trip exactly");
            }
        }
    }

    #[test]
    fn test_tombstones_survive_roundtrip() {
        let mut idx = sample_index();
        idx.remove("b");
        let restored = decode(&encode(&idx).unwrap()).unwrap();
        assert_eq!(restored.node_count(), 3);
        assert_eq!(restored.live_count(), 2);
        assert!(!restored.contains("b"));
        let hits = restored.knn(&[0.0, 1.0, 0.0, 0.0], 3, 50).unwrap();
        assert!(hits.iter().all(|h| h.key != "b"));
    }

    #[test]
    fn test_wire_format_field_names() {
        let idx = sample_index();
        let bytes = encode(&idx).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(value.get("M").is_some());
        assert!(value.get("efConstruction").is_some());
        assert!(value.get("levelMax").is_some());
        assert!(value.get("entryPointId").is_some());
        let node = &value["nodes"][0];
        assert!(node.get("id").is_some());
        assert!(node.get("level").is_some());
        assert!(node.get("vector").is_some());
        assert!(node.get("neighborsByLayer").is_some());
        let md = &value["metadata"];
        assert_eq!(md["version"], config::SNAPSHOT_VERSION);
        assert!(md.get("createdAt").is_some());
        assert_eq!(md["nodeCount"], 3);
        assert!(md.get("keys").is_some());
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let idx = sample_index();
        let bytes = encode(&idx).unwrap();
        let mut value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        value["metadata"]["version"] = serde_json::json!("9.9.9");
        let err = decode(&serde_json::to_vec(&value).unwrap()).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt(_)));
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        assert!(decode(b"not json at all").is_err());
        assert!(decode(b"{\"nodes\": []}").is_err());
    }

    #[test]
    fn test_mapping_does_not_depend_on_row_order() {
        // The key map rides inside the snapshot, so reconstruction cannot
        // be confused by any external ordering.
        let mut idx = VectorIndex::new(2, HnswConfig::default());
        idx.upsert("first", &[1.0, 0.0], meta("t1")).unwrap();
        idx.upsert("second", &[0.0, 1.0], meta("t2")).unwrap();
        let restored = decode(&encode(&idx).unwrap()).unwrap();
        let hit = &restored.knn(&[1.0, 0.0], 1, 50).unwrap()[0];
        assert_eq!(hit.key, "first");
        let hit = &restored.knn(&[0.0, 1.0], 1, 50).unwrap()[0];
        assert_eq!(hit.key, "second");
    }

    #[test]
    fn test_checksum_shape_and_stability() {
        let a = checksum(b"payload");
        let b = checksum(b"payload");
        let c = checksum(b"other");
        assert_eq!(a.len(), config::SNAPSHOT_CHECKSUM_LEN);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn test_empty_index_roundtrip() {
        let idx = VectorIndex::new(4, HnswConfig::default());
        let restored = decode(&encode(&idx).unwrap()).unwrap();
        assert_eq!(restored.node_count(), 0);
        assert!(restored.knn(&[], 1, 50).unwrap().is_empty());
    }
}
