//! Row-store contract: row shapes, the embedding wire codec, change
//! fingerprints, and the events the sync layer commits back.
//!
//! The host's store is event-sourced and schemaless at this boundary;
//! these types pin down the concrete record shapes so nothing untyped
//! leaks inward. Rows with mis-sized vector payloads are rejected at this
//! adapter with a logged warning.

use crate::error::SyncError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use noteseek_core::NoteMeta;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

/// Characters of note content kept as a result preview.
const PREVIEW_LEN: usize = 240;

/// A note row that still needs (re-)embedding.
#[derive(Debug, Clone)]
pub struct NoteRow {
    pub id: String,
    pub title: String,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

/// An embedding row: the authoritative vector for one external key.
///
/// `vec_bytes` is little-endian f32, row-major, `4 * vec_dim` bytes.
#[derive(Debug, Clone)]
pub struct EmbeddingRow {
    pub key: String,
    pub title: String,
    pub content: String,
    pub vec_bytes: Vec<u8>,
    pub vec_dim: usize,
    pub model: String,
    pub updated_at: DateTime<Utc>,
}

impl EmbeddingRow {
    /// Decode the vector payload, validating its length.
    pub fn vector(&self) -> Result<Vec<f32>, SyncError> {
        if self.vec_bytes.len() != self.vec_dim * 4 {
            return Err(SyncError::MalformedRow {
                key: self.key.clone(),
                reason: format!(
                    "{} payload bytes for dim {}",
                    self.vec_bytes.len(),
                    self.vec_dim
                ),
            });
        }
        Ok(self
            .vec_bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    /// Encode a vector into the row payload format.
    pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(vector.len() * 4);
        for x in vector {
            bytes.extend_from_slice(&x.to_le_bytes());
        }
        bytes
    }

    /// Change fingerprint: SHA-256 over a `\x1f`-separated canonical
    /// concatenation of title, content, updated-at, and model id, keeping
    /// the first 16 bytes as hex. Any field change flips the fingerprint.
    pub fn fingerprint(&self) -> String {
        content_fingerprint(&self.title, &self.content, &self.updated_at, &self.model)
    }

    /// Display metadata carried into the index.
    pub fn meta(&self) -> NoteMeta {
        let preview: String = self.content.chars().take(PREVIEW_LEN).collect();
        NoteMeta {
            title: self.title.clone(),
            preview,
        }
    }
}

/// See [`EmbeddingRow::fingerprint`].
pub fn content_fingerprint(
    title: &str,
    content: &str,
    updated_at: &DateTime<Utc>,
    model: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update([0x1f]);
    hasher.update(content.as_bytes());
    hasher.update([0x1f]);
    hasher.update(updated_at.to_rfc3339().as_bytes());
    hasher.update([0x1f]);
    hasher.update(model.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(32);
    for byte in digest.iter().take(16) {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

/// Events the sync layer commits into the event-sourced store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StoreEvent {
    #[serde(rename_all = "camelCase")]
    EmbeddingUpserted {
        key: String,
        title: String,
        content: String,
        vec_bytes: Vec<u8>,
        vec_dim: usize,
        model: String,
        ts: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    EmbeddingRemoved { key: String },
    #[serde(rename_all = "camelCase")]
    SnapshotCreated {
        file_name: String,
        checksum: String,
        size: u64,
        node_count: u32,
        model: String,
        ts: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    IndexCleared { ts: DateTime<Utc>, reason: String },
}

/// The two reactive queries the orchestrator subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// Notes whose `updated_at` is newer than their embedding's, or that
    /// have no embedding yet.
    NotesRequiringEmbedding,
    /// Embedding rows whose note no longer exists.
    OrphanedEmbeddings,
}

/// Contract over the host's event-sourced row store.
///
/// Query methods return the current result set; `subscribe` hands back a
/// channel that ticks whenever the selector's result set may have
/// changed. Dropping the receiver unsubscribes.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn notes_requiring_embedding(&self) -> Result<Vec<NoteRow>, SyncError>;
    async fn embedding_rows(&self) -> Result<Vec<EmbeddingRow>, SyncError>;
    /// Keys of orphaned embedding rows.
    async fn orphaned_embeddings(&self) -> Result<Vec<String>, SyncError>;
    async fn commit(&self, event: StoreEvent) -> Result<(), SyncError>;
    fn subscribe(&self, selector: Selector) -> mpsc::UnboundedReceiver<()>;
}
