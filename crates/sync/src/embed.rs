//! Embedding model contract.
//!
//! The model itself is an external collaborator — anything that can turn
//! text into fixed-dimension f32 vectors. The engine always L2-normalizes
//! what comes back, so the model's output convention does not matter.

use crate::error::SyncError;
use async_trait::async_trait;

/// Literal prefix prepended to query text before embedding. Asymmetric
/// models (e.g. the nomic family) are trained with distinct query and
/// passage prefixes.
pub const QUERY_PREFIX: &str = "search_query: ";

/// Literal prefix prepended to note text before embedding.
pub const PASSAGE_PREFIX: &str = "search_document: ";

/// Batch embedding result: per-text vectors of length `dim`, concatenated
/// row-major into one buffer.
#[derive(Debug, Clone)]
pub struct EmbeddingBatch {
    pub data: Vec<f32>,
    pub dim: usize,
}

impl EmbeddingBatch {
    /// Split the buffer into `expected` vector slices, validating shape.
    pub fn vectors(&self, expected: usize) -> Result<Vec<&[f32]>, SyncError> {
        if self.dim == 0 || self.data.len() != expected * self.dim {
            return Err(SyncError::Embedding(format!(
                "batch shape mismatch: {} floats for {expected} texts of dim {}",
                self.data.len(),
                self.dim
            )));
        }
        Ok(self.data.chunks_exact(self.dim).collect())
    }
}

/// Contract over the external embedding model.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Idempotent warm-up; called once before the first embed.
    async fn ready(&self) -> Result<(), SyncError>;

    /// Embed a batch of texts. The result concatenates one vector of
    /// length `dim` per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingBatch, SyncError>;

    /// Stable identifier of the model, recorded in embedding rows and
    /// change fingerprints.
    fn model_id(&self) -> &str;
}

/// Passage text fed to the model for a note.
pub fn passage_text(title: &str, content: &str) -> String {
    format!("{PASSAGE_PREFIX}{title}\n{content}")
}

/// Query text fed to the model for a search.
pub fn query_text(query: &str) -> String {
    format!("{QUERY_PREFIX}{query}")
}
