//! Chunk-key handling and dense/sparse score fusion.
//!
//! Chunked notes are indexed under `parentId:chunkIndex` keys. Search
//! collapses chunk hits to their parent note (keeping the best score) and
//! can blend the dense similarity with a sparse lexical score supplied by
//! an external provider.

use std::collections::HashMap;

/// Parent note id of an index key.
///
/// `parent:3` → `parent`; a key without a trailing integer chunk suffix is
/// its own parent.
pub fn parent_key(key: &str) -> &str {
    match key.rsplit_once(':') {
        Some((parent, suffix)) if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) => {
            parent
        }
        _ => key,
    }
}

/// Collapse scored chunk keys onto parent keys, keeping the maximum score
/// per parent. Input order is not preserved.
pub fn collapse_chunks(scored: Vec<(String, f32)>) -> Vec<(String, f32)> {
    let mut best: HashMap<String, f32> = HashMap::with_capacity(scored.len());
    for (key, score) in scored {
        let parent = parent_key(&key).to_string();
        best.entry(parent)
            .and_modify(|s| {
                if score > *s {
                    *s = score;
                }
            })
            .or_insert(score);
    }
    best.into_iter().collect()
}

/// Weighted combination of a dense score with an optional sparse score:
/// `alpha * dense + (1 - alpha) * sparse`. A missing sparse score
/// contributes zero.
#[inline]
pub fn linear_fuse(dense: f32, sparse: Option<f32>, alpha: f32) -> f32 {
    alpha * dense + (1.0 - alpha) * sparse.unwrap_or(0.0)
}
