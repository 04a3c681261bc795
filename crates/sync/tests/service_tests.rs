//! End-to-end tests for the noteseek service: boot, delta reconciliation,
//! orphan removal, snapshot/restore, and rollback — driven through the
//! control surface against an in-memory row store and a fixture embedder.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use noteseek_core::error::IndexError;
use noteseek_core::fusion::parent_key;
use noteseek_core::index::VectorIndex;
use noteseek_core::store::{GraphStore, PersistReport, SnapshotInfo, SnapshotStore};
use noteseek_sync::embed::{passage_text, Embedder, EmbeddingBatch};
use noteseek_sync::rows::{EmbeddingRow, NoteRow, RowStore, Selector, StoreEvent};
use noteseek_sync::{NoteSeek, NoteSeekBuilder, SyncConfig, SyncError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const DIM: usize = 4;

fn ts(offset_secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + offset_secs, 0).unwrap()
}

// ── In-memory event-sourced row store ──────────────────────────────────

#[derive(Default)]
struct StoreInner {
    notes: HashMap<String, NoteRow>,
    embeddings: HashMap<String, EmbeddingRow>,
    events: Vec<StoreEvent>,
    note_subs: Vec<mpsc::UnboundedSender<()>>,
    orphan_subs: Vec<mpsc::UnboundedSender<()>>,
}

/// Event-sourced store double: commits apply events to the row tables and
/// re-fire the reactive queries, like the host store would.
#[derive(Default)]
struct MemRowStore {
    inner: Mutex<StoreInner>,
}

impl MemRowStore {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn put_note(&self, id: &str, title: &str, content: &str, updated_at: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        inner.notes.insert(
            id.to_string(),
            NoteRow {
                id: id.to_string(),
                title: title.to_string(),
                content: content.to_string(),
                updated_at,
            },
        );
        notify(&mut inner.note_subs);
    }

    fn delete_note(&self, id: &str) {
        let mut inner = self.inner.lock();
        inner.notes.remove(id);
        notify(&mut inner.orphan_subs);
    }

    fn put_embedding(
        &self,
        key: &str,
        title: &str,
        content: &str,
        vector: &[f32],
        updated_at: DateTime<Utc>,
    ) {
        let mut inner = self.inner.lock();
        inner.embeddings.insert(
            key.to_string(),
            EmbeddingRow {
                key: key.to_string(),
                title: title.to_string(),
                content: content.to_string(),
                vec_bytes: EmbeddingRow::encode_vector(vector),
                vec_dim: vector.len(),
                model: "mock-model".to_string(),
                updated_at,
            },
        );
    }

    fn events(&self) -> Vec<StoreEvent> {
        self.inner.lock().events.clone()
    }

    fn has_embedding(&self, key: &str) -> bool {
        self.inner.lock().embeddings.contains_key(key)
    }

    fn clear_embeddings(&self) {
        self.inner.lock().embeddings.clear();
    }
}

fn notify(subs: &mut Vec<mpsc::UnboundedSender<()>>) {
    subs.retain(|tx| tx.send(()).is_ok());
}

#[async_trait]
impl RowStore for MemRowStore {
    async fn notes_requiring_embedding(&self) -> Result<Vec<NoteRow>, SyncError> {
        let inner = self.inner.lock();
        Ok(inner
            .notes
            .values()
            .filter(|note| {
                // Chunked notes carry their embeddings under
                // `noteId:chunkIndex` keys; any fresh-enough row covers
                // the note.
                !inner.embeddings.values().any(|emb| {
                    parent_key(&emb.key) == note.id && emb.updated_at >= note.updated_at
                })
            })
            .cloned()
            .collect())
    }

    async fn embedding_rows(&self) -> Result<Vec<EmbeddingRow>, SyncError> {
        Ok(self.inner.lock().embeddings.values().cloned().collect())
    }

    async fn orphaned_embeddings(&self) -> Result<Vec<String>, SyncError> {
        let inner = self.inner.lock();
        Ok(inner
            .embeddings
            .keys()
            .filter(|key| !inner.notes.contains_key(parent_key(key)))
            .cloned()
            .collect())
    }

    async fn commit(&self, event: StoreEvent) -> Result<(), SyncError> {
        let mut inner = self.inner.lock();
        match &event {
            StoreEvent::EmbeddingUpserted {
                key,
                title,
                content,
                vec_bytes,
                vec_dim,
                model,
                ts,
            } => {
                inner.embeddings.insert(
                    key.clone(),
                    EmbeddingRow {
                        key: key.clone(),
                        title: title.clone(),
                        content: content.clone(),
                        vec_bytes: vec_bytes.clone(),
                        vec_dim: *vec_dim,
                        model: model.clone(),
                        updated_at: *ts,
                    },
                );
                notify(&mut inner.note_subs);
            }
            StoreEvent::EmbeddingRemoved { key } => {
                inner.embeddings.remove(key);
                notify(&mut inner.orphan_subs);
            }
            StoreEvent::SnapshotCreated { .. } | StoreEvent::IndexCleared { .. } => {}
        }
        inner.events.push(event);
        Ok(())
    }

    fn subscribe(&self, selector: Selector) -> mpsc::UnboundedReceiver<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        match selector {
            Selector::NotesRequiringEmbedding => inner.note_subs.push(tx),
            Selector::OrphanedEmbeddings => inner.orphan_subs.push(tx),
        }
        rx
    }
}

// ── Fixture embedder ───────────────────────────────────────────────────

struct MockEmbedder {
    dim: usize,
    fixtures: Mutex<HashMap<String, Vec<f32>>>,
    failing: AtomicBool,
}

impl MockEmbedder {
    fn new(dim: usize) -> Arc<Self> {
        Arc::new(Self {
            dim,
            fixtures: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
        })
    }

    fn fix(&self, text: &str, vector: &[f32]) {
        self.fixtures
            .lock()
            .insert(text.to_string(), vector.to_vec());
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn ready(&self) -> Result<(), SyncError> {
        Ok(())
    }

    async fn embed(&self, texts: &[String]) -> Result<EmbeddingBatch, SyncError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SyncError::Embedding("injected model failure".into()));
        }
        let fixtures = self.fixtures.lock();
        let mut data = Vec::with_capacity(texts.len() * self.dim);
        for text in texts {
            match fixtures.get(text) {
                Some(v) => data.extend_from_slice(v),
                // Unfixtured passages embed to a fixed diagonal direction.
                None => data.extend((0..self.dim).map(|_| 0.5)),
            }
        }
        Ok(EmbeddingBatch {
            data,
            dim: self.dim,
        })
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

// ── Persist-failure injection for rollback tests ───────────────────────

struct FailingStore {
    inner: GraphStore,
    fail_persist: AtomicBool,
}

impl FailingStore {
    fn new(inner: GraphStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_persist: AtomicBool::new(false),
        })
    }
}

impl SnapshotStore for FailingStore {
    fn persist_graph(&self, index: &VectorIndex, name: &str) -> Result<PersistReport, IndexError> {
        if self.fail_persist.swap(false, Ordering::SeqCst) {
            return Err(IndexError::Io(std::io::Error::other("injected disk failure")));
        }
        self.inner.persist_graph(index, name)
    }

    fn load_graph(&self, name: &str) -> Option<VectorIndex> {
        self.inner.load_graph(name)
    }

    fn rename_file(&self, old: &str, new: &str) -> Result<(), IndexError> {
        self.inner.rename_file(old, new)
    }

    fn remove_file(&self, name: &str) -> Result<(), IndexError> {
        self.inner.remove_file(name)
    }

    fn snapshot_info(&self) -> Result<SnapshotInfo, IndexError> {
        self.inner.snapshot_info()
    }

    fn gc_old_snapshots(&self, keep: usize) -> Result<usize, IndexError> {
        self.inner.gc_old_snapshots(keep)
    }
}

// ── Fixtures ───────────────────────────────────────────────────────────

/// Three notes with orthonormal embeddings already in the store.
fn seed_basis(store: &MemRowStore) {
    let vectors: [(&str, [f32; 4]); 3] = [
        ("a", [1.0, 0.0, 0.0, 0.0]),
        ("b", [0.0, 1.0, 0.0, 0.0]),
        ("c", [0.0, 0.0, 1.0, 0.0]),
    ];
    for (key, vec) in vectors {
        store.put_note(key, key, "body", ts(0));
        store.put_embedding(key, key, "body", &vec, ts(0));
    }
}

fn fast_sync_config() -> SyncConfig {
    SyncConfig {
        debounce: Duration::from_millis(20),
        ..SyncConfig::default()
    }
}

fn query_fixtures(embedder: &MockEmbedder) {
    embedder.fix("search_query: q-a", &[1.0, 0.0, 0.0, 0.0]);
    embedder.fix("search_query: q-b", &[0.0, 1.0, 0.0, 0.0]);
}

async fn initialize(
    store: &Arc<MemRowStore>,
    embedder: &Arc<MockEmbedder>,
    dir: &std::path::Path,
) -> NoteSeek {
    NoteSeekBuilder::new(
        Arc::clone(store) as Arc<dyn RowStore>,
        Arc::clone(embedder) as Arc<dyn Embedder>,
        DIM,
    )
    .snapshot_dir(dir)
    .sync_config(fast_sync_config())
    .initialize()
    .await
    .expect("initialize")
}

// ── Scenarios ──────────────────────────────────────────────────────────

#[tokio::test]
async fn cold_boot_then_search() {
    let store = MemRowStore::new();
    seed_basis(&store);
    let embedder = MockEmbedder::new(DIM);
    query_fixtures(&embedder);
    let dir = tempfile::tempdir().unwrap();

    let service = initialize(&store, &embedder, dir.path()).await;
    let hits = service.search("q-a", 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].key, "a");
    assert!((hits[0].score - 1.0).abs() < 1e-5);
    assert!(hits[1].score.abs() < 1e-5);
    assert!(hits[1].key == "b" || hits[1].key == "c");

    let status = service.status().await.unwrap();
    assert_eq!(status.known_embedding_count, 3);
    assert_eq!(status.live_count, 3);
    assert_eq!(status.dimension, DIM);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn delta_upsert_replaces_vector() {
    let store = MemRowStore::new();
    seed_basis(&store);
    let embedder = MockEmbedder::new(DIM);
    query_fixtures(&embedder);
    let dir = tempfile::tempdir().unwrap();
    let service = initialize(&store, &embedder, dir.path()).await;

    // The host re-embeds b to coincide with a.
    store.put_embedding("b", "b", "body v2", &[1.0, 0.0, 0.0, 0.0], ts(60));
    service.force_sync().await.unwrap();

    let hits = service.search("q-a", 2).await.unwrap();
    let keys: Vec<&str> = hits.iter().map(|h| h.key.as_str()).collect();
    assert!(keys.contains(&"a") && keys.contains(&"b"), "got {keys:?}");
    for hit in &hits {
        assert!((hit.score - 1.0).abs() < 1e-5);
    }

    // The old vector for b is tombstoned, not rewired.
    let status = service.status().await.unwrap();
    assert_eq!(status.live_count, 3);
    assert_eq!(status.tombstone_count, 1);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn orphan_removal_tombstones_key() {
    let store = MemRowStore::new();
    seed_basis(&store);
    let embedder = MockEmbedder::new(DIM);
    query_fixtures(&embedder);
    let dir = tempfile::tempdir().unwrap();
    let service = initialize(&store, &embedder, dir.path()).await;

    store.delete_note("a");
    service.force_sync().await.unwrap();

    let hits = service.search("q-a", 3).await.unwrap();
    assert!(hits.iter().all(|h| h.key != "a"));
    assert!(hits.len() <= 2);

    let status = service.status().await.unwrap();
    assert_eq!(status.known_embedding_count, 2);
    assert_eq!(status.tombstone_count, 1);

    // The removal was committed back and the row retired.
    assert!(!store.has_embedding("a"));
    assert!(store
        .events()
        .iter()
        .any(|e| matches!(e, StoreEvent::EmbeddingRemoved { key } if key == "a")));

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn snapshot_then_warm_boot() {
    let store = MemRowStore::new();
    seed_basis(&store);
    let embedder = MockEmbedder::new(DIM);
    query_fixtures(&embedder);
    let dir = tempfile::tempdir().unwrap();

    let service = initialize(&store, &embedder, dir.path()).await;
    service.force_snapshot().await.unwrap();
    assert!(dir.path().join("latest.json").exists());
    assert!(store
        .events()
        .iter()
        .any(|e| matches!(e, StoreEvent::SnapshotCreated { node_count: 3, .. })));
    service.shutdown().await.unwrap();

    // Restart against the same directory.
    let service = initialize(&store, &embedder, dir.path()).await;
    let hits = service.search("q-b", 1).await.unwrap();
    assert_eq!(hits[0].key, "b");
    assert!((hits[0].score - 1.0).abs() < 1e-5);
    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn warm_boot_survives_missing_rows() {
    // If the snapshot is the only thing left, the graph (and its key map)
    // must still come back — mappings ride in the snapshot, not in row
    // iteration order.
    let store = MemRowStore::new();
    seed_basis(&store);
    let embedder = MockEmbedder::new(DIM);
    query_fixtures(&embedder);
    let dir = tempfile::tempdir().unwrap();

    let service = initialize(&store, &embedder, dir.path()).await;
    service.force_snapshot().await.unwrap();
    service.shutdown().await.unwrap();

    store.clear_embeddings();
    let service = initialize(&store, &embedder, dir.path()).await;
    let status = service.status().await.unwrap();
    assert_eq!(status.live_count, 3, "graph restored from snapshot alone");

    let hits = service.search("q-b", 1).await.unwrap();
    assert_eq!(hits[0].key, "b");
    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn failed_snapshot_rolls_back_latest() {
    let store = MemRowStore::new();
    seed_basis(&store);
    let embedder = MockEmbedder::new(DIM);
    query_fixtures(&embedder);
    let dir = tempfile::tempdir().unwrap();
    let graph_store = GraphStore::new(dir.path()).unwrap();
    let failing = FailingStore::new(graph_store);

    let service = NoteSeekBuilder::new(
        Arc::clone(&store) as Arc<dyn RowStore>,
        Arc::clone(&embedder) as Arc<dyn Embedder>,
        DIM,
    )
    .snapshot_store(Arc::clone(&failing) as Arc<dyn SnapshotStore>)
    .sync_config(fast_sync_config())
    .initialize()
    .await
    .unwrap();

    service.force_snapshot().await.unwrap();
    let latest_path = dir.path().join("latest.json");
    let before = std::fs::read(&latest_path).unwrap();

    // Make a change so state is dirty, then fail the next persist.
    store.put_embedding("d", "d", "body", &[0.0, 0.0, 0.0, 1.0], ts(120));
    store.put_note("d", "d", "body", ts(120));
    service.force_sync().await.unwrap();
    let pending_before = service.status().await.unwrap().pending_change_count;
    assert!(pending_before > 0);

    failing.fail_persist.store(true, Ordering::SeqCst);
    let result = service.force_snapshot().await;
    assert!(result.is_err(), "injected persist failure must surface");

    // The pre-call latest is back, byte for byte, and the counter kept.
    let after = std::fs::read(&latest_path).unwrap();
    assert_eq!(before, after);
    assert!(!dir.path().join("backup.json").exists());
    assert_eq!(
        service.status().await.unwrap().pending_change_count,
        pending_before
    );

    // The next snapshot succeeds and clears the counter.
    service.force_snapshot().await.unwrap();
    assert_eq!(service.status().await.unwrap().pending_change_count, 0);
    let healed = std::fs::read(&latest_path).unwrap();
    assert_ne!(before, healed);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn embed_pipeline_commits_rows() {
    let store = MemRowStore::new();
    let embedder = MockEmbedder::new(DIM);
    query_fixtures(&embedder);
    embedder.fix(&passage_text("Graphs", "all about hnsw"), &[0.0, 1.0, 0.0, 0.0]);
    let dir = tempfile::tempdir().unwrap();
    let service = initialize(&store, &embedder, dir.path()).await;

    store.put_note("n1", "Graphs", "all about hnsw", ts(10));
    service.force_sync().await.unwrap();

    // The orchestrator embedded the note and committed the row.
    assert!(store.has_embedding("n1"));
    assert!(store.events().iter().any(|e| matches!(
        e,
        StoreEvent::EmbeddingUpserted { key, vec_dim: 4, model, .. }
            if key == "n1" && model == "mock-model"
    )));

    let hits = service.search("q-b", 1).await.unwrap();
    assert_eq!(hits[0].key, "n1");
    assert_eq!(hits[0].title.as_deref(), Some("Graphs"));

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn embedding_failure_retries_next_pass() {
    let store = MemRowStore::new();
    let embedder = MockEmbedder::new(DIM);
    query_fixtures(&embedder);
    let dir = tempfile::tempdir().unwrap();
    let service = initialize(&store, &embedder, dir.path()).await;

    embedder.set_failing(true);
    store.put_note("n1", "Title", "content", ts(10));
    service.force_sync().await.unwrap();
    assert!(!store.has_embedding("n1"), "failed batch must not commit");
    assert_eq!(service.status().await.unwrap().known_embedding_count, 0);

    // The model recovers; the next pass retries and succeeds.
    embedder.set_failing(false);
    service.force_sync().await.unwrap();
    assert!(store.has_embedding("n1"));
    assert_eq!(service.status().await.unwrap().known_embedding_count, 1);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn reconcile_is_idempotent() {
    let store = MemRowStore::new();
    seed_basis(&store);
    let embedder = MockEmbedder::new(DIM);
    query_fixtures(&embedder);
    let dir = tempfile::tempdir().unwrap();
    let service = initialize(&store, &embedder, dir.path()).await;

    let before = service.status().await.unwrap();
    service.force_sync().await.unwrap();
    service.force_sync().await.unwrap();
    let after = service.status().await.unwrap();

    assert_eq!(before.node_count, after.node_count);
    assert_eq!(before.known_embedding_count, after.known_embedding_count);
    assert_eq!(after.pending_change_count, 0);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn convergence_after_mixed_mutations() {
    let store = MemRowStore::new();
    seed_basis(&store);
    let embedder = MockEmbedder::new(DIM);
    query_fixtures(&embedder);
    let dir = tempfile::tempdir().unwrap();
    let service = initialize(&store, &embedder, dir.path()).await;

    // Update b, delete c, add d and e, then quiesce and reconcile.
    store.put_embedding("b", "b", "body v2", &[0.0, 0.5, 0.5, 0.0], ts(60));
    store.delete_note("c");
    for key in ["d", "e"] {
        store.put_note(key, key, "body", ts(70));
        store.put_embedding(key, key, "body", &[0.0, 0.0, 0.5, 0.5], ts(70));
    }
    service.force_sync().await.unwrap();
    service.force_sync().await.unwrap();

    let status = service.status().await.unwrap();
    assert_eq!(status.known_embedding_count, 4, "a, b, d, e");
    assert_eq!(status.live_count, 4);

    let hits = service.search("q-a", 10).await.unwrap();
    assert!(hits.iter().all(|h| h.key != "c"));

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn threshold_triggers_snapshot() {
    let store = MemRowStore::new();
    seed_basis(&store);
    let embedder = MockEmbedder::new(DIM);
    query_fixtures(&embedder);
    let dir = tempfile::tempdir().unwrap();

    let service = NoteSeekBuilder::new(
        Arc::clone(&store) as Arc<dyn RowStore>,
        Arc::clone(&embedder) as Arc<dyn Embedder>,
        DIM,
    )
    .snapshot_dir(dir.path())
    .sync_config(SyncConfig {
        debounce: Duration::from_millis(20),
        changes_threshold: 3,
        ..SyncConfig::default()
    })
    .initialize()
    .await
    .unwrap();

    // Cold boot does not count toward the threshold.
    assert!(!dir.path().join("latest.json").exists());

    for (i, key) in ["x", "y", "z"].iter().enumerate() {
        store.put_note(key, key, "body", ts(100 + i as i64));
        store.put_embedding(key, key, "body", &[0.5, 0.5, 0.0, 0.0], ts(100 + i as i64));
    }
    service.force_sync().await.unwrap();

    assert!(dir.path().join("latest.json").exists());
    let status = service.status().await.unwrap();
    assert_eq!(status.pending_change_count, 0);
    assert!(status.last_snapshot_at.is_some());

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn full_rebuild_purges_tombstones() {
    let store = MemRowStore::new();
    seed_basis(&store);
    let embedder = MockEmbedder::new(DIM);
    query_fixtures(&embedder);
    let dir = tempfile::tempdir().unwrap();
    let service = initialize(&store, &embedder, dir.path()).await;

    store.delete_note("a");
    service.force_sync().await.unwrap();
    assert_eq!(service.status().await.unwrap().tombstone_count, 1);

    service.force_full_rebuild().await.unwrap();

    let status = service.status().await.unwrap();
    assert_eq!(status.tombstone_count, 0);
    assert_eq!(status.live_count, 2);
    assert!(dir.path().join("latest.json").exists());
    assert!(store
        .events()
        .iter()
        .any(|e| matches!(e, StoreEvent::IndexCleared { reason, .. } if reason == "manual")));

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn subscription_ticks_drive_reconciliation() {
    let store = MemRowStore::new();
    let embedder = MockEmbedder::new(DIM);
    query_fixtures(&embedder);
    embedder.fix(&passage_text("Fresh", "note body"), &[1.0, 0.0, 0.0, 0.0]);
    let dir = tempfile::tempdir().unwrap();
    let service = initialize(&store, &embedder, dir.path()).await;

    // No force_sync: the reactive tick plus debounce must pick this up.
    store.put_note("fresh", "Fresh", "note body", ts(10));

    let mut indexed = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(25)).await;
        if service.status().await.unwrap().known_embedding_count == 1 {
            indexed = true;
            break;
        }
    }
    assert!(indexed, "debounced reconciliation never caught up");

    let hits = service.search("q-a", 1).await.unwrap();
    assert_eq!(hits[0].key, "fresh");

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn chunked_notes_collapse_to_parent() {
    let store = MemRowStore::new();
    store.put_note("parent", "Parent", "long note", ts(0));
    store.put_embedding("parent:0", "Parent", "chunk 0", &[1.0, 0.0, 0.0, 0.0], ts(0));
    store.put_embedding("parent:1", "Parent", "chunk 1", &[0.0, 1.0, 0.0, 0.0], ts(0));
    let embedder = MockEmbedder::new(DIM);
    query_fixtures(&embedder);
    let dir = tempfile::tempdir().unwrap();
    let service = initialize(&store, &embedder, dir.path()).await;

    let hits = service.search("q-a", 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].key, "parent");
    assert!((hits[0].score - 1.0).abs() < 1e-5);

    // Deleting the parent note orphans both chunks.
    store.delete_note("parent");
    service.force_sync().await.unwrap();
    assert_eq!(service.status().await.unwrap().known_embedding_count, 0);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn search_after_shutdown_fails_cleanly() {
    let store = MemRowStore::new();
    seed_basis(&store);
    let embedder = MockEmbedder::new(DIM);
    query_fixtures(&embedder);
    let dir = tempfile::tempdir().unwrap();
    let service = initialize(&store, &embedder, dir.path()).await;

    let status = service.status().await.unwrap();
    assert!(!status.is_processing);
    service.shutdown().await.unwrap();
    // The handle is consumed by shutdown; nothing left to misuse.
}
