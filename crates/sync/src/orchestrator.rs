//! Sync orchestrator: keeps the index reconciled with the row store.
//!
//! A single actor task owns every index mutation. It boots warm from the
//! `latest` snapshot (or cold from the authoritative embedding rows),
//! subscribes to the two reactive queries, debounces their ticks into
//! single-flight reconciliation passes, and maintains the latest+backup
//! snapshot pair — renaming the old `latest` aside before each write and
//! renaming it back if the write fails.
//!
//! No error aborts the actor: reconciliation failures are logged and the
//! next tick (or an explicit `force_sync`) retries.

use crate::embed::{passage_text, Embedder};
use crate::engine::SearchEngine;
use crate::error::SyncError;
use crate::rows::{EmbeddingRow, RowStore, Selector, StoreEvent};
use chrono::{DateTime, Utc};
use noteseek_core::config::{SNAPSHOT_BACKUP, SNAPSHOT_EXT, SNAPSHOT_LATEST};
use noteseek_core::SnapshotStore;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

/// Orchestrator tuning knobs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Quiet period after a subscription tick before reconciling.
    pub debounce: Duration,
    /// Index changes that trigger an early snapshot.
    pub changes_threshold: usize,
    /// Period of the snapshot timer.
    pub snapshot_interval: Duration,
    /// Tombstone ratio above which a periodic snapshot first rebuilds the
    /// index to purge tombstones. Zero disables auto-compaction.
    pub auto_compact_ratio: f32,
    /// Notes embedded per model call.
    pub embed_batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(1),
            changes_threshold: 50,
            snapshot_interval: Duration::from_secs(300),
            auto_compact_ratio: 0.2,
            embed_batch_size: 16,
        }
    }
}

/// Why a snapshot was taken; recorded in logs and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotReason {
    Interval,
    Threshold,
    Manual,
}

impl SnapshotReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotReason::Interval => "interval",
            SnapshotReason::Threshold => "threshold",
            SnapshotReason::Manual => "manual",
        }
    }
}

/// Point-in-time view of the orchestrator and index, for `status()`.
#[derive(Debug, Clone)]
pub struct IndexStatus {
    /// Keys currently mirrored into the index.
    pub known_embedding_count: usize,
    pub node_count: usize,
    pub live_count: usize,
    pub tombstone_count: usize,
    pub pending_change_count: usize,
    pub is_processing: bool,
    pub pending_deltas: bool,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub last_snapshot_at: Option<DateTime<Utc>>,
    pub dimension: usize,
    pub estimated_memory_bytes: usize,
    pub adaptive_retries: u64,
}

/// Control-surface requests served by the actor loop.
pub(crate) enum Command {
    Sync(oneshot::Sender<Result<(), SyncError>>),
    Snapshot(oneshot::Sender<Result<(), SyncError>>),
    Rebuild(oneshot::Sender<Result<(), SyncError>>),
    Status(oneshot::Sender<IndexStatus>),
    Shutdown(oneshot::Sender<()>),
}

pub(crate) struct SyncOrchestrator {
    engine: Arc<SearchEngine>,
    rows: Arc<dyn RowStore>,
    blobs: Arc<dyn SnapshotStore>,
    embedder: Arc<dyn Embedder>,
    config: SyncConfig,

    known_ext: HashSet<String>,
    known_hash: HashMap<String, String>,
    pending_change_count: usize,
    is_processing: bool,
    pending_deltas: bool,
    last_processed_at: Option<DateTime<Utc>>,
    last_snapshot_at: Option<DateTime<Utc>>,

    notes_rx: Option<mpsc::UnboundedReceiver<()>>,
    orphans_rx: Option<mpsc::UnboundedReceiver<()>>,
}

impl SyncOrchestrator {
    pub(crate) fn new(
        engine: Arc<SearchEngine>,
        rows: Arc<dyn RowStore>,
        blobs: Arc<dyn SnapshotStore>,
        embedder: Arc<dyn Embedder>,
        config: SyncConfig,
    ) -> Self {
        Self {
            engine,
            rows,
            blobs,
            embedder,
            config,
            known_ext: HashSet::new(),
            known_hash: HashMap::new(),
            pending_change_count: 0,
            is_processing: false,
            pending_deltas: false,
            last_processed_at: None,
            last_snapshot_at: None,
            notes_rx: None,
            orphans_rx: None,
        }
    }

    /// Warm boot from the `latest` snapshot when possible, otherwise cold
    /// boot from rows; then subscribe to the reactive queries.
    pub(crate) async fn boot(&mut self) -> Result<(), SyncError> {
        let warm = self.try_warm_boot().await?;
        if !warm {
            self.cold_boot().await?;
        }
        self.notes_rx = Some(self.rows.subscribe(Selector::NotesRequiringEmbedding));
        self.orphans_rx = Some(self.rows.subscribe(Selector::OrphanedEmbeddings));
        Ok(())
    }

    async fn try_warm_boot(&mut self) -> Result<bool, SyncError> {
        let Some(index) = self.blobs.load_graph(SNAPSHOT_LATEST) else {
            return Ok(false);
        };
        if index.dimension() != self.engine.dimension() {
            tracing::warn!(
                snapshot_dim = index.dimension(),
                engine_dim = self.engine.dimension(),
                "snapshot dimension mismatch, falling back to cold boot"
            );
            return Ok(false);
        }
        self.engine.install(index);

        // The snapshot restores graph and key maps; rows remain the
        // authority on content, so fingerprints and display metadata are
        // rebuilt from the current embedding rows. Anything that drifted
        // since the snapshot is picked up by the first reconcile pass.
        self.known_ext.clear();
        self.known_hash.clear();
        let rows = self.rows.embedding_rows().await?;
        for row in &rows {
            if self.engine.contains(&row.key) {
                self.known_ext.insert(row.key.clone());
                self.known_hash.insert(row.key.clone(), row.fingerprint());
                self.engine.set_meta(&row.key, row.meta());
            }
        }
        tracing::info!(
            nodes = self.engine.node_count(),
            live = self.engine.live_count(),
            known = self.known_ext.len(),
            "warm boot from snapshot"
        );
        Ok(true)
    }

    /// Rebuild graph and maps from the authoritative embedding rows.
    async fn cold_boot(&mut self) -> Result<(), SyncError> {
        self.engine.clear();
        self.known_ext.clear();
        self.known_hash.clear();
        let rows = self.rows.embedding_rows().await?;
        for row in &rows {
            self.apply_upsert(row);
        }
        tracing::info!(live = self.engine.live_count(), "cold boot from rows");
        Ok(())
    }

    fn apply_upsert(&mut self, row: &EmbeddingRow) -> bool {
        let vec = match row.vector() {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(key = %row.key, error = %e, "rejecting malformed embedding row");
                return false;
            }
        };
        match self.engine.upsert(&row.key, &vec, row.meta()) {
            Ok(()) => {
                self.known_ext.insert(row.key.clone());
                self.known_hash.insert(row.key.clone(), row.fingerprint());
                true
            }
            Err(e) => {
                tracing::warn!(key = %row.key, error = %e, "index rejected embedding row");
                false
            }
        }
    }

    /// The actor loop. Consumes the orchestrator; exits on shutdown.
    pub(crate) async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let mut notes_rx = self.notes_rx.take().expect("boot() must run before run()");
        let mut orphans_rx = self.orphans_rx.take().expect("boot() must run before run()");
        let mut notes_alive = true;
        let mut orphans_alive = true;

        let mut timer = tokio::time::interval(self.config.snapshot_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer.tick().await; // the first tick completes immediately

        loop {
            tokio::select! {
                biased;

                cmd = commands.recv() => match cmd {
                    Some(Command::Sync(reply)) => {
                        let result = self.reconcile_guarded().await;
                        let _ = reply.send(result);
                    }
                    Some(Command::Snapshot(reply)) => {
                        let result = self.snapshot(SnapshotReason::Manual).await;
                        let _ = reply.send(result);
                    }
                    Some(Command::Rebuild(reply)) => {
                        let result = self.full_rebuild().await;
                        let _ = reply.send(result);
                    }
                    Some(Command::Status(reply)) => {
                        let _ = reply.send(self.status());
                    }
                    Some(Command::Shutdown(reply)) => {
                        tracing::info!("sync orchestrator shutting down");
                        let _ = reply.send(());
                        break;
                    }
                    None => break,
                },

                tick = notes_rx.recv(), if notes_alive => match tick {
                    Some(()) => self.debounced_reconcile(&mut notes_rx, &mut orphans_rx).await,
                    None => {
                        tracing::warn!("notes subscription closed; force_sync still reconciles");
                        notes_alive = false;
                    }
                },

                tick = orphans_rx.recv(), if orphans_alive => match tick {
                    Some(()) => self.debounced_reconcile(&mut notes_rx, &mut orphans_rx).await,
                    None => {
                        tracing::warn!("orphan subscription closed; force_sync still reconciles");
                        orphans_alive = false;
                    }
                },

                _ = timer.tick() => {
                    if let Err(e) = self.snapshot(SnapshotReason::Interval).await {
                        tracing::error!(error = %e, "periodic snapshot failed");
                    }
                }
            }
        }
        // Subscriptions drop here, after the in-flight pass finished.
    }

    /// Debounce a burst of ticks into one pass; ticks landing mid-pass
    /// coalesce into exactly one follow-up pass.
    async fn debounced_reconcile(
        &mut self,
        notes_rx: &mut mpsc::UnboundedReceiver<()>,
        orphans_rx: &mut mpsc::UnboundedReceiver<()>,
    ) {
        loop {
            tokio::time::sleep(self.config.debounce).await;
            while notes_rx.try_recv().is_ok() {}
            while orphans_rx.try_recv().is_ok() {}

            if let Err(e) = self.reconcile_guarded().await {
                tracing::warn!(error = %e, "delta reconciliation failed; retrying on next tick");
            }

            let mut more = false;
            while notes_rx.try_recv().is_ok() {
                more = true;
            }
            while orphans_rx.try_recv().is_ok() {
                more = true;
            }
            if !more {
                break;
            }
            self.pending_deltas = true;
        }
        self.pending_deltas = false;
    }

    async fn reconcile_guarded(&mut self) -> Result<(), SyncError> {
        self.is_processing = true;
        let result = self.reconcile().await;
        self.is_processing = false;
        result
    }

    /// One delta pass: embed pending notes, upsert changed rows, remove
    /// orphans. Upserts run before removals so a replaced key is never
    /// briefly absent.
    async fn reconcile(&mut self) -> Result<(), SyncError> {
        self.embed_pending().await?;

        let rows = self.rows.embedding_rows().await?;
        let mut upserted = 0usize;
        for row in &rows {
            let fingerprint = row.fingerprint();
            let unchanged = self.known_ext.contains(&row.key)
                && self.known_hash.get(&row.key) == Some(&fingerprint);
            if unchanged {
                continue;
            }
            if self.apply_upsert(row) {
                self.pending_change_count += 1;
                upserted += 1;
            }
        }

        let orphans = self.rows.orphaned_embeddings().await?;
        let mut removed = 0usize;
        for key in orphans {
            if !self.known_ext.remove(&key) {
                continue;
            }
            self.known_hash.remove(&key);
            self.engine.remove(&key);
            self.pending_change_count += 1;
            removed += 1;
            if let Err(e) = self
                .rows
                .commit(StoreEvent::EmbeddingRemoved { key: key.clone() })
                .await
            {
                tracing::warn!(key = %key, error = %e, "failed to commit embedding removal");
            }
        }

        self.last_processed_at = Some(Utc::now());
        if upserted > 0 || removed > 0 {
            tracing::info!(upserted, removed, pending = self.pending_change_count, "delta pass applied");
        }

        if self.pending_change_count >= self.config.changes_threshold {
            self.snapshot(SnapshotReason::Threshold).await?;
        }
        Ok(())
    }

    /// Embed notes the reactive query reports as stale and commit the
    /// resulting embedding rows. A model failure skips only that batch;
    /// fingerprints do not advance, so the next tick retries.
    async fn embed_pending(&mut self) -> Result<(), SyncError> {
        let notes = self.rows.notes_requiring_embedding().await?;
        if notes.is_empty() {
            return Ok(());
        }
        tracing::debug!(count = notes.len(), "embedding pending notes");

        for batch in notes.chunks(self.config.embed_batch_size.max(1)) {
            let texts: Vec<String> = batch
                .iter()
                .map(|n| passage_text(&n.title, &n.content))
                .collect();
            let embedded = match self.embedder.embed(&texts).await {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!(batch = batch.len(), error = %e, "embedding batch failed; will retry next tick");
                    continue;
                }
            };
            let vectors = match embedded.vectors(batch.len()) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "embedding batch malformed; will retry next tick");
                    continue;
                }
            };
            for (note, vec) in batch.iter().zip(vectors) {
                let event = StoreEvent::EmbeddingUpserted {
                    key: note.id.clone(),
                    title: note.title.clone(),
                    content: note.content.clone(),
                    vec_bytes: EmbeddingRow::encode_vector(vec),
                    vec_dim: vec.len(),
                    model: self.embedder.model_id().to_string(),
                    ts: note.updated_at,
                };
                if let Err(e) = self.rows.commit(event).await {
                    tracing::warn!(key = %note.id, error = %e, "failed to commit embedding row");
                }
            }
        }
        Ok(())
    }

    /// Latest+backup snapshot protocol.
    ///
    /// `latest` is renamed aside to `backup` before the write so a failed
    /// persist can roll back; on success everything but the canonical
    /// pair is pruned. The change counter survives a failure so the next
    /// threshold crossing retries.
    async fn snapshot(&mut self, reason: SnapshotReason) -> Result<(), SyncError> {
        if self.engine.live_count() == 0 {
            tracing::debug!(reason = reason.as_str(), "skipping snapshot of empty index");
            return Ok(());
        }

        if reason == SnapshotReason::Interval && self.config.auto_compact_ratio > 0.0 {
            let ratio = self.engine.tombstone_ratio();
            if ratio > self.config.auto_compact_ratio {
                tracing::info!(ratio = ratio as f64, "tombstone ratio over threshold, compacting before snapshot");
                self.rebuild_from_rows("compaction").await?;
            }
        }

        self.blobs.rename_file(SNAPSHOT_LATEST, SNAPSHOT_BACKUP)?;
        let persisted = self
            .engine
            .with_index(|index| self.blobs.persist_graph(index, SNAPSHOT_LATEST));

        match persisted {
            Ok(report) => {
                self.pending_change_count = 0;
                self.last_snapshot_at = Some(Utc::now());
                if let Err(e) = self.blobs.gc_old_snapshots(0) {
                    tracing::warn!(error = %e, "snapshot GC failed");
                }
                let event = StoreEvent::SnapshotCreated {
                    file_name: format!("{SNAPSHOT_LATEST}.{SNAPSHOT_EXT}"),
                    checksum: report.checksum.clone(),
                    size: report.size_bytes,
                    node_count: report.node_count,
                    model: self.embedder.model_id().to_string(),
                    ts: Utc::now(),
                };
                if let Err(e) = self.rows.commit(event).await {
                    tracing::warn!(error = %e, "failed to commit snapshot event");
                }
                tracing::info!(
                    reason = reason.as_str(),
                    nodes = report.node_count,
                    checksum = %report.checksum,
                    "snapshot complete"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(reason = reason.as_str(), error = %e, "snapshot persist failed, rolling back");
                if let Err(rollback) = self.blobs.rename_file(SNAPSHOT_BACKUP, SNAPSHOT_LATEST) {
                    tracing::error!(error = %rollback, "snapshot rollback failed");
                }
                Err(e.into())
            }
        }
    }

    /// Drop all state, cold boot from rows, and snapshot. The control
    /// surface rethrows any failure to the caller.
    async fn full_rebuild(&mut self) -> Result<(), SyncError> {
        self.rebuild_from_rows("manual").await?;
        self.snapshot(SnapshotReason::Manual).await
    }

    async fn rebuild_from_rows(&mut self, reason: &str) -> Result<(), SyncError> {
        tracing::info!(reason, "full index rebuild");
        self.pending_change_count = 0;
        self.cold_boot().await?;
        let event = StoreEvent::IndexCleared {
            ts: Utc::now(),
            reason: reason.to_string(),
        };
        if let Err(e) = self.rows.commit(event).await {
            tracing::warn!(error = %e, "failed to commit index-cleared event");
        }
        Ok(())
    }

    fn status(&self) -> IndexStatus {
        IndexStatus {
            known_embedding_count: self.known_ext.len(),
            node_count: self.engine.node_count(),
            live_count: self.engine.live_count(),
            tombstone_count: self.engine.tombstone_count(),
            pending_change_count: self.pending_change_count,
            is_processing: self.is_processing,
            pending_deltas: self.pending_deltas,
            last_processed_at: self.last_processed_at,
            last_snapshot_at: self.last_snapshot_at,
            dimension: self.engine.dimension(),
            estimated_memory_bytes: self.engine.estimate_memory_bytes(),
            adaptive_retries: self.engine.adaptive_retries(),
        }
    }
}
