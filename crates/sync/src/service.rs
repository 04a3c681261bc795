//! In-process control surface.
//!
//! [`NoteSeekBuilder`] composes the engine, orchestrator, snapshot store,
//! and contracts — the row store and embedder are injected here, at
//! construction — and `initialize()` boots the index and spawns the
//! orchestrator task. The returned [`NoteSeek`] handle talks to that task
//! over a command channel; searches bypass it and hit the engine
//! directly under its read lock.

use crate::embed::Embedder;
use crate::engine::{EngineConfig, SearchEngine, SearchResult, SparseScorer};
use crate::error::SyncError;
use crate::orchestrator::{Command, IndexStatus, SyncConfig, SyncOrchestrator};
use crate::rows::RowStore;
use noteseek_core::{GraphStore, SnapshotStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Builder for a [`NoteSeek`] service instance.
pub struct NoteSeekBuilder {
    rows: Arc<dyn RowStore>,
    embedder: Arc<dyn Embedder>,
    dimension: usize,
    snapshot_dir: Option<PathBuf>,
    snapshot_store: Option<Arc<dyn SnapshotStore>>,
    sparse: Option<Arc<dyn SparseScorer>>,
    engine_config: EngineConfig,
    sync_config: SyncConfig,
}

impl NoteSeekBuilder {
    /// Start a builder from the two external contracts and the embedding
    /// dimension of the model.
    pub fn new(rows: Arc<dyn RowStore>, embedder: Arc<dyn Embedder>, dimension: usize) -> Self {
        Self {
            rows,
            embedder,
            dimension,
            snapshot_dir: None,
            snapshot_store: None,
            sparse: None,
            engine_config: EngineConfig::default(),
            sync_config: SyncConfig::default(),
        }
    }

    /// Directory for the latest/backup snapshot pair.
    pub fn snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = Some(dir.into());
        self
    }

    /// Custom snapshot backend; overrides [`Self::snapshot_dir`].
    pub fn snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshot_store = Some(store);
        self
    }

    /// Optional sparse lexical scorer for hybrid ranking.
    pub fn sparse_scorer(mut self, scorer: Arc<dyn SparseScorer>) -> Self {
        self.sparse = Some(scorer);
        self
    }

    pub fn engine_config(mut self, config: EngineConfig) -> Self {
        self.engine_config = config;
        self
    }

    pub fn sync_config(mut self, config: SyncConfig) -> Self {
        self.sync_config = config;
        self
    }

    /// Warm up the embedder, boot the index (warm from snapshot or cold
    /// from rows), subscribe, and spawn the orchestrator task.
    pub async fn initialize(self) -> Result<NoteSeek, SyncError> {
        let blobs: Arc<dyn SnapshotStore> = match (self.snapshot_store, self.snapshot_dir) {
            (Some(store), _) => store,
            (None, Some(dir)) => Arc::new(GraphStore::new(dir)?),
            (None, None) => {
                return Err(SyncError::Store(
                    "a snapshot_dir or snapshot_store is required".to_string(),
                ))
            }
        };

        self.embedder.ready().await?;

        let engine = Arc::new(SearchEngine::new(
            self.dimension,
            self.engine_config,
            Arc::clone(&self.embedder),
            self.sparse,
        ));

        let mut orchestrator = SyncOrchestrator::new(
            Arc::clone(&engine),
            self.rows,
            blobs,
            self.embedder,
            self.sync_config,
        );
        orchestrator.boot().await?;

        let (commands, command_rx) = mpsc::channel(32);
        let task = tokio::spawn(orchestrator.run(command_rx));

        tracing::info!("noteseek initialized");
        Ok(NoteSeek {
            engine,
            commands,
            task,
        })
    }
}

/// Handle to a running noteseek instance.
pub struct NoteSeek {
    engine: Arc<SearchEngine>,
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl NoteSeek {
    /// Semantic search over the current index.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>, SyncError> {
        self.engine.search(query, k).await
    }

    /// Run a reconciliation pass now, without debounce.
    pub async fn force_sync(&self) -> Result<(), SyncError> {
        self.roundtrip(Command::Sync).await?
    }

    /// Snapshot the current index to `latest` (with backup rotation).
    pub async fn force_snapshot(&self) -> Result<(), SyncError> {
        self.roundtrip(Command::Snapshot).await?
    }

    /// Discard the index, rebuild from rows, and snapshot.
    pub async fn force_full_rebuild(&self) -> Result<(), SyncError> {
        self.roundtrip(Command::Rebuild).await?
    }

    /// Counters and timestamps describing the index and sync state.
    pub async fn status(&self) -> Result<IndexStatus, SyncError> {
        self.roundtrip(Command::Status).await
    }

    /// Cooperative shutdown: the orchestrator finishes its in-flight
    /// pass, releases its subscriptions, and exits. No final snapshot is
    /// taken — the periodic one is authoritative.
    pub async fn shutdown(self) -> Result<(), SyncError> {
        let (reply, response) = oneshot::channel();
        if self.commands.send(Command::Shutdown(reply)).await.is_ok() {
            let _ = response.await;
        }
        self.task.await.map_err(|_| SyncError::ShuttingDown)?;
        Ok(())
    }

    async fn roundtrip<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> Command,
    ) -> Result<R, SyncError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| SyncError::ShuttingDown)?;
        response.await.map_err(|_| SyncError::ShuttingDown)
    }
}
