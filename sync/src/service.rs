use crate::cache::{CacheOptions, Refresher, SchemaCache, SnapshotCache};
use crate::queue::{FlushReport, OfflineQueue};
use crate::reconcile::{reconcile, upsert};
use crate::state::{StateStore, SyncState};
use crate::views::compute_views;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use config::StagetrackConfig;
use errors::{RemoteResult, SyncError, SyncResult};
use remote::client::{NotionStore, RemoteStore};
use remote::mapper::{status_payload, to_record, to_write_payload};
use remote::schema::DatabaseSchema;
use serde_json::Value;
use st_core::traits::{DiagnosticsSink, StorageBackend};
use st_core::types::{
    OperationKind, PendingOperation, Snapshot, SnapshotSource, StageRecord, StageStatus
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// User-visible result of a public write operation. Callers render the
/// queued/offline states instead of catching exceptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub kind: OutcomeKind,
    pub message: String
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Synced,
    Queued,
    Failed
}

impl Outcome {
    fn synced(message: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Synced,
            message: message.into()
        }
    }

    fn queued(message: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Queued,
            message: message.into()
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Failed,
            message: message.into()
        }
    }
}

#[derive(Default)]
struct SyncStats {
    last_sync_at: Option<DateTime<Utc>>,
    total_syncs: u64
}

/// Owns the canonical record collection and every mutation path into it.
/// The snapshot cache holds this behind the `Refresher` trait and decides
/// when `refresh` runs.
struct EngineInner<S: StorageBackend> {
    config: StagetrackConfig,
    remote: Option<Arc<dyn RemoteStore>>,
    store: StateStore<S>,
    records: RwLock<Vec<StageRecord>>,
    queue: OfflineQueue,
    schema_cache: SchemaCache,
    stats: Mutex<SyncStats>,
    diag: Arc<dyn DiagnosticsSink>
}

/// The caller-facing sync engine.
pub struct StageService<S: StorageBackend> {
    inner: Arc<EngineInner<S>>,
    cache: SnapshotCache
}

impl<S> StageService<S>
where
    S: StorageBackend + Send + Sync + 'static,
    S::Error: std::error::Error + Send + Sync + 'static
{
    /// Build the service with an injected remote store (or none for a
    /// fully offline session). Persisted records and queue are loaded
    /// before the first call; corrupt blobs degrade to empty state.
    pub async fn new(
        config: StagetrackConfig,
        storage: Arc<S>,
        remote: Option<Arc<dyn RemoteStore>>,
        diag: Arc<dyn DiagnosticsSink>
    ) -> SyncResult<Self> {
        config.validate()?;

        let store = StateStore::new(storage);
        let state = store.load_state().await?;
        let queue = OfflineQueue::new();
        queue.restore(store.load_queue().await?).await;

        let snapshot_ttl = config.cache.snapshot_ttl();
        let schema_ttl = config.cache.schema_ttl();

        let inner = Arc::new(EngineInner {
            config,
            remote,
            store,
            records: RwLock::new(state.records),
            queue,
            schema_cache: SchemaCache::new(schema_ttl),
            stats: Mutex::new(SyncStats {
                last_sync_at: state.last_sync_at,
                total_syncs: state.total_syncs
            }),
            diag
        });

        let cache = SnapshotCache::new(snapshot_ttl, inner.clone());
        Ok(Self { inner, cache })
    }

    /// Build the service from configuration alone, constructing the HTTP
    /// remote store when credentials are present.
    pub async fn from_config(
        config: StagetrackConfig,
        storage: Arc<S>,
        diag: Arc<dyn DiagnosticsSink>
    ) -> SyncResult<Self> {
        let remote: Option<Arc<dyn RemoteStore>> = if config.remote.has_credentials() {
            let store = NotionStore::new(&config.remote, &config.retry, diag.clone())
                .map_err(SyncError::Config)?;
            Some(Arc::new(store))
        } else {
            None
        };
        Self::new(config, storage, remote, diag).await
    }

    /// Insert or merge a record locally, then push it to the remote side.
    /// A retryable remote failure degrades to "queued", never to a hard
    /// error: the user-perceived write has already succeeded locally.
    pub async fn add_or_update(&self, record: StageRecord) -> Outcome {
        let now = Utc::now();
        let stored = {
            let mut records = self.inner.records.write().await;
            upsert(&mut records, record, &self.inner.config.matching, now)
        };
        if let Err(e) = self.inner.persist_state().await {
            return Outcome::failed(format!("local store failed: {e}"));
        }

        let op = OperationKind::UpsertRecord { record: stored };
        self.inner.push_or_queue(op).await
    }

    /// Transition a record's status. Unknown ids fail fast; remote write
    /// failures degrade to "queued" like `add_or_update`.
    pub async fn set_status(&self, id: &str, status: StageStatus) -> Outcome {
        let now = Utc::now();
        let op = {
            let mut records = self.inner.records.write().await;
            let Some(record) = records.iter_mut().find(|r| r.id == id) else {
                return Outcome::failed(format!("no record with id {id}"));
            };
            record.status = status;
            record.updated_at = now;

            if record.is_local() {
                // Not on the remote side yet; replaying a status patch
                // against a local id can never succeed, so push the whole
                // record instead.
                OperationKind::UpsertRecord {
                    record: record.clone()
                }
            } else {
                OperationKind::UpdateStatus {
                    id: id.to_string(),
                    status
                }
            }
        };
        if let Err(e) = self.inner.persist_state().await {
            return Outcome::failed(format!("local store failed: {e}"));
        }

        self.inner.push_or_queue(op).await
    }

    /// Archive the remote counterpart and drop the local copy. Records are
    /// never hard-deleted remotely.
    pub async fn delete(&self, id: &str) -> Outcome {
        let removed = {
            let mut records = self.inner.records.write().await;
            match records.iter().position(|r| r.id == id) {
                Some(index) => records.remove(index),
                None => return Outcome::failed(format!("no record with id {id}"))
            }
        };
        if let Err(e) = self.inner.persist_state().await {
            return Outcome::failed(format!("local store failed: {e}"));
        }

        if removed.is_local() {
            return Outcome::synced("removed local draft");
        }
        match &self.inner.remote {
            None => Outcome::synced("removed locally; remote not configured"),
            Some(remote) => match remote.archive_record(&removed.id).await {
                Ok(()) => Outcome::synced("archived"),
                Err(e) => Outcome::failed(format!("archive failed: {e}"))
            }
        }
    }

    /// Full synchronization. `force` bypasses the snapshot TTL and also
    /// invalidates the schema cache; an unforced sync reuses a fresh
    /// snapshot when one exists.
    pub async fn sync(&self, force: bool) -> SyncResult<Arc<Snapshot>> {
        if force {
            self.inner.schema_cache.invalidate().await;
        }
        self.cache
            .get(CacheOptions {
                force,
                allow_stale: false
            })
            .await
    }

    /// Read the current snapshot. With `allow_stale` an expired snapshot is
    /// served immediately while one background refresh runs.
    pub async fn snapshot(&self, allow_stale: bool) -> SyncResult<Arc<Snapshot>> {
        self.cache
            .get(CacheOptions {
                force: false,
                allow_stale
            })
            .await
    }

    /// Replay the offline queue. No-op without remote credentials.
    pub async fn flush_queue(&self) -> FlushReport {
        match &self.inner.remote {
            Some(remote) => self.inner.flush_queue_internal(remote.clone()).await,
            None => FlushReport::default()
        }
    }

    /// Always-visible indicator of unsynchronized state.
    pub async fn queue_len(&self) -> usize {
        self.inner.queue.len().await
    }

    pub async fn records(&self) -> Vec<StageRecord> {
        self.inner.records.read().await.clone()
    }
}

impl<S> EngineInner<S>
where
    S: StorageBackend + Send + Sync + 'static,
    S::Error: std::error::Error + Send + Sync + 'static
{
    /// Attempt a write immediately; queue it when the failure is worth
    /// replaying, surface it when it is permanent.
    async fn push_or_queue(&self, op: OperationKind) -> Outcome {
        let Some(remote) = self.remote.clone() else {
            self.queue.enqueue(PendingOperation::new(op)).await;
            let _ = self.persist_queue().await;
            return Outcome::queued("stored locally; remote not configured");
        };

        let schema = match self.schema_cache.get_or_fetch(remote.as_ref()).await {
            Ok(schema) => schema,
            Err(e) if e.should_queue() => {
                self.queue.enqueue(PendingOperation::new(op)).await;
                let _ = self.persist_queue().await;
                return Outcome::queued(format!("schema unavailable, queued for retry: {e}"));
            }
            Err(e) => return Outcome::failed(format!("schema fetch failed: {e}"))
        };

        let attempt = self
            .apply_operation(remote.as_ref(), PendingOperation::new(op.clone()), &schema)
            .await;
        match attempt {
            Ok(()) => Outcome::synced("synced"),
            Err(e) if e.should_queue() => {
                self.queue.enqueue(PendingOperation::new(op)).await;
                let _ = self.persist_queue().await;
                Outcome::queued(format!("queued for retry: {e}"))
            }
            Err(e) => Outcome::failed(format!("remote write failed: {e}"))
        }
    }

    /// Execute one pending operation against the remote store. Successful
    /// creates promote the locally-issued id to the remote-issued one.
    async fn apply_operation(
        &self,
        remote: &dyn RemoteStore,
        op: PendingOperation,
        schema: &DatabaseSchema
    ) -> RemoteResult<()> {
        let fields = &self.config.fields;
        let statuses = &self.config.statuses;

        match op.kind {
            OperationKind::UpsertRecord { record } => {
                let payload = Value::Object(to_write_payload(&record, schema, fields, statuses));
                if record.is_local() {
                    let remote_id = remote.create_record(payload).await?;
                    self.promote_local_id(&record.id, &remote_id).await;
                } else {
                    remote.update_record(&record.id, payload).await?;
                }
            }
            OperationKind::UpdateStatus { id, status } => {
                let payload = status_payload(status, schema, fields, statuses);
                if payload.is_empty() {
                    // Status column missing from the remote schema; nothing
                    // to write.
                    debug!(id = %id, "Status field not in schema, skipping patch");
                    return Ok(());
                }
                remote.update_record(&id, Value::Object(payload)).await?;
            }
        }
        Ok(())
    }

    /// Swap a locally-issued id for the remote-issued one after the first
    /// successful create.
    async fn promote_local_id(&self, local_id: &str, remote_id: &str) {
        {
            let mut records = self.records.write().await;
            if let Some(record) = records.iter_mut().find(|r| r.id == local_id) {
                record.id = remote_id.to_string();
            }
        }
        if let Err(e) = self.persist_state().await {
            warn!(error = %e, "Failed to persist id promotion");
        }
        debug!(local_id = local_id, remote_id = remote_id, "Promoted local record id");
    }

    async fn flush_queue_internal(&self, remote: Arc<dyn RemoteStore>) -> FlushReport {
        if self.queue.is_empty().await {
            return FlushReport::default();
        }
        let schema = match self.schema_cache.get_or_fetch(remote.as_ref()).await {
            Ok(schema) => schema,
            Err(e) => {
                warn!(error = %e, "Schema unavailable, skipping queue flush");
                return FlushReport::default();
            }
        };

        let report = self
            .queue
            .flush(|op| self.apply_operation(remote.as_ref(), op, &schema))
            .await;
        let _ = self.persist_queue().await;
        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            dropped = report.dropped,
            "Queue flush completed"
        );
        report
    }

    async fn persist_state(&self) -> SyncResult<()> {
        let state = {
            let records = self.records.read().await;
            let stats = self.stats.lock().await;
            SyncState {
                records: records.clone(),
                last_sync_at: stats.last_sync_at,
                total_syncs: stats.total_syncs
            }
        };
        self.store.save_state(&state).await
    }

    async fn persist_queue(&self) -> SyncResult<()> {
        let ops = self.queue.operations().await;
        self.store.save_queue(&ops).await
    }

    /// The full refresh cycle: flush the queue, pull the remote collection,
    /// reconcile, persist, derive views.
    async fn run_refresh(&self) -> SyncResult<Snapshot> {
        let started = Instant::now();
        let now = Utc::now();

        if let Some(remote) = self.remote.clone() {
            let flush = self.flush_queue_internal(remote.clone()).await;
            if flush.attempted > 0 {
                debug!(succeeded = flush.succeeded, remaining = flush.remaining, "Pre-sync flush");
            }

            let incoming = self.fetch_remote_collection(remote.as_ref()).await?;
            info!(count = incoming.len(), "Fetched remote records");

            let reconciled = {
                let records = self.records.read().await;
                reconcile(&records, &incoming, &self.config.matching, now)
            };
            *self.records.write().await = reconciled.clone();

            {
                let mut stats = self.stats.lock().await;
                stats.last_sync_at = Some(now);
                stats.total_syncs += 1;
            }
            self.persist_state().await?;

            metrics::counter!("sync.cycles").increment(1);
            metrics::histogram!("sync.duration_ms")
                .record(started.elapsed().as_millis() as f64);
            self.diag.record(
                st_core::traits::Severity::Info,
                "sync",
                "refresh completed",
                serde_json::json!({
                    "records": reconciled.len(),
                    "durationMs": started.elapsed().as_millis() as u64
                })
            );

            Ok(self.build_snapshot(reconciled, now))
        } else {
            // Offline session: the snapshot is generated from the canonical
            // local collection.
            let records = self.records.read().await.clone();
            Ok(self.build_snapshot(records, now))
        }
    }

    async fn fetch_remote_collection(
        &self,
        remote: &dyn RemoteStore
    ) -> SyncResult<Vec<StageRecord>> {
        let mut incoming = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let batch = remote
                .query_page(cursor.as_deref(), self.config.sync.page_size)
                .await?;
            incoming.extend(
                batch
                    .pages
                    .iter()
                    .filter_map(|page| to_record(page, &self.config.fields, &self.config.statuses))
            );
            cursor = batch.next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        Ok(incoming)
    }

    fn build_snapshot(&self, records: Vec<StageRecord>, now: DateTime<Utc>) -> Snapshot {
        let views = compute_views(&records, now, self.config.sync.sla_days);
        Snapshot {
            generated_at: now,
            source: SnapshotSource::Network,
            stale: false,
            records,
            views
        }
    }
}

#[async_trait]
impl<S> Refresher for EngineInner<S>
where
    S: StorageBackend + Send + Sync + 'static,
    S::Error: std::error::Error + Send + Sync + 'static
{
    async fn refresh(&self) -> SyncResult<Snapshot> {
        self.run_refresh().await
    }
}
