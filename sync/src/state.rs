use chrono::{DateTime, Utc};
use errors::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use st_core::traits::StorageBackend;
use st_core::types::{PendingOperation, StageRecord};
use std::sync::Arc;
use tracing::warn;

const STATE_KEY: &str = "stagetrack/state";
const QUEUE_KEY: &str = "stagetrack/queue";

/// The engine's persisted collections: the canonical record list plus sync
/// bookkeeping. The offline queue is stored under its own key so queue
/// churn does not rewrite the record blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub records: Vec<StageRecord>,
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_syncs: u64
}

/// Serializes the engine's collections through the blob-store collaborator.
///
/// A blob that fails to deserialize is treated as absent: local-integrity
/// corruption must degrade to an empty state and force a full resync, not
/// wedge the engine.
pub struct StateStore<S: StorageBackend> {
    storage: Arc<S>
}

impl<S: StorageBackend> StateStore<S>
where
    S::Error: std::error::Error + Send + Sync + 'static
{
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    pub async fn load_state(&self) -> SyncResult<SyncState> {
        match self.read_blob(STATE_KEY).await? {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(state) => Ok(state),
                Err(e) => {
                    warn!(error = %e, "Persisted state corrupted, starting empty");
                    metrics::counter!("state.corrupt_blobs").increment(1);
                    Ok(SyncState::default())
                }
            },
            None => Ok(SyncState::default())
        }
    }

    pub async fn save_state(&self, state: &SyncState) -> SyncResult<()> {
        let bytes = serde_json::to_vec(state)?;
        self.write_blob(STATE_KEY, &bytes).await
    }

    pub async fn load_queue(&self) -> SyncResult<Vec<PendingOperation>> {
        match self.read_blob(QUEUE_KEY).await? {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(ops) => Ok(ops),
                Err(e) => {
                    warn!(error = %e, "Persisted queue corrupted, starting empty");
                    metrics::counter!("state.corrupt_blobs").increment(1);
                    Ok(Vec::new())
                }
            },
            None => Ok(Vec::new())
        }
    }

    pub async fn save_queue(&self, ops: &[PendingOperation]) -> SyncResult<()> {
        let bytes = serde_json::to_vec(ops)?;
        self.write_blob(QUEUE_KEY, &bytes).await
    }

    async fn read_blob(&self, key: &str) -> SyncResult<Option<Vec<u8>>> {
        self.storage
            .retrieve(key)
            .await
            .map_err(|e| SyncError::Storage {
                reason: e.to_string()
            })
    }

    async fn write_blob(&self, key: &str, bytes: &[u8]) -> SyncResult<()> {
        self.storage
            .store(key, bytes)
            .await
            .map_err(|e| SyncError::Storage {
                reason: e.to_string()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use st_core::types::{OperationKind, StageStatus};
    use storage::MemoryStore;

    #[tokio::test]
    async fn test_load_missing_is_default() {
        let store = StateStore::new(Arc::new(MemoryStore::new()));
        assert_eq!(store.load_state().await.unwrap(), SyncState::default());
        assert!(store.load_queue().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_state_roundtrip() {
        let store = StateStore::new(Arc::new(MemoryStore::new()));
        let mut state = SyncState::default();
        state.records.push(StageRecord::new_local("SWE Intern", "Acme"));
        state.total_syncs = 3;

        store.save_state(&state).await.unwrap();
        let loaded = store.load_state().await.unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn test_queue_roundtrip() {
        let store = StateStore::new(Arc::new(MemoryStore::new()));
        let ops = vec![PendingOperation::new(OperationKind::UpdateStatus {
            id: "r1".into(),
            status: StageStatus::Applied
        })];
        store.save_queue(&ops).await.unwrap();
        assert_eq!(store.load_queue().await.unwrap(), ops);
    }

    #[tokio::test]
    async fn test_corrupt_blob_treated_as_empty() {
        let backend = Arc::new(MemoryStore::new());
        backend.store(STATE_KEY, b"{not json").await.unwrap();
        backend.store(QUEUE_KEY, b"also broken").await.unwrap();

        let store = StateStore::new(backend);
        assert_eq!(store.load_state().await.unwrap(), SyncState::default());
        assert!(store.load_queue().await.unwrap().is_empty());
    }
}
