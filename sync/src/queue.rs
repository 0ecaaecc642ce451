use errors::RemoteResult;
use serde::{Deserialize, Serialize};
use st_core::types::PendingOperation;
use std::future::Future;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Result of one flush cycle over the offline queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushReport {
    pub attempted: usize,
    pub succeeded: usize,
    /// Failed retryably; kept for the next flush.
    pub failed: usize,
    /// Failed permanently; dropped so they cannot wedge the queue.
    pub dropped: usize,
    pub remaining: usize
}

/// Durable, ordered log of write operations that failed against the remote
/// service. Operations targeting the same (kind, record) collapse into one
/// entry; flush replays in enqueue order.
#[derive(Default)]
pub struct OfflineQueue {
    inner: Mutex<Vec<PendingOperation>>
}

impl OfflineQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a failed write. An equivalent pending operation absorbs the
    /// new one: the payload is replaced with the newer state and the retry
    /// counter increments, so replaying applies the latest intent once.
    pub async fn enqueue(&self, op: PendingOperation) {
        let mut queue = self.inner.lock().await;
        if let Some(index) = queue.iter().position(|existing| existing.collapses_with(&op)) {
            let existing = &mut queue[index];
            existing.kind = op.kind;
            existing.retry_count += 1;
            debug!(
                target_id = %existing.target_id(),
                retry_count = existing.retry_count,
                "Collapsed queued operation"
            );
        } else {
            queue.push(op);
            queue.sort_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at));
        }
        metrics::gauge!("queue.depth").set(queue.len() as f64);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Snapshot of the queued operations, oldest first. Used for
    /// persistence and UI display.
    pub async fn operations(&self) -> Vec<PendingOperation> {
        self.inner.lock().await.clone()
    }

    /// Replace the queue contents from persisted state.
    pub async fn restore(&self, ops: Vec<PendingOperation>) {
        let mut queue = self.inner.lock().await;
        *queue = ops;
        queue.sort_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at));
        metrics::gauge!("queue.depth").set(queue.len() as f64);
    }

    /// Replay every queued operation once through `attempt`.
    ///
    /// The queue is drained under the lock, attempts run with the lock
    /// released, and retryable failures merge back through the collapsing
    /// path. An operation enqueued mid-flush therefore lands in the live
    /// queue and is picked up by a later flush, never lost or double-run.
    pub async fn flush<F, Fut>(&self, mut attempt: F) -> FlushReport
    where
        F: FnMut(PendingOperation) -> Fut,
        Fut: Future<Output = RemoteResult<()>>
    {
        let batch: Vec<PendingOperation> = {
            let mut queue = self.inner.lock().await;
            std::mem::take(&mut *queue)
        };

        let mut report = FlushReport {
            attempted: batch.len(),
            ..FlushReport::default()
        };

        for op in batch {
            match attempt(op.clone()).await {
                Ok(()) => {
                    report.succeeded += 1;
                    debug!(target_id = %op.target_id(), "Queued operation replayed");
                }
                Err(e) if e.should_queue() => {
                    report.failed += 1;
                    warn!(target_id = %op.target_id(), error = %e, "Replay failed, keeping operation");
                    self.readmit(op).await;
                }
                Err(e) => {
                    report.dropped += 1;
                    warn!(target_id = %op.target_id(), error = %e, "Replay failed permanently, dropping operation");
                }
            }
        }

        let queue = self.inner.lock().await;
        report.remaining = queue.len();
        metrics::gauge!("queue.depth").set(queue.len() as f64);
        report
    }

    /// Put a failed operation back. If a newer equivalent arrived mid-flush
    /// it wins the payload; the failed one only bumps the retry counter and
    /// restores the older enqueue time so ordering intent survives.
    async fn readmit(&self, mut op: PendingOperation) {
        let mut queue = self.inner.lock().await;
        if let Some(index) = queue.iter().position(|existing| existing.collapses_with(&op)) {
            let existing = &mut queue[index];
            existing.retry_count = existing.retry_count.max(op.retry_count) + 1;
            if op.enqueued_at < existing.enqueued_at {
                existing.enqueued_at = op.enqueued_at;
            }
        } else {
            op.retry_count += 1;
            queue.push(op);
        }
        queue.sort_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use errors::RemoteError;
    use st_core::types::{OperationKind, StageStatus};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn status_op(id: &str, status: StageStatus) -> PendingOperation {
        PendingOperation::new(OperationKind::UpdateStatus {
            id: id.into(),
            status
        })
    }

    #[tokio::test]
    async fn test_enqueue_collapses_same_target() {
        let queue = OfflineQueue::new();
        queue.enqueue(status_op("r1", StageStatus::Applied)).await;
        queue.enqueue(status_op("r1", StageStatus::Rejected)).await;

        let ops = queue.operations().await;
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].retry_count, 1);
        // Newest payload wins the collapse.
        match &ops[0].kind {
            OperationKind::UpdateStatus { status, .. } => {
                assert_eq!(*status, StageStatus::Rejected);
            }
            other => panic!("unexpected kind {other:?}")
        }
    }

    #[tokio::test]
    async fn test_enqueue_distinct_targets() {
        let queue = OfflineQueue::new();
        queue.enqueue(status_op("r1", StageStatus::Applied)).await;
        queue.enqueue(status_op("r2", StageStatus::Applied)).await;
        assert_eq!(queue.len().await, 2);
    }

    #[tokio::test]
    async fn test_flush_removes_successes() {
        let queue = OfflineQueue::new();
        queue.enqueue(status_op("r1", StageStatus::Applied)).await;
        queue.enqueue(status_op("r2", StageStatus::Applied)).await;

        let report = queue.flush(|_op| async { Ok(()) }).await;
        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.remaining, 0);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_flush_keeps_retryable_failures() {
        let queue = OfflineQueue::new();
        queue.enqueue(status_op("r1", StageStatus::Applied)).await;

        let report = queue
            .flush(|_op| async {
                Err(RemoteError::Status {
                    status: 503,
                    message: String::new()
                })
            })
            .await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.remaining, 1);

        let ops = queue.operations().await;
        assert_eq!(ops[0].retry_count, 1);
    }

    #[tokio::test]
    async fn test_flush_drops_permanent_failures() {
        let queue = OfflineQueue::new();
        queue.enqueue(status_op("gone", StageStatus::Applied)).await;

        let report = queue
            .flush(|_op| async {
                Err(RemoteError::Status {
                    status: 404,
                    message: String::new()
                })
            })
            .await;
        assert_eq!(report.dropped, 1);
        assert_eq!(report.remaining, 0);
    }

    #[tokio::test]
    async fn test_enqueue_mid_flush_not_lost() {
        let queue = Arc::new(OfflineQueue::new());
        queue.enqueue(status_op("r1", StageStatus::Applied)).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let queue_in_flush = queue.clone();
        let calls_in_flush = calls.clone();
        let report = queue
            .flush(move |_op| {
                let queue = queue_in_flush.clone();
                let calls = calls_in_flush.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    // A caller enqueues a different record while the flush
                    // cycle is still running.
                    queue.enqueue(status_op("r2", StageStatus::Applied)).await;
                    Ok(())
                }
            })
            .await;

        assert_eq!(report.attempted, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // The mid-flush enqueue survives for the next cycle.
        assert_eq!(report.remaining, 1);
        let ops = queue.operations().await;
        assert_eq!(ops[0].target_id(), "r2");
    }

    #[tokio::test]
    async fn test_flush_in_enqueue_order() {
        let queue = OfflineQueue::new();
        let mut old = status_op("first", StageStatus::Applied);
        old.enqueued_at -= chrono::Duration::minutes(5);
        queue.enqueue(status_op("second", StageStatus::Applied)).await;
        queue.enqueue(old).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_flush = seen.clone();
        queue
            .flush(move |op| {
                let seen = seen_in_flush.clone();
                async move {
                    seen.lock().await.push(op.target_id().to_string());
                    Ok(())
                }
            })
            .await;

        assert_eq!(*seen.lock().await, vec!["first".to_string(), "second".to_string()]);
    }
}
