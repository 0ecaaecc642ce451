use crate::service::StageService;
use errors::{SyncError, SyncResult};
use st_core::traits::StorageBackend;
use st_core::types::Snapshot;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

/// Periodic refresh collaborator. Sits outside the engine core: it only
/// calls the service's unforced sync on an interval, so the snapshot cache
/// still owns all staleness decisions.
pub struct RefreshScheduler<S: StorageBackend> {
    scheduler: JobScheduler,
    service: Arc<StageService<S>>,
    last_snapshot: Arc<RwLock<Option<Arc<Snapshot>>>>
}

impl<S> RefreshScheduler<S>
where
    S: StorageBackend + Send + Sync + 'static,
    S::Error: std::error::Error + Send + Sync + 'static
{
    pub async fn new(
        service: Arc<StageService<S>>,
        interval_secs: u64
    ) -> SyncResult<Self> {
        let scheduler = JobScheduler::new().await.map_err(|e| SyncError::Scheduler {
            reason: format!("init failed: {e}")
        })?;

        let last_snapshot = Arc::new(RwLock::new(None));
        let minutes = (interval_secs / 60).max(1);
        let cron_expression = format!("0 */{minutes} * * * *");

        let service_clone = service.clone();
        let snapshot_clone = last_snapshot.clone();

        let job = Job::new_async(cron_expression.as_str(), move |_uuid, _lock| {
            let service = service_clone.clone();
            let slot = snapshot_clone.clone();
            Box::pin(async move {
                info!("Starting scheduled refresh");
                match service.sync(false).await {
                    Ok(snapshot) => {
                        info!(
                            records = snapshot.records.len(),
                            stale = snapshot.stale,
                            "Scheduled refresh completed"
                        );
                        let mut guard = slot.write().await;
                        *guard = Some(snapshot);
                    }
                    Err(e) => {
                        error!(error = %e, "Scheduled refresh failed");
                    }
                }
            })
        })
        .map_err(|e| SyncError::Scheduler {
            reason: format!("job creation failed: {e}")
        })?;

        scheduler.add(job).await.map_err(|e| SyncError::Scheduler {
            reason: format!("job registration failed: {e}")
        })?;

        Ok(Self {
            scheduler,
            service,
            last_snapshot
        })
    }

    pub async fn start(&self) -> SyncResult<()> {
        self.scheduler.start().await.map_err(|e| SyncError::Scheduler {
            reason: format!("start failed: {e}")
        })?;
        info!("Refresh scheduler started");
        Ok(())
    }

    pub async fn stop(&mut self) -> SyncResult<()> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| SyncError::Scheduler {
                reason: format!("shutdown failed: {e}")
            })?;
        info!("Refresh scheduler stopped");
        Ok(())
    }

    /// Run one refresh immediately, outside the schedule.
    pub async fn run_now(&self) -> SyncResult<Arc<Snapshot>> {
        let snapshot = self.service.sync(true).await?;
        let mut guard = self.last_snapshot.write().await;
        *guard = Some(snapshot.clone());
        Ok(snapshot)
    }

    pub async fn last_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.last_snapshot.read().await.clone()
    }
}
