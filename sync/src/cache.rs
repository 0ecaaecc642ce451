use async_trait::async_trait;
use errors::{RemoteResult, SyncError, SyncResult};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use remote::client::RemoteStore;
use remote::schema::DatabaseSchema;
use st_core::types::Snapshot;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Produces a fresh snapshot from the network. Implemented by the
/// orchestrating service; the cache only decides when to call it.
#[async_trait]
pub trait Refresher: Send + Sync + 'static {
    async fn refresh(&self) -> SyncResult<Snapshot>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheOptions {
    pub force: bool,
    pub allow_stale: bool
}

type SharedRefresh = Shared<BoxFuture<'static, Result<Arc<Snapshot>, Arc<SyncError>>>>;

struct CachedSnapshot {
    snapshot: Arc<Snapshot>,
    stored_at: Instant
}

struct CacheInner {
    ttl: Duration,
    refresher: Arc<dyn Refresher>,
    slot: RwLock<Option<CachedSnapshot>>,
    inflight: Mutex<Option<SharedRefresh>>
}

/// Time-boxed read-through cache over the reconciled collection.
///
/// States: fresh (served directly), stale-with-background-refresh (served
/// immediately, one refresh kicked off), refreshing (concurrent callers
/// share the in-flight result), empty (caller blocks on a synchronous
/// refresh). The single-flight guard is the shared future stored in
/// `inflight`: the underlying refresh runs once no matter how many callers
/// join, and its result lands in the slot atomically.
#[derive(Clone)]
pub struct SnapshotCache {
    inner: Arc<CacheInner>
}

impl SnapshotCache {
    pub fn new(ttl: Duration, refresher: Arc<dyn Refresher>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                ttl,
                refresher,
                slot: RwLock::new(None),
                inflight: Mutex::new(None)
            })
        }
    }

    pub async fn get(&self, options: CacheOptions) -> SyncResult<Arc<Snapshot>> {
        if !options.force {
            let slot = self.inner.slot.read().await;
            if let Some(cached) = slot.as_ref() {
                if cached.stored_at.elapsed() < self.inner.ttl {
                    metrics::counter!("cache.hits").increment(1);
                    return Ok(Arc::new(cached.snapshot.marked_cached()));
                }
                if options.allow_stale {
                    let stale = Arc::new(cached.snapshot.marked_stale());
                    drop(slot);
                    metrics::counter!("cache.stale_served").increment(1);
                    self.spawn_background_refresh().await;
                    return Ok(stale);
                }
            }
        }

        metrics::counter!("cache.misses").increment(1);
        let refresh = self.join_refresh().await;
        match refresh.await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                let slot = self.inner.slot.read().await;
                if let Some(cached) = slot.as_ref() {
                    warn!(error = %e, "Refresh failed, re-serving cached snapshot as stale");
                    metrics::counter!("cache.stale_served").increment(1);
                    Ok(Arc::new(cached.snapshot.marked_stale()))
                } else {
                    Err(SyncError::Refresh {
                        reason: e.to_string()
                    })
                }
            }
        }
    }

    /// Join the in-flight refresh, starting one if none exists.
    async fn join_refresh(&self) -> SharedRefresh {
        let mut inflight = self.inner.inflight.lock().await;
        if let Some(shared) = inflight.as_ref() {
            debug!("Joining in-flight refresh");
            return shared.clone();
        }

        let inner = self.inner.clone();
        let shared: SharedRefresh = async move {
            let outcome = match inner.refresher.refresh().await {
                Ok(snapshot) => {
                    let snapshot = Arc::new(snapshot);
                    let mut slot = inner.slot.write().await;
                    *slot = Some(CachedSnapshot {
                        snapshot: snapshot.clone(),
                        stored_at: Instant::now()
                    });
                    Ok(snapshot)
                }
                Err(e) => Err(Arc::new(e))
            };
            *inner.inflight.lock().await = None;
            outcome
        }
        .boxed()
        .shared();

        *inflight = Some(shared.clone());
        shared
    }

    /// Drive the shared refresh from a detached task so stale readers
    /// return immediately.
    async fn spawn_background_refresh(&self) {
        let shared = self.join_refresh().await;
        tokio::spawn(async move {
            if let Err(e) = shared.await {
                warn!(error = %e, "Background refresh failed");
            }
        });
    }

    /// Drop the cached snapshot; the next read blocks on a refresh.
    pub async fn invalidate(&self) {
        *self.inner.slot.write().await = None;
    }
}

/// Long-TTL cache for the discovered remote schema. Schema shape changes
/// rarely, so this only refetches after expiry or an explicit invalidation
/// (a forced sync); ordinary record refreshes never touch it.
pub struct SchemaCache {
    ttl: Duration,
    slot: RwLock<Option<(Instant, Arc<DatabaseSchema>)>>
}

impl SchemaCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::new(None)
        }
    }

    pub async fn get_or_fetch(&self, store: &dyn RemoteStore) -> RemoteResult<Arc<DatabaseSchema>> {
        {
            let slot = self.slot.read().await;
            if let Some((stored_at, schema)) = slot.as_ref() {
                if stored_at.elapsed() < self.ttl {
                    return Ok(schema.clone());
                }
            }
        }

        let schema = Arc::new(store.schema().await?);
        *self.slot.write().await = Some((Instant::now(), schema.clone()));
        debug!(properties = schema.properties.len(), "Refreshed schema cache");
        Ok(schema)
    }

    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use st_core::types::{SnapshotSource, SnapshotViews};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct TestRefresher {
        calls: AtomicUsize,
        fail: AtomicBool,
        delay: Duration
    }

    impl TestRefresher {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                delay
            })
        }
    }

    #[async_trait]
    impl Refresher for TestRefresher {
        async fn refresh(&self) -> SyncResult<Snapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(SyncError::Storage {
                    reason: "boom".into()
                });
            }
            Ok(Snapshot {
                generated_at: Utc::now(),
                source: SnapshotSource::Network,
                stale: false,
                records: vec![],
                views: SnapshotViews::default()
            })
        }
    }

    #[tokio::test]
    async fn test_empty_cache_blocks_on_refresh() {
        let refresher = TestRefresher::new(Duration::ZERO);
        let cache = SnapshotCache::new(Duration::from_secs(90), refresher.clone());

        let snap = cache.get(CacheOptions::default()).await.unwrap();
        assert_eq!(snap.source, SnapshotSource::Network);
        assert!(!snap.stale);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fresh_hit_serves_from_cache() {
        let refresher = TestRefresher::new(Duration::ZERO);
        let cache = SnapshotCache::new(Duration::from_secs(90), refresher.clone());

        cache.get(CacheOptions::default()).await.unwrap();
        let snap = cache.get(CacheOptions::default()).await.unwrap();
        assert_eq!(snap.source, SnapshotSource::Cache);
        assert!(!snap.stale);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_while_revalidate_single_flight() {
        let refresher = TestRefresher::new(Duration::from_millis(100));
        let cache = SnapshotCache::new(Duration::ZERO, refresher.clone());

        // Seed the slot.
        cache.get(CacheOptions::default()).await.unwrap();
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);

        // TTL zero: both reads see a stale slot before the second refresh
        // lands, serve the prior snapshot and share one refresh.
        let opts = CacheOptions {
            force: false,
            allow_stale: true
        };
        let first = cache.get(opts).await.unwrap();
        let second = cache.get(opts).await.unwrap();
        assert!(first.stale);
        assert!(second.stale);
        assert_eq!(first.generated_at, second.generated_at);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_blocking_callers_share_refresh() {
        let refresher = TestRefresher::new(Duration::from_millis(50));
        let cache = SnapshotCache::new(Duration::from_secs(90), refresher.clone());

        let (a, b) = tokio::join!(
            cache.get(CacheOptions::default()),
            cache.get(CacheOptions::default())
        );
        assert_eq!(a.unwrap().generated_at, b.unwrap().generated_at);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_reserves_cached_as_stale() {
        let refresher = TestRefresher::new(Duration::ZERO);
        let cache = SnapshotCache::new(Duration::ZERO, refresher.clone());

        cache.get(CacheOptions::default()).await.unwrap();
        refresher.fail.store(true, Ordering::SeqCst);

        let snap = cache.get(CacheOptions::default()).await.unwrap();
        assert!(snap.stale);
        assert_eq!(snap.source, SnapshotSource::Cache);
    }

    #[tokio::test]
    async fn test_failed_refresh_without_cache_propagates() {
        let refresher = TestRefresher::new(Duration::ZERO);
        refresher.fail.store(true, Ordering::SeqCst);
        let cache = SnapshotCache::new(Duration::from_secs(90), refresher.clone());

        let err = cache.get(CacheOptions::default()).await.unwrap_err();
        assert!(matches!(err, SyncError::Refresh { .. }));
    }

    #[tokio::test]
    async fn test_force_bypasses_fresh_cache() {
        let refresher = TestRefresher::new(Duration::ZERO);
        let cache = SnapshotCache::new(Duration::from_secs(90), refresher.clone());

        cache.get(CacheOptions::default()).await.unwrap();
        cache
            .get(CacheOptions {
                force: true,
                allow_stale: false
            })
            .await
            .unwrap();
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
    }
}
