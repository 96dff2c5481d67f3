use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::sync::OwnedMutexGuard;
use tokio::sync::RwLock;
use tracing::info;
use tracing::warn;

use crate::error::CatalogError;
use crate::ingest::Ingestor;
use crate::query::CatalogState;

/// Holds the one current `{snapshot, index}` pair and runs refreshes
/// against it.
///
/// Reads only ever clone the current `Arc`; the write lock is held for the
/// pointer swap alone, so a query never blocks on a refresh it did not
/// initiate. At most one refresh runs at a time; callers that arrive while
/// one is in flight share its result instead of starting another.
#[derive(Clone)]
pub struct CatalogCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    ingestor: Ingestor,
    current: RwLock<Option<Arc<CatalogState>>>,
    refresh_lock: Arc<Mutex<()>>,
    next_version: AtomicU64,
}

impl CatalogCache {
    pub fn new(ingestor: Ingestor) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                ingestor,
                current: RwLock::new(None),
                refresh_lock: Arc::new(Mutex::new(())),
                next_version: AtomicU64::new(0),
            }),
        }
    }

    /// The current state, however stale. `None` until a refresh succeeds.
    pub async fn current(&self) -> Option<Arc<CatalogState>> {
        self.inner.current.read().await.clone()
    }

    /// The current state, or `Unavailable` when no snapshot was ever built.
    pub async fn state(&self) -> Result<Arc<CatalogState>, CatalogError> {
        self.current().await.ok_or(CatalogError::Unavailable)
    }

    /// Run a refresh, or join the one already in flight, and return the
    /// freshest installed state.
    pub async fn refresh_now(&self) -> Result<Arc<CatalogState>, CatalogError> {
        let observed = self.current_version().await;
        let guard = self.inner.refresh_lock.clone().lock_owned().await;
        if self.current_version().await > observed {
            // A refresh finished while we waited for the lock; its result
            // is ours.
            drop(guard);
            return self.state().await;
        }
        self.run_refresh(guard).await
    }

    /// Kick off a background refresh when the snapshot is absent or older
    /// than `max_age`. Returns whether a refresh was started; triggers
    /// that find one already running coalesce into it.
    pub async fn refresh_if_stale(&self, max_age: Duration) -> bool {
        if let Some(state) = self.current().await {
            let stale = match state.snapshot.age(Utc::now()).to_std() {
                Ok(age) => age >= max_age,
                // Built "in the future" under clock skew; treat as fresh.
                Err(_) => false,
            };
            if !stale {
                return false;
            }
        }
        let Ok(guard) = self.inner.refresh_lock.clone().try_lock_owned() else {
            return false;
        };
        let cache = self.clone();
        tokio::spawn(async move {
            if let Err(err) = cache.run_refresh(guard).await {
                warn!("background catalog refresh failed: {err}");
            }
        });
        true
    }

    async fn run_refresh(
        &self,
        guard: OwnedMutexGuard<()>,
    ) -> Result<Arc<CatalogState>, CatalogError> {
        let _guard = guard;
        let version = self.inner.next_version.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = self.inner.ingestor.refresh(version).await?;
        let state = Arc::new(CatalogState::build(snapshot));
        if self.install(state).await {
            info!(version, "installed catalog snapshot");
        }
        self.state().await
    }

    /// Install only a strictly newer snapshot; a slow refresh that was
    /// superseded must not clobber the fresher result.
    async fn install(&self, state: Arc<CatalogState>) -> bool {
        let mut guard = self.inner.current.write().await;
        match guard.as_ref() {
            Some(existing) if existing.snapshot.version >= state.snapshot.version => false,
            _ => {
                *guard = Some(state);
                true
            }
        }
    }

    async fn current_version(&self) -> u64 {
        self.inner
            .current
            .read()
            .await
            .as_ref()
            .map(|state| state.snapshot.version)
            .unwrap_or(0)
    }
}
