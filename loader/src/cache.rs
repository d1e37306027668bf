//! Single-flight module load cache.
//!
//! One pending episode per module id: every concurrent caller shares the
//! same future, and retries happen *behind* that future, so a caller that
//! joined during attempt 1 benefits from attempt 2 without calling `load`
//! again. Success is cached permanently; a terminally failed episode leaves
//! the entry absent so the next `load` starts over with a fresh attempt
//! budget.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::sync::{Mutex, oneshot};

use plutus_types::{LoadError, ModuleId};

/// Attempts per load episode before the failure is surfaced.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

type LoaderFn<T> = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;

/// An opaque deferred module: an id plus the zero-argument loader that
/// produces it. The cache never inspects `T`.
pub struct ModuleRef<T> {
    id: ModuleId,
    loader: LoaderFn<T>,
}

impl<T> Clone for ModuleRef<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            loader: Arc::clone(&self.loader),
        }
    }
}

impl<T> fmt::Debug for ModuleRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRef").field("id", &self.id).finish()
    }
}

impl<T> ModuleRef<T> {
    pub fn new<F, Fut>(id: impl Into<ModuleId>, loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            id: id.into(),
            loader: Arc::new(move || loader().boxed()),
        }
    }

    #[must_use]
    pub fn id(&self) -> &ModuleId {
        &self.id
    }
}

type SharedLoad<T> = Shared<BoxFuture<'static, Result<Arc<T>, LoadError>>>;

enum Entry<T> {
    Pending { epoch: u64, shared: SharedLoad<T> },
    Resolved(Arc<T>),
}

struct CacheInner<T> {
    entries: Mutex<HashMap<ModuleId, Entry<T>>>,
    max_attempts: u32,
    next_epoch: AtomicU64,
}

/// Process-wide module load cache. Cheap to clone; clones share state.
pub struct ModuleCache<T> {
    inner: Arc<CacheInner<T>>,
}

impl<T> Clone for ModuleCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for ModuleCache<T>
where
    T: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ModuleCache<T>
where
    T: Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_attempts(DEFAULT_MAX_ATTEMPTS)
    }

    /// `max_attempts` below 1 is treated as 1.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(HashMap::new()),
                max_attempts: max_attempts.max(1),
                next_epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Load `module`, joining the in-flight episode if one exists.
    ///
    /// A resolved module is returned immediately, forever. All callers that
    /// share one episode observe the same outcome.
    pub async fn load(&self, module: &ModuleRef<T>) -> Result<Arc<T>, LoadError> {
        let shared = {
            let mut entries = self.inner.entries.lock().await;
            match entries.get(module.id()) {
                Some(Entry::Resolved(loaded)) => return Ok(Arc::clone(loaded)),
                Some(Entry::Pending { shared, .. }) => shared.clone(),
                None => self.start_episode(&mut entries, module),
            }
        };
        shared.await
    }

    /// Detach the pending episode for `id`, if any. The episode keeps running
    /// for waiters that already joined, but can no longer touch the cache;
    /// the next `load` starts a fresh episode. Resolved modules are kept.
    pub async fn invalidate(&self, id: &ModuleId) -> bool {
        let mut entries = self.inner.entries.lock().await;
        if matches!(entries.get(id), Some(Entry::Pending { .. })) {
            entries.remove(id);
            tracing::debug!(module = %id, "detached pending load episode");
            true
        } else {
            false
        }
    }

    /// Peek at an already-resolved module without triggering a load.
    pub async fn resolved(&self, id: &ModuleId) -> Option<Arc<T>> {
        let entries = self.inner.entries.lock().await;
        match entries.get(id) {
            Some(Entry::Resolved(loaded)) => Some(Arc::clone(loaded)),
            _ => None,
        }
    }

    fn start_episode(
        &self,
        entries: &mut HashMap<ModuleId, Entry<T>>,
        module: &ModuleRef<T>,
    ) -> SharedLoad<T> {
        let epoch = self.inner.next_epoch.fetch_add(1, Ordering::Relaxed);
        let (done_tx, done_rx) = oneshot::channel();
        let shared: SharedLoad<T> = async move {
            // A dropped sender means the episode was torn down with the
            // runtime; report "no answer".
            done_rx.await.unwrap_or(Err(LoadError::Cancelled))
        }
        .boxed()
        .shared();

        entries.insert(
            module.id().clone(),
            Entry::Pending {
                epoch,
                shared: shared.clone(),
            },
        );
        tokio::spawn(drive_episode(
            Arc::clone(&self.inner),
            module.clone(),
            epoch,
            done_tx,
        ));
        shared
    }
}

/// Runs one load episode: up to `max_attempts` loader invocations with
/// doubling backoff, then commits the outcome to the cache map before any
/// waiter observes it.
async fn drive_episode<T>(
    inner: Arc<CacheInner<T>>,
    module: ModuleRef<T>,
    epoch: u64,
    done_tx: oneshot::Sender<Result<Arc<T>, LoadError>>,
) where
    T: Send + Sync + 'static,
{
    let mut attempts: u32 = 0;
    let result = loop {
        match (module.loader)().await {
            Ok(loaded) => break Ok(Arc::new(loaded)),
            Err(error) => {
                attempts += 1;
                if attempts >= inner.max_attempts {
                    tracing::warn!(
                        module = %module.id,
                        attempts,
                        error = %error,
                        "module load episode exhausted"
                    );
                    break Err(LoadError::failed(module.id.clone(), attempts, error.to_string()));
                }
                let delay = attempt_delay(attempts);
                tracing::debug!(
                    module = %module.id,
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    "module load failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    };

    {
        let mut entries = inner.entries.lock().await;
        let still_current = matches!(
            entries.get(&module.id),
            Some(Entry::Pending { epoch: current, .. }) if *current == epoch
        );
        if still_current {
            match &result {
                Ok(loaded) => {
                    entries.insert(module.id.clone(), Entry::Resolved(Arc::clone(loaded)));
                }
                Err(_) => {
                    // Absent entry = next load starts a fresh episode with a
                    // reset attempt budget.
                    entries.remove(&module.id);
                }
            }
        }
    }
    let _ = done_tx.send(result);
}

/// Delay before retrying after the `attempts`-th failure: `2^attempts` s.
fn attempt_delay(attempts: u32) -> Duration {
    let factor = 1u64.checked_shl(attempts).unwrap_or(u64::MAX);
    Duration::from_millis(1_000u64.saturating_mul(factor))
}
