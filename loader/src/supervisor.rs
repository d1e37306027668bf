//! Recovery supervisor: the crash firewall around one deferred module mount.
//!
//! Load and first-render failures are converted into a tagged state instead
//! of propagating up the UI tree. From `Failed`, a user-initiated retry bumps
//! the failure generation, discards the cached episode and mounts again from
//! a clean slate.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;

use plutus_types::{LoadError, ModuleId};

use crate::cache::{ModuleCache, ModuleRef};

/// How long the fallback stays suppressed after a mount starts, so fast
/// loads do not flicker.
pub const DEFAULT_FALLBACK_GRACE: Duration = Duration::from_millis(200);

/// Why a mount episode ended in `Failed`.
#[derive(Debug, Clone, Error)]
pub enum MountError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("module {module} failed during first render: {reason}")]
    Render { module: ModuleId, reason: Arc<str> },
}

/// Observable state of one supervised subtree.
#[derive(Debug, Clone)]
pub enum SupervisorState<V> {
    /// Mount in progress. The fallback view is suppressed until the grace
    /// window elapses.
    Loading { fallback_visible: bool },
    /// The subtree rendered; terminal for the episode.
    Ready(V),
    /// The episode failed terminally; a user retry starts a new one.
    Failed(MountError),
}

impl<V> SupervisorState<V> {
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, SupervisorState::Loading { .. })
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, SupervisorState::Ready(_))
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, SupervisorState::Failed(_))
    }
}

type RenderFn<T, V> = Arc<dyn Fn(Arc<T>) -> anyhow::Result<V> + Send + Sync>;

struct SupervisorInner<T, V> {
    cache: ModuleCache<T>,
    module: ModuleRef<T>,
    render: RenderFn<T, V>,
    state_tx: watch::Sender<SupervisorState<V>>,
    generation: AtomicU64,
    grace: Duration,
}

/// Supervises one point in the UI tree that depends on one deferred module.
///
/// Cheap to clone; clones share state. Owned by the subtree instance and
/// dropped when it unmounts.
pub struct Supervisor<T, V> {
    inner: Arc<SupervisorInner<T, V>>,
}

impl<T, V> Clone for Supervisor<T, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, V> Supervisor<T, V>
where
    T: Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new<F>(cache: ModuleCache<T>, module: ModuleRef<T>, render: F) -> Self
    where
        F: Fn(Arc<T>) -> anyhow::Result<V> + Send + Sync + 'static,
    {
        Self::with_fallback_grace(cache, module, render, DEFAULT_FALLBACK_GRACE)
    }

    pub fn with_fallback_grace<F>(
        cache: ModuleCache<T>,
        module: ModuleRef<T>,
        render: F,
        grace: Duration,
    ) -> Self
    where
        F: Fn(Arc<T>) -> anyhow::Result<V> + Send + Sync + 'static,
    {
        let (state_tx, _state_rx) = watch::channel(SupervisorState::Loading {
            fallback_visible: false,
        });
        Self {
            inner: Arc::new(SupervisorInner {
                cache,
                module,
                render: Arc::new(render),
                state_tx,
                generation: AtomicU64::new(0),
                grace,
            }),
        }
    }

    /// Subscribe to state transitions. UI code renders children on `Ready`,
    /// the fallback while `Loading { fallback_visible: true }` and the error
    /// view with a retry action on `Failed`.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SupervisorState<V>> {
        self.inner.state_tx.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> SupervisorState<V> {
        self.inner.state_tx.borrow().clone()
    }

    /// Number of user-initiated retries so far.
    #[must_use]
    pub fn failure_generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Relaxed)
    }

    /// Run the initial mount episode to completion (`Ready` or `Failed`).
    pub async fn mount(&self) {
        let generation = self.inner.generation.load(Ordering::Relaxed);
        self.run_episode(generation).await;
    }

    /// User-initiated retry. Only valid from `Failed`; returns false (and
    /// does nothing) otherwise. Increments the failure generation, discards
    /// any cached episode for the module, and mounts again from a clean
    /// slate — a fresh load episode even if a previous one is still inside
    /// its own backoff.
    pub async fn retry(&self) -> bool {
        if !self.state().is_failed() {
            return false;
        }
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            module = %self.inner.module.id(),
            generation,
            "user retry, remounting subtree"
        );
        self.inner.cache.invalidate(self.inner.module.id()).await;
        self.run_episode(generation).await;
        true
    }

    async fn run_episode(&self, generation: u64) {
        self.publish(
            generation,
            SupervisorState::Loading {
                fallback_visible: false,
            },
        );

        // Spawned so a panicking first render is contained here instead of
        // unwinding through the caller.
        let mut work = {
            let cache = self.inner.cache.clone();
            let module = self.inner.module.clone();
            let render = Arc::clone(&self.inner.render);
            tokio::spawn(async move {
                let loaded = cache.load(&module).await.map_err(MountError::from)?;
                (render)(loaded).map_err(|error| MountError::Render {
                    module: module.id().clone(),
                    reason: Arc::from(error.to_string().as_str()),
                })
            })
        };

        let outcome = tokio::select! {
            joined = &mut work => joined,
            () = tokio::time::sleep(self.inner.grace) => {
                self.publish(
                    generation,
                    SupervisorState::Loading {
                        fallback_visible: true,
                    },
                );
                (&mut work).await
            }
        };

        let state = match outcome {
            Ok(Ok(view)) => SupervisorState::Ready(view),
            Ok(Err(error)) => {
                tracing::warn!(
                    module = %self.inner.module.id(),
                    error = %error,
                    "module mount failed"
                );
                SupervisorState::Failed(error)
            }
            Err(join_error) => {
                let reason = if join_error.is_panic() {
                    "first render panicked"
                } else {
                    "mount task was aborted"
                };
                tracing::warn!(module = %self.inner.module.id(), reason, "module mount aborted");
                SupervisorState::Failed(MountError::Render {
                    module: self.inner.module.id().clone(),
                    reason: Arc::from(reason),
                })
            }
        };
        self.publish(generation, state);
    }

    fn publish(&self, generation: u64, state: SupervisorState<V>) {
        // A stale episode must not clobber the state of a newer generation.
        if self.inner.generation.load(Ordering::Relaxed) == generation {
            self.inner.state_tx.send_replace(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn instant_module(counter: Arc<AtomicU32>) -> ModuleRef<u32> {
        ModuleRef::new("settings-page", move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(5u32)
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn fast_load_never_shows_fallback() {
        let counter = Arc::new(AtomicU32::new(0));
        let supervisor = Supervisor::new(
            ModuleCache::new(),
            instant_module(counter),
            |loaded: Arc<u32>| Ok(*loaded * 2),
        );
        let mut states = supervisor.subscribe();

        supervisor.mount().await;

        // Drain everything the episode published; the fallback must never
        // have become visible.
        let mut saw_visible_fallback = false;
        loop {
            match &*states.borrow_and_update() {
                SupervisorState::Loading { fallback_visible } => {
                    saw_visible_fallback |= *fallback_visible;
                }
                SupervisorState::Ready(view) => {
                    assert_eq!(*view, 10);
                    break;
                }
                SupervisorState::Failed(error) => panic!("unexpected failure: {error}"),
            }
            states.changed().await.unwrap();
        }
        assert!(!saw_visible_fallback);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_load_shows_fallback_after_grace() {
        let module = ModuleRef::new("analytics-page", || async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(1u32)
        });
        let supervisor =
            Supervisor::new(ModuleCache::new(), module, |loaded: Arc<u32>| Ok(*loaded));
        let states = supervisor.subscribe();

        let mount = {
            let supervisor = supervisor.clone();
            tokio::spawn(async move { supervisor.mount().await })
        };
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(matches!(
            *states.borrow(),
            SupervisorState::Loading {
                fallback_visible: true
            }
        ));

        mount.await.unwrap();
        assert!(supervisor.state().is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn render_failure_is_contained() {
        let counter = Arc::new(AtomicU32::new(0));
        let supervisor = Supervisor::new(
            ModuleCache::new(),
            instant_module(counter),
            |_loaded: Arc<u32>| -> anyhow::Result<u32> { anyhow::bail!("table widget exploded") },
        );

        supervisor.mount().await;

        match supervisor.state() {
            SupervisorState::Failed(MountError::Render { reason, .. }) => {
                assert!(reason.contains("table widget exploded"));
            }
            other => panic!("expected render failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn render_panic_is_contained() {
        let counter = Arc::new(AtomicU32::new(0));
        let supervisor = Supervisor::new(
            ModuleCache::new(),
            instant_module(counter),
            |_loaded: Arc<u32>| -> anyhow::Result<u32> { panic!("render bug") },
        );

        supervisor.mount().await;

        match supervisor.state() {
            SupervisorState::Failed(MountError::Render { reason, .. }) => {
                assert!(reason.contains("panicked"));
            }
            other => panic!("expected contained panic, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retry_is_a_noop_unless_failed() {
        let counter = Arc::new(AtomicU32::new(0));
        let supervisor = Supervisor::new(
            ModuleCache::new(),
            instant_module(Arc::clone(&counter)),
            |loaded: Arc<u32>| Ok(*loaded),
        );

        supervisor.mount().await;
        assert!(supervisor.state().is_ready());
        assert!(!supervisor.retry().await);
        assert_eq!(supervisor.failure_generation(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
