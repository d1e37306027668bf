//! Best-effort cache warming during low-priority time.
//!
//! Preloading exists purely so a later supervisor mount finds the module
//! already resolved. It must never surface an error or affect the depending
//! UI; every failure is swallowed after a debug log.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::cache::{ModuleCache, ModuleRef};

/// Delay before a batch preload when no idle primitive exists.
pub const BATCH_PRELOAD_DELAY: Duration = Duration::from_millis(2_000);

/// Delay before a single high-priority preload.
pub const HIGH_PRIORITY_PRELOAD_DELAY: Duration = Duration::from_millis(100);

/// Low-priority task scheduling capability. Selected once at startup: an
/// idle-hook-backed implementation where the host environment provides one,
/// a fixed-delay timer otherwise.
pub trait Scheduler: Send + Sync {
    fn schedule_low_priority(&self, task: BoxFuture<'static, ()>);
}

/// Fixed-delay fallback scheduler.
pub struct TimerScheduler {
    delay: Duration,
}

impl TimerScheduler {
    #[must_use]
    pub fn batch() -> Self {
        Self::with_delay(BATCH_PRELOAD_DELAY)
    }

    #[must_use]
    pub fn high_priority() -> Self {
        Self::with_delay(HIGH_PRIORITY_PRELOAD_DELAY)
    }

    #[must_use]
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Scheduler for TimerScheduler {
    fn schedule_low_priority(&self, task: BoxFuture<'static, ()>) {
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
    }
}

/// Scheduler backed by a host-provided idle callback primitive. The hook
/// receives the task and runs it whenever the host considers itself idle.
pub struct IdleScheduler {
    hook: Arc<dyn Fn(BoxFuture<'static, ()>) + Send + Sync>,
}

impl IdleScheduler {
    pub fn new<F>(hook: F) -> Self
    where
        F: Fn(BoxFuture<'static, ()>) + Send + Sync + 'static,
    {
        Self {
            hook: Arc::new(hook),
        }
    }
}

impl Scheduler for IdleScheduler {
    fn schedule_low_priority(&self, task: BoxFuture<'static, ()>) {
        (self.hook)(task);
    }
}

/// Warms the module cache opportunistically.
pub struct Preloader<T> {
    cache: ModuleCache<T>,
    scheduler: Arc<dyn Scheduler>,
}

impl<T> Preloader<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(cache: ModuleCache<T>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self { cache, scheduler }
    }

    /// Queue `modules` for loading during the next low-priority period.
    /// Does nothing when `condition` is false.
    pub fn schedule_preload(&self, modules: Vec<ModuleRef<T>>, condition: bool) {
        if !condition || modules.is_empty() {
            return;
        }
        let cache = self.cache.clone();
        self.scheduler.schedule_low_priority(Box::pin(async move {
            for module in modules {
                match cache.load(&module).await {
                    Ok(_) => tracing::debug!(module = %module.id(), "preloaded module"),
                    Err(error) => {
                        // Best-effort only; the mount path will retry with a
                        // fresh episode if this module is ever needed.
                        tracing::debug!(module = %module.id(), error = %error, "preload failed");
                    }
                }
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counted_module(name: &str, counter: Arc<AtomicU32>, fail: bool) -> ModuleRef<u32> {
        ModuleRef::new(name, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if fail {
                    anyhow::bail!("bundle fetch failed");
                }
                Ok(0u32)
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn condition_false_does_nothing() {
        let counter = Arc::new(AtomicU32::new(0));
        let cache: ModuleCache<u32> = ModuleCache::new();
        let preloader = Preloader::new(
            cache.clone(),
            Arc::new(TimerScheduler::with_delay(Duration::from_millis(10))),
        );

        preloader.schedule_preload(
            vec![counted_module("reports", Arc::clone(&counter), false)],
            false,
        );
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn warms_the_cache_for_a_later_load() {
        let counter = Arc::new(AtomicU32::new(0));
        let cache: ModuleCache<u32> = ModuleCache::new();
        let preloader = Preloader::new(cache.clone(), Arc::new(TimerScheduler::batch()));

        let module = counted_module("reports", Arc::clone(&counter), false);
        preloader.schedule_preload(vec![module.clone()], true);
        tokio::time::sleep(Duration::from_millis(2_100)).await;

        assert!(cache.resolved(module.id()).await.is_some());

        // The later real load is a cache hit, not a second invocation.
        cache.load(&module).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_swallowed() {
        let counter = Arc::new(AtomicU32::new(0));
        let cache: ModuleCache<u32> = ModuleCache::new();
        let preloader = Preloader::new(
            cache.clone(),
            Arc::new(TimerScheduler::with_delay(Duration::from_millis(10))),
        );

        let module = counted_module("broken", Arc::clone(&counter), true);
        preloader.schedule_preload(vec![module.clone()], true);
        // Long enough for the episode's internal retries to exhaust.
        tokio::time::sleep(Duration::from_secs(10)).await;

        // Three attempts made, nothing cached, nothing propagated.
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(cache.resolved(module.id()).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_scheduler_delegates_to_the_hook() {
        let counter = Arc::new(AtomicU32::new(0));
        let cache: ModuleCache<u32> = ModuleCache::new();
        // Host "idle" hook that just runs the task immediately.
        let scheduler = Arc::new(IdleScheduler::new(|task| {
            tokio::spawn(task);
        }));
        let preloader = Preloader::new(cache.clone(), scheduler);

        let module = counted_module("watchlist", Arc::clone(&counter), false);
        preloader.schedule_preload(vec![module.clone()], true);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(cache.resolved(module.id()).await.is_some());
    }
}
