//! End-to-end recovery behavior: cache episodes driven through the
//! supervisor, including the user-retry reset of the attempt budget.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use plutus_loader::{ModuleCache, ModuleRef, MountError, Supervisor, SupervisorState};
use plutus_types::LoadError;

#[tokio::test(start_paused = true)]
async fn user_retry_restarts_the_attempt_budget() {
    let invocations = Arc::new(AtomicU32::new(0));
    let healthy = Arc::new(AtomicBool::new(false));

    let module = {
        let invocations = Arc::clone(&invocations);
        let healthy = Arc::clone(&healthy);
        ModuleRef::new("portfolio-page", move || {
            let invocations = Arc::clone(&invocations);
            let healthy = Arc::clone(&healthy);
            async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                if healthy.load(Ordering::SeqCst) {
                    Ok("portfolio view")
                } else {
                    anyhow::bail!("chunk server unreachable")
                }
            }
        })
    };

    let cache: ModuleCache<&'static str> = ModuleCache::new();
    let supervisor = Supervisor::new(cache, module, |loaded: Arc<&'static str>| Ok(*loaded));

    // First episode: three attempts, terminal failure, contained.
    supervisor.mount().await;
    match supervisor.state() {
        SupervisorState::Failed(MountError::Load(LoadError::Failed { attempts, .. })) => {
            assert_eq!(attempts, 3);
        }
        other => panic!("expected load failure, got {other:?}"),
    }
    assert_eq!(invocations.load(Ordering::SeqCst), 3);
    assert_eq!(supervisor.failure_generation(), 0);

    // User retry: a fresh episode whose attempt count starts at 0 again,
    // not a continuation of the exhausted counter.
    assert!(supervisor.retry().await);
    assert_eq!(supervisor.failure_generation(), 1);
    match supervisor.state() {
        SupervisorState::Failed(MountError::Load(LoadError::Failed { attempts, .. })) => {
            assert_eq!(attempts, 3);
        }
        other => panic!("expected load failure, got {other:?}"),
    }
    assert_eq!(invocations.load(Ordering::SeqCst), 6);

    // The backend recovers; the next retry succeeds on its first attempt.
    healthy.store(true, Ordering::SeqCst);
    assert!(supervisor.retry().await);
    assert_eq!(supervisor.failure_generation(), 2);
    match supervisor.state() {
        SupervisorState::Ready(view) => assert_eq!(view, "portfolio view"),
        other => panic!("expected success, got {other:?}"),
    }
    assert_eq!(invocations.load(Ordering::SeqCst), 7);
}

#[tokio::test(start_paused = true)]
async fn concurrent_mounts_share_one_episode() {
    let invocations = Arc::new(AtomicU32::new(0));
    let module = {
        let invocations = Arc::clone(&invocations);
        ModuleRef::new("markets-page", move || {
            let invocations = Arc::clone(&invocations);
            async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                Ok(42u32)
            }
        })
    };

    let cache: ModuleCache<u32> = ModuleCache::new();
    // Two routes mount views over the same deferred module.
    let table = Supervisor::new(cache.clone(), module.clone(), |loaded: Arc<u32>| Ok(*loaded));
    let chart = Supervisor::new(cache, module, |loaded: Arc<u32>| Ok(*loaded + 1));

    tokio::join!(table.mount(), chart.mount());

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert!(matches!(table.state(), SupervisorState::Ready(42)));
    assert!(matches!(chart.state(), SupervisorState::Ready(43)));
}
