//! Cancellation registry: one live cancellation handle per request key.
//!
//! Installing a handle under a key that already has one cancels the previous
//! holder exactly once (supersession). Natural completion removes the entry
//! generation-checked, so a finished request can never evict its successor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, oneshot};

use plutus_types::RequestKey;

/// Why a cancellation handle fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// A newer request was installed under the same key.
    Superseded,
    /// `cancel` / `cancel_all` was invoked.
    Explicit,
}

/// Identifies one installation of a handle under a key. Monotonic per
/// registry; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

struct Slot {
    generation: Generation,
    cancel_tx: oneshot::Sender<CancelReason>,
}

/// Process-wide map of request key to active cancellation handle.
///
/// All map mutation is synchronous within the lock region; the lock is never
/// held across an `await` of anything but its own acquisition.
pub struct CancellationRegistry {
    slots: Mutex<HashMap<RequestKey, Slot>>,
    next_generation: AtomicU64,
}

impl Default for CancellationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Install a fresh handle for `key`, superseding any prior holder.
    ///
    /// The previous holder, if any, observes [`CancelReason::Superseded`]
    /// exactly once, strictly before this call returns.
    pub async fn install(&self, key: &RequestKey) -> (Generation, oneshot::Receiver<CancelReason>) {
        let generation = Generation(self.next_generation.fetch_add(1, Ordering::Relaxed));
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let previous = {
            let mut slots = self.slots.lock().await;
            slots.insert(
                key.clone(),
                Slot {
                    generation,
                    cancel_tx,
                },
            )
        };
        if let Some(slot) = previous {
            tracing::debug!(key = %key, "superseding in-flight request");
            let _ = slot.cancel_tx.send(CancelReason::Superseded);
        }

        (generation, cancel_rx)
    }

    /// Remove the entry for `key` if `generation` is still the current
    /// holder. Called on natural completion so handles do not leak.
    pub async fn remove(&self, key: &RequestKey, generation: Generation) {
        let mut slots = self.slots.lock().await;
        if slots
            .get(key)
            .is_some_and(|slot| slot.generation == generation)
        {
            slots.remove(key);
        }
    }

    /// Cancel the in-flight request under `key`, if any. Returns whether a
    /// handle was present.
    pub async fn cancel(&self, key: &RequestKey) -> bool {
        let slot = self.slots.lock().await.remove(key);
        match slot {
            Some(slot) => {
                let _ = slot.cancel_tx.send(CancelReason::Explicit);
                true
            }
            None => false,
        }
    }

    /// Cancel and clear every entry. Full teardown, e.g. navigating away
    /// from the application.
    pub async fn cancel_all(&self) {
        let drained: Vec<Slot> = {
            let mut slots = self.slots.lock().await;
            slots.drain().map(|(_, slot)| slot).collect()
        };
        let count = drained.len();
        for slot in drained {
            let _ = slot.cancel_tx.send(CancelReason::Explicit);
        }
        if count > 0 {
            tracing::debug!(count, "cancelled all in-flight requests");
        }
    }

    /// Number of live handles. Test and diagnostics aid.
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }
}
