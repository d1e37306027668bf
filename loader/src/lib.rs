//! Deferred UI module loading for the dashboard.
//!
//! # Architecture
//!
//! - [`ModuleCache`] - single-flights concurrent loads of the same deferred
//!   module and retries failed loads behind one shared future
//! - [`Supervisor`] - wraps one module-driven UI subtree; turns load and
//!   first-render failures into a contained, user-recoverable state
//! - [`Preloader`] - opportunistically warms the cache during low-priority
//!   time; failures are swallowed
//!
//! The cache never inspects a module's contents. The loader primitive is an
//! opaque zero-argument async function supplied by routing code; a "module"
//! is whatever that function resolves to.

mod cache;
mod preload;
mod supervisor;

pub use cache::{DEFAULT_MAX_ATTEMPTS, ModuleCache, ModuleRef};
pub use preload::{
    BATCH_PRELOAD_DELAY, HIGH_PRIORITY_PRELOAD_DELAY, IdleScheduler, Preloader, Scheduler,
    TimerScheduler,
};
pub use supervisor::{DEFAULT_FALLBACK_GRACE, MountError, Supervisor, SupervisorState};

pub use plutus_types;
