//! Resilient HTTP request execution for the dashboard API.
//!
//! # Architecture
//!
//! - [`RequestExecutor`] - performs one logical call with per-attempt timeout,
//!   deterministic exponential backoff and cancellation
//! - [`CancellationRegistry`] - at most one live cancellation handle per
//!   request key; a newer call under a key supersedes the older one
//! - [`backoff`] - the retry delay schedule (1s, 2s, 4s, capped at 5s)
//!
//! # Delivery semantics
//!
//! The executor does not know what data it is fetching. It guarantees only:
//!
//! | Outcome | Meaning |
//! |---------|---------|
//! | `Ok(value)` | 2xx response with a JSON-decodable body |
//! | `ClientError` | 4xx, never retried |
//! | `ServerError` / `NetworkError` | transient cause, surfaced after the retry budget |
//! | `Timeout` | no response within the budget on any attempt |
//! | `Cancelled` | superseded or explicitly cancelled; "no answer", not "bad answer" |
//!
//! Logs are operational only; nothing in this crate branches on them.

pub mod backoff;
mod error;
mod executor;
mod registry;

pub use error::RequestError;
pub use executor::{RawResponse, RequestExecutor};
pub use registry::{CancelReason, CancellationRegistry, Generation};

pub use plutus_types;
