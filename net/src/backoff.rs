//! Deterministic retry delay schedule.
//!
//! The delay before retrying attempt `n` (0-based) is `1000 * 2^n` ms capped
//! at 5000 ms: 1s, 2s, 4s, 5s, 5s, ... No jitter; the schedule is part of the
//! executor's observable contract.

use std::time::Duration;

const BASE_DELAY_MS: u64 = 1_000;
const MAX_DELAY_MS: u64 = 5_000;

/// Delay to wait after the failure of `attempt` (0-based) before the next
/// transport call.
#[must_use]
pub fn retry_delay(attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    let millis = BASE_DELAY_MS.saturating_mul(factor).min(MAX_DELAY_MS);
    Duration::from_millis(millis)
}
