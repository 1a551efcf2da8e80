use std::time::Duration;

use rand::Rng;

/// Base delay, backoff factor, and cap for the exponential-backoff-with-
/// jitter policy in spec.md §5: base ≈1s, factor 2, cap 30s.
const BASE_DELAY_MS: u64 = 1_000;
const FACTOR: u64 = 2;
const CAP_MS: u64 = 30_000;

/// Pure backoff delay computation for `attempt` (0-indexed), excluding
/// jitter, so it stays unit-testable without randomness.
pub fn base_backoff_delay(attempt: u32) -> Duration {
    let exp = FACTOR.saturating_pow(attempt);
    let ms = BASE_DELAY_MS.saturating_mul(exp).min(CAP_MS);
    Duration::from_millis(ms)
}

/// Backoff delay with jitter in `[0, D]` added on top, capped at 30s
/// overall, per spec.md §5.
pub fn jittered_backoff_delay(attempt: u32) -> Duration {
    let base = base_backoff_delay(attempt);
    let jitter_ms = rand::rng().random_range(0..=base.as_millis() as u64);
    (base + Duration::from_millis(jitter_ms)).min(Duration::from_millis(CAP_MS))
}
