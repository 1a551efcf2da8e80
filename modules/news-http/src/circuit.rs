use std::collections::HashMap;
use std::time::{Duration, Instant};

use news_common::FULL_WEIGHT;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Per-endpoint circuit breaker state machine (spec.md §5): closed → open →
/// half-open → closed. No crate in this stack covers this, so it's
/// hand-rolled as a small owned state machine, same as the other per-
/// endpoint tracking in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct EndpointBreaker {
    state: BreakerState,
    failure_weight: u32,
    opened_at: Option<Instant>,
}

impl EndpointBreaker {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            failure_weight: 0,
            opened_at: None,
        }
    }
}

/// Decision returned by [`CircuitBreaker::guard`]: whether the caller may
/// attempt the network call, and whether this attempt is a half-open probe
/// (probes that fail re-open immediately; that distinction only matters
/// internally, callers just get a go/no-go).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Proceed,
    FailFast,
}

/// Shared, process-wide circuit breaker keyed by logical endpoint name
/// (e.g. "scorer-llm", "scraping-gateway"). Constructed once at start-up
/// and passed explicitly into stages — never accessed via a global, per
/// spec.md §9's "module-level clients" redesign note.
pub struct CircuitBreaker {
    /// Threshold expressed in consecutive full-weight (5xx-equivalent)
    /// failures; compared against accumulated weight, not a raw call count,
    /// so weaker failure kinds (429) take proportionally more of them to
    /// trip the breaker.
    failure_threshold: u32,
    cooldown: Duration,
    endpoints: RwLock<HashMap<String, EndpointBreaker>>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            endpoints: RwLock::new(HashMap::new()),
        }
    }

    fn weighted_threshold(&self) -> u32 {
        self.failure_threshold.saturating_mul(FULL_WEIGHT)
    }

    /// Ask whether a call to `endpoint` may proceed. If the breaker is open
    /// and the cool-down has elapsed, this transitions it to half-open and
    /// admits exactly one probe call.
    pub async fn guard(&self, endpoint: &str) -> Admission {
        let mut map = self.endpoints.write().await;
        let breaker = map.entry(endpoint.to_string()).or_insert_with(EndpointBreaker::new);
        match breaker.state {
            BreakerState::Closed => Admission::Proceed,
            BreakerState::HalfOpen => Admission::FailFast,
            BreakerState::Open => {
                let elapsed = breaker.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.cooldown {
                    breaker.state = BreakerState::HalfOpen;
                    info!(endpoint, "circuit breaker half-open probe admitted");
                    Admission::Proceed
                } else {
                    Admission::FailFast
                }
            }
        }
    }

    /// Returns `true` if this call closed a breaker that was open or
    /// half-open (a transition the caller reports to its counters).
    pub async fn record_success(&self, endpoint: &str) -> bool {
        let mut map = self.endpoints.write().await;
        let breaker = map.entry(endpoint.to_string()).or_insert_with(EndpointBreaker::new);
        let was_open = breaker.state != BreakerState::Closed;
        if was_open {
            info!(endpoint, "circuit breaker closed after successful probe");
        }
        breaker.state = BreakerState::Closed;
        breaker.failure_weight = 0;
        breaker.opened_at = None;
        was_open
    }

    /// Records a full-weight (5xx-equivalent) failure. Convenience wrapper
    /// around [`record_failure_weighted`](Self::record_failure_weighted)
    /// for callers that don't need to distinguish failure kinds.
    pub async fn record_failure(&self, endpoint: &str) -> bool {
        self.record_failure_weighted(endpoint, FULL_WEIGHT).await
    }

    /// Returns `true` if this call opened (or re-opened) the breaker.
    /// `weight` lets weaker failure kinds (rate limits) count less toward
    /// the threshold than hard transient failures (spec.md §7) — pass
    /// [`FULL_WEIGHT`] for the latter and [`RATE_LIMIT_WEIGHT`] for the
    /// former.
    pub async fn record_failure_weighted(&self, endpoint: &str, weight: u32) -> bool {
        let mut map = self.endpoints.write().await;
        let breaker = map.entry(endpoint.to_string()).or_insert_with(EndpointBreaker::new);
        match breaker.state {
            BreakerState::HalfOpen => {
                warn!(endpoint, "half-open probe failed, re-opening circuit breaker");
                breaker.state = BreakerState::Open;
                breaker.opened_at = Some(Instant::now());
                true
            }
            BreakerState::Closed => {
                breaker.failure_weight += weight;
                if breaker.failure_weight >= self.weighted_threshold() {
                    warn!(
                        endpoint,
                        failure_weight = breaker.failure_weight,
                        "circuit breaker opening"
                    );
                    breaker.state = BreakerState::Open;
                    breaker.opened_at = Some(Instant::now());
                    true
                } else {
                    false
                }
            }
            BreakerState::Open => false,
        }
    }

    #[cfg(test)]
    pub(crate) async fn state_of(&self, endpoint: &str) -> BreakerState {
        let map = self.endpoints.read().await;
        map.get(endpoint).map(|b| b.state).unwrap_or(BreakerState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use news_common::RATE_LIMIT_WEIGHT;

    #[tokio::test]
    async fn closed_admits_calls() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(60));
        assert_eq!(cb.guard("x").await, Admission::Proceed);
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            cb.record_failure("x").await;
        }
        assert_eq!(cb.state_of("x").await, BreakerState::Open);
        assert_eq!(cb.guard("x").await, Admission::FailFast);
    }

    #[tokio::test]
    async fn stays_closed_below_threshold() {
        let cb = CircuitBreaker::new(5, Duration::from_secs(60));
        for _ in 0..4 {
            cb.record_failure("x").await;
        }
        assert_eq!(cb.state_of("x").await, BreakerState::Closed);
    }

    #[tokio::test]
    async fn half_open_after_cooldown() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(10));
        cb.record_failure("x").await;
        assert_eq!(cb.guard("x").await, Admission::FailFast);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cb.guard("x").await, Admission::Proceed);
        assert_eq!(cb.state_of("x").await, BreakerState::HalfOpen);
    }

    #[tokio::test]
    async fn successful_probe_closes_breaker() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(10));
        cb.record_failure("x").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        cb.guard("x").await;
        cb.record_success("x").await;
        assert_eq!(cb.state_of("x").await, BreakerState::Closed);
    }

    #[tokio::test]
    async fn failed_probe_reopens_breaker() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(10));
        cb.record_failure("x").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        cb.guard("x").await;
        cb.record_failure("x").await;
        assert_eq!(cb.state_of("x").await, BreakerState::Open);
    }

    #[tokio::test]
    async fn rate_limit_failures_count_more_weakly_than_full_failures() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(60));
        // Same count of rate-limit failures as the full-weight threshold
        // would trip at is not enough on its own.
        for _ in 0..3 {
            cb.record_failure_weighted("x", RATE_LIMIT_WEIGHT).await;
        }
        assert_eq!(cb.state_of("x").await, BreakerState::Closed);

        // It takes FULL_WEIGHT/RATE_LIMIT_WEIGHT times as many to trip it.
        let needed = (3 * FULL_WEIGHT) / RATE_LIMIT_WEIGHT;
        for _ in 3..needed {
            cb.record_failure_weighted("x", RATE_LIMIT_WEIGHT).await;
        }
        assert_eq!(cb.state_of("x").await, BreakerState::Open);
    }

    #[tokio::test]
    async fn separate_endpoints_are_independent() {
        let cb = CircuitBreaker::new(1, Duration::from_secs(60));
        cb.record_failure("a").await;
        assert_eq!(cb.state_of("a").await, BreakerState::Open);
        assert_eq!(cb.state_of("b").await, BreakerState::Closed);
        assert_eq!(cb.guard("b").await, Admission::Proceed);
    }
}
