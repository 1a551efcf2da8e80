use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

/// Per-endpoint counters exposed for the supervisor to log at cycle end
/// (spec.md §5: "total calls, successes, errors, average latency, breaker
/// open/closed").
#[derive(Default)]
struct EndpointCounters {
    total_calls: AtomicU64,
    successes: AtomicU64,
    errors: AtomicU64,
    total_latency_ms: AtomicU64,
    breaker_opens: AtomicU64,
    breaker_closes: AtomicU64,
}

#[derive(Debug, Clone, Default)]
pub struct CounterSnapshot {
    pub total_calls: u64,
    pub successes: u64,
    pub errors: u64,
    pub average_latency_ms: f64,
    pub breaker_opens: u64,
    pub breaker_closes: u64,
}

pub struct Counters {
    endpoints: RwLock<HashMap<String, EndpointCounters>>,
}

impl Counters {
    pub fn new() -> Self {
        Self {
            endpoints: RwLock::new(HashMap::new()),
        }
    }

    pub async fn record_call(&self, endpoint: &str, success: bool, latency_ms: u64) {
        let map = self.endpoints.read().await;
        if let Some(c) = map.get(endpoint) {
            Self::bump(c, success, latency_ms);
            return;
        }
        drop(map);
        let mut map = self.endpoints.write().await;
        let c = map.entry(endpoint.to_string()).or_default();
        Self::bump(c, success, latency_ms);
    }

    fn bump(c: &EndpointCounters, success: bool, latency_ms: u64) {
        c.total_calls.fetch_add(1, Ordering::Relaxed);
        if success {
            c.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            c.errors.fetch_add(1, Ordering::Relaxed);
        }
        c.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub async fn record_breaker_open(&self, endpoint: &str) {
        let mut map = self.endpoints.write().await;
        map.entry(endpoint.to_string())
            .or_default()
            .breaker_opens
            .fetch_add(1, Ordering::Relaxed);
    }

    pub async fn record_breaker_close(&self, endpoint: &str) {
        let mut map = self.endpoints.write().await;
        map.entry(endpoint.to_string())
            .or_default()
            .breaker_closes
            .fetch_add(1, Ordering::Relaxed);
    }

    pub async fn snapshot(&self, endpoint: &str) -> CounterSnapshot {
        let map = self.endpoints.read().await;
        match map.get(endpoint) {
            Some(c) => {
                let total = c.total_calls.load(Ordering::Relaxed);
                let latency = c.total_latency_ms.load(Ordering::Relaxed);
                CounterSnapshot {
                    total_calls: total,
                    successes: c.successes.load(Ordering::Relaxed),
                    errors: c.errors.load(Ordering::Relaxed),
                    average_latency_ms: if total > 0 {
                        latency as f64 / total as f64
                    } else {
                        0.0
                    },
                    breaker_opens: c.breaker_opens.load(Ordering::Relaxed),
                    breaker_closes: c.breaker_closes.load(Ordering::Relaxed),
                }
            }
            None => CounterSnapshot::default(),
        }
    }

    /// All endpoint names with recorded activity, for the cycle-summary log.
    pub async fn endpoint_names(&self) -> Vec<String> {
        self.endpoints.read().await.keys().cloned().collect()
    }
}

impl Default for Counters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_successes_and_errors() {
        let counters = Counters::new();
        counters.record_call("x", true, 100).await;
        counters.record_call("x", false, 200).await;
        let snap = counters.snapshot("x").await;
        assert_eq!(snap.total_calls, 2);
        assert_eq!(snap.successes, 1);
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.average_latency_ms, 150.0);
    }

    #[tokio::test]
    async fn unknown_endpoint_returns_zeroed_snapshot() {
        let counters = Counters::new();
        let snap = counters.snapshot("never-called").await;
        assert_eq!(snap.total_calls, 0);
    }
}
