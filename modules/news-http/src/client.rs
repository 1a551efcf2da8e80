use std::future::Future;
use std::time::{Duration, Instant};

use news_common::PipelineError;
use tracing::{debug, warn};

use crate::circuit::{Admission, CircuitBreaker};
use crate::counters::{CounterSnapshot, Counters};
use crate::retry::jittered_backoff_delay;

/// The single outbound-call handle shared by every LLM-calling and
/// scraping stage (spec.md §2, cross-cutting leaf (d)). Constructed once at
/// start-up, passed explicitly into stages, disposed on shutdown — never a
/// global (spec.md §9).
pub struct HttpClient {
    max_retries: u32,
    breaker: CircuitBreaker,
    counters: Counters,
}

impl HttpClient {
    pub fn new(max_retries: u32, breaker_failure_threshold: u32, breaker_cooldown: Duration) -> Self {
        Self {
            max_retries,
            breaker: CircuitBreaker::new(breaker_failure_threshold, breaker_cooldown),
            counters: Counters::new(),
        }
    }

    /// Execute `call` against `endpoint`, applying the circuit breaker gate,
    /// exponential backoff with jitter, and rate-limit-aware retry
    /// (spec.md §5). `call` performs exactly one network attempt and
    /// returns a typed `PipelineError` on failure so the retry policy can
    /// classify it.
    ///
    /// Per spec.md §8 testable property 8, when the breaker is open the
    /// network is never touched: `call` is simply not invoked.
    pub async fn call_with_retry<F, Fut, T>(&self, endpoint: &str, mut call: F) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let mut attempt = 0u32;
        loop {
            match self.breaker.guard(endpoint).await {
                Admission::FailFast => {
                    debug!(endpoint, "circuit breaker open, failing fast");
                    return Err(PipelineError::CircuitOpen(endpoint.to_string()));
                }
                Admission::Proceed => {}
            }

            let started = Instant::now();
            let result = call().await;
            let latency_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(value) => {
                    self.counters.record_call(endpoint, true, latency_ms).await;
                    if self.breaker.record_success(endpoint).await {
                        self.counters.record_breaker_close(endpoint).await;
                    }
                    return Ok(value);
                }
                Err(err) => {
                    self.counters.record_call(endpoint, false, latency_ms).await;
                    let weight = err.breaker_weight();
                    if weight > 0 && self.breaker.record_failure_weighted(endpoint, weight).await {
                        self.counters.record_breaker_open(endpoint).await;
                    }

                    if !err.is_retryable() || attempt + 1 >= self.max_retries {
                        warn!(endpoint, attempt, error = %err, "giving up after exhausting retries");
                        return Err(err);
                    }

                    let delay = match &err {
                        PipelineError::RateLimited { retry_after_secs, .. } => {
                            Duration::from_secs(*retry_after_secs)
                        }
                        _ => jittered_backoff_delay(attempt),
                    };
                    warn!(endpoint, attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying after backoff");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    pub async fn counters(&self, endpoint: &str) -> CounterSnapshot {
        self.counters.snapshot(endpoint).await
    }

    pub async fn endpoint_names(&self) -> Vec<String> {
        self.counters.endpoint_names().await
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_on_first_try() {
        let client = HttpClient::new(3, 5, Duration::from_secs(60));
        let calls = AtomicU32::new(0);
        let result = client
            .call_with_retry("endpoint", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, PipelineError>(42) }
            })
            .await
            .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_failures_up_to_max() {
        let client = HttpClient::new(3, 10, Duration::from_secs(60));
        let calls = AtomicU32::new(0);
        let result: Result<i32, _> = client
            .call_with_retry("endpoint", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(PipelineError::TransientUpstream("boom".into())) }
            })
            .await;
        assert!(result.is_err());
        // 3 max_retries => 3 total attempts, never exceeding the configured max.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_failures() {
        let client = HttpClient::new(3, 10, Duration::from_secs(60));
        let calls = AtomicU32::new(0);
        let result: Result<i32, _> = client
            .call_with_retry("endpoint", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(PipelineError::PermanentUpstream("404".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn does_not_retry_content_rejected() {
        let client = HttpClient::new(3, 10, Duration::from_secs(60));
        let calls = AtomicU32::new(0);
        let result: Result<i32, _> = client
            .call_with_retry("endpoint", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(PipelineError::ContentRejected("safety block".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn circuit_breaker_fails_fast_without_touching_network() {
        let client = HttpClient::new(5, 1, Duration::from_secs(60));
        let calls = AtomicU32::new(0);

        // First call opens the breaker (threshold=1).
        let _ = client
            .call_with_retry("endpoint", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(PipelineError::TransientUpstream("boom".into())) }
            })
            .await;

        let before = calls.load(Ordering::SeqCst);

        // Second call should fail fast: the network closure must not run.
        let result: Result<i32, _> = client
            .call_with_retry("endpoint", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(1) }
            })
            .await;

        assert!(matches!(result, Err(PipelineError::CircuitOpen(_))));
        assert_eq!(calls.load(Ordering::SeqCst), before, "network closure must not run while breaker is open");
    }

    #[tokio::test]
    async fn eventual_success_after_transient_failures() {
        let client = HttpClient::new(3, 10, Duration::from_secs(60));
        let calls = AtomicU32::new(0);
        let result = client
            .call_with_retry("endpoint", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 1 {
                        Err(PipelineError::TransientUpstream("boom".into()))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 7);
    }

    #[tokio::test]
    async fn counters_track_successes_and_errors() {
        let client = HttpClient::new(3, 10, Duration::from_secs(60));
        let _ = client
            .call_with_retry("endpoint", || async { Ok::<_, PipelineError>(1) })
            .await;
        let snapshot = client.counters("endpoint").await;
        assert_eq!(snapshot.total_calls, 1);
        assert_eq!(snapshot.successes, 1);
    }

    #[tokio::test]
    async fn scripted_transport_drives_retry_then_success() {
        use crate::test_support::ScriptedTransport;

        let transport = ScriptedTransport::new(vec![
            Err(PipelineError::TransientUpstream("first attempt down".into())),
            Ok(99u32),
        ]);
        let client = HttpClient::new(3, 10, Duration::from_secs(60));
        let result = client.call_with_retry("scripted-endpoint", || transport.next()).await.unwrap();

        assert_eq!(result, 99);
        assert_eq!(transport.call_count(), 2);
        let snapshot = client.counters("scripted-endpoint").await;
        assert_eq!(snapshot.total_calls, 2);
        assert_eq!(snapshot.successes, 1);
        assert_eq!(snapshot.errors, 1);
    }

    #[tokio::test]
    async fn scripted_transport_reports_breaker_open_close_transitions() {
        use crate::test_support::ScriptedTransport;

        let transport = ScriptedTransport::new(vec![Err(PipelineError::TransientUpstream("down".into()))]);
        let client = HttpClient::new(1, 1, Duration::from_millis(10));

        let _ = client.call_with_retry("flaky-endpoint", || transport.next()).await;
        let after_open = client.counters("flaky-endpoint").await;
        assert_eq!(after_open.breaker_opens, 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let recovered = ScriptedTransport::new(vec![Ok(1u32)]);
        let result = client.call_with_retry("flaky-endpoint", || recovered.next()).await;
        assert!(result.is_ok());
        let after_close = client.counters("flaky-endpoint").await;
        assert_eq!(after_close.breaker_closes, 1);
    }
}
