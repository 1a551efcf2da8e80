use thiserror::Error;

/// Failure weight for a hard transient failure (5xx, timeout, connection
/// reset) against a circuit breaker's threshold.
pub const FULL_WEIGHT: u32 = 3;

/// Failure weight for a rate-limited (429) response. A run of nothing but
/// 429s takes `FULL_WEIGHT / RATE_LIMIT_WEIGHT` times as many consecutive
/// failures to trip the breaker as a run of 5xxs would (spec.md §7: rate
/// limits "count against the breaker more weakly than 5xx").
pub const RATE_LIMIT_WEIGHT: u32 = 1;

/// Closed error taxonomy for the pipeline, following the error-handling
/// design in spec.md §7. Every variant maps to a retry/drop/defer policy
/// that downstream stages interpret explicitly — nothing here unwinds via
/// panics.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("transient upstream failure: {0}")]
    TransientUpstream(String),

    #[error("rate limited, retry after {retry_after_secs}s: {message}")]
    RateLimited {
        retry_after_secs: u64,
        message: String,
    },

    #[error("permanent upstream failure: {0}")]
    PermanentUpstream(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("content rejected by provider: {0}")]
    ContentRejected(String),

    #[error("validation failure: {0}")]
    Validation(String),

    #[error("store failure: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("circuit breaker open for endpoint {0}")]
    CircuitOpen(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// The weight this error should contribute to a circuit breaker's
    /// failure threshold, or `0` if it shouldn't count at all. Rate limits
    /// count more weakly than hard transient failures (spec.md §7: "counts
    /// against the breaker more weakly than 5xx") rather than treating
    /// every countable error identically.
    pub fn breaker_weight(&self) -> u32 {
        match self {
            PipelineError::TransientUpstream(_) => FULL_WEIGHT,
            PipelineError::RateLimited { .. } => RATE_LIMIT_WEIGHT,
            _ => 0,
        }
    }

    /// Whether a caller should retry this call at all (permanent failures
    /// and content rejections never retry with the same request).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::TransientUpstream(_)
                | PipelineError::RateLimited { .. }
                | PipelineError::MalformedResponse(_)
                | PipelineError::Validation(_)
                | PipelineError::Store(_)
        )
    }
}
