use std::env;
use std::time::Duration;

/// Closed configuration record, read once from the environment at
/// start-up and validated — missing required keys panic immediately with a
/// named-variable message.
///
/// This enumerates exactly the options spec.md §9 calls out as the
/// "configurable by a dictionary" closed record: poll interval, retention
/// window, clustering window, importance threshold, max retries,
/// timeout-per-stage, concurrency-per-stage, provider keys.
#[derive(Debug, Clone)]
pub struct Config {
    /// Scoring LLM provider API key.
    pub scorer_api_key: String,
    /// Writing LLM provider API key (synthesis).
    pub writer_api_key: String,
    /// Research LLM provider API key (component generation).
    pub research_api_key: String,
    /// Fallback writing LLM provider key, used when the primary provider's
    /// circuit breaker is open (spec.md §5, graceful degradation).
    pub writer_fallback_api_key: Option<String>,

    /// Scraping gateway base URL and key.
    pub scraper_base_url: String,
    pub scraper_api_key: String,

    /// Output (published-event) store base URL and credentials.
    pub output_store_url: String,
    pub output_store_token: String,

    /// Cluster store and processed-URL store base URLs. In this workspace
    /// both may point at the same durable backend; kept separate because
    /// spec.md §6 treats them as distinct external collaborators.
    pub cluster_store_url: String,
    pub processed_url_store_url: String,

    /// Poll interval between cycles (default 5 minutes).
    pub poll_interval: Duration,
    /// Maximum age of a feed entry admitted to the pipeline (default 24h).
    pub retention_window: Duration,
    /// Maximum gap between a candidate's published-at and a cluster's
    /// last-seen for it to be considered for that cluster (default 24h).
    pub clustering_window: Duration,
    /// Publication floor for the scorer's importance output (default 700).
    pub importance_threshold: u16,

    /// Max retry attempts for any single outbound call (default 3).
    pub max_retries: u32,
    /// Circuit breaker: consecutive failures before the breaker opens.
    pub breaker_failure_threshold: u32,
    /// Circuit breaker: cool-down before a half-open probe is attempted.
    pub breaker_cooldown: Duration,

    /// Per-stage timeouts.
    pub collector_timeout: Duration,
    pub body_fetch_timeout: Duration,
    pub llm_timeout: Duration,
    pub image_probe_timeout: Duration,

    /// Per-stage concurrency limits.
    pub collector_concurrency: usize,
    pub body_fetch_concurrency_per_cluster: usize,
    pub body_fetch_concurrency_global: usize,
    pub llm_concurrency: usize,
    pub global_http_concurrency: usize,

    /// Soft wall-clock budget for one cycle (default 30 minutes).
    pub cycle_budget: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            scorer_api_key: required_env("SCORER_LLM_API_KEY"),
            writer_api_key: required_env("WRITER_LLM_API_KEY"),
            research_api_key: required_env("RESEARCH_LLM_API_KEY"),
            writer_fallback_api_key: env::var("WRITER_LLM_FALLBACK_API_KEY").ok(),

            scraper_base_url: required_env("SCRAPER_GATEWAY_URL"),
            scraper_api_key: required_env("SCRAPER_GATEWAY_API_KEY"),

            output_store_url: required_env("OUTPUT_STORE_URL"),
            output_store_token: required_env("OUTPUT_STORE_TOKEN"),

            cluster_store_url: env_or("CLUSTER_STORE_URL", "OUTPUT_STORE_URL"),
            processed_url_store_url: env_or("PROCESSED_URL_STORE_URL", "OUTPUT_STORE_URL"),

            poll_interval: secs_env("POLL_INTERVAL_SECS", 300),
            retention_window: secs_env("RETENTION_WINDOW_SECS", 24 * 3600),
            clustering_window: secs_env("CLUSTERING_WINDOW_SECS", 24 * 3600),
            importance_threshold: num_env("IMPORTANCE_THRESHOLD", 700),

            max_retries: num_env("MAX_RETRIES", 3),
            breaker_failure_threshold: num_env("BREAKER_FAILURE_THRESHOLD", 5),
            breaker_cooldown: secs_env("BREAKER_COOLDOWN_SECS", 60),

            collector_timeout: secs_env("COLLECTOR_TIMEOUT_SECS", 10),
            body_fetch_timeout: secs_env("BODY_FETCH_TIMEOUT_SECS", 30),
            llm_timeout: secs_env("LLM_TIMEOUT_SECS", 45),
            image_probe_timeout: secs_env("IMAGE_PROBE_TIMEOUT_SECS", 5),

            collector_concurrency: num_env("COLLECTOR_CONCURRENCY", 24),
            body_fetch_concurrency_per_cluster: num_env("BODY_FETCH_CONCURRENCY_PER_CLUSTER", 6),
            body_fetch_concurrency_global: num_env("BODY_FETCH_CONCURRENCY_GLOBAL", 32),
            llm_concurrency: num_env("LLM_CONCURRENCY", 16),
            global_http_concurrency: num_env("GLOBAL_HTTP_CONCURRENCY", 64),

            cycle_budget: secs_env("CYCLE_BUDGET_SECS", 30 * 60),
        }
    }

    /// Log presence (not value) of every sensitive env var.
    pub fn log_redacted(&self) {
        let vars: [(&str, &str); 6] = [
            ("SCORER_LLM_API_KEY", &self.scorer_api_key),
            ("WRITER_LLM_API_KEY", &self.writer_api_key),
            ("RESEARCH_LLM_API_KEY", &self.research_api_key),
            ("SCRAPER_GATEWAY_API_KEY", &self.scraper_api_key),
            ("OUTPUT_STORE_TOKEN", &self.output_store_token),
            ("SCRAPER_GATEWAY_URL", &self.scraper_base_url),
        ];
        for (name, value) in vars {
            if value.is_empty() {
                tracing::warn!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn env_or(key: &str, fallback_key: &str) -> String {
    env::var(key).unwrap_or_else(|_| required_env(fallback_key))
}

fn secs_env(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default_secs),
    )
}

fn num_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
