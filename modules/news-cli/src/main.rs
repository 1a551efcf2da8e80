//! Thin entrypoint: initialize logging, load `Config::from_env`, construct
//! the shared `HttpClient` handle and the store/provider handles, then
//! drive the cycle loop.
//!
//! RSS source lists as literal data are out of scope for the core
//! (spec.md §1); this binary reads them from an external JSON file instead
//! of hard-coding them.

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use news_common::{Config, FeedDescriptor};
use tracing::info;
use tracing_subscriber::EnvFilter;

use news_client::OpenAiCompatibleProvider;
use news_fetch::{BodyCache, HttpScrapingGateway};
use news_http::HttpClient;
use news_pipeline::{run_cycle, CycleConfig, PipelineServices};
use news_store::{HttpClusterStore, HttpOutputStore, HttpProcessedUrlStore};
use news_synth::HttpImageProber;

#[derive(Parser, Debug)]
#[command(name = "news-cli", about = "News ingestion and synthesis pipeline")]
struct Args {
    /// Run a single cycle and exit, instead of looping forever.
    #[arg(long)]
    once: bool,

    /// Load configuration and the feed list, log the result, and exit
    /// without running a cycle.
    #[arg(long)]
    config_check: bool,

    /// Path to a JSON file of feed descriptors (spec.md §1: RSS source
    /// lists as literal data are explicitly out of the core's scope).
    #[arg(long, env = "FEEDS_FILE", default_value = "feeds.json")]
    feeds_file: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("news=info".parse()?))
        .init();

    info!("news pipeline starting...");

    let args = Args::parse();
    let config = Config::from_env();
    config.log_redacted();

    let feeds = load_feeds(&args.feeds_file)?;
    info!(count = feeds.len(), path = %args.feeds_file, "loaded feed descriptors");

    if args.config_check {
        info!("config check OK, exiting");
        return Ok(());
    }

    let services = build_services(&config);
    let cycle_config = cycle_config_from(&config);

    if args.once {
        let report = run_cycle(&services, &feeds, &cycle_config).await;
        report.log();
        return Ok(());
    }

    loop {
        let report = run_cycle(&services, &feeds, &cycle_config).await;
        report.log();
        tokio::time::sleep(config.poll_interval).await;
    }
}

fn load_feeds(path: &str) -> Result<Vec<FeedDescriptor>> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading feeds file {path}"))?;
    let feeds: Vec<FeedDescriptor> = serde_json::from_str(&raw).with_context(|| format!("parsing feeds file {path}"))?;
    Ok(feeds)
}

fn build_services(config: &Config) -> PipelineServices {
    let http = Arc::new(HttpClient::new(config.max_retries, config.breaker_failure_threshold, config.breaker_cooldown));

    let scorer_provider = Arc::new(OpenAiCompatibleProvider::new("scorer-llm", config.scorer_api_key.clone(), scorer_base_url(config)));
    let writer_provider = Arc::new(OpenAiCompatibleProvider::new("writer-llm", config.writer_api_key.clone(), writer_base_url(config)));
    let writer_fallback = config
        .writer_fallback_api_key
        .clone()
        .map(|key| Arc::new(OpenAiCompatibleProvider::new("writer-llm-fallback", key, writer_fallback_base_url(config))) as Arc<dyn news_client::LlmProvider>);
    let research_provider = Arc::new(OpenAiCompatibleProvider::new("research-llm", config.research_api_key.clone(), research_base_url(config)));

    let image_prober = Arc::new(HttpImageProber::new());
    let scraping_gateway = Arc::new(HttpScrapingGateway::new(config.scraper_base_url.clone(), config.scraper_api_key.clone()));
    let body_cache = Arc::new(BodyCache::new());

    let processed_url_store = Arc::new(HttpProcessedUrlStore::new(Arc::clone(&http), config.processed_url_store_url.clone(), config.output_store_token.clone()));
    let cluster_store = Arc::new(HttpClusterStore::new(Arc::clone(&http), config.cluster_store_url.clone(), config.output_store_token.clone()));
    let output_store = Arc::new(HttpOutputStore::new(Arc::clone(&http), config.output_store_url.clone(), config.output_store_token.clone()));

    PipelineServices {
        http,
        scorer_provider,
        writer_provider,
        writer_fallback,
        research_provider,
        image_prober,
        scraping_gateway,
        body_cache,
        processed_url_store,
        cluster_store,
        output_store,
    }
}

/// The three LLM roles (scoring, writing, research) may point at distinct
/// provider base URLs in deployment; default them all to a single
/// environment-supplied endpoint when no per-role override is set.
fn scorer_base_url(config: &Config) -> String {
    std::env::var("SCORER_LLM_BASE_URL").unwrap_or_else(|_| default_llm_base_url(config))
}

fn writer_base_url(config: &Config) -> String {
    std::env::var("WRITER_LLM_BASE_URL").unwrap_or_else(|_| default_llm_base_url(config))
}

fn writer_fallback_base_url(config: &Config) -> String {
    std::env::var("WRITER_LLM_FALLBACK_BASE_URL").unwrap_or_else(|_| default_llm_base_url(config))
}

fn research_base_url(config: &Config) -> String {
    std::env::var("RESEARCH_LLM_BASE_URL").unwrap_or_else(|_| default_llm_base_url(config))
}

fn default_llm_base_url(_config: &Config) -> String {
    std::env::var("LLM_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string())
}

fn cycle_config_from(config: &Config) -> CycleConfig {
    CycleConfig {
        retention_window: chrono::Duration::from_std(config.retention_window).unwrap_or(chrono::Duration::hours(24)),
        clustering_window: chrono::Duration::from_std(config.clustering_window).unwrap_or(chrono::Duration::hours(24)),
        importance_threshold: config.importance_threshold,
        min_summary_chars: 280,
        scorer_model: std::env::var("SCORER_LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
        writer_model: std::env::var("WRITER_LLM_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
        selector_model: std::env::var("SELECTOR_LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
        research_model: std::env::var("RESEARCH_LLM_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
        cycle_budget: config.cycle_budget,
        llm_concurrency: config.llm_concurrency,
    }
}
