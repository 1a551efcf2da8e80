//! Stage 3 (spec.md §4.4): fetches full article text for every cluster
//! member whose body is still empty, bounded per-cluster and globally, and
//! cached by URL so a later cycle's cluster update doesn't refetch.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use news_common::{ClusterMember, EventCluster, PipelineError};
use news_http::HttpClient;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};

use crate::gateway::ScrapingGateway;

const DEFAULT_PER_CLUSTER_CONCURRENCY: usize = 6;
const DEFAULT_GLOBAL_CONCURRENCY: usize = 32;

/// Per-URL cache of fetched body text, so a cluster update in a later cycle
/// doesn't refetch a source it already has (spec.md §4.4).
pub struct BodyCache {
    entries: Mutex<HashMap<String, String>>,
}

impl BodyCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    async fn get(&self, url: &str) -> Option<String> {
        self.entries.lock().await.get(url).cloned()
    }

    async fn put(&self, url: &str, text: String) {
        self.entries.lock().await.insert(url.to_string(), text);
    }
}

impl Default for BodyCache {
    fn default() -> Self {
        Self::new()
    }
}

pub struct BodyFetcher {
    http: Arc<HttpClient>,
    gateway: Arc<dyn ScrapingGateway>,
    cache: Arc<BodyCache>,
    global_semaphore: Arc<Semaphore>,
    per_cluster_concurrency: usize,
}

impl BodyFetcher {
    pub fn new(http: Arc<HttpClient>, gateway: Arc<dyn ScrapingGateway>, cache: Arc<BodyCache>) -> Self {
        Self::with_concurrency(
            http,
            gateway,
            cache,
            DEFAULT_PER_CLUSTER_CONCURRENCY,
            DEFAULT_GLOBAL_CONCURRENCY,
        )
    }

    pub fn with_concurrency(
        http: Arc<HttpClient>,
        gateway: Arc<dyn ScrapingGateway>,
        cache: Arc<BodyCache>,
        per_cluster_concurrency: usize,
        global_concurrency: usize,
    ) -> Self {
        Self {
            http,
            gateway,
            cache,
            global_semaphore: Arc::new(Semaphore::new(global_concurrency)),
            per_cluster_concurrency,
        }
    }

    /// Fetches every member of `cluster` still missing a body, mutating the
    /// cluster in place. Members that fetch successfully get
    /// `fetched_body = Some(text)`; members that fail permanently get
    /// `fetched_body = Some(String::new())` so the synthesizer falls back
    /// to the feed summary (spec.md §4.4).
    pub async fn fetch_cluster(&self, cluster: &mut EventCluster) {
        let cluster_semaphore = Arc::new(Semaphore::new(self.per_cluster_concurrency));

        let indices: Vec<usize> = cluster
            .members
            .iter()
            .enumerate()
            .filter(|(_, m)| m.needs_fetch())
            .map(|(i, _)| i)
            .collect();

        if indices.is_empty() {
            return;
        }

        let results = stream::iter(indices.iter().map(|&idx| {
            let url = cluster.members[idx].scored.url().to_string();
            let cluster_semaphore = Arc::clone(&cluster_semaphore);
            async move {
                let _global = self.global_semaphore.acquire().await.expect("global fetch semaphore closed");
                let _local = cluster_semaphore.acquire().await.expect("per-cluster fetch semaphore closed");
                (idx, self.fetch_one(&url).await)
            }
        }))
        .buffer_unordered(self.per_cluster_concurrency)
        .collect::<Vec<_>>()
        .await;

        for (idx, body) in results {
            cluster.members[idx].fetched_body = Some(body);
        }
    }

    async fn fetch_one(&self, url: &str) -> String {
        if let Some(cached) = self.cache.get(url).await {
            debug!(url, "body fetcher: cache hit");
            return cached;
        }

        let endpoint = self.gateway.endpoint_name().to_string();
        let gateway = Arc::clone(&self.gateway);
        let url_owned = url.to_string();

        let result = self
            .http
            .call_with_retry(&endpoint, move || {
                let gateway = Arc::clone(&gateway);
                let url = url_owned.clone();
                async move { gateway.fetch_text(&url).await }
            })
            .await;

        match result {
            Ok(text) => {
                self.cache.put(url, text.clone()).await;
                text
            }
            Err(PipelineError::PermanentUpstream(reason)) => {
                debug!(url, reason, "body fetcher: permanent failure, body left empty");
                String::new()
            }
            Err(err) => {
                warn!(url, error = %err, "body fetcher: giving up after retries, body left empty");
                String::new()
            }
        }
    }
}

/// True if the cluster has at least one usable synthesis source — either a
/// fetched body or a non-trivial summary (spec.md §4.4 fallback rule: "a
/// cluster with zero fetchable bodies proceeds only if the member
/// summaries are long enough to synthesise from").
pub fn has_usable_source(cluster: &EventCluster, min_summary_chars: usize) -> bool {
    cluster.members.iter().any(|m| member_is_usable(m, min_summary_chars))
}

fn member_is_usable(member: &ClusterMember, min_summary_chars: usize) -> bool {
    match &member.fetched_body {
        Some(body) if !body.is_empty() => true,
        _ => member.scored.entry.summary.len() >= min_summary_chars,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use news_common::{Category, CredibilityTier, FeedEntry, ScoredEntry};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeGateway {
        calls: AtomicUsize,
        outcome: fn(&str) -> Result<String, PipelineError>,
    }

    #[async_trait]
    impl ScrapingGateway for FakeGateway {
        fn endpoint_name(&self) -> &str {
            "fake-gateway"
        }

        async fn fetch_text(&self, url: &str) -> Result<String, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)(url)
        }
    }

    fn member(url: &str, summary: &str) -> ClusterMember {
        ClusterMember::new(ScoredEntry {
            entry: FeedEntry {
                source_name: "Wire".into(),
                url: url.into(),
                guid: None,
                title: "Title".into(),
                summary: summary.into(),
                body: String::new(),
                image_url: Some("https://example.com/x.jpg".into()),
                published_at: Utc::now(),
                fetched_at: Utc::now(),
                tier: CredibilityTier::Major,
            },
            importance: 900,
            category: Category::World,
            emoji: "🌍".into(),
            score_reasoning: String::new(),
        })
    }

    fn cluster_with(members: Vec<ClusterMember>) -> EventCluster {
        let mut iter = members.into_iter();
        let mut cluster = EventCluster::seed(iter.next().unwrap(), Default::default(), Default::default());
        for m in iter {
            cluster.members.push(m);
        }
        cluster
    }

    #[tokio::test]
    async fn fetches_and_caches_successful_bodies() {
        let http = Arc::new(HttpClient::new(3, 5, Duration::from_secs(60)));
        let gateway = Arc::new(FakeGateway {
            calls: AtomicUsize::new(0),
            outcome: |_| Ok("full article text".to_string()),
        });
        let cache = Arc::new(BodyCache::new());
        let fetcher = BodyFetcher::new(http, gateway.clone(), cache.clone());

        let mut cluster = cluster_with(vec![member("https://example.com/a", "short")]);
        fetcher.fetch_cluster(&mut cluster).await;

        assert_eq!(cluster.members[0].fetched_body.as_deref(), Some("full article text"));
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);

        // Second fetch of the same URL hits the cache, not the gateway.
        let mut cluster2 = cluster_with(vec![member("https://example.com/a", "short")]);
        fetcher.fetch_cluster(&mut cluster2).await;
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1, "cache should avoid refetch");
    }

    #[tokio::test]
    async fn permanent_failure_leaves_body_empty_and_does_not_retry() {
        let http = Arc::new(HttpClient::new(3, 5, Duration::from_secs(60)));
        let gateway = Arc::new(FakeGateway {
            calls: AtomicUsize::new(0),
            outcome: |_| Err(PipelineError::PermanentUpstream("404".to_string())),
        });
        let cache = Arc::new(BodyCache::new());
        let fetcher = BodyFetcher::new(http, gateway.clone(), cache);

        let mut cluster = cluster_with(vec![member("https://example.com/a", "short")]);
        fetcher.fetch_cluster(&mut cluster).await;

        assert_eq!(cluster.members[0].fetched_body.as_deref(), Some(""));
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1, "permanent failures must not retry");
    }

    #[tokio::test]
    async fn skips_members_that_already_have_a_fetched_body() {
        let http = Arc::new(HttpClient::new(3, 5, Duration::from_secs(60)));
        let gateway = Arc::new(FakeGateway {
            calls: AtomicUsize::new(0),
            outcome: |_| Ok("text".to_string()),
        });
        let cache = Arc::new(BodyCache::new());
        let fetcher = BodyFetcher::new(http, gateway.clone(), cache);

        let mut m = member("https://example.com/a", "short");
        m.fetched_body = Some("already fetched".to_string());
        let mut cluster = cluster_with(vec![m]);
        fetcher.fetch_cluster(&mut cluster).await;

        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn has_usable_source_falls_back_to_long_summary() {
        let cluster = cluster_with(vec![member("https://example.com/a", &"x".repeat(300))]);
        assert!(has_usable_source(&cluster, 200));
    }

    #[test]
    fn has_usable_source_false_when_everything_is_thin() {
        let cluster = cluster_with(vec![member("https://example.com/a", "short")]);
        assert!(!has_usable_source(&cluster, 200));
    }
}
