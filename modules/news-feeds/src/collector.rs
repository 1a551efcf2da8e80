//! Stage 0: polls every configured feed concurrently and returns the batch
//! of new [`FeedEntry`] records for the cycle (spec.md §4.1).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use news_common::{CredibilityTier, FeedDescriptor, FeedEntry};
use news_http::HttpClient;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::canonicalize::canonicalize_url;
use crate::html::{extract_og_image, first_img_src, strip_html};

const DEFAULT_CONCURRENCY: usize = 24;
const DEFAULT_FEED_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ITEMS_PER_FEED: usize = 50;

pub struct FeedCollector {
    http: reqwest::Client,
    client: Arc<HttpClient>,
    concurrency: usize,
    retention: chrono::Duration,
}

impl FeedCollector {
    pub fn new(client: Arc<HttpClient>, retention: chrono::Duration) -> Self {
        Self::with_concurrency(client, retention, DEFAULT_CONCURRENCY)
    }

    pub fn with_concurrency(client: Arc<HttpClient>, retention: chrono::Duration, concurrency: usize) -> Self {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_FEED_TIMEOUT)
            .user_agent("news-collector/0.1")
            .build()
            .expect("failed to build feed HTTP client");
        Self {
            http,
            client,
            concurrency,
            retention,
        }
    }

    /// Fetches every feed in `feeds`, bounded to `self.concurrency` parallel
    /// fetchers, and returns every entry newer than the retention window
    /// that is not already in `already_seen`. Per-feed failures are logged
    /// and skipped; the cycle continues (spec.md §4.1: "the pipeline
    /// continues").
    pub async fn collect(
        &self,
        feeds: &[FeedDescriptor],
        already_seen: impl Fn(&str) -> bool + Sync,
    ) -> Vec<FeedEntry> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let cutoff = Utc::now() - self.retention;

        let fetches = feeds.iter().map(|feed| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire().await.expect("feed semaphore closed");
                self.fetch_one(feed, cutoff).await
            }
        });

        let results = futures::future::join_all(fetches).await;

        let mut batch = Vec::new();
        for entries in results {
            for entry in entries {
                let canon = canonicalize_url(&entry.url);
                if already_seen(&canon) {
                    continue;
                }
                let mut entry = entry;
                entry.url = canon;
                batch.push(entry);
            }
        }

        info!(feeds = feeds.len(), entries = batch.len(), "feed collector: cycle complete");
        batch
    }

    async fn fetch_one(&self, feed: &FeedDescriptor, cutoff: DateTime<Utc>) -> Vec<FeedEntry> {
        let bytes = match self.http.get(&feed.url).send().await {
            Ok(resp) => match resp.bytes().await {
                Ok(b) => b,
                Err(e) => {
                    warn!(source = %feed.source_name, url = %feed.url, error = %e, "feed: failed to read body");
                    return Vec::new();
                }
            },
            Err(e) => {
                warn!(source = %feed.source_name, url = %feed.url, error = %e, "feed: fetch failed");
                return Vec::new();
            }
        };

        let parsed = match feed_rs::parser::parse(&bytes[..]) {
            Ok(p) => p,
            Err(e) => {
                warn!(source = %feed.source_name, url = %feed.url, error = %e, "feed: malformed XML, skipping");
                return Vec::new();
            }
        };

        let mut entries = Vec::new();
        for raw_entry in parsed.entries.into_iter().take(MAX_ITEMS_PER_FEED) {
            let Some(url) = raw_entry.links.first().map(|l| l.href.clone()) else {
                continue;
            };

            let published_at = raw_entry
                .published
                .or(raw_entry.updated)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(Utc::now);

            if published_at <= cutoff {
                continue;
            }

            let title = raw_entry.title.map(|t| t.content).unwrap_or_default();
            let raw_summary = raw_entry
                .summary
                .map(|s| s.content)
                .or_else(|| raw_entry.content.as_ref().and_then(|c| c.body.clone()))
                .unwrap_or_default();
            let summary = strip_html(&raw_summary);
            let body = raw_entry
                .content
                .and_then(|c| c.body)
                .map(|b| strip_html(&b))
                .unwrap_or_default();

            let image_url = extract_image_url(&raw_entry.media, &raw_entry.links, &raw_summary, &body);
            let image_url = match image_url {
                Some(u) => Some(u),
                None => self.fetch_og_image(&url).await,
            };

            entries.push(FeedEntry {
                source_name: feed.source_name.clone(),
                url,
                guid: (!raw_entry.id.is_empty()).then(|| raw_entry.id.clone()),
                title,
                summary,
                body,
                image_url,
                published_at,
                fetched_at: Utc::now(),
                tier: feed.tier,
            });
        }

        debug!(source = %feed.source_name, kept = entries.len(), "feed: parsed");
        entries
    }

    /// Last-resort image lookup: HEAD-then-partial-GET the article page and
    /// scan its `<head>` for an Open-Graph image tag (spec.md §4.1). Routed
    /// through the shared retrying client so a flaky article host doesn't
    /// spend the whole per-feed timeout budget.
    async fn fetch_og_image(&self, article_url: &str) -> Option<String> {
        let http = self.http.clone();
        let url = article_url.to_string();
        let result = self
            .client
            .call_with_retry("feed-og-probe", || {
                let http = http.clone();
                let url = url.clone();
                async move {
                    let head = http.head(&url).send().await;
                    if !matches!(head, Ok(resp) if resp.status().is_success()) {
                        return Err(news_common::PipelineError::TransientUpstream(format!(
                            "HEAD probe failed for {url}"
                        )));
                    }
                    let resp = http
                        .get(&url)
                        .send()
                        .await
                        .map_err(|e| news_common::PipelineError::TransientUpstream(e.to_string()))?;
                    let text = resp
                        .text()
                        .await
                        .map_err(|e| news_common::PipelineError::TransientUpstream(e.to_string()))?;
                    Ok(text)
                }
            })
            .await;

        match result {
            Ok(html) => extract_og_image(&html),
            Err(_) => None,
        }
    }
}

/// Tries, in order: an enclosure link, the feed's media namespace, the
/// first `<img>` in summary or body HTML (spec.md §4.1 — the Open-Graph
/// fetch is the caller's last resort when all of these return `None`).
fn extract_image_url(
    media: &[feed_rs::model::MediaObject],
    links: &[feed_rs::model::Link],
    raw_summary: &str,
    raw_body: &str,
) -> Option<String> {
    if let Some(link) = links.iter().find(|l| l.rel.as_deref() == Some("enclosure")) {
        return Some(link.href.clone());
    }

    for object in media {
        if let Some(content) = object.content.iter().find_map(|c| c.url.as_ref()) {
            return Some(content.to_string());
        }
        if let Some(thumb) = object.thumbnails.first() {
            return Some(thumb.image.uri.clone());
        }
    }

    first_img_src(raw_summary).or_else(|| first_img_src(raw_body))
}
