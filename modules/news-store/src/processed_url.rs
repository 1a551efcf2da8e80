//! Processed-URL store (spec.md §3, §6): a key-value table keyed by
//! canonicalised URL, existing purely for cross-poll idempotence. The core
//! requires an atomic check-and-insert — "check then insert" as two
//! separate calls is a known race between concurrent pollers that happen to
//! see the same URL in the same cycle (spec.md §5).

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use news_common::PipelineError;
use news_http::HttpClient;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

#[async_trait]
pub trait ProcessedUrlStore: Send + Sync {
    /// Atomically checks whether `url` has been marked processed and, if
    /// not, marks it. Returns `true` if this call performed the insert
    /// (i.e. the URL was new).
    async fn check_and_insert(&self, url: &str) -> Result<bool, PipelineError>;

    /// Bulk variant for the collector's stage-0 filter (spec.md §4.1): reads
    /// which of `urls` are already marked, without inserting.
    async fn bulk_check(&self, urls: &[String]) -> Result<HashSet<String>, PipelineError>;
}

/// HTTP-backed processed-URL store (spec.md §6: "a key-value table...
/// exposed by an HTTPS API").
pub struct HttpProcessedUrlStore {
    http: Arc<HttpClient>,
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpProcessedUrlStore {
    pub fn new(http: Arc<HttpClient>, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }
}

#[derive(Serialize)]
struct CheckAndInsertRequest<'a> {
    url: &'a str,
    first_seen: chrono::DateTime<Utc>,
}

#[derive(Deserialize)]
struct CheckAndInsertResponse {
    inserted: bool,
}

#[derive(Serialize)]
struct BulkCheckRequest<'a> {
    urls: &'a [String],
}

#[derive(Deserialize)]
struct BulkCheckResponse {
    processed: Vec<String>,
}

#[async_trait]
impl ProcessedUrlStore for HttpProcessedUrlStore {
    async fn check_and_insert(&self, url: &str) -> Result<bool, PipelineError> {
        let client = self.client.clone();
        let endpoint = format!("{}/processed-urls/check-and-insert", self.base_url);
        let token = self.token.clone();
        let url_owned = url.to_string();

        self.http
            .call_with_retry("processed-url-store", move || {
                let client = client.clone();
                let endpoint = endpoint.clone();
                let token = token.clone();
                let url = url_owned.clone();
                async move {
                    let response = client
                        .post(&endpoint)
                        .bearer_auth(&token)
                        .json(&CheckAndInsertRequest { url: &url, first_seen: Utc::now() })
                        .send()
                        .await
                        .map_err(|e| PipelineError::TransientUpstream(e.to_string()))?;

                    classify_store_status(&response)?;
                    let body: CheckAndInsertResponse = response
                        .json()
                        .await
                        .map_err(|e| PipelineError::MalformedResponse(e.to_string()))?;
                    Ok(body.inserted)
                }
            })
            .await
    }

    async fn bulk_check(&self, urls: &[String]) -> Result<HashSet<String>, PipelineError> {
        if urls.is_empty() {
            return Ok(HashSet::new());
        }
        let client = self.client.clone();
        let endpoint = format!("{}/processed-urls/bulk-check", self.base_url);
        let token = self.token.clone();
        let urls_owned = urls.to_vec();

        self.http
            .call_with_retry("processed-url-store", move || {
                let client = client.clone();
                let endpoint = endpoint.clone();
                let token = token.clone();
                let urls = urls_owned.clone();
                async move {
                    let response = client
                        .post(&endpoint)
                        .bearer_auth(&token)
                        .json(&BulkCheckRequest { urls: &urls })
                        .send()
                        .await
                        .map_err(|e| PipelineError::TransientUpstream(e.to_string()))?;

                    classify_store_status(&response)?;
                    let body: BulkCheckResponse = response
                        .json()
                        .await
                        .map_err(|e| PipelineError::MalformedResponse(e.to_string()))?;
                    Ok(body.processed.into_iter().collect())
                }
            })
            .await
    }
}

fn classify_store_status(response: &reqwest::Response) -> Result<(), PipelineError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        return Err(PipelineError::RateLimited {
            retry_after_secs: retry_after,
            message: "processed-url store rate limited".to_string(),
        });
    }
    if status.is_server_error() {
        return Err(PipelineError::TransientUpstream(format!("store returned {status}")));
    }
    Err(PipelineError::Store(format!("store returned {status}")))
}

/// In-memory store used by pipeline integration tests and by single-box
/// deployments that don't need a shared backend (spec.md §6 treats the
/// store as an external collaborator, but nothing forbids an in-process
/// one for a non-clustered deployment).
#[derive(Default)]
pub struct InMemoryProcessedUrlStore {
    seen: Mutex<HashSet<String>>,
}

impl InMemoryProcessedUrlStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessedUrlStore for InMemoryProcessedUrlStore {
    async fn check_and_insert(&self, url: &str) -> Result<bool, PipelineError> {
        let mut seen = self.seen.lock().await;
        Ok(seen.insert(url.to_string()))
    }

    async fn bulk_check(&self, urls: &[String]) -> Result<HashSet<String>, PipelineError> {
        let seen = self.seen.lock().await;
        Ok(urls.iter().filter(|u| seen.contains(*u)).cloned().collect())
    }
}
