//! Cluster store (spec.md §3, §6): durable representation of `EventCluster`
//! records. Lives across polls — a cluster must survive at least the
//! clustering window so a later poll's entries can still join it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use news_common::{ClusterState, EventCluster, PipelineError};
use news_http::HttpClient;
use tokio::sync::Mutex;
use uuid::Uuid;

#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Clusters not yet closed whose `last_seen` falls within `window` of
    /// `reference_time` — the clusterer's candidate pool for one entry
    /// (spec.md §4.3). A store-side implementation may use this as a range
    /// query rather than loading every open cluster per entry.
    async fn candidates(&self, reference_time: DateTime<Utc>, window: chrono::Duration) -> Result<Vec<EventCluster>, PipelineError>;

    async fn get(&self, cluster_id: Uuid) -> Result<Option<EventCluster>, PipelineError>;

    async fn save(&self, cluster: &EventCluster) -> Result<(), PipelineError>;

    /// Transitions clusters whose `last_seen` is older than `retention`
    /// relative to `now` into `Closed` (spec.md §3 invariant iii). Returns
    /// the number of clusters closed.
    async fn close_expired(&self, now: DateTime<Utc>, retention: chrono::Duration) -> Result<usize, PipelineError>;
}

pub struct HttpClusterStore {
    http: Arc<HttpClient>,
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpClusterStore {
    pub fn new(http: Arc<HttpClient>, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl ClusterStore for HttpClusterStore {
    async fn candidates(&self, reference_time: DateTime<Utc>, window: chrono::Duration) -> Result<Vec<EventCluster>, PipelineError> {
        let client = self.client.clone();
        let endpoint = format!(
            "{}/clusters/candidates?reference_time={}&window_secs={}",
            self.base_url,
            reference_time.to_rfc3339(),
            window.num_seconds()
        );
        let token = self.token.clone();

        self.http
            .call_with_retry("cluster-store", move || {
                let client = client.clone();
                let endpoint = endpoint.clone();
                let token = token.clone();
                async move {
                    let response = client
                        .get(&endpoint)
                        .bearer_auth(&token)
                        .send()
                        .await
                        .map_err(|e| PipelineError::TransientUpstream(e.to_string()))?;
                    if !response.status().is_success() {
                        return Err(PipelineError::TransientUpstream(format!("cluster store returned {}", response.status())));
                    }
                    response.json().await.map_err(|e| PipelineError::MalformedResponse(e.to_string()))
                }
            })
            .await
    }

    async fn get(&self, cluster_id: Uuid) -> Result<Option<EventCluster>, PipelineError> {
        let client = self.client.clone();
        let endpoint = format!("{}/clusters/{}", self.base_url, cluster_id);
        let token = self.token.clone();

        self.http
            .call_with_retry("cluster-store", move || {
                let client = client.clone();
                let endpoint = endpoint.clone();
                let token = token.clone();
                async move {
                    let response = client
                        .get(&endpoint)
                        .bearer_auth(&token)
                        .send()
                        .await
                        .map_err(|e| PipelineError::TransientUpstream(e.to_string()))?;
                    if response.status() == reqwest::StatusCode::NOT_FOUND {
                        return Ok(None);
                    }
                    if !response.status().is_success() {
                        return Err(PipelineError::TransientUpstream(format!("cluster store returned {}", response.status())));
                    }
                    response.json().await.map(Some).map_err(|e| PipelineError::MalformedResponse(e.to_string()))
                }
            })
            .await
    }

    async fn save(&self, cluster: &EventCluster) -> Result<(), PipelineError> {
        let client = self.client.clone();
        let endpoint = format!("{}/clusters/{}", self.base_url, cluster.cluster_id);
        let token = self.token.clone();
        let body = cluster.clone();

        self.http
            .call_with_retry("cluster-store", move || {
                let client = client.clone();
                let endpoint = endpoint.clone();
                let token = token.clone();
                let body = body.clone();
                async move {
                    let response = client
                        .put(&endpoint)
                        .bearer_auth(&token)
                        .json(&body)
                        .send()
                        .await
                        .map_err(|e| PipelineError::TransientUpstream(e.to_string()))?;
                    if !response.status().is_success() {
                        return Err(PipelineError::TransientUpstream(format!("cluster store returned {}", response.status())));
                    }
                    Ok(())
                }
            })
            .await
    }

    async fn close_expired(&self, now: DateTime<Utc>, retention: chrono::Duration) -> Result<usize, PipelineError> {
        let client = self.client.clone();
        let endpoint = format!("{}/clusters/close-expired?now={}&retention_secs={}", self.base_url, now.to_rfc3339(), retention.num_seconds());
        let token = self.token.clone();

        self.http
            .call_with_retry("cluster-store", move || {
                let client = client.clone();
                let endpoint = endpoint.clone();
                let token = token.clone();
                async move {
                    let response = client
                        .post(&endpoint)
                        .bearer_auth(&token)
                        .send()
                        .await
                        .map_err(|e| PipelineError::TransientUpstream(e.to_string()))?;
                    if !response.status().is_success() {
                        return Err(PipelineError::TransientUpstream(format!("cluster store returned {}", response.status())));
                    }
                    #[derive(serde::Deserialize)]
                    struct ClosedCount {
                        closed: usize,
                    }
                    let body: ClosedCount = response.json().await.map_err(|e| PipelineError::MalformedResponse(e.to_string()))?;
                    Ok(body.closed)
                }
            })
            .await
    }
}

#[derive(Default)]
pub struct InMemoryClusterStore {
    clusters: Mutex<HashMap<Uuid, EventCluster>>,
}

impl InMemoryClusterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClusterStore for InMemoryClusterStore {
    async fn candidates(&self, reference_time: DateTime<Utc>, window: chrono::Duration) -> Result<Vec<EventCluster>, PipelineError> {
        let clusters = self.clusters.lock().await;
        Ok(clusters
            .values()
            .filter(|c| c.state != ClusterState::Closed && c.is_within_window(reference_time, window))
            .cloned()
            .collect())
    }

    async fn get(&self, cluster_id: Uuid) -> Result<Option<EventCluster>, PipelineError> {
        let clusters = self.clusters.lock().await;
        Ok(clusters.get(&cluster_id).cloned())
    }

    async fn save(&self, cluster: &EventCluster) -> Result<(), PipelineError> {
        let mut clusters = self.clusters.lock().await;
        clusters.insert(cluster.cluster_id, cluster.clone());
        Ok(())
    }

    async fn close_expired(&self, now: DateTime<Utc>, retention: chrono::Duration) -> Result<usize, PipelineError> {
        let mut clusters = self.clusters.lock().await;
        let mut closed = 0;
        for cluster in clusters.values_mut() {
            if cluster.state != ClusterState::Closed && now - cluster.last_seen > retention {
                cluster.state = ClusterState::Closed;
                closed += 1;
            }
        }
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use news_common::{Category, ClusterMember, CredibilityTier, FeedEntry, ScoredEntry};

    fn cluster() -> EventCluster {
        let member = ClusterMember::new(ScoredEntry {
            entry: FeedEntry {
                source_name: "Wire".into(),
                url: "https://example.com/a".into(),
                guid: None,
                title: "Title".into(),
                summary: "summary".into(),
                body: String::new(),
                image_url: None,
                published_at: Utc::now(),
                fetched_at: Utc::now(),
                tier: CredibilityTier::Major,
            },
            importance: 900,
            category: Category::World,
            emoji: "🌍".into(),
            score_reasoning: String::new(),
        });
        EventCluster::seed(member, Default::default(), Default::default())
    }

    #[tokio::test]
    async fn save_then_get_roundtrips() {
        let store = InMemoryClusterStore::new();
        let c = cluster();
        store.save(&c).await.unwrap();
        let fetched = store.get(c.cluster_id).await.unwrap().unwrap();
        assert_eq!(fetched.cluster_id, c.cluster_id);
    }

    #[tokio::test]
    async fn candidates_excludes_closed_clusters() {
        let store = InMemoryClusterStore::new();
        let mut c = cluster();
        c.state = ClusterState::Closed;
        store.save(&c).await.unwrap();
        let result = store.candidates(Utc::now(), chrono::Duration::hours(24)).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn close_expired_transitions_old_clusters() {
        let store = InMemoryClusterStore::new();
        let mut c = cluster();
        c.last_seen = Utc::now() - chrono::Duration::days(2);
        store.save(&c).await.unwrap();
        let closed = store.close_expired(Utc::now(), chrono::Duration::hours(24)).await.unwrap();
        assert_eq!(closed, 1);
        let fetched = store.get(c.cluster_id).await.unwrap().unwrap();
        assert_eq!(fetched.state, ClusterState::Closed);
    }
}
