//! Output store (spec.md §3, §6): the system's published records. The
//! publisher (stage 8) is the only writer; everything else is read-only
//! from this crate's point of view.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use news_common::{PipelineError, PublishedEvent};
use news_http::HttpClient;
use tokio::sync::Mutex;
use uuid::Uuid;

#[async_trait]
pub trait OutputStore: Send + Sync {
    async fn get_by_cluster_id(&self, cluster_id: Uuid) -> Result<Option<PublishedEvent>, PipelineError>;

    async fn upsert(&self, event: &PublishedEvent) -> Result<(), PipelineError>;
}

pub struct HttpOutputStore {
    http: Arc<HttpClient>,
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpOutputStore {
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
impl OutputStore for HttpOutputStore {
    async fn get_by_cluster_id(&self, cluster_id: Uuid) -> Result<Option<PublishedEvent>, PipelineError> {
        let client = self.client.clone();
        let endpoint = format!("{}/events/by-cluster/{}", self.base_url, cluster_id);
        let token = self.token.clone();

        self.http
            .call_with_retry("output-store", move || {
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
                        return Err(PipelineError::TransientUpstream(format!("output store returned {}", response.status())));
                    }
                    response.json().await.map(Some).map_err(|e| PipelineError::MalformedResponse(e.to_string()))
                }
            })
            .await
    }

    async fn upsert(&self, event: &PublishedEvent) -> Result<(), PipelineError> {
        let client = self.client.clone();
        let endpoint = format!("{}/events/{}", self.base_url, event.event_id);
        let token = self.token.clone();
        let body = event.clone();

        self.http
            .call_with_retry("output-store", move || {
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
                        return Err(PipelineError::TransientUpstream(format!("output store returned {}", response.status())));
                    }
                    Ok(())
                }
            })
            .await
    }
}

#[derive(Default)]
pub struct InMemoryOutputStore {
    events: Mutex<HashMap<Uuid, PublishedEvent>>,
}

impl InMemoryOutputStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OutputStore for InMemoryOutputStore {
    async fn get_by_cluster_id(&self, cluster_id: Uuid) -> Result<Option<PublishedEvent>, PipelineError> {
        let events = self.events.lock().await;
        Ok(events.values().find(|e| e.cluster_id == cluster_id).cloned())
    }

    async fn upsert(&self, event: &PublishedEvent) -> Result<(), PipelineError> {
        let mut events = self.events.lock().await;
        events.insert(event.event_id, event.clone());
        Ok(())
    }
}
