//! Stage 5 (spec.md §4.6): turns a clustered event into a dual-register
//! article. Up to three attempts total; each attempt tries the primary
//! provider and falls back to a secondary provider only when the primary's
//! circuit is open, then runs the mechanical [`validate`] gate before
//! accepting the reply.

use std::sync::Arc;

use news_client::{salvage_json, LlmProvider};
use news_common::{Category, EventCluster, PipelineError};
use news_http::HttpClient;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::prompt;
use crate::validate::validate;

const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct RawSynthResponse {
    #[serde(rename = "title-advanced")]
    pub title_advanced: String,
    #[serde(rename = "title-simple")]
    pub title_simple: String,
    #[serde(rename = "bullets-advanced")]
    pub bullets_advanced: Vec<String>,
    #[serde(rename = "bullets-simple")]
    pub bullets_simple: Vec<String>,
    #[serde(rename = "body-advanced")]
    pub body_advanced: String,
    #[serde(rename = "body-simple")]
    pub body_simple: String,
}

#[derive(Debug, Clone)]
pub struct SynthesizedArticle {
    pub title_advanced: String,
    pub title_simple: String,
    pub bullets_advanced: Vec<String>,
    pub bullets_simple: Vec<String>,
    pub body_advanced: String,
    pub body_simple: String,
}

impl From<RawSynthResponse> for SynthesizedArticle {
    fn from(raw: RawSynthResponse) -> Self {
        Self {
            title_advanced: raw.title_advanced,
            title_simple: raw.title_simple,
            bullets_advanced: raw.bullets_advanced,
            bullets_simple: raw.bullets_simple,
            body_advanced: raw.body_advanced,
            body_simple: raw.body_simple,
        }
    }
}

pub struct Synthesizer {
    http: Arc<HttpClient>,
    primary: Arc<dyn LlmProvider>,
    fallback: Option<Arc<dyn LlmProvider>>,
    model: String,
}

impl Synthesizer {
    pub fn new(http: Arc<HttpClient>, primary: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            http,
            primary,
            fallback: None,
            model: model.into(),
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn LlmProvider>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Synthesizes `cluster`. Returns `Err` after three failed attempts —
    /// the caller defers the cluster to the next cycle (spec.md §4.6).
    pub async fn synthesize(&self, cluster: &EventCluster, category: Category) -> Result<SynthesizedArticle, PipelineError> {
        let mut last_err = PipelineError::Validation("no attempt made".to_string());

        for attempt in 1..=MAX_ATTEMPTS {
            let request = prompt::build_request(cluster, category, &self.model);

            let call_result = self.call_with_fallback(request).await;
            let raw = match call_result {
                Ok(completion) => salvage_json::<RawSynthResponse>(&completion),
                Err(err) => Err(err),
            };

            match raw {
                Ok(parsed) => match validate(&parsed) {
                    Ok(()) => return Ok(parsed.into()),
                    Err(reason) => {
                        debug!(cluster_id = %cluster.cluster_id, attempt, reason, "synthesizer: validation failed, retrying");
                        last_err = PipelineError::Validation(reason);
                    }
                },
                Err(err) => {
                    debug!(cluster_id = %cluster.cluster_id, attempt, error = %err, "synthesizer: call failed, retrying");
                    last_err = err;
                }
            }
        }

        warn!(cluster_id = %cluster.cluster_id, "synthesizer: exhausted all attempts, deferring cluster");
        Err(last_err)
    }

    async fn call_with_fallback(&self, request: news_client::ChatRequest) -> Result<String, PipelineError> {
        let endpoint = self.primary.endpoint_name().to_string();
        let primary = Arc::clone(&self.primary);
        let request_clone = request.clone();

        let primary_result = self
            .http
            .call_with_retry(&endpoint, move || {
                let primary = Arc::clone(&primary);
                let request = request_clone.clone();
                async move { primary.complete(request).await.map(|c| c.content) }
            })
            .await;

        match (primary_result, &self.fallback) {
            (Ok(content), _) => Ok(content),
            (Err(PipelineError::CircuitOpen(_)), Some(fallback)) => {
                debug!("synthesizer: primary circuit open, using fallback provider");
                let endpoint = fallback.endpoint_name().to_string();
                let fallback = Arc::clone(fallback);
                self.http
                    .call_with_retry(&endpoint, move || {
                        let fallback = Arc::clone(&fallback);
                        let request = request.clone();
                        async move { fallback.complete(request).await.map(|c| c.content) }
                    })
                    .await
            }
            (Err(err), _) => Err(err),
        }
    }
}
