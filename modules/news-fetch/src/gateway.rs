//! The scraping gateway (spec.md §6): a third-party service that returns
//! clean article text and handles anti-bot measures on the collector's
//! behalf. Modeled as a trait so `news-pipeline` depends only on the
//! interface, never a concrete HTTP implementation (SPEC_FULL.md §6).

use async_trait::async_trait;
use news_common::PipelineError;
use serde::Deserialize;

#[async_trait]
pub trait ScrapingGateway: Send + Sync {
    /// Logical endpoint name for circuit-breaker/counter keying.
    fn endpoint_name(&self) -> &str;

    /// Fetches and extracts clean article text for `url`. Permanent
    /// failures (404, paywall, empty extraction) return
    /// [`PipelineError::PermanentUpstream`]; anything retryable returns
    /// [`PipelineError::TransientUpstream`] or [`PipelineError::RateLimited`].
    async fn fetch_text(&self, url: &str) -> Result<String, PipelineError>;
}

#[derive(Debug, Deserialize)]
struct GatewayEnvelope {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    html: Option<String>,
}

/// HTTP-backed gateway client. The request carries the target URL; the
/// response is a JSON envelope with an `html` or `text` field and a status
/// code (spec.md §6).
pub struct HttpScrapingGateway {
    endpoint_name: String,
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl HttpScrapingGateway {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint_name: "scraping-gateway".to_string(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ScrapingGateway for HttpScrapingGateway {
    fn endpoint_name(&self) -> &str {
        &self.endpoint_name
    }

    async fn fetch_text(&self, url: &str) -> Result<String, PipelineError> {
        let response = self
            .http
            .post(format!("{}/extract", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await
            .map_err(|e| PipelineError::TransientUpstream(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(5);
            return Err(PipelineError::RateLimited {
                retry_after_secs: retry_after,
                message: "scraping gateway rate limited".to_string(),
            });
        }
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
            return Err(PipelineError::PermanentUpstream(format!("gateway {status} for {url}")));
        }
        if status.is_server_error() {
            return Err(PipelineError::TransientUpstream(format!("gateway {status} for {url}")));
        }
        if !status.is_success() {
            return Err(PipelineError::PermanentUpstream(format!("gateway {status} for {url}")));
        }

        let envelope: GatewayEnvelope = response
            .json()
            .await
            .map_err(|e| PipelineError::MalformedResponse(e.to_string()))?;

        let text = match (envelope.text, envelope.html) {
            (Some(text), _) if !text.trim().is_empty() => text,
            (_, Some(html)) if !html.trim().is_empty() => news_feeds::html::strip_html(&html),
            _ => return Err(PipelineError::PermanentUpstream(format!("empty extraction for {url}"))),
        };

        Ok(text)
    }
}
