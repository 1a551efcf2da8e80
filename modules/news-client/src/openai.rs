//! An OpenAI-compatible chat-completion provider (bearer auth header,
//! `/chat/completions` endpoint, one JSON body in, one JSON body out).
//! One of potentially several interchangeable `LlmProvider`s so the
//! Synthesizer and Component Generator can fall back between providers
//! (spec.md §5).

use async_trait::async_trait;
use news_common::PipelineError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::provider::{ChatCompletion, ChatRequest, FinishReason, LlmProvider};

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireChoiceMessage {
    content: Option<String>,
}

pub struct OpenAiCompatibleProvider {
    endpoint_name: String,
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(endpoint_name: impl Into<String>, api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            endpoint_name: endpoint_name.into(),
            api_key: api_key.into(),
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    fn headers(&self) -> Result<HeaderMap, PipelineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| PipelineError::Config(e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn endpoint_name(&self) -> &str {
        &self.endpoint_name
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, PipelineError> {
        let url = format!("{}/chat/completions", self.base_url);
        let wire = WireRequest {
            model: request.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: match m.role {
                        crate::provider::Role::System => "system".to_string(),
                        crate::provider::Role::User => "user".to_string(),
                    },
                    content: m.content.clone(),
                })
                .collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!(model = %request.model, endpoint = %self.endpoint_name, "LLM chat request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&wire)
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
                message: format!("{} rate limited", self.endpoint_name),
            });
        }
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::TransientUpstream(format!(
                "{} {status}: {body}",
                self.endpoint_name
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::PermanentUpstream(format!(
                "{} {status}: {body}",
                self.endpoint_name
            )));
        }

        let body: WireResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::MalformedResponse(e.to_string()))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::MalformedResponse("no choices in response".to_string()))?;

        let finish_reason = match choice.finish_reason.as_deref() {
            Some("content_filter") => FinishReason::SafetyBlock,
            Some("length") => FinishReason::Length,
            _ => FinishReason::Stop,
        };

        if finish_reason == FinishReason::SafetyBlock {
            return Err(PipelineError::ContentRejected(format!(
                "{} finish_reason=content_filter",
                self.endpoint_name
            )));
        }

        let content = choice
            .message
            .content
            .ok_or_else(|| PipelineError::MalformedResponse("no content in choice".to_string()))?;

        Ok(ChatCompletion { content, finish_reason })
    }
}
