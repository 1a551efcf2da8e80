use async_trait::async_trait;
use news_common::PipelineError;
use serde::{Deserialize, Serialize};

/// A single chat turn, generalized across providers (spec.md §6: "the
/// client must send a JSON body with model name and messages, and parse a
/// JSON body whose content field holds the model's reply text").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    /// Upper bound on reply size; providers that don't support this field
    /// ignore it.
    pub max_tokens: Option<u32>,
}

/// The finish condition a provider reports for a completion. `SafetyBlock`
/// maps directly to spec.md §7's "content rejected by LLM" error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    SafetyBlock,
}

#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub content: String,
    pub finish_reason: FinishReason,
}

/// Chat-completion-style provider abstraction. The core never depends on
/// provider-specific streaming (spec.md §6) — one blocking `complete` call
/// per prompt is sufficient for every stage in this pipeline.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Logical name used as the circuit-breaker/counter endpoint key, e.g.
    /// "openai-scorer" or "openai-writer".
    fn endpoint_name(&self) -> &str;

    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, PipelineError>;
}
