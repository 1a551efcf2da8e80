//! Stage 1 (spec.md §4.2): classifies each surviving [`FeedEntry`] into a
//! kept [`ScoredEntry`] or a dropped outcome. Every input produces exactly
//! one [`ScoreOutcome`] so the caller can mark every URL into
//! ProcessedUrlMark regardless of outcome — that is the idempotence
//! boundary spec.md calls non-negotiable, and it happens one layer up in
//! `news-store`/`news-pipeline` since marking is a store concern, not a
//! scoring concern.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use news_client::{salvage_json, LlmProvider};
use news_common::{Category, FeedEntry, PipelineError, ScoredEntry};
use news_http::HttpClient;
use serde::Deserialize;
use tracing::debug;

use crate::prompt;

const DEFAULT_CONCURRENCY: usize = 16;

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    importance: u16,
    category: String,
    emoji: String,
    #[serde(default)]
    reasoning: String,
}

/// Why an entry was dropped rather than carried into clustering. Diagnostic
/// only — both kept and dropped outcomes are reported to the caller so
/// every entry, regardless of fate, can be marked processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// No image-url present; the LLM was never called (spec.md §4.2).
    MissingImage,
    BelowThreshold { importance: u16 },
    ContentRejected,
    Unparseable,
}

#[derive(Debug, Clone)]
pub enum ScoreOutcome {
    Kept(ScoredEntry),
    Dropped { entry: FeedEntry, reason: DropReason },
}

impl ScoreOutcome {
    pub fn url(&self) -> &str {
        match self {
            ScoreOutcome::Kept(scored) => scored.url(),
            ScoreOutcome::Dropped { entry, .. } => &entry.url,
        }
    }
}

pub struct Scorer {
    http: Arc<HttpClient>,
    provider: Arc<dyn LlmProvider>,
    model: String,
    importance_threshold: u16,
    concurrency: usize,
}

impl Scorer {
    pub fn new(http: Arc<HttpClient>, provider: Arc<dyn LlmProvider>, model: impl Into<String>, importance_threshold: u16) -> Self {
        Self::with_concurrency(http, provider, model, importance_threshold, DEFAULT_CONCURRENCY)
    }

    pub fn with_concurrency(
        http: Arc<HttpClient>,
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        importance_threshold: u16,
        concurrency: usize,
    ) -> Self {
        Self {
            http,
            provider,
            model: model.into(),
            importance_threshold,
            concurrency,
        }
    }

    /// Scores every entry, bounded to `self.concurrency` in-flight LLM
    /// calls. Returns one outcome per input entry, in no particular order.
    pub async fn score_batch(&self, entries: Vec<FeedEntry>) -> Vec<ScoreOutcome> {
        stream::iter(entries.into_iter().map(|entry| self.score_one(entry)))
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }

    async fn score_one(&self, entry: FeedEntry) -> ScoreOutcome {
        if entry.image_url.is_none() {
            debug!(url = %entry.url, "scorer: dropping entry without image-url, no LLM call made");
            return ScoreOutcome::Dropped {
                entry,
                reason: DropReason::MissingImage,
            };
        }

        let request = prompt::build_request(&entry.title, &entry.source_name, &self.model);
        let endpoint = self.provider.endpoint_name().to_string();
        let provider = Arc::clone(&self.provider);

        let result = self
            .http
            .call_with_retry(&endpoint, move || {
                let provider = Arc::clone(&provider);
                let request = request.clone();
                async move {
                    let completion = provider.complete(request).await?;
                    salvage_json::<ScoreResponse>(&completion.content)
                }
            })
            .await;

        match result {
            Ok(parsed) => {
                let importance = parsed.importance.min(1000);
                if importance < self.importance_threshold {
                    debug!(url = %entry.url, importance, "scorer: below publication threshold");
                    ScoreOutcome::Dropped {
                        entry,
                        reason: DropReason::BelowThreshold { importance },
                    }
                } else {
                    ScoreOutcome::Kept(ScoredEntry {
                        category: Category::parse_lenient(&parsed.category),
                        emoji: parsed.emoji.trim().to_string(),
                        score_reasoning: parsed.reasoning,
                        importance,
                        entry,
                    })
                }
            }
            Err(PipelineError::ContentRejected(_)) => ScoreOutcome::Dropped {
                entry,
                reason: DropReason::ContentRejected,
            },
            Err(err) => {
                debug!(url = %entry.url, error = %err, "scorer: giving up, dropping entry");
                ScoreOutcome::Dropped {
                    entry,
                    reason: DropReason::Unparseable,
                }
            }
        }
    }
}
