//! Stage 6 (spec.md §4.7): picks which visual components belong on an
//! article from the synthesized title alone. A selector reply that is
//! empty or names an unrecognized component falls back to a fixed,
//! category-driven default — the pipeline never fails to publish for want
//! of a component choice.

use std::collections::HashSet;
use std::sync::Arc;

use news_client::{salvage_json, ChatMessage, ChatRequest, LlmProvider};
use news_common::{Category, ComponentKind, PipelineError};
use news_http::HttpClient;
use serde::Deserialize;
use tracing::debug;

const MIN_COMPONENTS: usize = 1;
const MAX_COMPONENTS: usize = 4;

const SYSTEM_PROMPT: &str = "You select which visual components accompany a news \
article, from its headline alone. Choose an ordered, non-empty subset (at most four) \
of: timeline (evolving or historical stories — resignations, investigations, ongoing \
conflicts, policy changes), details (fact-heavy stories — casualties, specs, prices, \
measurements), graph (data/trend stories — rates, prices, polls, time series), map \
(geographic events — disasters, conflicts, multi-country events). Prefer quality over \
quantity: do not choose a component that would not genuinely help the reader. If you \
choose graph or map, also provide a one-sentence hint describing what data the \
generator should research. Reply with a single JSON object and nothing else: \
{\"components\": [<ordered list of component names>], \"hint\": <string or null>}.";

#[derive(Debug, Deserialize)]
struct RawSelection {
    components: Vec<String>,
    #[serde(default)]
    hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub components: Vec<ComponentKind>,
    pub hint: Option<String>,
}

pub struct ComponentSelector {
    http: Arc<HttpClient>,
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl ComponentSelector {
    pub fn new(http: Arc<HttpClient>, provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            http,
            provider,
            model: model.into(),
        }
    }

    pub async fn select(&self, title_advanced: &str, category: Category) -> Selection {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(format!("Headline: {title_advanced}"))],
            temperature: 0.2,
            max_tokens: Some(300),
        };

        let endpoint = self.provider.endpoint_name().to_string();
        let provider = Arc::clone(&self.provider);

        let result: Result<RawSelection, PipelineError> = self
            .http
            .call_with_retry(&endpoint, move || {
                let provider = Arc::clone(&provider);
                let request = request.clone();
                async move {
                    let completion = provider.complete(request).await?;
                    salvage_json::<RawSelection>(&completion.content)
                }
            })
            .await;

        match result {
            Ok(raw) => match parse_components(&raw.components) {
                Some(components) => Selection { components, hint: raw.hint },
                None => {
                    debug!(title_advanced, "component selector: invalid set, falling back to category default");
                    fallback_for_category(category)
                }
            },
            Err(err) => {
                debug!(title_advanced, error = %err, "component selector: call failed, falling back to category default");
                fallback_for_category(category)
            }
        }
    }
}

fn parse_components(raw: &[String]) -> Option<Vec<ComponentKind>> {
    if !(MIN_COMPONENTS..=MAX_COMPONENTS).contains(&raw.len()) {
        return None;
    }

    let mut seen = HashSet::new();
    let mut parsed = Vec::with_capacity(raw.len());
    for name in raw {
        let kind = match name.trim().to_lowercase().as_str() {
            "timeline" => ComponentKind::Timeline,
            "details" => ComponentKind::Details,
            "graph" => ComponentKind::Graph,
            "map" => ComponentKind::Map,
            _ => return None,
        };
        if !seen.insert(kind) {
            return None;
        }
        parsed.push(kind);
    }
    Some(parsed)
}

/// Category-based fallback (spec.md §4.7): geographic categories favor
/// `map`, economic categories favor `graph`; everything else defaults to
/// `timeline`. Every branch still carries `details`, which is also the
/// fallback of last resort.
fn fallback_for_category(category: Category) -> Selection {
    let components = if category.is_geographic() {
        vec![ComponentKind::Map, ComponentKind::Details]
    } else if category.is_economic() {
        vec![ComponentKind::Graph, ComponentKind::Details]
    } else {
        vec![ComponentKind::Timeline, ComponentKind::Details]
    };
    Selection { components, hint: None }
}
