//! Prompt contract for stage 1 (spec.md §4.2): the scorer is handed only
//! `title` and `source-name` — never the body — which keeps token cost
//! down and forces the model to rely on signals that generalise across
//! domains rather than leaking long-form source bias.

use news_client::{ChatMessage, ChatRequest};

const SYSTEM_PROMPT: &str = "You are a news importance classifier. Given only a \
headline and its source outlet, assign an importance score and a category. Reply \
with a single JSON object and nothing else: \
{\"importance\": <integer 0-1000>, \"category\": <one of world, politics, business, \
markets, technology, science, health, climate, sports, entertainment, other>, \
\"emoji\": <one grapheme that captures the story>, \"reasoning\": <short free text>}. \
Calibrate so that only the most significant 5-10% of headlines score above 700.";

pub fn build_request(title: &str, source_name: &str, model: &str) -> ChatRequest {
    let user = format!("Title: {title}\nSource: {source_name}");
    ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)],
        temperature: 0.2,
        max_tokens: Some(200),
    }
}
