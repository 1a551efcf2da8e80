//! Prompt contract for the synthesizer (spec.md §4.6): a single writer call
//! turns up to ten ranked sources into a dual-register article. The system
//! prompt encodes the semantic rules that can't be checked mechanically
//! (attribution style, numeric hedging, ordering) — [`validate`] only
//! catches the rules that can be (counts, markers).

use news_client::{ChatMessage, ChatRequest};
use news_common::{Category, EventCluster};

const MAX_SOURCES: usize = 10;
const MAX_SOURCE_CHARS: usize = 1500;

const SYSTEM_PROMPT: &str = "You are a wire synthesizer. You are given a canonical \
headline, a category, and several source excerpts describing the same event. Write a \
single article in two registers without ever attributing claims to a specific outlet \
(no \"according to\", no outlet names in prose) — write as first-party reporting of \
the event itself. When sources disagree on a number, prefer the most recent source or \
hedge with \"at least\". Order the body in inverted-pyramid form: the most important \
fact first. Never repeat the headline verbatim as the first sentence of the body. Wrap \
every named entity, number, date, and key term in double curly braces, e.g. \
{{7.8-magnitude}} quake hit {{Gaziantep}}. Reply with a single JSON object and nothing \
else, using exactly these keys: \"title-advanced\", \"title-simple\", \
\"bullets-advanced\" (array of 3-5 strings), \"bullets-simple\" (array of 3-5 strings), \
\"body-advanced\" (300-400 words), \"body-simple\" (300-400 words, shorter sentences \
and plainer vocabulary than the advanced body but the same facts).";

pub fn build_request(cluster: &EventCluster, category: Category, model: &str) -> ChatRequest {
    let user = build_user_prompt(cluster, category);
    ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)],
        temperature: 0.4,
        max_tokens: Some(2200),
    }
}

fn build_user_prompt(cluster: &EventCluster, category: Category) -> String {
    let mut ranked: Vec<_> = cluster.members.iter().collect();
    ranked.sort_by(|a, b| b.scored.importance.cmp(&a.scored.importance));
    ranked.truncate(MAX_SOURCES);

    let mut out = format!("Headline anchor: {}\nCategory: {:?}\n\nSources:\n", cluster.canonical_title, category);
    for (i, member) in ranked.iter().enumerate() {
        let text = truncate_chars(member.synthesis_text(), MAX_SOURCE_CHARS);
        out.push_str(&format!("[{}] {} — {}\n\n", i + 1, member.scored.entry.source_name, text));
    }
    out
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}
