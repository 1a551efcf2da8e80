//! Title tokenisation, keyword extraction, and entity extraction (spec.md
//! §4.3 "Preparation per entry"). The exact significance-filter vocabulary
//! is a tunable list outside this design (spec.md §9 Open Questions); the
//! list here is a small, illustrative seed — operators are expected to
//! replace it with a curated list for their domain.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "of", "in", "on", "at", "to", "for", "and", "or", "is", "are", "was",
    "were", "with", "by", "from", "as", "that", "this", "it", "its", "be", "has", "have", "had",
    "will", "after", "over", "amid", "into", "their", "his", "her", "than", "but", "not", "no",
    "up", "out", "about", "against", "between", "during", "before", "under", "more", "most",
    "new", "says", "said", "how", "why", "what", "who", "amid",
];

/// A small seed of words that signal story substance across domains.
/// Keyword-set extraction falls back to top-N content tokens when a
/// title's tokens don't intersect this list at all (spec.md §9).
const SIGNIFICANCE_FILTER: &[&str] = &[
    "earthquake", "war", "conflict", "election", "president", "prime", "minister", "attack",
    "strike", "ceasefire", "invasion", "protest", "resignation", "investigation", "indictment",
    "trial", "verdict", "merger", "acquisition", "bankruptcy", "ipo", "recall", "outbreak",
    "pandemic", "hurricane", "flood", "wildfire", "explosion", "shooting", "coup", "sanctions",
    "tariff", "summit", "treaty", "crash", "collapse", "layoffs", "earnings", "inflation",
    "recession", "launch", "breakthrough", "vaccine", "diagnosis", "extradition", "ruling",
    "impeachment", "quake", "magnitude", "earthquake", "storm", "drought", "famine",
];

const MAX_FALLBACK_KEYWORDS: usize = 8;

/// Lowercase, strip punctuation, drop the stopword list. Tokens shorter
/// than two characters are dropped as noise.
pub fn title_tokens(title: &str) -> Vec<String> {
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.len() > 1 && !STOPWORDS.contains(s))
        .map(|s| s.to_string())
        .collect()
}

/// Keyword-set: the intersection of `tokens` with the significance filter,
/// or the top-N remaining content tokens if the filter matches nothing.
pub fn keyword_set(tokens: &[String]) -> HashSet<String> {
    let significant: HashSet<String> = tokens
        .iter()
        .filter(|t| SIGNIFICANCE_FILTER.contains(&t.as_str()))
        .cloned()
        .collect();
    if !significant.is_empty() {
        return significant;
    }
    tokens.iter().take(MAX_FALLBACK_KEYWORDS).cloned().collect()
}

fn capitalized_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Z][\w'’.-]*(?:\s+[A-Z][\w'’.-]*)*\b").unwrap())
}

fn numeric_unit_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$?\d[\d,.]*(?:-[a-zA-Z]+)?%?").unwrap())
}

/// Entity-set: runs of capitalised tokens in the original (un-lowercased)
/// title, plus numeric+unit pairs like "7.8-magnitude" or "$999" (spec.md
/// §4.3).
pub fn entity_set(title: &str) -> HashSet<String> {
    let mut set = HashSet::new();
    for m in capitalized_run_regex().find_iter(title) {
        let text = m.as_str().trim();
        if text.chars().count() > 1 {
            set.insert(text.to_string());
        }
    }
    for m in numeric_unit_regex().find_iter(title) {
        set.insert(m.as_str().to_string());
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_lowercase_and_strips_punctuation() {
        let tokens = title_tokens("Apple Announces iPhone 16 at $999");
        assert!(tokens.contains(&"apple".to_string()));
        assert!(tokens.contains(&"announces".to_string()));
        assert!(tokens.contains(&"iphone".to_string()));
        assert!(!tokens.contains(&"at".to_string()));
    }

    #[test]
    fn keyword_set_uses_significance_filter_when_present() {
        let tokens = title_tokens("Magnitude 7.8 earthquake strikes near Gaziantep");
        let kw = keyword_set(&tokens);
        assert!(kw.contains("earthquake"));
        assert!(kw.contains("magnitude"));
    }

    #[test]
    fn keyword_set_falls_back_to_top_n_tokens() {
        let tokens = title_tokens("Local bakery wins regional pastry award");
        let kw = keyword_set(&tokens);
        assert!(!kw.is_empty());
        assert!(kw.len() <= MAX_FALLBACK_KEYWORDS);
    }

    #[test]
    fn entity_set_finds_capitalized_runs() {
        let ents = entity_set("Earthquake Near Gaziantep Kills Dozens");
        assert!(ents.iter().any(|e| e.contains("Gaziantep")));
    }

    #[test]
    fn entity_set_finds_numeric_unit_pairs() {
        let ents = entity_set("7.8-magnitude earthquake hits Turkey");
        assert!(ents.contains("7.8-magnitude"));
    }

    #[test]
    fn entity_set_finds_dollar_amounts() {
        let ents = entity_set("Apple announces iPhone 16 at $999");
        assert!(ents.iter().any(|e| e.starts_with('$')));
    }
}
