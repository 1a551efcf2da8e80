//! Validation gate for a synthesizer reply (spec.md §4.6, §8 testable
//! property 4): word counts, bullet counts and highlight-marker balance. A
//! response that fails here counts as a validation retry, not a network
//! retry — it came back successfully, it's just unusable.

use news_common::highlight::{has_balanced_highlights, word_count};

use crate::synthesizer::RawSynthResponse;

const MIN_BODY_WORDS: usize = 270;
const MAX_BODY_WORDS: usize = 440;
const MIN_BULLETS: usize = 3;
const MAX_BULLETS: usize = 5;

pub fn validate(raw: &RawSynthResponse) -> Result<(), String> {
    if raw.title_advanced.trim().is_empty() || raw.title_simple.trim().is_empty() {
        return Err("title must not be empty".to_string());
    }

    validate_bullets(&raw.bullets_advanced, "bullets-advanced")?;
    validate_bullets(&raw.bullets_simple, "bullets-simple")?;

    validate_body(&raw.body_advanced, "body-advanced")?;
    validate_body(&raw.body_simple, "body-simple")?;

    Ok(())
}

fn validate_bullets(bullets: &[String], field: &str) -> Result<(), String> {
    if !(MIN_BULLETS..=MAX_BULLETS).contains(&bullets.len()) {
        return Err(format!("{field}: expected {MIN_BULLETS}-{MAX_BULLETS} bullets, got {}", bullets.len()));
    }
    if bullets.iter().any(|b| b.trim().is_empty()) {
        return Err(format!("{field}: contains an empty bullet"));
    }
    Ok(())
}

fn validate_body(body: &str, field: &str) -> Result<(), String> {
    let words = word_count(body);
    if !(MIN_BODY_WORDS..=MAX_BODY_WORDS).contains(&words) {
        return Err(format!("{field}: expected {MIN_BODY_WORDS}-{MAX_BODY_WORDS} words, got {words}"));
    }
    if !has_balanced_highlights(body) {
        return Err(format!("{field}: unbalanced highlight markers"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_of(words: usize) -> String {
        vec!["word"; words].join(" ")
    }

    fn valid_response() -> RawSynthResponse {
        RawSynthResponse {
            title_advanced: "Title".into(),
            title_simple: "Title".into(),
            bullets_advanced: vec!["one".into(), "two".into(), "three".into()],
            bullets_simple: vec!["one".into(), "two".into(), "three".into()],
            body_advanced: body_of(350),
            body_simple: body_of(350),
        }
    }

    #[test]
    fn accepts_well_formed_response() {
        assert!(validate(&valid_response()).is_ok());
    }

    #[test]
    fn rejects_body_below_minimum_word_count() {
        let mut raw = valid_response();
        raw.body_advanced = body_of(100);
        assert!(validate(&raw).is_err());
    }

    #[test]
    fn rejects_body_above_maximum_word_count() {
        let mut raw = valid_response();
        raw.body_simple = body_of(500);
        assert!(validate(&raw).is_err());
    }

    #[test]
    fn rejects_too_few_bullets() {
        let mut raw = valid_response();
        raw.bullets_advanced = vec!["only one".into()];
        assert!(validate(&raw).is_err());
    }

    #[test]
    fn rejects_too_many_bullets() {
        let mut raw = valid_response();
        raw.bullets_simple = vec!["a".into(), "b".into(), "c".into(), "d".into(), "e".into(), "f".into()];
        assert!(validate(&raw).is_err());
    }

    #[test]
    fn rejects_unbalanced_highlight_markers() {
        let mut raw = valid_response();
        raw.body_advanced = format!("{{{{unbalanced {}", body_of(349));
        assert!(validate(&raw).is_err());
    }

    #[test]
    fn boundary_word_counts_are_accepted() {
        let mut raw = valid_response();
        raw.body_advanced = body_of(270);
        raw.body_simple = body_of(440);
        assert!(validate(&raw).is_ok());
    }
}
