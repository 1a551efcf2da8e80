//! The match decision (spec.md §4.3): rules are evaluated in order, first
//! rule that fires wins. The reject floor is evaluated before Moderate/
//! Entity — without it, two unrelated articles sharing a handful of common
//! words could otherwise collide via keyword or entity overlap alone.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    Strong,
    Moderate,
    Entity,
}

pub const STRONG_THRESHOLD: f64 = 0.75;
pub const REJECT_FLOOR: f64 = 0.35;
pub const MODERATE_KEYWORD_OVERLAP: usize = 5;
pub const ENTITY_OVERLAP_MIN: usize = 2;

/// Pure decision function (spec.md §4.3, §8 testable property 6). Returns
/// the rule that fired, or `None` if no rule matched this candidate.
pub fn decide(title_similarity: f64, keyword_overlap: usize, entity_overlap: usize) -> Option<MatchRule> {
    if title_similarity >= STRONG_THRESHOLD {
        return Some(MatchRule::Strong);
    }
    if title_similarity < REJECT_FLOOR {
        return None;
    }
    if keyword_overlap >= MODERATE_KEYWORD_OVERLAP {
        return Some(MatchRule::Moderate);
    }
    if entity_overlap >= ENTITY_OVERLAP_MIN {
        return Some(MatchRule::Entity);
    }
    None
}
