//! The highlight markup convention (spec.md §3, `TextualRef`): a substring
//! wrapped in a fenced delimiter pair marks a "highlight" (a named entity,
//! number, or key term) that a renderer may style. The core never
//! interprets the contents — it only guarantees the delimiters round-trip
//! through every stage and excludes them from word counts.

/// Opening delimiter. Doubled braces so the markup survives JSON string
/// transport without escaping and can't collide with normal prose.
pub const HIGHLIGHT_OPEN: &str = "{{";
pub const HIGHLIGHT_CLOSE: &str = "}}";

/// Strip highlight delimiters (but keep their contents) so word-count and
/// length validation operate on the reader-visible text, not the markup.
pub fn strip_highlight_markers(text: &str) -> String {
    text.replace(HIGHLIGHT_OPEN, "").replace(HIGHLIGHT_CLOSE, "")
}

/// True if every opening delimiter in `text` has a matching closing
/// delimiter, in order (no nesting, no overlap). A writer LLM that emits
/// unbalanced markers has produced a malformed response under spec.md §7.
pub fn has_balanced_highlights(text: &str) -> bool {
    let mut depth = 0i32;
    let mut rest = text;
    loop {
        let next_open = rest.find(HIGHLIGHT_OPEN);
        let next_close = rest.find(HIGHLIGHT_CLOSE);
        match (next_open, next_close) {
            (None, None) => return depth == 0,
            (Some(o), None) => {
                let _ = o;
                return false;
            }
            (None, Some(_)) => return false,
            (Some(o), Some(c)) => {
                if o < c {
                    depth += 1;
                    rest = &rest[o + HIGHLIGHT_OPEN.len()..];
                } else {
                    depth -= 1;
                    if depth < 0 {
                        return false;
                    }
                    rest = &rest[c + HIGHLIGHT_CLOSE.len()..];
                }
            }
        }
    }
}

/// Word count over the reader-visible text (highlight markers stripped).
/// Used to validate the 300-400 word body bounds and the bullet length
/// guidance in spec.md §4.6.
pub fn word_count(text: &str) -> usize {
    strip_highlight_markers(text)
        .split_whitespace()
        .count()
}
