//! HTML-to-text stripping and image URL extraction fallback chain
//! (spec.md §4.1): enclosure -> media namespace -> first `<img>` in
//! content/summary -> Open-Graph tag fetched from the article page.

use scraper::{Html, Selector};

/// Strips tags from a summary/body fragment with a tolerant HTML parser,
/// collapsing runs of whitespace left behind by block elements.
pub fn strip_html(fragment: &str) -> String {
    let document = Html::parse_fragment(fragment);
    let text = document.root_element().text().collect::<Vec<_>>().join(" ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First `<img src="...">` found in an HTML fragment, if any.
pub fn first_img_src(fragment: &str) -> Option<String> {
    let document = Html::parse_fragment(fragment);
    let selector = Selector::parse("img").ok()?;
    document
        .select(&selector)
        .find_map(|el| el.value().attr("src"))
        .map(|s| s.to_string())
}

/// Open-Graph `og:image` content, read from a fetched page's `<head>`. Used
/// only as the last resort in the image fallback chain, since it requires a
/// network round-trip against the article page rather than the feed
/// payload.
pub fn extract_og_image(page_html: &str) -> Option<String> {
    let document = Html::parse_document(page_html);
    let selector = Selector::parse(r#"meta[property="og:image"]"#).ok()?;
    document
        .select(&selector)
        .find_map(|el| el.value().attr("content"))
        .map(|s| s.to_string())
}
