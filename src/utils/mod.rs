//! Utility functions and helpers.

pub mod http;
pub mod log;
pub mod retry;
pub mod url;

use ::url::Url;
use unicode_segmentation::UnicodeSegmentation;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Collapse runs of whitespace (including line breaks) into single spaces.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut `text` to at most `max` user-perceived characters, adding an
/// ellipsis when something was dropped.
pub fn truncate_graphemes(text: &str, max: usize) -> String {
    let mut graphemes = text.graphemes(true);
    let kept: String = graphemes.by_ref().take(max).collect();
    if graphemes.next().is_some() {
        format!("{kept}…")
    } else {
        kept
    }
}
