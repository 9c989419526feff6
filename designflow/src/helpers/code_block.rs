//! Extraction of the fenced HTML block from model output.

use regex::Regex;
use std::sync::LazyLock;

#[allow(clippy::unwrap_used)]
static HTML_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```html\n([\s\S]+?)\n```").unwrap());

/// Returns the payload of the first ```` ```html ```` block.
///
/// The payload excludes the fence markers and the single newline after the
/// opening marker and before the closing one. `None` means the model skipped
/// the convention, which callers treat as "nothing to render yet".
#[must_use]
pub fn extract_html_block(output: &str) -> Option<&str> {
    HTML_BLOCK
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Returns the fenced HTML payload, or an empty string when there is none.
#[must_use]
pub fn html_or_empty(output: &str) -> &str {
    extract_html_block(output).unwrap_or_default()
}
