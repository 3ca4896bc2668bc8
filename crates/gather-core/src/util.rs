//! Small text helpers shared by config parsing and the remote store.

/// Longest error body kept in a message
const MAX_ERROR_TEXT: usize = 180;

/// Trimmed text, or `None` when nothing but whitespace was given.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToString::to_string)
}

/// Whether a configured URL carries an `http` or `https` scheme
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Squash an HTTP error body onto one short line.
///
/// Whitespace runs (newlines included) become a single space and the result
/// is cut at [`MAX_ERROR_TEXT`] characters.
pub fn compact_text(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_ERROR_TEXT)
        .collect()
}
