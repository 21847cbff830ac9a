//! Turning typed input and model requests into loadable URLs.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters left alone by JavaScript's `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub const DEFAULT_SEARCH_TEMPLATE: &str = "https://search.brave.com/search?q={query}";

/// Prefix `https://` unless the URL already names http or https.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

/// Substitute a percent-encoded query into a `{query}` template.
pub fn search_url(template: &str, query: &str) -> String {
    let encoded = utf8_percent_encode(query, COMPONENT).to_string();
    template.replace("{query}", &encoded)
}

/// Resolve what a user typed into the address bar.
///
/// Input with no dot that does not start with `http` is treated as a search.
pub fn resolve_input(input: &str, search_template: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if !input.contains('.') && !input.starts_with("http") {
        Some(search_url(search_template, input))
    } else {
        Some(normalize_url(input))
    }
}
