//! The capability surface the agent uses to reach the active page.

use crate::error::PageError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Handle to whatever document a tab is currently showing.
///
/// Every call suspends until the page answers. Implementations report a
/// throwing page-side script as [`PageError::Script`].
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Evaluate a script and return its value.
    async fn run_script(&self, code: &str) -> Result<Value, PageError>;

    /// Call a fixed function declaration with JSON arguments.
    ///
    /// Arguments travel as data, never as script text.
    async fn call_function(&self, declaration: &str, args: Vec<Value>)
        -> Result<Value, PageError>;

    async fn current_url(&self) -> Result<String, PageError>;

    async fn load(&self, url: &str) -> Result<(), PageError>;

    async fn can_go_back(&self) -> Result<bool, PageError>;

    async fn can_go_forward(&self) -> Result<bool, PageError>;

    async fn go_back(&self) -> Result<(), PageError>;

    async fn go_forward(&self) -> Result<(), PageError>;

    /// Highlight `text` with the page's native find.
    async fn find_in_page(&self, text: &str) -> Result<(), PageError> {
        self.call_function(functions::FIND_IN_PAGE, vec![json!(text)])
            .await
            .map(|_| ())
    }

    /// Release the page. Further calls may fail with [`PageError::Closed`].
    async fn close(&self) -> Result<(), PageError> {
        Ok(())
    }
}

/// Page-side functions. Each is a plain declaration whose parameters are
/// supplied per call.
pub mod functions {
    pub const CLICK: &str = r#"function(selector) {
        const el = document.querySelector(selector);
        if (el) {
            el.click();
            return true;
        }
        return false;
    }"#;

    pub const SET_VALUE: &str = r#"function(selector, value) {
        const el = document.querySelector(selector);
        if (!el) return false;
        el.focus();
        el.value = value;
        el.dispatchEvent(new Event('input', { bubbles: true }));
        el.dispatchEvent(new Event('change', { bubbles: true }));
        return true;
    }"#;

    pub const SCROLL_BY: &str = r#"function(dy) {
        window.scrollBy(0, dy);
        return window.scrollY;
    }"#;

    pub const READ_PAGE: &str = r#"function(maxChars, maxLinks) {
        try {
            const text = document.body ? document.body.innerText : '';
            return {
                title: document.title,
                url: window.location.href,
                text: text.substring(0, maxChars),
                links: Array.from(document.querySelectorAll('a')).slice(0, maxLinks)
                    .map(a => ({ text: a.innerText, href: a.href }))
            };
        } catch (e) {
            return { title: '', url: '', text: '', links: [] };
        }
    }"#;

    pub const CONTAINS_TEXT: &str = r#"function(text) {
        return !!document.body && document.body.innerText.includes(text);
    }"#;

    pub const FIND_IN_PAGE: &str = r#"function(text) {
        return window.find(text);
    }"#;

    pub const ELEMENT_INFO: &str = r#"function(selector, maxText, maxHtml) {
        const el = document.querySelector(selector);
        if (!el) return null;
        return {
            tag: el.tagName,
            text: (el.innerText || '').substring(0, maxText),
            html: (el.innerHTML || '').substring(0, maxHtml),
            attributes: Array.from(el.attributes).map(a => ({ name: a.name, value: a.value }))
        };
    }"#;

    pub const EXISTS: &str = r#"function(selector) {
        return !!document.querySelector(selector);
    }"#;

    pub const VIEW_SOURCE: &str = r#"function(maxElements) {
        try {
            const nodes = document.querySelectorAll(
                'button, a, input[type="button"], input[type="submit"]');
            return {
                html: document.documentElement.outerHTML,
                elements: Array.from(nodes).slice(0, maxElements).map(el => ({
                    tag: el.tagName,
                    text: el.innerText || el.value || el.getAttribute('aria-label') || '',
                    classes: typeof el.className === 'string' ? el.className : '',
                    id: el.id || '',
                    type: el.type || ''
                }))
            };
        } catch (e) {
            return { html: '', elements: [] };
        }
    }"#;

    pub const PAGE_CONTEXT: &str = r#"function(maxText, maxHtml) {
        try {
            return {
                title: document.title,
                url: window.location.href,
                text: document.body ? document.body.innerText.substring(0, maxText) : '',
                html_snippet: document.documentElement.outerHTML.substring(0, maxHtml)
            };
        } catch (e) {
            return { title: '', url: '', text: '', html_snippet: '' };
        }
    }"#;
}

/// Snapshot of the page handed to the model alongside a user message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageContext {
    pub title: String,
    pub url: String,
    /// Visible text (truncated)
    pub text: String,
    /// Leading markup (truncated)
    pub html_snippet: String,
}

impl PageContext {
    pub const TEXT_LIMIT: usize = 2000;
    pub const HTML_LIMIT: usize = 3000;

    /// Capture the current page. `None` when the page cannot answer.
    pub async fn capture(page: &dyn PageHandle) -> Option<Self> {
        let value = page
            .call_function(
                functions::PAGE_CONTEXT,
                vec![json!(Self::TEXT_LIMIT), json!(Self::HTML_LIMIT)],
            )
            .await;

        match value {
            Ok(value) => serde_json::from_value(value).ok(),
            Err(e) => {
                tracing::warn!("Failed to capture page context: {}", e);
                None
            }
        }
    }
}

/// Truncate to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_page_context_decodes_script_shape() {
        let value = json!({
            "title": "Example",
            "url": "https://example.com/",
            "text": "Hello",
            "html_snippet": "<html>"
        });
        let ctx: PageContext = serde_json::from_value(value).unwrap();
        assert_eq!(ctx.title, "Example");
        assert_eq!(ctx.html_snippet, "<html>");
    }
}
