//! Structured results of dispatching an action, and their narration.

use crate::agent::page::truncate_chars;
use crate::agent::types::ScrollDirection;
use serde::{Deserialize, Serialize};

/// Coarse status of one dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Failure,
    /// Nothing went wrong but nothing was done either (unknown kind, unavailable feature)
    Info,
    /// Precondition not met, silently ignored
    Skipped,
}

/// Result of dispatching one action request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Wire name of the action kind
    pub action: String,
    pub detail: OutcomeDetail,
}

impl ActionOutcome {
    pub fn new(action: impl Into<String>, detail: OutcomeDetail) -> Self {
        Self {
            action: action.into(),
            detail,
        }
    }

    pub fn status(&self) -> OutcomeStatus {
        self.detail.status()
    }

    pub fn is_success(&self) -> bool {
        self.status() == OutcomeStatus::Success
    }
}

/// What happened, with the data the action produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeDetail {
    Navigated { url: String },
    Searching { query: String, url: String },
    Clicked { target: String },
    Typed { selector: String },
    FormFilled { count: usize, missing: usize },
    Scrolled { direction: ScrollDirection, delta: i64 },
    PageRead(PageSummary),
    TextFound { text: String },
    ScriptResult { value: Option<serde_json::Value> },
    Element(ElementInfo),
    Appeared { selector: String, elapsed_ms: u64 },
    WentBack,
    WentForward,
    Source(SourceSummary),

    NotFound { selector: String },
    InputNotFound { selector: String },
    TextNotFound { text: String },
    WaitTimedOut { selector: String, timeout_ms: u64 },
    ScriptFailed { message: String },
    PageFailed { message: String },
    InvalidAction { reason: String },

    HistoryUnavailable,
    NotAvailable { feature: String },
    UnknownAction,
}

impl OutcomeDetail {
    pub fn status(&self) -> OutcomeStatus {
        match self {
            Self::Navigated { .. }
            | Self::Searching { .. }
            | Self::Clicked { .. }
            | Self::Typed { .. }
            | Self::FormFilled { .. }
            | Self::Scrolled { .. }
            | Self::PageRead(_)
            | Self::TextFound { .. }
            | Self::ScriptResult { .. }
            | Self::Element(_)
            | Self::Appeared { .. }
            | Self::WentBack
            | Self::WentForward
            | Self::Source(_) => OutcomeStatus::Success,

            Self::NotFound { .. }
            | Self::InputNotFound { .. }
            | Self::TextNotFound { .. }
            | Self::WaitTimedOut { .. }
            | Self::ScriptFailed { .. }
            | Self::PageFailed { .. }
            | Self::InvalidAction { .. } => OutcomeStatus::Failure,

            Self::NotAvailable { .. } | Self::UnknownAction => OutcomeStatus::Info,

            Self::HistoryUnavailable => OutcomeStatus::Skipped,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkInfo {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub href: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSummary {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub links: Vec<LinkInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementAttribute {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementInfo {
    pub tag: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub attributes: Vec<ElementAttribute>,
}

/// A button, link or input listed by `view-source`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClickableElement {
    pub tag: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub classes: String,
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub input_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceSummary {
    /// Length of the full document markup in characters
    pub html_len: usize,
    pub elements: Vec<ClickableElement>,
}

/// Characters of page text shown when narrating `read-page`.
const READ_PAGE_PREVIEW: usize = 500;

/// Notice shown before an action starts, for actions that take a while.
pub fn narrate_start(action: &crate::agent::types::ActionRequest) -> Option<String> {
    match action {
        crate::agent::types::ActionRequest::Wait { selector, .. } => {
            Some(format!("⏳ Waiting for: {}", selector))
        }
        _ => None,
    }
}

/// Render an outcome for display. `None` means nothing should be shown.
pub fn narrate(outcome: &ActionOutcome) -> Option<String> {
    let text = match &outcome.detail {
        OutcomeDetail::Navigated { url } => format!("✓ Navigated to {}", url),
        OutcomeDetail::Searching { query, .. } => format!("✓ Searching for: {}", query),
        OutcomeDetail::Clicked { target } => format!("✓ Clicked: {}", target),
        OutcomeDetail::Typed { selector } => format!("✓ Typed into: {}", selector),
        OutcomeDetail::FormFilled { count, missing: 0 } => {
            format!("✓ Filled {} form fields", count)
        }
        OutcomeDetail::FormFilled { count, missing } => {
            format!("✓ Filled {} form fields ({} not found)", count, missing)
        }
        OutcomeDetail::Scrolled { direction, .. } => format!("✓ Scrolled {}", direction.as_str()),
        OutcomeDetail::PageRead(page) => format!(
            "Page: {}\n\nContent:\n{}...",
            page.title,
            truncate_chars(&page.text, READ_PAGE_PREVIEW)
        ),
        OutcomeDetail::TextFound { text } => format!("✓ Found: \"{}\"", text),
        OutcomeDetail::ScriptResult { value: Some(value) } => {
            format!("✓ Executed JavaScript: {}", value)
        }
        OutcomeDetail::ScriptResult { value: None } => "✓ Executed JavaScript".to_string(),
        OutcomeDetail::Element(info) => format!("Element: {}\nText: {}", info.tag, info.text),
        OutcomeDetail::Appeared { elapsed_ms, .. } => {
            format!("✓ Element appeared after {} ms", elapsed_ms)
        }
        OutcomeDetail::WentBack => "✓ Went back".to_string(),
        OutcomeDetail::WentForward => "✓ Went forward".to_string(),
        OutcomeDetail::Source(source) => {
            let mut out = String::from("Clickable elements found:\n");
            for (i, el) in source.elements.iter().enumerate() {
                out.push_str(&format!(
                    "{}. {} - \"{}\" (class: {}, id: {})\n",
                    i + 1,
                    el.tag,
                    el.text,
                    or_none(&el.classes),
                    or_none(&el.id)
                ));
            }
            out.push_str(&format!("\nFull HTML ({} chars)", source.html_len));
            out
        }
        OutcomeDetail::NotFound { selector } => format!("✗ Element not found: {}", selector),
        OutcomeDetail::InputNotFound { selector } => format!("✗ Input not found: {}", selector),
        OutcomeDetail::TextNotFound { text } => format!("✗ Not found: \"{}\"", text),
        OutcomeDetail::WaitTimedOut {
            selector,
            timeout_ms,
        } => format!(
            "✗ Timeout waiting for element: {} ({} ms)",
            selector, timeout_ms
        ),
        OutcomeDetail::ScriptFailed { message } | OutcomeDetail::PageFailed { message } => {
            format!("✗ Error: {}", message)
        }
        OutcomeDetail::InvalidAction { reason } => {
            format!("✗ Invalid {} action: {}", outcome.action, reason)
        }
        OutcomeDetail::NotAvailable { feature } => {
            format!("ℹ {} is not available yet", feature)
        }
        OutcomeDetail::UnknownAction => format!("Unknown action: {}", outcome.action),
        OutcomeDetail::HistoryUnavailable => return None,
    };
    Some(text)
}

fn or_none(value: &str) -> &str {
    if value.is_empty() {
        "none"
    } else {
        value
    }
}
