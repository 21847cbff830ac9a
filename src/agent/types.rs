use serde::{Deserialize, Deserializer, Serialize};

/// Every action kind the dispatcher understands, in wire spelling.
pub const KNOWN_ACTIONS: &[&str] = &[
    "navigate",
    "search",
    "click",
    "type",
    "fill-form",
    "scroll",
    "read-page",
    "find-text",
    "screenshot",
    "execute-script",
    "execute-js",
    "get-element",
    "wait",
    "go-back",
    "go-forward",
    "view-source",
];

/// A page-manipulation request decoded from model output.
///
/// The wire shape is a flat JSON object whose `action` key names the kind,
/// e.g. `{"action": "click", "selector": "button.login"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum ActionRequest {
    /// Load a URL in the current page
    Navigate { url: String },
    /// Run a query through the configured search engine
    Search { query: String },
    /// Click the first element matching a selector
    Click {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// Set the value of an input
    Type { selector: String, text: String },
    /// Set several inputs, in order
    FillForm { fields: Vec<FormField> },
    /// Scroll vertically
    Scroll {
        #[serde(default)]
        direction: ScrollDirection,
        #[serde(default = "default_scroll_amount", deserialize_with = "whole_number")]
        amount: u32,
    },
    ReadPage,
    FindText { text: String },
    Screenshot,
    /// Run arbitrary script in the page
    #[serde(alias = "execute-js")]
    ExecuteScript { code: String },
    GetElement { selector: String },
    /// Wait for a selector to appear
    Wait {
        selector: String,
        /// Milliseconds
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            deserialize_with = "optional_whole_number"
        )]
        timeout: Option<u64>,
    },
    GoBack,
    GoForward,
    ViewSource,
    /// A kind outside the vocabulary
    #[serde(skip)]
    Unknown { kind: String },
    /// A known kind whose fields could not be decoded
    #[serde(skip)]
    Invalid { kind: String, reason: String },
}

fn default_scroll_amount() -> u32 {
    500
}

/// Any JSON number, truncated. Negative values become zero.
fn whole_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Ok(f64::deserialize(deserializer)? as u32)
}

fn optional_whole_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<u64>, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.map(|n| n as u64))
}

impl ActionRequest {
    /// Build a request from a decoded JSON object.
    ///
    /// Returns `None` when the object carries no usable `action` key. Unknown
    /// kinds and known kinds with bad fields still produce a request so the
    /// dispatcher can report on them.
    pub fn from_value(mut value: serde_json::Value) -> Option<Self> {
        let kind = match value.get("action")? {
            serde_json::Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
            serde_json::Value::String(_) | serde_json::Value::Null => return None,
            serde_json::Value::Bool(false) => return None,
            other => other.to_string(),
        };

        if !KNOWN_ACTIONS.contains(&kind.as_str()) {
            return Some(Self::Unknown { kind });
        }
        if let Some(object) = value.as_object_mut() {
            object.insert("action".to_string(), serde_json::Value::String(kind.clone()));
        }

        match serde_json::from_value::<ActionRequest>(value) {
            Ok(action) => Some(action),
            Err(e) => Some(Self::Invalid {
                kind,
                reason: e.to_string(),
            }),
        }
    }

    /// Wire name of this request's kind.
    pub fn kind(&self) -> &str {
        match self {
            Self::Navigate { .. } => "navigate",
            Self::Search { .. } => "search",
            Self::Click { .. } => "click",
            Self::Type { .. } => "type",
            Self::FillForm { .. } => "fill-form",
            Self::Scroll { .. } => "scroll",
            Self::ReadPage => "read-page",
            Self::FindText { .. } => "find-text",
            Self::Screenshot => "screenshot",
            Self::ExecuteScript { .. } => "execute-script",
            Self::GetElement { .. } => "get-element",
            Self::Wait { .. } => "wait",
            Self::GoBack => "go-back",
            Self::GoForward => "go-forward",
            Self::ViewSource => "view-source",
            Self::Unknown { kind } | Self::Invalid { kind, .. } => kind,
        }
    }
}

/// One entry of a `fill-form` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub selector: String,
    pub value: String,
}

/// Scroll direction. Anything other than `down` scrolls up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ScrollDirection {
    #[default]
    Down,
    Up,
}

impl From<String> for ScrollDirection {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("down") {
            Self::Down
        } else {
            Self::Up
        }
    }
}

impl ScrollDirection {
    /// Signed vertical delta for a scroll of `amount` pixels.
    pub fn delta(self, amount: u32) -> i64 {
        match self {
            Self::Down => i64::from(amount),
            Self::Up => -i64::from(amount),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Down => "down",
            Self::Up => "up",
        }
    }
}

/// LLM message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LLMMessage {
    pub role: String,
    pub content: String,
}

impl LLMMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// LLM response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
}

/// Token usage statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}
