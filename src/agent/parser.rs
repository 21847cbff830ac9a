//! Splits a model reply into prose and the action requests embedded in it.
//!
//! Two forms are recognised. A fenced block tagged `action` holds either one
//! JSON object or an array of them and is decoded exactly. Outside fences,
//! any flat `{...}` containing the literal key `"action"` is decoded as a
//! single object.

use crate::agent::types::ActionRequest;
use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

fn fenced_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)```action[ \t]*\r?\n(.*?)```").expect("valid regex"))
}

fn inline_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"\{[^{}]*"action"[^{}]*\}"#).expect("valid regex"))
}

/// A reply separated into narration and actions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedReply {
    /// Remaining text, trimmed. Empty means there is nothing to narrate.
    pub prose: String,
    /// Actions in order of appearance
    pub actions: Vec<ActionRequest>,
    /// Action-like fragments that failed to decode and were dropped
    pub rejected: Vec<String>,
}

impl ParsedReply {
    pub fn has_prose(&self) -> bool {
        !self.prose.is_empty()
    }

    pub fn has_actions(&self) -> bool {
        !self.actions.is_empty()
    }
}

/// Extract action requests from `reply`.
pub fn parse(reply: &str) -> ParsedReply {
    // (offset, actions found there)
    let mut found: Vec<(usize, Vec<ActionRequest>)> = Vec::new();
    let mut removed: Vec<Range<usize>> = Vec::new();
    let mut rejected = Vec::new();

    for caps in fenced_pattern().captures_iter(reply) {
        let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        match decode_fenced(body.as_str()) {
            Some(actions) => found.push((whole.start(), actions)),
            None if body.as_str().contains("\"action\"") => {
                rejected.push(whole.as_str().to_string())
            }
            // not an action block after all, leave it to the reader
            None => continue,
        }
        removed.push(whole.range());
    }

    let fenced = removed.clone();
    for m in inline_pattern().find_iter(reply) {
        if fenced.iter().any(|r| r.start < m.end() && m.start() < r.end) {
            continue;
        }
        match serde_json::from_str::<serde_json::Value>(m.as_str()) {
            Ok(value) => {
                if let Some(action) = ActionRequest::from_value(value) {
                    found.push((m.start(), vec![action]));
                    removed.push(m.range());
                }
            }
            Err(e) => {
                tracing::debug!("Dropping malformed action fragment: {}", e);
                rejected.push(m.as_str().to_string());
                removed.push(m.range());
            }
        }
    }

    if removed.is_empty() {
        return ParsedReply {
            prose: reply.to_string(),
            actions: Vec::new(),
            rejected,
        };
    }

    found.sort_by_key(|(offset, _)| *offset);
    removed.sort_by_key(|r| r.start);

    let mut prose = String::with_capacity(reply.len());
    let mut cursor = 0;
    for range in removed {
        prose.push_str(&reply[cursor..range.start]);
        cursor = range.end;
    }
    prose.push_str(&reply[cursor..]);

    ParsedReply {
        prose: prose.trim().to_string(),
        actions: found.into_iter().flat_map(|(_, actions)| actions).collect(),
        rejected,
    }
}

/// Decode the body of a fenced block. `None` if nothing usable is inside.
fn decode_fenced(body: &str) -> Option<Vec<ActionRequest>> {
    let value: serde_json::Value = serde_json::from_str(body.trim()).ok()?;
    let actions: Vec<ActionRequest> = match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(ActionRequest::from_value)
            .collect(),
        other => ActionRequest::from_value(other).into_iter().collect(),
    };
    if actions.is_empty() {
        None
    } else {
        Some(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::types::ScrollDirection;

    #[test]
    fn test_plain_text_is_untouched() {
        let reply = "  Hello there, nothing to do.\n";
        let parsed = parse(reply);
        assert_eq!(parsed.prose, reply);
        assert!(parsed.actions.is_empty());
        assert!(parsed.rejected.is_empty());
    }

    #[test]
    fn test_single_inline_action() {
        let reply = r#"Let me click that button for you. {"action": "click", "selector": "button.submit"}"#;
        let parsed = parse(reply);
        assert_eq!(parsed.prose, "Let me click that button for you.");
        assert_eq!(
            parsed.actions,
            vec![ActionRequest::Click {
                selector: "button.submit".to_string(),
                description: None
            }]
        );
    }

    #[test]
    fn test_actions_keep_source_order() {
        let reply = r#"First I'll scroll {"action": "scroll", "direction": "down", "amount": 500} then click {"action": "click", "selector": ".video"} and read {"action": "read-page"}"#;
        let parsed = parse(reply);
        let kinds: Vec<&str> = parsed.actions.iter().map(|a| a.kind()).collect();
        assert_eq!(kinds, vec!["scroll", "click", "read-page"]);
        assert_eq!(
            parsed.actions[0],
            ActionRequest::Scroll {
                direction: ScrollDirection::Down,
                amount: 500
            }
        );
        assert_eq!(parsed.prose, "First I'll scroll  then click  and read");
    }

    #[test]
    fn test_malformed_fragment_is_dropped() {
        let reply = r#"Going now {"action": "navigate", "url": "https://example.com} done"#;
        let parsed = parse(reply);
        assert!(parsed.actions.is_empty());
        assert_eq!(parsed.prose, "Going now  done");
        assert!(!parsed.prose.contains("action"));
        assert_eq!(parsed.rejected.len(), 1);
    }

    #[test]
    fn test_reply_fully_consumed() {
        let parsed = parse(r#"  {"action": "go-back"}  "#);
        assert_eq!(parsed.prose, "");
        assert!(!parsed.has_prose());
        assert_eq!(parsed.actions, vec![ActionRequest::GoBack]);
    }

    #[test]
    fn test_empty_action_key_stays_in_prose() {
        let reply = r#"Example: {"action": ""}"#;
        let parsed = parse(reply);
        assert_eq!(parsed.prose, reply);
        assert!(parsed.actions.is_empty());
    }

    #[test]
    fn test_nested_objects_are_not_matched() {
        let reply = r#"{"action": {"type": "navigate"}}"#;
        let parsed = parse(reply);
        assert!(parsed.actions.is_empty());
    }

    #[test]
    fn test_fenced_array() {
        let reply = "Filling in the login.\n```action\n[{\"action\": \"type\", \"selector\": \"#user\", \"text\": \"ann\"}, {\"action\": \"click\", \"selector\": \"#go\"}]\n```\nDone.";
        let parsed = parse(reply);
        assert_eq!(parsed.actions.len(), 2);
        assert_eq!(parsed.actions[0].kind(), "type");
        assert_eq!(parsed.actions[1].kind(), "click");
        assert_eq!(parsed.prose, "Filling in the login.\n\nDone.");
    }

    #[test]
    fn test_fenced_and_inline_are_ordered_by_offset() {
        let reply = "{\"action\": \"go-back\"} then\n```action\n{\"action\": \"view-source\"}\n```";
        let parsed = parse(reply);
        let kinds: Vec<&str> = parsed.actions.iter().map(|a| a.kind()).collect();
        assert_eq!(kinds, vec!["go-back", "view-source"]);
        assert_eq!(parsed.prose, "then");
    }

    #[test]
    fn test_malformed_fence_is_rejected() {
        let parsed = parse("ok\n```action\n{\"action\": \"click\",\n```");
        assert!(parsed.actions.is_empty());
        assert_eq!(parsed.prose, "ok");
        assert_eq!(parsed.rejected.len(), 1);
    }

    #[test]
    fn test_other_code_fences_stay_verbatim() {
        let reply = "Here is the snippet:\n```actionscript\ntrace('hi');\n```\nHope that helps.";
        let parsed = parse(reply);
        assert_eq!(parsed.prose, reply);
        assert!(parsed.actions.is_empty());
        assert!(parsed.rejected.is_empty());

        let reply = "Wrap them in ```action blocks``` next time.";
        let parsed = parse(reply);
        assert_eq!(parsed.prose, reply);
        assert!(parsed.rejected.is_empty());
    }

    #[test]
    fn test_action_fence_without_actions_stays_in_prose() {
        let reply = "Use it like this:\n```action\nnot json at all\n```";
        let parsed = parse(reply);
        assert_eq!(parsed.prose, reply);
        assert!(parsed.rejected.is_empty());
    }

    #[test]
    fn test_unknown_kind_is_kept() {
        let parsed = parse(r#"{"action": "teleport"}"#);
        assert_eq!(
            parsed.actions,
            vec![ActionRequest::Unknown {
                kind: "teleport".to_string()
            }]
        );
    }
}
