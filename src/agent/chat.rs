//! One conversational turn with the model.

use crate::agent::llm::{build_system_prompt, LLMProvider};
use crate::agent::page::{PageContext, PageHandle};
use crate::agent::parser;
use crate::agent::types::{ActionRequest, LLMMessage};
use crate::error::Result;
use crate::memory::ConversationMemory;
use std::sync::Arc;

/// What the shell shows and runs after a turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReply {
    pub prose: String,
    pub actions: Vec<ActionRequest>,
    pub rejected: Vec<String>,
    /// Reply exactly as the model produced it
    pub raw: String,
}

pub struct ChatSession {
    provider: Box<dyn LLMProvider>,
    memory: Arc<ConversationMemory>,
    context_entries: usize,
}

impl ChatSession {
    pub fn new(
        provider: Box<dyn LLMProvider>,
        memory: Arc<ConversationMemory>,
        context_entries: usize,
    ) -> Self {
        Self {
            provider,
            memory,
            context_entries,
        }
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Assemble the message list for `message` against the given page context.
    pub fn build_messages(&self, message: &str, context: Option<&PageContext>) -> Vec<LLMMessage> {
        let mut messages = vec![LLMMessage::system(build_system_prompt(context))];
        for entry in self.memory.recent(self.context_entries) {
            messages.push(LLMMessage::user(entry.user));
            messages.push(LLMMessage::assistant(entry.assistant));
        }
        messages.push(LLMMessage::user(message));
        messages
    }

    /// Run one turn. Nothing is dispatched here; the caller runs the actions.
    pub async fn turn(&self, message: &str, page: Option<&dyn PageHandle>) -> Result<TurnReply> {
        let context = match page {
            Some(page) => PageContext::capture(page).await,
            None => None,
        };

        let messages = self.build_messages(message, context.as_ref());
        tracing::debug!(
            "Sending {} messages to {}:{}",
            messages.len(),
            self.provider.name(),
            self.provider.model()
        );

        let response = self.provider.complete(&messages).await?;
        tracing::debug!("Model used {} tokens", response.usage.total_tokens);
        let raw = response.content;

        if let Err(e) = self.memory.append(message, &raw) {
            tracing::warn!("Failed to save conversation memory: {}", e);
        }

        let parsed = parser::parse(&raw);
        for fragment in &parsed.rejected {
            tracing::debug!("Dropped malformed action fragment: {}", fragment);
        }

        let prose = if !parsed.has_prose() && !parsed.has_actions() {
            raw.clone()
        } else {
            parsed.prose
        };

        Ok(TurnReply {
            prose,
            actions: parsed.actions,
            rejected: parsed.rejected,
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::types::{LLMResponse, TokenUsage};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct ScriptedProvider {
        reply: String,
        seen: Arc<Mutex<Vec<LLMMessage>>>,
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        async fn complete(&self, messages: &[LLMMessage]) -> Result<LLMResponse> {
            *self.seen.lock() = messages.to_vec();
            Ok(LLMResponse {
                content: self.reply.clone(),
                model: "scripted".to_string(),
                usage: TokenUsage::default(),
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    fn session(reply: &str, dir: &tempfile::TempDir) -> (ChatSession, Arc<Mutex<Vec<LLMMessage>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let provider = ScriptedProvider {
            reply: reply.to_string(),
            seen: Arc::clone(&seen),
        };
        let memory = Arc::new(ConversationMemory::open(dir.path().join("memory.json"), 50));
        (ChatSession::new(Box::new(provider), memory, 10), seen)
    }

    #[tokio::test]
    async fn test_turn_splits_prose_and_actions() {
        let dir = tempfile::tempdir().unwrap();
        let (chat, seen) = session(
            r#"Opening it now. {"action": "navigate", "url": "example.com"}"#,
            &dir,
        );

        let reply = chat.turn("open example", None).await.unwrap();
        assert_eq!(reply.prose, "Opening it now.");
        assert_eq!(reply.actions.len(), 1);
        assert_eq!(reply.actions[0].kind(), "navigate");

        let messages = seen.lock().clone();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("No page loaded"));
        assert_eq!(messages[1].content, "open example");

        let stored = chat.memory().recent(10);
        assert_eq!(stored.len(), 1);
        assert!(stored[0].assistant.contains(r#""action": "navigate""#));
    }

    #[tokio::test]
    async fn test_turn_includes_history() {
        let dir = tempfile::tempdir().unwrap();
        let (chat, seen) = session("Sure.", &dir);

        chat.turn("first", None).await.unwrap();
        chat.turn("second", None).await.unwrap();

        let messages = seen.lock().clone();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[1].content, "first");
        assert_eq!(messages[2].role, "assistant");
        assert_eq!(messages[3].content, "second");
    }

    #[tokio::test]
    async fn test_blank_reply_is_kept_as_prose() {
        let dir = tempfile::tempdir().unwrap();
        let (chat, _) = session("   ", &dir);

        let reply = chat.turn("hello", None).await.unwrap();
        assert!(reply.actions.is_empty());
        assert_eq!(reply.prose, "   ");
    }

    #[tokio::test]
    async fn test_code_fence_reply_is_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let answer = "Try this:\n```actionscript\ntrace('hi');\n```";
        let (chat, _) = session(answer, &dir);

        let reply = chat.turn("show me actionscript", None).await.unwrap();
        assert!(reply.actions.is_empty());
        assert!(reply.rejected.is_empty());
        assert_eq!(reply.prose, answer);
    }
}
