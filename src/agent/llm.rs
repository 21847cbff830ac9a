use crate::agent::page::{truncate_chars, PageContext};
use crate::agent::types::{LLMMessage, LLMResponse, TokenUsage};
use crate::config::{AIConfig, ApiType, ProviderConfig};
use crate::error::{AstaError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Characters of visible page text shown to the model
pub const PROMPT_TEXT_CHARS: usize = 500;
/// Characters of page markup shown to the model
pub const PROMPT_HTML_CHARS: usize = 3000;

/// LLM Provider trait
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Send a chat completion request
    async fn complete(&self, messages: &[LLMMessage]) -> Result<LLMResponse>;

    /// Get provider name
    fn name(&self) -> &str;

    /// Get model name
    fn model(&self) -> &str;
}

fn http_client(timeout_seconds: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to build HTTP client with timeout: {}", e);
            Client::new()
        })
}

async fn read_json(response: reqwest::Response, api: &str) -> Result<serde_json::Value> {
    if !response.status().is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(AstaError::Llm(format!("{} API error: {}", api, error_text)));
    }

    response
        .json()
        .await
        .map_err(|e| AstaError::Llm(format!("Failed to parse response: {}", e)))
}

fn count(value: &serde_json::Value) -> u32 {
    value.as_u64().unwrap_or(0) as u32
}

/// OpenAI-compatible provider (OpenAI, Azure, custom endpoints, etc.)
pub struct OpenAIProvider {
    client: Client,
    config: ProviderConfig,
    model: String,
    provider_id: String,
}

impl OpenAIProvider {
    pub fn new(provider_id: String, config: ProviderConfig, model: String) -> Self {
        Self::with_timeout(provider_id, config, model, 120)
    }

    pub fn with_timeout(
        provider_id: String,
        config: ProviderConfig,
        model: String,
        timeout_seconds: u64,
    ) -> Self {
        Self {
            client: http_client(timeout_seconds),
            config,
            model,
            provider_id,
        }
    }

    fn build_body(&self, messages: &[LLMMessage]) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = messages
            .iter()
            .map(|msg| {
                serde_json::json!({
                    "role": msg.role,
                    "content": msg.content
                })
            })
            .collect();

        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": 4096,
            "temperature": 0.3
        })
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn complete(&self, messages: &[LLMMessage]) -> Result<LLMResponse> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let mut request = self.client.post(&url).json(&self.build_body(messages));
        if let Some(api_key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| AstaError::Llm(format!("Request failed: {}", e)))?;
        let json = read_json(response, "OpenAI").await?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();

        let usage = TokenUsage {
            prompt_tokens: count(&json["usage"]["prompt_tokens"]),
            completion_tokens: count(&json["usage"]["completion_tokens"]),
            total_tokens: count(&json["usage"]["total_tokens"]),
        };

        Ok(LLMResponse {
            content,
            model: self.model.clone(),
            usage,
        })
    }

    fn name(&self) -> &str {
        &self.provider_id
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Anthropic provider
pub struct AnthropicProvider {
    client: Client,
    config: ProviderConfig,
    model: String,
    provider_id: String,
}

impl AnthropicProvider {
    pub fn new(provider_id: String, config: ProviderConfig, model: String) -> Self {
        Self::with_timeout(provider_id, config, model, 120)
    }

    pub fn with_timeout(
        provider_id: String,
        config: ProviderConfig,
        model: String,
        timeout_seconds: u64,
    ) -> Self {
        Self {
            client: http_client(timeout_seconds),
            config,
            model,
            provider_id,
        }
    }

    /// System prompt goes in its own field; the rest become text blocks.
    fn build_body(&self, messages: &[LLMMessage]) -> serde_json::Value {
        let mut anthropic_messages = Vec::new();
        let mut system_prompt = String::new();

        for msg in messages {
            if msg.role == "system" {
                system_prompt = msg.content.clone();
            } else {
                anthropic_messages.push(serde_json::json!({
                    "role": msg.role,
                    "content": [{ "type": "text", "text": msg.content }]
                }));
            }
        }

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": anthropic_messages,
            "max_tokens": 4096,
        });

        if !system_prompt.is_empty() {
            body["system"] = serde_json::Value::String(system_prompt);
        }
        body
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    async fn complete(&self, messages: &[LLMMessage]) -> Result<LLMResponse> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));

        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| AstaError::Llm("Anthropic API key required".to_string()))?;

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&self.build_body(messages))
            .send()
            .await
            .map_err(|e| AstaError::Llm(format!("Request failed: {}", e)))?;
        let json = read_json(response, "Anthropic").await?;

        let content = json["content"][0]["text"]
            .as_str()
            .unwrap_or("")
            .to_string();

        let input = count(&json["usage"]["input_tokens"]);
        let output = count(&json["usage"]["output_tokens"]);
        let usage = TokenUsage {
            prompt_tokens: input,
            completion_tokens: output,
            total_tokens: input + output,
        };

        Ok(LLMResponse {
            content,
            model: self.model.clone(),
            usage,
        })
    }

    fn name(&self) -> &str {
        &self.provider_id
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Ollama provider (local or hosted)
pub struct OllamaProvider {
    client: Client,
    config: ProviderConfig,
    model: String,
    provider_id: String,
}

impl OllamaProvider {
    pub fn new(provider_id: String, config: ProviderConfig, model: String) -> Self {
        Self::with_timeout(provider_id, config, model, 120)
    }

    pub fn with_timeout(
        provider_id: String,
        config: ProviderConfig,
        model: String,
        timeout_seconds: u64,
    ) -> Self {
        Self {
            client: http_client(timeout_seconds),
            config,
            model,
            provider_id,
        }
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    async fn complete(&self, messages: &[LLMMessage]) -> Result<LLMResponse> {
        let url = format!("{}/api/chat", self.config.base_url.trim_end_matches('/'));

        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": false
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(api_key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| AstaError::Llm(format!("Request failed: {}", e)))?;
        let json = read_json(response, "Ollama").await?;

        let content = json["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();

        let prompt_tokens = count(&json["prompt_eval_count"]);
        let completion_tokens = count(&json["eval_count"]);
        let usage = TokenUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        };

        Ok(LLMResponse {
            content,
            model: self.model.clone(),
            usage,
        })
    }

    fn name(&self) -> &str {
        &self.provider_id
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// LLM Client factory
pub struct LLMClient {
    config: AIConfig,
}

impl LLMClient {
    pub fn new(config: AIConfig) -> Self {
        Self { config }
    }

    /// Create a provider instance with the specified model
    pub fn create_provider(&self, provider_id: &str, model: &str) -> Result<Box<dyn LLMProvider>> {
        let provider_config = self.config.providers.get(provider_id).ok_or_else(|| {
            AstaError::Llm(format!("Provider '{}' not configured", provider_id))
        })?;

        let id = provider_id.to_string();
        let config = provider_config.clone();
        let model = model.to_string();
        let timeout = self.config.timeout_seconds;

        let provider: Box<dyn LLMProvider> = match provider_config.api_type {
            ApiType::Openai => Box::new(OpenAIProvider::with_timeout(id, config, model, timeout)),
            ApiType::Anthropic => {
                Box::new(AnthropicProvider::with_timeout(id, config, model, timeout))
            }
            ApiType::Ollama => Box::new(OllamaProvider::with_timeout(id, config, model, timeout)),
        };

        Ok(provider)
    }

    /// Get the default LLM provider (format: "provider_id:model_name").
    ///
    /// Only the first colon separates the two, so model tags such as
    /// `llama3:8b` survive.
    pub fn get_default_llm(&self) -> Result<Box<dyn LLMProvider>> {
        let selection = self.config.default_llm.as_ref().ok_or_else(|| {
            AstaError::Llm(
                "No default LLM configured. Set ai.default_llm in the config file.".to_string(),
            )
        })?;

        let (provider_id, model) = selection.split_once(':').ok_or_else(|| {
            AstaError::Llm(format!(
                "Invalid default_llm format '{}'. Expected 'provider_id:model_name'",
                selection
            ))
        })?;

        self.create_provider(provider_id, model)
    }
}

/// Build the system prompt for a chat turn
pub fn build_system_prompt(context: Option<&PageContext>) -> String {
    let page = match context {
        Some(ctx) => format!(
            "Title: {}\nURL: {}\nVisible Text: {}...\n\nHTML Source (first {} chars):\n{}...",
            ctx.title,
            ctx.url,
            truncate_chars(&ctx.text, PROMPT_TEXT_CHARS),
            PROMPT_HTML_CHARS,
            truncate_chars(&ctx.html_snippet, PROMPT_HTML_CHARS),
        ),
        None => "No page loaded".to_string(),
    };

    format!(
        r##"You are Asta AI, a browser assistant that can interact with the page the user is looking at.

CURRENT PAGE CONTEXT:
{page}

AVAILABLE ACTIONS (JSON objects):

1. NAVIGATE - Go to a website
   {{"action": "navigate", "url": "https://example.com"}}
2. SEARCH - Search the web
   {{"action": "search", "query": "search terms"}}
3. CLICK - Click an element
   {{"action": "click", "selector": "button.login", "description": "login button"}}
4. TYPE - Type into an input field
   {{"action": "type", "selector": "input[name='email']", "text": "me@example.com"}}
5. FILL FORM - Fill several fields in order
   {{"action": "fill-form", "fields": [{{"selector": "#user", "value": "john"}}, {{"selector": "#pass", "value": "secret"}}]}}
6. SCROLL - Scroll the page
   {{"action": "scroll", "direction": "down", "amount": 500}}
7. READ PAGE - Get the page content
   {{"action": "read-page"}}
8. FIND TEXT - Find text on the page
   {{"action": "find-text", "text": "search for this"}}
9. SCREENSHOT - Take a screenshot
   {{"action": "screenshot"}}
10. EXECUTE JS - Run JavaScript on the page
   {{"action": "execute-js", "code": "document.title"}}
11. GET ELEMENT - Inspect an element
   {{"action": "get-element", "selector": "h1"}}
12. WAIT - Wait for an element to appear
   {{"action": "wait", "selector": ".results", "timeout": 5000}}
13. VIEW SOURCE - Get the page source and its clickable elements
   {{"action": "view-source"}}
14. GO BACK / GO FORWARD
   {{"action": "go-back"}} or {{"action": "go-forward"}}

RULES:
- Explain what you are doing in plain text BEFORE the actions.
- Put actions in a fenced block tagged `action`, one object or an array of objects:
```action
[{{"action": "scroll", "direction": "down", "amount": 500}}, {{"action": "click", "selector": ".video"}}]
```
- A single inline object such as {{"action": "read-page"}} is also accepted.
- Actions run in the order written.
- Use CSS selectors taken from the HTML above. Use view-source when you need more of it.
- For plain conversation, answer normally without actions.
- When reporting page results, summarise them in a sentence or a short paragraph.
- If asked who made you, say Asta Entertainment.
- If the user complains, apologise and say you will report it.

MEMORY: previous conversations follow. Use them to remember the user's preferences."##
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn provider_config(api_type: ApiType) -> ProviderConfig {
        ProviderConfig {
            name: "test".to_string(),
            api_type,
            base_url: "https://api.example.com".to_string(),
            api_key: Some("test-key".to_string()),
            models: vec!["gpt-4".to_string()],
        }
    }

    #[test]
    fn test_openai_body() {
        let provider = OpenAIProvider::new(
            "test".to_string(),
            provider_config(ApiType::Openai),
            "gpt-4".to_string(),
        );

        let body = provider.build_body(&[LLMMessage::system("sys"), LLMMessage::user("Hello")]);
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "Hello");
    }

    #[test]
    fn test_anthropic_body_lifts_system_prompt() {
        let provider = AnthropicProvider::new(
            "test".to_string(),
            provider_config(ApiType::Anthropic),
            "claude".to_string(),
        );

        let body = provider.build_body(&[
            LLMMessage::system("be brief"),
            LLMMessage::user("hi"),
            LLMMessage::assistant("hello"),
        ]);
        assert_eq!(body["system"], "be brief");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["content"][0]["text"], "hi");
    }

    #[test]
    fn test_llm_client_no_default() {
        let client = LLMClient::new(AIConfig::default());

        let result = client.get_default_llm();
        match result {
            Err(AstaError::Llm(msg)) => assert!(msg.contains("No default LLM configured")),
            _ => panic!("expected missing default error"),
        }
    }

    #[test]
    fn test_llm_client_keeps_model_tag() {
        let mut providers = HashMap::new();
        providers.insert("ollama".to_string(), provider_config(ApiType::Ollama));
        let client = LLMClient::new(AIConfig {
            default_llm: Some("ollama:llama3:8b".to_string()),
            timeout_seconds: 30,
            providers,
        });

        let provider = client.get_default_llm().unwrap();
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.model(), "llama3:8b");
    }

    #[test]
    fn test_llm_client_unknown_provider() {
        let client = LLMClient::new(AIConfig {
            default_llm: Some("missing:model".to_string()),
            ..AIConfig::default()
        });
        assert!(client.get_default_llm().is_err());
    }

    #[test]
    fn test_system_prompt_without_page() {
        let prompt = build_system_prompt(None);
        assert!(prompt.contains("No page loaded"));
        assert!(prompt.contains("```action"));
        assert!(prompt.contains(r#"{"action": "go-back"}"#));
    }

    #[test]
    fn test_system_prompt_truncates_context() {
        let ctx = PageContext {
            title: "Example".to_string(),
            url: "https://example.com/".to_string(),
            text: "x".repeat(2000),
            html_snippet: "<p>".repeat(2000),
        };
        let prompt = build_system_prompt(Some(&ctx));
        assert!(prompt.contains("Title: Example"));
        assert!(prompt.contains(&format!("{}...", "x".repeat(PROMPT_TEXT_CHARS))));
        assert!(!prompt.contains(&"x".repeat(PROMPT_TEXT_CHARS + 1)));
    }
}
