use crate::navigation::DEFAULT_SEARCH_TEMPLATE;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Browser launch settings
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Search engine used for omnibox queries and `search` actions
    #[serde(default)]
    pub search: SearchConfig,

    /// Runtime rebranding of the search engine UI
    #[serde(default)]
    pub branding: BrandingConfig,

    /// Action dispatch tuning
    #[serde(default)]
    pub agent: AgentConfig,

    /// Conversation memory
    #[serde(default)]
    pub memory: MemoryConfig,

    /// AI configuration for agent
    #[serde(default)]
    pub ai: AIConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Chrome executable path
    #[serde(default = "default_chrome_path")]
    pub chrome_path: PathBuf,

    /// User data directory (a temporary profile is used when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data_dir: Option<PathBuf>,

    /// Remote debugging port
    #[serde(default = "default_cdp_port")]
    pub cdp_port: u16,

    #[serde(default)]
    pub headless: bool,

    /// User agent presented to every site
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Page opened in every new tab
    #[serde(default = "default_home_url")]
    pub home_url: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chrome_path: default_chrome_path(),
            user_data_dir: None,
            cdp_port: default_cdp_port(),
            headless: false,
            user_agent: default_user_agent(),
            home_url: default_home_url(),
        }
    }
}

/// Get default Chrome path based on platform
fn default_chrome_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        PathBuf::from("C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe")
    }
    #[cfg(target_os = "macos")]
    {
        PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome")
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        PathBuf::from("/usr/bin/google-chrome")
    }
}

fn default_cdp_port() -> u16 {
    9222
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_home_url() -> String {
    "https://search.brave.com".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// URL template; `{query}` is replaced by the encoded query
    #[serde(default = "default_search_template")]
    pub url_template: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url_template: default_search_template(),
        }
    }
}

fn default_search_template() -> String {
    DEFAULT_SEARCH_TEMPLATE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Word replaced in page text
    #[serde(default = "default_brand_from")]
    pub replace: String,

    /// Replacement word
    #[serde(default = "default_brand_to")]
    pub with: String,

    /// Host whose pages get logos hidden
    #[serde(default = "default_host_from")]
    pub search_host: String,

    /// Host shown in place of `search_host`
    #[serde(default = "default_host_to")]
    pub display_host: String,

    /// Substrings identifying logo images
    #[serde(default = "default_logo_markers")]
    pub logo_markers: Vec<String>,
}

impl Default for BrandingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            replace: default_brand_from(),
            with: default_brand_to(),
            search_host: default_host_from(),
            display_host: default_host_to(),
            logo_markers: default_logo_markers(),
        }
    }
}

fn default_brand_from() -> String {
    "Brave".to_string()
}

fn default_brand_to() -> String {
    "Asta".to_string()
}

fn default_host_from() -> String {
    "search.brave.com".to_string()
}

fn default_host_to() -> String {
    "search.asta".to_string()
}

fn default_logo_markers() -> Vec<String> {
    vec!["brave-logo".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Default `wait` timeout in milliseconds
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_ms: u64,

    /// Interval between `wait` checks in milliseconds
    #[serde(default = "default_poll_interval")]
    pub wait_poll_interval_ms: u64,

    /// Characters of visible text returned by `read-page`
    #[serde(default = "default_read_page_chars")]
    pub read_page_chars: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: default_wait_timeout(),
            wait_poll_interval_ms: default_poll_interval(),
            read_page_chars: default_read_page_chars(),
        }
    }
}

fn default_wait_timeout() -> u64 {
    3000
}

fn default_poll_interval() -> u64 {
    100
}

fn default_read_page_chars() -> usize {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Memory file (defaults to the platform data directory)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Entries kept on disk
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Most recent entries sent to the model as context
    #[serde(default = "default_context_entries")]
    pub context_entries: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_entries: default_max_entries(),
            context_entries: default_context_entries(),
        }
    }
}

fn default_max_entries() -> usize {
    50
}

fn default_context_entries() -> usize {
    10
}

fn default_true() -> bool {
    true
}

// ==================== AI Configuration ====================

/// API type for the provider
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    #[default]
    Openai,
    Anthropic,
    Ollama,
}

/// AI Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Display name for this provider
    pub name: String,
    /// API type (determines request format)
    #[serde(default)]
    pub api_type: ApiType,
    /// Base URL for the API
    pub base_url: String,
    /// API key (optional for local providers like Ollama)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Available models for this provider
    #[serde(default)]
    pub models: Vec<String>,
}

/// AI configuration for the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIConfig {
    /// Default LLM model to use (format: "provider_id:model_name")
    #[serde(default)]
    pub default_llm: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// AI providers configuration (key = provider id, value = config)
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_timeout() -> u64 {
    120
}

impl Default for AIConfig {
    fn default() -> Self {
        Self {
            default_llm: None,
            timeout_seconds: default_timeout(),
            providers: HashMap::new(),
        }
    }
}
