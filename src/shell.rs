//! Terminal front end: tab commands and chat turns.

use crate::agent::cdp::CdpBrowser;
use crate::agent::chat::ChatSession;
use crate::agent::dispatcher::Dispatcher;
use crate::agent::llm::LLMClient;
use crate::agent::outcome::{narrate, narrate_start};
use crate::agent::page::PageHandle;
use crate::branding::Branding;
use crate::config::AppConfig;
use crate::error::{AstaError, Result};
use crate::memory::ConversationMemory;
use crate::navigation::resolve_input;
use crate::tabs::{PageFactory, TabId, TabManager};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

const LOAD_POLL_INTERVAL: Duration = Duration::from_millis(100);
const LOAD_POLLS: u32 = 50;

const HELP: &str = "\
Commands:
  /open [url]     open a tab (home page by default)
  /go <input>     load a URL or search for the input
  /tabs           list tabs
  /switch <id>    activate a tab
  /close [id]     close a tab (the active one by default)
  /back           go back in history
  /forward        go forward in history
  /clear-memory   forget previous conversations
  /help           show this help
  /quit           exit
Anything else is sent to Asta.";

/// A line of user input
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Chat(String),
    Open(Option<String>),
    Go(String),
    Tabs,
    Switch(TabId),
    Close(Option<TabId>),
    Back,
    Forward,
    ClearMemory,
    Help,
    Quit,
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Parse one line of input. `None` for a blank line.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if !line.starts_with('/') {
        return Some(Command::Chat(line.to_string()));
    }

    let (name, arg) = match line.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (line, ""),
    };
    let arg = (!arg.is_empty()).then(|| arg.to_string());

    let command = match name {
        "/open" => Command::Open(arg),
        "/go" => match arg {
            Some(input) => Command::Go(input),
            None => Command::Invalid("/go needs a URL or search terms".to_string()),
        },
        "/tabs" => Command::Tabs,
        "/switch" => match arg.as_deref().map(parse_tab_id) {
            Some(Some(id)) => Command::Switch(id),
            _ => Command::Invalid("/switch needs a tab id".to_string()),
        },
        "/close" => match arg.as_deref().map(parse_tab_id) {
            None => Command::Close(None),
            Some(Some(id)) => Command::Close(Some(id)),
            Some(None) => Command::Invalid("/close takes a tab id".to_string()),
        },
        "/back" => Command::Back,
        "/forward" => Command::Forward,
        "/clear-memory" => Command::ClearMemory,
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        other => Command::Invalid(format!("Unknown command: {}", other)),
    };
    Some(command)
}

fn parse_tab_id(arg: &str) -> Option<TabId> {
    arg.parse().ok().map(TabId)
}

pub struct Shell {
    tabs: TabManager,
    dispatcher: Dispatcher,
    chat: Option<ChatSession>,
    memory: Arc<ConversationMemory>,
    branding: Branding,
    search_template: String,
}

impl Shell {
    pub fn new(
        config: &AppConfig,
        tabs: TabManager,
        chat: Option<ChatSession>,
        memory: Arc<ConversationMemory>,
    ) -> Self {
        Self {
            tabs,
            dispatcher: Dispatcher::new(&config.agent, &config.search),
            chat,
            memory,
            branding: Branding::new(config.branding.clone()),
            search_template: config.search.url_template.clone(),
        }
    }

    /// Build the shell around a running browser, adopting its first page as
    /// the initial tab.
    pub async fn start(config: &AppConfig, browser: Arc<CdpBrowser>) -> Result<Self> {
        let memory = Arc::new(ConversationMemory::from_config(&config.memory));

        let chat = match LLMClient::new(config.ai.clone()).get_default_llm() {
            Ok(provider) => {
                tracing::info!("Using model {}:{}", provider.name(), provider.model());
                Some(ChatSession::new(
                    provider,
                    Arc::clone(&memory),
                    config.memory.context_entries,
                ))
            }
            Err(e) => {
                tracing::warn!("Chat disabled: {}", e);
                None
            }
        };

        let home = config.browser.home_url.clone();
        let first: Arc<dyn PageHandle> = Arc::new(browser.first_page().await?);
        let factory: Arc<dyn PageFactory> = browser;
        let mut tabs = TabManager::new(factory, home.clone());
        tabs.adopt(Arc::clone(&first), home.clone());
        if let Err(e) = first.load(&home).await {
            tracing::warn!("Failed to load home page: {}", e);
        }

        let mut shell = Self::new(config, tabs, chat, memory);
        shell.refresh_active().await;
        Ok(shell)
    }

    pub fn tabs(&self) -> &TabManager {
        &self.tabs
    }

    /// Run one command, writing user-facing lines to `out`.
    pub async fn handle(&mut self, command: Command, out: &mut dyn FnMut(String)) -> Result<Flow> {
        match command {
            Command::Chat(message) => self.chat_turn(&message, out).await?,
            Command::Open(url) => {
                let url = url.and_then(|input| resolve_input(&input, &self.search_template));
                let id = self.tabs.open(url.as_deref()).await?;
                self.refresh_active().await;
                out(format!("Opened tab {}", id));
            }
            Command::Go(input) => {
                let Some(url) = resolve_input(&input, &self.search_template) else {
                    return Ok(Flow::Continue);
                };
                let page = self.active_page()?;
                page.load(&url).await?;
                self.refresh_active().await;
                out(format!("Loaded {}", self.branding.display_url(&url)));
            }
            Command::Tabs => {
                let active = self.tabs.active_id();
                for tab in self.tabs.tabs() {
                    let marker = if Some(tab.id) == active { '*' } else { ' ' };
                    out(format!(
                        "{} [{}] {} ({})",
                        marker,
                        tab.id,
                        tab.title,
                        self.branding.display_url(&tab.url)
                    ));
                }
            }
            Command::Switch(id) => {
                self.tabs.switch(id)?;
                out(format!("Switched to tab {}", id));
            }
            Command::Close(id) => {
                let id = match id.or_else(|| self.tabs.active_id()) {
                    Some(id) => id,
                    None => return Err(AstaError::Validation("No tab to close".to_string())),
                };
                let active = self.tabs.close(id).await?;
                self.refresh_active().await;
                out(format!("Closed tab {}, tab {} is active", id, active));
            }
            Command::Back => {
                let page = self.active_page()?;
                if page.can_go_back().await? {
                    page.go_back().await?;
                    self.refresh_active().await;
                }
            }
            Command::Forward => {
                let page = self.active_page()?;
                if page.can_go_forward().await? {
                    page.go_forward().await?;
                    self.refresh_active().await;
                }
            }
            Command::ClearMemory => {
                self.memory.clear()?;
                out("Memory cleared".to_string());
            }
            Command::Help => out(HELP.to_string()),
            Command::Quit => return Ok(Flow::Quit),
            Command::Invalid(message) => out(message),
        }
        Ok(Flow::Continue)
    }

    /// Read commands from stdin until `/quit` or end of input.
    pub async fn run(&mut self) -> Result<()> {
        println!("Asta is ready. Type /help for commands.");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            print!("> ");
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let Some(command) = parse_command(&line) else {
                continue;
            };

            match self.handle(command, &mut |line: String| println!("{}", line)).await {
                Ok(Flow::Quit) => break,
                Ok(Flow::Continue) => {}
                Err(e) => println!("✗ Error: {}", e),
            }
        }
        Ok(())
    }

    async fn chat_turn(&mut self, message: &str, out: &mut dyn FnMut(String)) -> Result<()> {
        let Some(chat) = &self.chat else {
            out("✗ No language model configured. Set ai.default_llm in the config file.".to_string());
            return Ok(());
        };

        let page = self.tabs.active_page();
        let reply = chat.turn(message, page.as_deref()).await?;

        if !reply.prose.is_empty() {
            out(format!("Asta: {}", reply.prose));
        }
        if reply.actions.is_empty() {
            return Ok(());
        }

        let Some(page) = page else {
            out("✗ Error: no active tab".to_string());
            return Ok(());
        };

        for action in &reply.actions {
            if let Some(line) = narrate_start(action) {
                out(line);
            }
            let outcome = self.dispatcher.dispatch(action, page.as_ref()).await;
            if let Some(line) = narrate(&outcome) {
                out(line);
            }
        }

        self.refresh_active().await;
        Ok(())
    }

    fn active_page(&self) -> Result<Arc<dyn PageHandle>> {
        self.tabs
            .active_page()
            .ok_or_else(|| AstaError::Validation("No active tab".to_string()))
    }

    /// Wait for the active document, rebrand it and record its URL and title.
    async fn refresh_active(&mut self) {
        let (Some(id), Some(page)) = (self.tabs.active_id(), self.tabs.active_page()) else {
            return;
        };

        wait_for_load(page.as_ref()).await;

        if let Err(e) = self.branding.apply(page.as_ref()).await {
            tracing::debug!("Branding not applied: {}", e);
        }
        if let Err(e) = self.tabs.refresh_url(id).await {
            tracing::debug!("Failed to read URL of tab {}: {}", id, e);
        }
        match page.run_script("document.title").await {
            Ok(title) => {
                let _ = self.tabs.set_title(id, title.as_str().unwrap_or_default());
            }
            Err(e) => tracing::debug!("Failed to read title of tab {}: {}", id, e),
        }
    }
}

async fn wait_for_load(page: &dyn PageHandle) {
    for _ in 0..LOAD_POLLS {
        match page.run_script("document.readyState").await {
            Ok(state) if state.as_str() != Some("loading") => return,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("Failed to read document state: {}", e);
                return;
            }
        }
        tokio::time::sleep(LOAD_POLL_INTERVAL).await;
    }
    tracing::debug!("Document still loading, continuing");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_and_blank() {
        assert_eq!(parse_command("   "), None);
        assert_eq!(
            parse_command(" hello there "),
            Some(Command::Chat("hello there".to_string()))
        );
    }

    #[test]
    fn test_parse_tab_commands() {
        assert_eq!(parse_command("/open"), Some(Command::Open(None)));
        assert_eq!(
            parse_command("/open example.com"),
            Some(Command::Open(Some("example.com".to_string())))
        );
        assert_eq!(parse_command("/switch 3"), Some(Command::Switch(TabId(3))));
        assert_eq!(parse_command("/close"), Some(Command::Close(None)));
        assert_eq!(parse_command("/close 2"), Some(Command::Close(Some(TabId(2)))));
        assert!(matches!(parse_command("/switch x"), Some(Command::Invalid(_))));
    }

    #[test]
    fn test_parse_misc_commands() {
        assert_eq!(
            parse_command("/go rust async book"),
            Some(Command::Go("rust async book".to_string()))
        );
        assert!(matches!(parse_command("/go"), Some(Command::Invalid(_))));
        assert_eq!(parse_command("/back"), Some(Command::Back));
        assert_eq!(parse_command("/clear-memory"), Some(Command::ClearMemory));
        assert_eq!(parse_command("/exit"), Some(Command::Quit));
        assert!(matches!(parse_command("/teleport"), Some(Command::Invalid(_))));
    }
}
