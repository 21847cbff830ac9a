//! In-memory page and page factory shared by the integration tests.
#![allow(dead_code)]

use asta_lib::agent::page::{functions, PageHandle};
use asta_lib::error::{PageError, Result};
use asta_lib::tabs::PageFactory;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default)]
pub struct FakeState {
    pub history: Vec<String>,
    pub index: usize,
    pub title: String,
    pub text: String,
    /// selector -> delay after creation before it exists
    pub elements: HashMap<String, Duration>,
    pub values: Vec<(String, String)>,
    pub clicks: Vec<String>,
    pub scrolls: Vec<i64>,
    pub found: Vec<String>,
    pub scripts: Vec<String>,
    pub rebrands: usize,
    pub script_error: Option<String>,
    pub closed: bool,
}

/// A page whose document is a handful of selectors and some text
pub struct FakePage {
    pub state: Mutex<FakeState>,
    created: Instant,
}

impl FakePage {
    pub fn new(url: &str) -> Self {
        Self {
            state: Mutex::new(FakeState {
                history: vec![url.to_string()],
                title: "Fake Page".to_string(),
                ..FakeState::default()
            }),
            created: Instant::now(),
        }
    }

    pub fn with_element(self, selector: &str) -> Self {
        self.with_element_after(selector, Duration::ZERO)
    }

    pub fn with_element_after(self, selector: &str, delay: Duration) -> Self {
        self.state.lock().elements.insert(selector.to_string(), delay);
        self
    }

    pub fn with_text(self, text: &str) -> Self {
        self.state.lock().text = text.to_string();
        self
    }

    pub fn with_title(self, title: &str) -> Self {
        self.state.lock().title = title.to_string();
        self
    }

    pub fn with_script_error(self, message: &str) -> Self {
        self.state.lock().script_error = Some(message.to_string());
        self
    }

    pub fn url(&self) -> String {
        let state = self.state.lock();
        state.history[state.index].clone()
    }

    pub fn close_now(&self) {
        self.state.lock().closed = true;
    }

    fn exists(&self, selector: &str) -> bool {
        let state = self.state.lock();
        state
            .elements
            .get(selector)
            .is_some_and(|delay| self.created.elapsed() >= *delay)
    }

    fn check_open(&self) -> std::result::Result<(), PageError> {
        if self.state.lock().closed {
            Err(PageError::Closed)
        } else {
            Ok(())
        }
    }
}

fn arg_str(args: &[Value], i: usize) -> String {
    args.get(i)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl PageHandle for FakePage {
    async fn run_script(&self, code: &str) -> std::result::Result<Value, PageError> {
        self.check_open()?;
        let mut state = self.state.lock();
        match code {
            "document.readyState" => return Ok(json!("complete")),
            "document.title" => return Ok(json!(state.title)),
            _ => {}
        }
        state.scripts.push(code.to_string());
        match &state.script_error {
            Some(message) => Err(PageError::script(message.clone())),
            None => Ok(json!(code.len())),
        }
    }

    async fn call_function(
        &self,
        declaration: &str,
        args: Vec<Value>,
    ) -> std::result::Result<Value, PageError> {
        self.check_open()?;
        let selector = arg_str(&args, 0);

        let value = if declaration == functions::CLICK {
            let hit = self.exists(&selector);
            if hit {
                self.state.lock().clicks.push(selector);
            }
            json!(hit)
        } else if declaration == functions::SET_VALUE {
            let hit = self.exists(&selector);
            if hit {
                self.state.lock().values.push((selector, arg_str(&args, 1)));
            }
            json!(hit)
        } else if declaration == functions::EXISTS {
            json!(self.exists(&selector))
        } else if declaration == functions::SCROLL_BY {
            let delta = args.first().and_then(|v| v.as_i64()).unwrap_or_default();
            self.state.lock().scrolls.push(delta);
            json!(0)
        } else if declaration == functions::CONTAINS_TEXT {
            json!(self.state.lock().text.contains(&selector))
        } else if declaration == functions::FIND_IN_PAGE {
            self.state.lock().found.push(selector);
            json!(true)
        } else if declaration == functions::READ_PAGE {
            let max = args.first().and_then(|v| v.as_u64()).unwrap_or(500) as usize;
            let state = self.state.lock();
            json!({
                "title": state.title,
                "url": state.history[state.index],
                "text": state.text.chars().take(max).collect::<String>(),
                "links": [{ "text": "More", "href": "https://example.com/more" }]
            })
        } else if declaration == functions::ELEMENT_INFO {
            if self.exists(&selector) {
                json!({
                    "tag": "H1",
                    "text": "Heading",
                    "html": "Heading",
                    "attributes": [{ "name": "class", "value": "title" }]
                })
            } else {
                Value::Null
            }
        } else if declaration == functions::VIEW_SOURCE {
            json!({
                "html": "<html><body><button id=\"go\">Go</button></body></html>",
                "elements": [{ "tag": "BUTTON", "text": "Go", "classes": "", "id": "go", "type": "submit" }]
            })
        } else if declaration == functions::PAGE_CONTEXT {
            let state = self.state.lock();
            json!({
                "title": state.title,
                "url": state.history[state.index],
                "text": state.text,
                "html_snippet": "<html>"
            })
        } else {
            self.state.lock().rebrands += 1;
            json!(true)
        };
        Ok(value)
    }

    async fn current_url(&self) -> std::result::Result<String, PageError> {
        self.check_open()?;
        Ok(self.url())
    }

    async fn load(&self, url: &str) -> std::result::Result<(), PageError> {
        self.check_open()?;
        let mut state = self.state.lock();
        let keep = state.index + 1;
        state.history.truncate(keep);
        state.history.push(url.to_string());
        state.index = state.history.len() - 1;
        Ok(())
    }

    async fn can_go_back(&self) -> std::result::Result<bool, PageError> {
        self.check_open()?;
        Ok(self.state.lock().index > 0)
    }

    async fn can_go_forward(&self) -> std::result::Result<bool, PageError> {
        self.check_open()?;
        let state = self.state.lock();
        Ok(state.index + 1 < state.history.len())
    }

    async fn go_back(&self) -> std::result::Result<(), PageError> {
        self.check_open()?;
        let mut state = self.state.lock();
        state.index = state.index.saturating_sub(1);
        Ok(())
    }

    async fn go_forward(&self) -> std::result::Result<(), PageError> {
        self.check_open()?;
        let mut state = self.state.lock();
        if state.index + 1 < state.history.len() {
            state.index += 1;
        }
        Ok(())
    }

    async fn close(&self) -> std::result::Result<(), PageError> {
        self.close_now();
        Ok(())
    }
}

/// Opens a fresh [`FakePage`] per tab and remembers them in order.
#[derive(Default)]
pub struct FakeFactory {
    pub pages: Mutex<Vec<Arc<FakePage>>>,
}

impl FakeFactory {
    pub fn opened_urls(&self) -> Vec<String> {
        self.pages.lock().iter().map(|p| p.state.lock().history[0].clone()).collect()
    }
}

#[async_trait]
impl PageFactory for FakeFactory {
    async fn open(&self, url: &str) -> Result<Arc<dyn PageHandle>> {
        let page = Arc::new(FakePage::new(url));
        self.pages.lock().push(Arc::clone(&page));
        Ok(page)
    }
}
