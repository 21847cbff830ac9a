//! Carries out one action request against a page.

use crate::agent::outcome::{
    ActionOutcome, ClickableElement, ElementInfo, OutcomeDetail, OutcomeStatus, PageSummary,
    SourceSummary,
};
use crate::agent::page::{functions, PageHandle};
use crate::agent::types::{ActionRequest, FormField};
use crate::config::{AgentConfig, SearchConfig};
use crate::error::PageError;
use crate::navigation::{normalize_url, search_url, DEFAULT_SEARCH_TEMPLATE};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const READ_PAGE_MAX_LINKS: usize = 10;
const ELEMENT_TEXT_LIMIT: usize = 100;
const ELEMENT_HTML_LIMIT: usize = 200;
const VIEW_SOURCE_MAX_ELEMENTS: usize = 20;

/// Dispatches action requests. Holds no per-action state, so one instance
/// serves every tab.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    search_template: String,
    wait_timeout: Duration,
    poll_interval: Duration,
    read_page_chars: usize,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(&AgentConfig::default(), &SearchConfig::default())
    }
}

#[derive(Deserialize)]
struct SourceReply {
    #[serde(default)]
    html: String,
    #[serde(default)]
    elements: Vec<ClickableElement>,
}

impl Dispatcher {
    pub fn new(agent: &AgentConfig, search: &SearchConfig) -> Self {
        let search_template = if search.url_template.is_empty() {
            DEFAULT_SEARCH_TEMPLATE.to_string()
        } else {
            search.url_template.clone()
        };
        Self {
            search_template,
            wait_timeout: Duration::from_millis(agent.wait_timeout_ms),
            poll_interval: Duration::from_millis(agent.wait_poll_interval_ms.max(1)),
            read_page_chars: agent.read_page_chars,
        }
    }

    /// Perform `action` on `page`. Failures are reported in the outcome,
    /// never raised.
    pub async fn dispatch(&self, action: &ActionRequest, page: &dyn PageHandle) -> ActionOutcome {
        let kind = action.kind().to_string();
        tracing::debug!("Dispatching {} action", kind);

        let detail = match self.execute(action, page).await {
            Ok(detail) => detail,
            Err(PageError::Script { message }) => OutcomeDetail::ScriptFailed { message },
            Err(e) => OutcomeDetail::PageFailed {
                message: e.to_string(),
            },
        };

        let outcome = ActionOutcome::new(kind, detail);
        if outcome.status() == OutcomeStatus::Failure {
            tracing::warn!("Action {} failed: {:?}", outcome.action, outcome.detail);
        }
        outcome
    }

    async fn execute(
        &self,
        action: &ActionRequest,
        page: &dyn PageHandle,
    ) -> Result<OutcomeDetail, PageError> {
        match action {
            ActionRequest::Navigate { url } => {
                let url = normalize_url(url);
                page.load(&url).await?;
                Ok(OutcomeDetail::Navigated { url })
            }

            ActionRequest::Search { query } => {
                let url = search_url(&self.search_template, query);
                page.load(&url).await?;
                Ok(OutcomeDetail::Searching {
                    query: query.clone(),
                    url,
                })
            }

            ActionRequest::Click {
                selector,
                description,
            } => {
                let clicked = page
                    .call_function(functions::CLICK, vec![json!(selector)])
                    .await?;
                if truthy(&clicked) {
                    Ok(OutcomeDetail::Clicked {
                        target: description.clone().unwrap_or_else(|| selector.clone()),
                    })
                } else {
                    Ok(OutcomeDetail::NotFound {
                        selector: selector.clone(),
                    })
                }
            }

            ActionRequest::Type { selector, text } => {
                if set_value(page, selector, text).await? {
                    Ok(OutcomeDetail::Typed {
                        selector: selector.clone(),
                    })
                } else {
                    Ok(OutcomeDetail::InputNotFound {
                        selector: selector.clone(),
                    })
                }
            }

            ActionRequest::FillForm { fields } => self.fill_form(page, fields).await,

            ActionRequest::Scroll { direction, amount } => {
                let delta = direction.delta(*amount);
                page.call_function(functions::SCROLL_BY, vec![json!(delta)])
                    .await?;
                Ok(OutcomeDetail::Scrolled {
                    direction: *direction,
                    delta,
                })
            }

            ActionRequest::ReadPage => {
                let value = page
                    .call_function(
                        functions::READ_PAGE,
                        vec![json!(self.read_page_chars), json!(READ_PAGE_MAX_LINKS)],
                    )
                    .await?;
                let summary: PageSummary = decode(value)?;
                Ok(OutcomeDetail::PageRead(summary))
            }

            ActionRequest::FindText { text } => {
                let present = page
                    .call_function(functions::CONTAINS_TEXT, vec![json!(text)])
                    .await?;
                if truthy(&present) {
                    page.find_in_page(text).await?;
                    Ok(OutcomeDetail::TextFound { text: text.clone() })
                } else {
                    Ok(OutcomeDetail::TextNotFound { text: text.clone() })
                }
            }

            ActionRequest::ExecuteScript { code } => {
                let value = page.run_script(code).await?;
                Ok(OutcomeDetail::ScriptResult {
                    value: (!value.is_null()).then_some(value),
                })
            }

            ActionRequest::GetElement { selector } => {
                let value = page
                    .call_function(
                        functions::ELEMENT_INFO,
                        vec![
                            json!(selector),
                            json!(ELEMENT_TEXT_LIMIT),
                            json!(ELEMENT_HTML_LIMIT),
                        ],
                    )
                    .await?;
                if value.is_null() {
                    return Ok(OutcomeDetail::NotFound {
                        selector: selector.clone(),
                    });
                }
                let info: ElementInfo = decode(value)?;
                Ok(OutcomeDetail::Element(info))
            }

            ActionRequest::Wait { selector, timeout } => {
                let timeout = timeout
                    .map(Duration::from_millis)
                    .unwrap_or(self.wait_timeout);
                self.wait_for(page, selector, timeout).await
            }

            ActionRequest::GoBack => {
                if page.can_go_back().await? {
                    page.go_back().await?;
                    Ok(OutcomeDetail::WentBack)
                } else {
                    Ok(OutcomeDetail::HistoryUnavailable)
                }
            }

            ActionRequest::GoForward => {
                if page.can_go_forward().await? {
                    page.go_forward().await?;
                    Ok(OutcomeDetail::WentForward)
                } else {
                    Ok(OutcomeDetail::HistoryUnavailable)
                }
            }

            ActionRequest::ViewSource => {
                let value = page
                    .call_function(
                        functions::VIEW_SOURCE,
                        vec![json!(VIEW_SOURCE_MAX_ELEMENTS)],
                    )
                    .await?;
                let reply: SourceReply = decode(value)?;
                Ok(OutcomeDetail::Source(SourceSummary {
                    html_len: reply.html.chars().count(),
                    elements: reply.elements,
                }))
            }

            ActionRequest::Screenshot => Ok(OutcomeDetail::NotAvailable {
                feature: "Screenshot".to_string(),
            }),

            ActionRequest::Unknown { .. } => Ok(OutcomeDetail::UnknownAction),

            ActionRequest::Invalid { reason, .. } => Ok(OutcomeDetail::InvalidAction {
                reason: reason.clone(),
            }),
        }
    }

    /// Apply each field in list order, finishing one before starting the next.
    async fn fill_form(
        &self,
        page: &dyn PageHandle,
        fields: &[FormField],
    ) -> Result<OutcomeDetail, PageError> {
        let mut missing = 0;
        for field in fields {
            if !set_value(page, &field.selector, &field.value).await? {
                tracing::debug!("Form field not found: {}", field.selector);
                missing += 1;
            }
        }
        Ok(OutcomeDetail::FormFilled {
            count: fields.len(),
            missing,
        })
    }

    /// Poll for `selector` until it exists or `timeout` has elapsed.
    async fn wait_for(
        &self,
        page: &dyn PageHandle,
        selector: &str,
        timeout: Duration,
    ) -> Result<OutcomeDetail, PageError> {
        let started = tokio::time::Instant::now();
        loop {
            let exists = page
                .call_function(functions::EXISTS, vec![json!(selector)])
                .await?;
            let elapsed = started.elapsed();

            if truthy(&exists) {
                return Ok(OutcomeDetail::Appeared {
                    selector: selector.to_string(),
                    elapsed_ms: elapsed.as_millis() as u64,
                });
            }

            if elapsed >= timeout {
                return Ok(OutcomeDetail::WaitTimedOut {
                    selector: selector.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }

            tokio::time::sleep(self.poll_interval.min(timeout - elapsed)).await;
        }
    }
}

async fn set_value(page: &dyn PageHandle, selector: &str, value: &str) -> Result<bool, PageError> {
    let done = page
        .call_function(functions::SET_VALUE, vec![json!(selector), json!(value)])
        .await?;
    Ok(truthy(&done))
}

fn truthy(value: &Value) -> bool {
    value.as_bool().unwrap_or(false)
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, PageError> {
    serde_json::from_value(value).map_err(|e| PageError::Decode(e.to_string()))
}
