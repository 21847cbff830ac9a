//! Tabs owned by the shell, each holding its own page.

use crate::agent::page::PageHandle;
use crate::error::{AstaError, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_TAB_TITLE: &str = "New Tab";

/// Stable tab identifier. Never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TabId(pub u64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Creates the page behind a new tab
#[async_trait]
pub trait PageFactory: Send + Sync {
    async fn open(&self, url: &str) -> Result<Arc<dyn PageHandle>>;
}

#[derive(Clone)]
pub struct Tab {
    pub id: TabId,
    pub title: String,
    pub url: String,
    pub page: Arc<dyn PageHandle>,
}

impl fmt::Debug for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tab")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

pub struct TabManager {
    factory: Arc<dyn PageFactory>,
    home_url: String,
    /// In display order
    tabs: Vec<Tab>,
    active: Option<TabId>,
    next_id: u64,
}

impl TabManager {
    pub fn new(factory: Arc<dyn PageFactory>, home_url: impl Into<String>) -> Self {
        Self {
            factory,
            home_url: home_url.into(),
            tabs: Vec::new(),
            active: None,
            next_id: 0,
        }
    }

    /// Adopt an already-open page as a tab and make it active.
    pub fn adopt(&mut self, page: Arc<dyn PageHandle>, url: impl Into<String>) -> TabId {
        let id = TabId(self.next_id);
        self.next_id += 1;
        self.tabs.push(Tab {
            id,
            title: DEFAULT_TAB_TITLE.to_string(),
            url: url.into(),
            page,
        });
        self.active = Some(id);
        tracing::debug!("Opened tab {}", id);
        id
    }

    /// Open a tab on `url` (the home page when `None`) and make it active.
    pub async fn open(&mut self, url: Option<&str>) -> Result<TabId> {
        let url = url.unwrap_or(&self.home_url).to_string();
        let page = self.factory.open(&url).await?;
        Ok(self.adopt(page, url))
    }

    pub fn switch(&mut self, id: TabId) -> Result<()> {
        if self.index_of(id).is_none() {
            return Err(AstaError::TabNotFound(id.0));
        }
        self.active = Some(id);
        Ok(())
    }

    /// Close a tab and return the tab that is active afterwards.
    ///
    /// Closing the active tab activates its left neighbour (or the new first
    /// tab). Closing the last tab opens a fresh home tab.
    pub async fn close(&mut self, id: TabId) -> Result<TabId> {
        let index = self.index_of(id).ok_or(AstaError::TabNotFound(id.0))?;
        let tab = self.tabs.remove(index);
        if let Err(e) = tab.page.close().await {
            tracing::warn!("Failed to close page of tab {}: {}", id, e);
        }
        tracing::debug!("Closed tab {}", id);

        if self.tabs.is_empty() {
            self.active = None;
            return self.open(None).await;
        }

        if self.active == Some(id) {
            let next = self.tabs[index.saturating_sub(1)].id;
            self.active = Some(next);
        }

        self.active.ok_or(AstaError::TabNotFound(id.0))
    }

    pub fn active(&self) -> Option<&Tab> {
        let id = self.active?;
        self.tabs.iter().find(|t| t.id == id)
    }

    pub fn active_id(&self) -> Option<TabId> {
        self.active
    }

    pub fn active_page(&self) -> Option<Arc<dyn PageHandle>> {
        self.active().map(|t| Arc::clone(&t.page))
    }

    pub fn get(&self, id: TabId) -> Option<&Tab> {
        self.tabs.iter().find(|t| t.id == id)
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    /// Set a tab's title; an empty title falls back to the default.
    pub fn set_title(&mut self, id: TabId, title: &str) -> Result<()> {
        let tab = self.get_mut(id)?;
        tab.title = if title.trim().is_empty() {
            DEFAULT_TAB_TITLE.to_string()
        } else {
            title.to_string()
        };
        Ok(())
    }

    /// Re-read the tab's URL from its page.
    pub async fn refresh_url(&mut self, id: TabId) -> Result<String> {
        let page = Arc::clone(&self.get_mut(id)?.page);
        let url = page.current_url().await?;
        self.get_mut(id)?.url = url.clone();
        Ok(url)
    }

    fn index_of(&self, id: TabId) -> Option<usize> {
        self.tabs.iter().position(|t| t.id == id)
    }

    fn get_mut(&mut self, id: TabId) -> Result<&mut Tab> {
        self.tabs
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(AstaError::TabNotFound(id.0))
    }
}
