//! Conversation memory: past exchanges persisted as JSON.

use crate::config::{default_memory_path, MemoryConfig};
use crate::error::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// One user/assistant exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    /// Unix ms
    pub timestamp: u64,
    pub user: String,
    pub assistant: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MemoryFile {
    #[serde(default)]
    conversations: Vec<ConversationEntry>,
}

/// Most recent exchanges, oldest first, capped at `max_entries`.
pub struct ConversationMemory {
    path: PathBuf,
    max_entries: usize,
    entries: Mutex<Vec<ConversationEntry>>,
}

impl ConversationMemory {
    /// Load memory from `path`. A missing file starts empty; an unreadable
    /// one is moved to `<path>.bak` first.
    pub fn open(path: impl Into<PathBuf>, max_entries: usize) -> Self {
        let path = path.into();
        let mut entries = match load(&path) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Error loading memory from {:?}: {}", path, e);
                set_aside(&path);
                Vec::new()
            }
        };
        evict(&mut entries, max_entries);

        Self {
            path,
            max_entries,
            entries: Mutex::new(entries),
        }
    }

    pub fn from_config(config: &MemoryConfig) -> Self {
        let path = config.path.clone().unwrap_or_else(default_memory_path);
        Self::open(path, config.max_entries)
    }

    /// Up to `n` most recent entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<ConversationEntry> {
        let entries = self.entries.lock();
        let start = entries.len().saturating_sub(n);
        entries[start..].to_vec()
    }

    /// Record an exchange and persist.
    pub fn append(&self, user: &str, assistant: &str) -> Result<()> {
        let snapshot = {
            let mut entries = self.entries.lock();
            entries.push(ConversationEntry {
                timestamp: now_ms(),
                user: user.to_string(),
                assistant: assistant.to_string(),
            });
            evict(&mut entries, self.max_entries);
            entries.clone()
        };
        save(&self.path, snapshot)
    }

    /// Forget everything, on disk too.
    pub fn clear(&self) -> Result<()> {
        self.entries.lock().clear();
        save(&self.path, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn evict(entries: &mut Vec<ConversationEntry>, max_entries: usize) {
    if entries.len() > max_entries {
        let excess = entries.len() - max_entries;
        entries.drain(..excess);
    }
}

fn load(path: &Path) -> Result<Vec<ConversationEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    let file: MemoryFile = serde_json::from_str(&content)?;
    Ok(file.conversations)
}

fn backup_path(path: &Path) -> PathBuf {
    let mut backup = path.as_os_str().to_owned();
    backup.push(".bak");
    PathBuf::from(backup)
}

fn set_aside(path: &Path) {
    let backup = backup_path(path);
    match std::fs::rename(path, &backup) {
        Ok(()) => tracing::warn!("Moved unreadable memory file to {:?}", backup),
        Err(e) => tracing::warn!("Failed to move {:?} aside: {}", path, e),
    }
}

fn save(path: &Path, conversations: Vec<ConversationEntry>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(&MemoryFile { conversations })?;
    std::fs::write(path, content)?;
    tracing::debug!("Saved memory to {:?}", path);
    Ok(())
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
