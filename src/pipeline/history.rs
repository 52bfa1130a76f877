//! Published-text history, the memory behind the novelty check.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::HistoryConfig;
use crate::store::StateStore;

/// One published text. Never modified after it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub text: String,
    /// Script or job that produced the text.
    pub source: String,
    pub platform: String,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        text: impl Into<String>,
        source: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            source: source.into(),
            platform: platform.into(),
            created_at: Utc::now(),
        }
    }
}

/// Bounded, append-only history over a store.
pub struct History {
    store: Box<dyn StateStore<Vec<HistoryEntry>>>,
    entries: Vec<HistoryEntry>,
    max_entries: usize,
}

impl History {
    /// Load from `store`. A failed load starts empty.
    pub fn open(store: Box<dyn StateStore<Vec<HistoryEntry>>>, config: HistoryConfig) -> Self {
        let mut entries = match store.load() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(store = %store.describe(), error = %e, "Failed to load history, starting empty");
                Vec::new()
            }
        };
        trim(&mut entries, config.max_entries);
        debug!(store = %store.describe(), entries = entries.len(), "History loaded");
        Self {
            store,
            entries,
            max_entries: config.max_entries,
        }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Texts of the last `n` entries, oldest first.
    pub fn recent_texts(&self, n: usize) -> Vec<String> {
        let start = self.entries.len().saturating_sub(n);
        self.entries[start..]
            .iter()
            .map(|e| e.text.clone())
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Append, trim to the window, and save. A failed save is logged; the
    /// entry stays in memory.
    pub fn append(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
        trim(&mut self.entries, self.max_entries);
        if let Err(e) = self.store.save(&self.entries) {
            warn!(store = %self.store.describe(), error = %e, "Failed to save history");
        }
    }
}

fn trim(entries: &mut Vec<HistoryEntry>, max: usize) {
    if entries.len() > max {
        let excess = entries.len() - max;
        entries.drain(..excess);
    }
}
