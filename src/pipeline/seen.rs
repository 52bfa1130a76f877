//! Processed-item cache, so a restarted job never answers the same mention twice.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::StateStore;

/// Item id → when it was processed.
pub type SeenMap = BTreeMap<String, DateTime<Utc>>;

/// How long a processed id is remembered.
pub const SEEN_RETENTION_HOURS: i64 = 48;

pub struct SeenCache {
    store: Box<dyn StateStore<SeenMap>>,
    items: SeenMap,
    retention: Duration,
}

impl SeenCache {
    /// Load from `store` and drop ids older than the retention window.
    pub fn open(store: Box<dyn StateStore<SeenMap>>) -> Self {
        Self::open_at(store, Utc::now())
    }

    pub fn open_at(store: Box<dyn StateStore<SeenMap>>, now: DateTime<Utc>) -> Self {
        let items = match store.load() {
            Ok(items) => items,
            Err(e) => {
                warn!(store = %store.describe(), error = %e, "Failed to load seen items, starting empty");
                SeenMap::new()
            }
        };
        let mut cache = Self {
            store,
            items,
            retention: Duration::hours(SEEN_RETENTION_HOURS),
        };
        let before = cache.items.len();
        cache.purge(now);
        debug!(
            kept = cache.items.len(),
            purged = before - cache.items.len(),
            "Seen items loaded"
        );
        cache
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Remember `id`. Returns false if it was already known.
    pub fn mark(&mut self, id: &str) -> bool {
        self.mark_at(id, Utc::now())
    }

    pub fn mark_at(&mut self, id: &str, now: DateTime<Utc>) -> bool {
        if self.items.contains_key(id) {
            return false;
        }
        self.items.insert(id.to_string(), now);
        true
    }

    /// Persist the cache. Callers batch marks and save once per run.
    pub fn save(&self) -> Result<(), StoreError> {
        self.store.save(&self.items)
    }

    fn purge(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.retention;
        self.items.retain(|_, seen_at| *seen_at > cutoff);
    }
}
