//! Time-bounded cache of catalog views.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Entries keyed by server filter, valid for a fixed time to live.
#[derive(Debug)]
pub(crate) struct DiscoveryCache<T> {
    ttl: Duration,
    entries: HashMap<Option<String>, (Instant, Vec<T>)>,
}

impl<T: Clone> DiscoveryCache<T> {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Returns the cached view unless it has outlived the time to live.
    pub(crate) fn get(&self, key: Option<&str>, now: Instant) -> Option<Vec<T>> {
        self.entries
            .get(&key.map(str::to_owned))
            .filter(|(stored_at, _)| now.saturating_duration_since(*stored_at) < self.ttl)
            .map(|(_, items)| items.clone())
    }

    pub(crate) fn put(&mut self, key: Option<&str>, now: Instant, items: Vec<T>) {
        self.entries.insert(key.map(str::to_owned), (now, items));
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
