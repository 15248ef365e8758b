//! Observer interface for cache changes.
//!
//! Listeners run synchronously, after the state change, outside the cache lock.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use super::QueryKey;

/// What happened to a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// New data landed (fetch result or optimistic write).
    Updated(QueryKey),
    /// Marked stale; the next read refetches.
    Invalidated(QueryKey),
    /// Dropped from the cache (purge or garbage collection).
    Removed(QueryKey),
    /// A failed mutation restored the pre-mutation value.
    RolledBack(QueryKey),
    /// A fetch gave up with an error; previous data (if any) is kept.
    Failed(QueryKey),
}

impl CacheEvent {
    pub fn key(&self) -> &QueryKey {
        match self {
            Self::Updated(key)
            | Self::Invalidated(key)
            | Self::Removed(key)
            | Self::RolledBack(key)
            | Self::Failed(key) => key,
        }
    }
}

pub type Listener = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

pub(crate) struct Registered {
    pub(crate) key: Option<QueryKey>,
    pub(crate) listener: Listener,
}

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    pub(crate) by_id: BTreeMap<u64, Registered>,
}

impl Listeners {
    pub(crate) fn insert(&mut self, key: Option<QueryKey>, listener: Listener) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.by_id.insert(id, Registered { key, listener });
        id
    }

    /// Listeners interested in `event`, cloned so they can run unlocked.
    pub(crate) fn matching(&self, event: &CacheEvent) -> Vec<Listener> {
        self.by_id
            .values()
            .filter(|r| r.key.as_ref().is_none_or(|key| key == event.key()))
            .map(|r| Arc::clone(&r.listener))
            .collect()
    }
}

/// Something that can drop a subscription. Implemented by the cache internals.
pub(crate) trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self, id: u64);
}

/// Live subscription. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    owner: Weak<dyn Unsubscribe>,
}

impl Subscription {
    pub(crate) fn new(id: u64, owner: Weak<dyn Unsubscribe>) -> Self {
        Self { id, owner }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.unsubscribe(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
