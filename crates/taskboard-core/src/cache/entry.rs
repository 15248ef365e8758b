//! Per-key cache entry.

use futures::future::{BoxFuture, Shared};
use std::time::Duration;
use tokio::time::Instant;

use super::QueryData;
use super::mutation::Overlay;
use crate::domain::StoreError;

/// Handle every concurrent reader of a key awaits while one store call is pending.
pub(crate) type InFlight = Shared<BoxFuture<'static, Result<QueryData, StoreError>>>;

pub(crate) struct CacheEntry {
    pub(crate) data: Option<QueryData>,

    /// When `data` last came back from the store.
    pub(crate) fetched_at: Option<Instant>,

    /// Set by invalidation. A stale entry refetches on the next read.
    pub(crate) stale: bool,

    /// Bumped by every fetch start, invalidation and optimistic write.
    /// A fetch only writes its result if the generation is still its own.
    pub(crate) generation: u64,

    pub(crate) in_flight: Option<InFlight>,

    pub(crate) last_error: Option<StoreError>,

    pub(crate) last_accessed: Instant,

    /// Live key-scoped subscriptions. Observed entries are never collected.
    pub(crate) observers: usize,

    /// Present while optimistic mutations are pending on this entry. Reads
    /// serve `data` as-is instead of refetching.
    pub(crate) overlay: Option<Overlay>,
}

impl CacheEntry {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            data: None,
            fetched_at: None,
            stale: false,
            generation: 0,
            in_flight: None,
            last_error: None,
            last_accessed: now,
            observers: 0,
            overlay: None,
        }
    }

    /// Fresh means usable without a store call: present, not invalidated and
    /// younger than `stale_time`. A zero stale time is never fresh.
    pub(crate) fn is_fresh(&self, now: Instant, stale_time: Duration) -> bool {
        match (&self.data, self.fetched_at) {
            (Some(_), Some(at)) if !self.stale => now.saturating_duration_since(at) < stale_time,
            _ => false,
        }
    }

    pub(crate) fn is_collectable(&self, now: Instant, gc_time: Duration) -> bool {
        self.observers == 0
            && self.in_flight.is_none()
            && self.overlay.is_none()
            && now.saturating_duration_since(self.last_accessed) >= gc_time
    }

    /// Mark stale and detach any pending fetch so its result is discarded.
    pub(crate) fn invalidate(&mut self, generation: u64) {
        self.stale = true;
        self.generation = generation;
        self.in_flight = None;
    }
}

/// Read-only view of an entry for callers and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStatus {
    pub has_data: bool,
    pub stale: bool,
    pub fetching: bool,
    pub last_error: Option<StoreError>,
    /// Optimistic mutations still waiting on the store.
    pub pending_mutations: usize,
}

impl From<&CacheEntry> for EntryStatus {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            has_data: entry.data.is_some(),
            stale: entry.stale,
            fetching: entry.in_flight.is_some(),
            last_error: entry.last_error.clone(),
            pending_mutations: entry.overlay.as_ref().map_or(0, Overlay::pending),
        }
    }
}
