//! Query cache: the process-wide view of what the board believes the store holds.
//!
//! - `read` serves fresh entries from memory and de-duplicates concurrent
//!   fetches of the same key (one store call per key at a time).
//! - `mutate` applies optimistic updates through a `MutationAttempt`, calls the
//!   store, then invalidates on success or rebuilds the touched entries on
//!   failure. Entries with a pending mutation serve their optimistic value.
//! - Listeners are notified synchronously after each state change.
//!
//! The cache is the only writer of cache entries. Components get a cloned
//! handle; clones share state.

mod entry;
mod key;
mod mutation;
mod retry;
mod subscription;

pub use self::entry::EntryStatus;
pub use self::key::{QueryData, QueryKey};
pub use self::mutation::{Mutation, MutationAttempt, MutationOutput};
pub use self::retry::RetryPolicy;
pub use self::subscription::{CacheEvent, Listener, Subscription};

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::time::Instant;

use self::entry::{CacheEntry, InFlight};
use self::mutation::PendingMutation;
use self::subscription::{Listeners, Unsubscribe};
use crate::domain::{Column, StoreError, Task, TaskDraft, TaskId, TaskPage, TaskPatch};
use crate::ports::{Clock, SystemClock, TaskStore};

/// Timing and retry knobs for the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Freshness window for `Tasks` and `Task` keys.
    pub list_stale_time: Duration,
    /// Freshness window for `Page` keys. Zero means every read refetches.
    pub page_stale_time: Duration,
    /// Unobserved, untouched entries older than this are collected.
    pub gc_time: Duration,
    pub read_retry: RetryPolicy,
    pub mutation_retry: RetryPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            list_stale_time: Duration::from_secs(5 * 60),
            page_stale_time: Duration::ZERO,
            gc_time: Duration::from_secs(5 * 60),
            read_retry: RetryPolicy::reads(),
            mutation_retry: RetryPolicy::mutations(),
        }
    }
}

impl CacheConfig {
    pub fn stale_time(&self, key: &QueryKey) -> Duration {
        match key {
            QueryKey::Page { .. } => self.page_stale_time,
            QueryKey::Tasks(_) | QueryKey::Task(_) => self.list_stale_time,
        }
    }
}

/// Counters for observability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Reads that joined an already pending fetch.
    pub deduplicated: u64,
    /// Store calls issued for reads (retries excluded).
    pub fetches: u64,
    pub retries: u64,
    pub mutations: u64,
    pub rollbacks: u64,
}

pub(crate) struct CacheState {
    pub(crate) entries: HashMap<QueryKey, CacheEntry>,
    pub(crate) stats: CacheStats,
    /// Optimistic mutations awaiting the store, keyed by attempt id.
    pub(crate) pending: BTreeMap<u64, PendingMutation>,
    next_generation: u64,
}

impl CacheState {
    /// Fresh generation number, unique across the cache.
    pub(crate) fn bump(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }
}

struct Inner {
    state: Mutex<CacheState>,
    listeners: Mutex<Listeners>,
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run listeners for each event. Must be called with no lock held.
    fn notify(&self, events: Vec<CacheEvent>) {
        for event in events {
            let listeners = self.listeners().matching(&event);
            for listener in listeners {
                listener(&event);
            }
        }
    }

    /// Write a fetch result unless the entry moved on to a newer generation.
    fn finish_fetch(&self, key: &QueryKey, generation: u64, result: &Result<QueryData, StoreError>) {
        let event = {
            let mut state = self.state();
            let Some(entry) = state.entries.get_mut(key) else {
                tracing::debug!(key = %key, "Fetch finished for a removed entry");
                return;
            };
            if entry.generation != generation {
                tracing::debug!(key = %key, "Discarding superseded fetch result");
                return;
            }
            entry.in_flight = None;
            match result {
                Ok(data) => {
                    entry.data = Some(data.clone());
                    entry.fetched_at = Some(Instant::now());
                    entry.stale = false;
                    entry.last_error = None;
                    CacheEvent::Updated(key.clone())
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Fetch failed");
                    entry.last_error = Some(e.clone());
                    CacheEvent::Failed(key.clone())
                }
            }
        };
        self.notify(vec![event]);
    }
}

impl Unsubscribe for Inner {
    fn unsubscribe(&self, id: u64) {
        let removed = self.listeners().by_id.remove(&id);
        if let Some(key) = removed.and_then(|r| r.key) {
            let mut state = self.state();
            if let Some(entry) = state.entries.get_mut(&key) {
                entry.observers = entry.observers.saturating_sub(1);
                entry.last_accessed = Instant::now();
            }
        }
    }
}

/// Shared handle to the query cache.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl QueryCache {
    pub fn new(store: Arc<dyn TaskStore>, config: CacheConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// `clock` stamps `updatedAt` on optimistic writes.
    pub fn with_clock(store: Arc<dyn TaskStore>, config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CacheState {
                    entries: HashMap::new(),
                    stats: CacheStats::default(),
                    pending: BTreeMap::new(),
                    next_generation: 0,
                }),
                listeners: Mutex::new(Listeners::default()),
                store,
                clock,
                config,
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Cached value if fresh, otherwise the result of a (shared) store call.
    pub async fn read(&self, key: QueryKey) -> Result<QueryData, StoreError> {
        let pending = {
            let mut guard = self.inner.state();
            let state = &mut *guard;
            let now = Instant::now();
            let stale_time = self.inner.config.stale_time(&key);

            let entry = state
                .entries
                .entry(key.clone())
                .or_insert_with(|| CacheEntry::new(now));
            entry.last_accessed = now;

            // A refetch now could only return the pre-mutation value.
            if (entry.overlay.is_some() || entry.is_fresh(now, stale_time))
                && let Some(data) = entry.data.clone()
            {
                state.stats.hits += 1;
                tracing::debug!(key = %key, optimistic = entry.overlay.is_some(), "Cache hit");
                return Ok(data);
            }

            if let Some(pending) = entry.in_flight.clone() {
                state.stats.deduplicated += 1;
                tracing::debug!(key = %key, "Joining in-flight fetch");
                pending
            } else {
                state.stats.misses += 1;
                state.stats.fetches += 1;
                let generation = state.bump();
                let pending = self.start_fetch(key.clone(), generation);
                if let Some(entry) = state.entries.get_mut(&key) {
                    entry.generation = generation;
                    entry.in_flight = Some(pending.clone());
                }
                tracing::debug!(key = %key, generation, "Cache miss, fetching");
                pending
            }
        };
        pending.await
    }

    fn start_fetch(&self, key: QueryKey, generation: u64) -> InFlight {
        let inner = Arc::clone(&self.inner);
        let pending = async move {
            let store = Arc::clone(&inner.store);
            let policy = inner.config.read_retry.clone();
            let result = policy
                .run(
                    || key.fetch(store.as_ref()),
                    |_, _| inner.state().stats.retries += 1,
                )
                .await;
            inner.finish_fetch(&key, generation, &result);
            result
        }
        .boxed()
        .shared();

        // Keep going even if every reader stops listening.
        tokio::spawn(pending.clone());
        pending
    }

    /// Typed read of a listing key.
    pub async fn read_page(&self, key: QueryKey) -> Result<TaskPage, StoreError> {
        let data = self.read(key.clone()).await?;
        data.into_page().ok_or_else(|| {
            StoreError::Storage(format!("cache key {key} does not hold a listing"))
        })
    }

    pub async fn read_task(&self, id: TaskId) -> Result<Task, StoreError> {
        let key = QueryKey::Task(id);
        let data = self.read(key.clone()).await?;
        data.into_task().ok_or_else(|| {
            StoreError::Storage(format!("cache key {key} does not hold a task"))
        })
    }

    /// Current value without touching the store.
    pub fn peek(&self, key: &QueryKey) -> Option<QueryData> {
        self.inner
            .state()
            .entries
            .get(key)
            .and_then(|entry| entry.data.clone())
    }

    pub fn status(&self, key: &QueryKey) -> Option<EntryStatus> {
        self.inner.state().entries.get(key).map(EntryStatus::from)
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.status(key).is_some_and(|status| status.fetching)
    }

    pub fn keys(&self) -> Vec<QueryKey> {
        self.inner.state().entries.keys().cloned().collect()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.state().stats.clone()
    }

    /// Apply a mutation optimistically, run it against the store, then settle or roll back.
    pub async fn mutate(&self, mutation: Mutation) -> Result<MutationOutput, StoreError> {
        let label = mutation.label();
        let target = mutation.target();

        // Optimistic write happens before the store call is issued.
        let (attempt, events) = {
            let mut state = self.inner.state();
            state.stats.mutations += 1;
            MutationAttempt::begin(mutation, &mut state, self.inner.clock.now())
        };
        tracing::debug!(
            mutation = label,
            keys = attempt.keys().count(),
            "Applied optimistic update"
        );
        self.inner.notify(events);

        let store = Arc::clone(&self.inner.store);
        let policy = self.inner.config.mutation_retry.clone();
        let result = policy
            .run(
                || attempt.mutation().execute(store.as_ref()),
                |_, _| self.inner.state().stats.retries += 1,
            )
            .await;

        let events = {
            let mut state = self.inner.state();
            match &result {
                Ok(_) => attempt.settle(&mut state),
                Err(_) => {
                    state.stats.rollbacks += 1;
                    attempt.roll_back(&mut state)
                }
            }
        };
        match &result {
            Ok(_) => tracing::info!(mutation = label, ?target, "Mutation committed"),
            Err(e) => tracing::warn!(
                mutation = label,
                ?target,
                error = %e,
                "Mutation failed, optimistic state rolled back"
            ),
        }
        self.inner.notify(events);
        result
    }

    pub async fn create(&self, draft: TaskDraft) -> Result<Task, StoreError> {
        let output = self.mutate(Mutation::Create(draft)).await?;
        output
            .into_task()
            .ok_or_else(|| StoreError::Storage("create returned no task".to_string()))
    }

    pub async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Task, StoreError> {
        let output = self.mutate(Mutation::Update { id, patch }).await?;
        output
            .into_task()
            .ok_or_else(|| StoreError::Storage("update returned no task".to_string()))
    }

    pub async fn move_task(&self, id: TaskId, column: Column) -> Result<Task, StoreError> {
        let output = self.mutate(Mutation::Move { id, column }).await?;
        output
            .into_task()
            .ok_or_else(|| StoreError::Storage("move returned no task".to_string()))
    }

    pub async fn delete(&self, id: TaskId) -> Result<(), StoreError> {
        self.mutate(Mutation::Delete(id)).await.map(|_| ())
    }

    /// Mark matching entries stale. Pending fetches for them are discarded.
    pub fn invalidate(&self, predicate: impl Fn(&QueryKey) -> bool) -> usize {
        let events: Vec<CacheEvent> = {
            let mut state = self.inner.state();
            let keys: Vec<QueryKey> = state.entries.keys().filter(|key| predicate(*key)).cloned().collect();
            keys.into_iter()
                .filter_map(|key| {
                    let generation = state.bump();
                    let entry = state.entries.get_mut(&key)?;
                    entry.invalidate(generation);
                    Some(CacheEvent::Invalidated(key))
                })
                .collect()
        };
        let count = events.len();
        if count > 0 {
            tracing::debug!(entries = count, "Invalidated cache entries");
        }
        self.inner.notify(events);
        count
    }

    /// Drop matching entries outright.
    pub fn remove(&self, predicate: impl Fn(&QueryKey) -> bool) -> usize {
        let events: Vec<CacheEvent> = {
            let mut state = self.inner.state();
            let keys: Vec<QueryKey> = state.entries.keys().filter(|key| predicate(*key)).cloned().collect();
            keys.into_iter()
                .filter(|key| state.entries.remove(key).is_some())
                .map(CacheEvent::Removed)
                .collect()
        };
        let count = events.len();
        if count > 0 {
            tracing::debug!(entries = count, "Removed cache entries");
        }
        self.inner.notify(events);
        count
    }

    /// Remove entries nobody observes that have been idle for `gc_time`.
    pub fn collect_garbage(&self) -> usize {
        let gc_time = self.inner.config.gc_time;
        let now = Instant::now();
        let events: Vec<CacheEvent> = {
            let mut state = self.inner.state();
            let keys: Vec<QueryKey> = state
                .entries
                .iter()
                .filter(|(_, entry)| entry.is_collectable(now, gc_time))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &keys {
                state.entries.remove(key);
            }
            keys.into_iter().map(CacheEvent::Removed).collect()
        };
        let count = events.len();
        if count > 0 {
            tracing::debug!(entries = count, "Collected idle cache entries");
        }
        self.inner.notify(events);
        count
    }

    /// Listen to every cache event.
    pub fn subscribe(&self, listener: impl Fn(&CacheEvent) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.listeners().insert(None, Arc::new(listener));
        Subscription::new(id, self.owner())
    }

    /// Listen to events for one key. The entry is kept alive while subscribed.
    pub fn subscribe_key(
        &self,
        key: QueryKey,
        listener: impl Fn(&CacheEvent) + Send + Sync + 'static,
    ) -> Subscription {
        {
            let mut state = self.inner.state();
            let now = Instant::now();
            let entry = state
                .entries
                .entry(key.clone())
                .or_insert_with(|| CacheEntry::new(now));
            entry.observers += 1;
        }
        let id = self.inner.listeners().insert(Some(key), Arc::new(listener));
        Subscription::new(id, self.owner())
    }

    fn owner(&self) -> Weak<dyn Unsubscribe> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        weak
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ListFilter;
    use crate::impls::{FlakyStore, LocalTaskStore, MemoryPersistence, StaticSeed};
    use chrono::{TimeZone, Utc};

    type Store = FlakyStore<LocalTaskStore>;

    fn seed() -> Vec<Task> {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        [
            (1, "Write docs", Column::Backlog),
            (2, "Fix crash", Column::Backlog),
            (3, "Crash triage", Column::Backlog),
            (4, "Review parser", Column::Review),
        ]
        .into_iter()
        .map(|(id, title, column)| {
            TaskDraft::new(title, "description for the task", column).into_task(TaskId::new(id), at)
        })
        .collect()
    }

    fn store() -> Arc<Store> {
        let local = LocalTaskStore::open(
            Arc::new(MemoryPersistence::new()),
            Arc::new(StaticSeed::new(seed())),
            Arc::new(SystemClock),
        )
        .unwrap();
        Arc::new(FlakyStore::new(local))
    }

    fn config() -> CacheConfig {
        let fast = RetryPolicy {
            base_delay_ms: 10,
            ..RetryPolicy::reads()
        };
        CacheConfig {
            read_retry: fast.clone(),
            mutation_retry: fast.with_max_attempts(2),
            ..CacheConfig::default()
        }
    }

    fn cache(store: &Arc<Store>) -> QueryCache {
        QueryCache::new(store.clone(), config())
    }

    fn all() -> QueryKey {
        QueryKey::Tasks(ListFilter::all())
    }

    fn record(cache: &QueryCache) -> (Arc<Mutex<Vec<CacheEvent>>>, Subscription) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let subscription = cache.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
        (events, subscription)
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_listing_is_served_from_memory() {
        let store = store();
        let cache = cache(&store);

        let first = cache.read(all()).await.unwrap();
        let second = cache.read(all()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.reads(), 1);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn listing_refetches_once_stale() {
        let store = store();
        let cache = cache(&store);

        cache.read(all()).await.unwrap();
        tokio::time::advance(Duration::from_secs(5 * 60)).await;
        cache.read(all()).await.unwrap();

        assert_eq!(store.reads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn page_reads_always_refetch() {
        let store = store();
        let cache = cache(&store);
        let key = QueryKey::page(Column::Backlog, 1, 2, "");

        let page = cache.read_page(key.clone()).await.unwrap();
        cache.read_page(key).await.unwrap();

        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(store.reads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_reads_share_one_store_call() {
        let store = store();
        store.set_latency(Duration::from_millis(100));
        let cache = cache(&store);

        let (a, b) = tokio::join!(cache.read(all()), cache.read(all()));

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(store.reads(), 1);
        assert_eq!(cache.stats().deduplicated, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_read_failures_are_retried() {
        let store = store();
        store.fail_reads(2, StoreError::Transient("502".into()));
        let cache = cache(&store);

        let data = cache.read(all()).await.unwrap();

        assert_eq!(data.as_page().unwrap().total, 4);
        assert_eq!(store.reads(), 3);
        assert_eq!(cache.stats().retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reads_give_up_after_three_attempts() {
        let store = store();
        store.fail_reads(10, StoreError::Transient("offline".into()));
        let cache = cache(&store);

        let err = cache.read(all()).await.unwrap_err();

        assert!(matches!(err, StoreError::Transient(_)));
        assert_eq!(store.reads(), 3);
        assert_eq!(cache.status(&all()).unwrap().last_error, Some(err));
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_is_not_retried() {
        let store = store();
        let cache = cache(&store);

        let err = cache.read_task(TaskId::new(99)).await.unwrap_err();

        assert_eq!(err, StoreError::NotFound(TaskId::new(99)));
        assert_eq!(store.reads(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn optimistic_state_is_visible_before_the_store_answers() {
        let store = store();
        let cache = cache(&store);
        cache.read(all()).await.unwrap();
        store.set_latency(Duration::from_millis(200));

        let pending = tokio::spawn({
            let cache = cache.clone();
            async move { cache.move_task(TaskId::new(1), Column::Done).await }
        });
        tokio::task::yield_now().await;

        let optimistic = cache.peek(&all()).unwrap();
        assert_eq!(optimistic.find(TaskId::new(1)).unwrap().column, Column::Done);

        let moved = pending.await.unwrap().unwrap();
        assert_eq!(moved.column, Column::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_mutation_restores_every_entry_exactly() {
        let store = store();
        let cache = cache(&store);
        let backlog = QueryKey::page(Column::Backlog, 1, 10, "");
        let done = QueryKey::page(Column::Done, 1, 10, "");
        cache.read(all()).await.unwrap();
        cache.read(backlog.clone()).await.unwrap();
        cache.read(done.clone()).await.unwrap();
        let before: Vec<Option<QueryData>> =
            [&all(), &backlog, &done].iter().map(|k| cache.peek(k)).collect();
        let (events, _subscription) = record(&cache);

        store.fail_writes(2, StoreError::Transient("connection reset".into()));
        let err = cache.move_task(TaskId::new(2), Column::Done).await.unwrap_err();

        let after: Vec<Option<QueryData>> =
            [&all(), &backlog, &done].iter().map(|k| cache.peek(k)).collect();
        assert!(matches!(err, StoreError::Transient(_)));
        assert_eq!(before, after);
        assert_eq!(store.writes(), 2);
        assert_eq!(cache.stats().rollbacks, 1);

        let events = events.lock().unwrap();
        assert!(events.contains(&CacheEvent::Updated(done.clone())));
        assert!(events.contains(&CacheEvent::RolledBack(done)));
    }

    #[tokio::test(start_paused = true)]
    async fn validation_failures_roll_back_without_retry() {
        let store = store();
        let cache = cache(&store);
        cache.read(all()).await.unwrap();
        let before = cache.peek(&all());

        let patch = TaskPatch {
            title: Some("no".into()),
            ..TaskPatch::default()
        };
        let err = cache.update(TaskId::new(1), patch).await.unwrap_err();

        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(cache.peek(&all()), before);
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_mutation_invalidates_listings() {
        let store = store();
        let cache = cache(&store);
        cache.read(all()).await.unwrap();

        cache.move_task(TaskId::new(1), Column::Review).await.unwrap();
        assert!(cache.status(&all()).unwrap().stale);

        let refreshed = cache.read(all()).await.unwrap();
        assert_eq!(refreshed.find(TaskId::new(1)).unwrap().column, Column::Review);
        assert_eq!(store.reads(), 2);
    }

    /// Start a mutation whose store call takes `latency`, and let it reach the store.
    async fn spawn_slow(
        store: &Arc<Store>,
        cache: &QueryCache,
        latency: Duration,
        mutation: Mutation,
    ) -> tokio::task::JoinHandle<Result<MutationOutput, StoreError>> {
        store.set_latency(latency);
        let handle = tokio::spawn({
            let cache = cache.clone();
            async move { cache.mutate(mutation).await }
        });
        tokio::task::yield_now().await;
        handle
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_failures_leave_the_original_state() {
        let store = store();
        let cache = cache(&store);
        let backlog = QueryKey::page(Column::Backlog, 1, 10, "");
        cache.read(all()).await.unwrap();
        cache.read(backlog.clone()).await.unwrap();
        let before = (cache.peek(&all()), cache.peek(&backlog));
        store.fail_writes(2, StoreError::Storage("disk full".into()));

        let first = spawn_slow(&store, &cache, Duration::from_millis(100), Mutation::Move {
            id: TaskId::new(1),
            column: Column::Done,
        })
        .await;
        let second = spawn_slow(&store, &cache, Duration::from_millis(300), Mutation::Move {
            id: TaskId::new(2),
            column: Column::Review,
        })
        .await;
        assert_eq!(cache.status(&all()).unwrap().pending_mutations, 2);

        first.await.unwrap().unwrap_err();
        let midway = cache.peek(&all()).unwrap();
        assert_eq!(midway.find(TaskId::new(1)).unwrap().column, Column::Backlog);
        assert_eq!(midway.find(TaskId::new(2)).unwrap().column, Column::Review);

        second.await.unwrap().unwrap_err();
        assert_eq!((cache.peek(&all()), cache.peek(&backlog)), before);
        let status = cache.status(&all()).unwrap();
        assert_eq!(status.pending_mutations, 0);
        assert!(!status.stale);
        assert_eq!(cache.stats().rollbacks, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_after_an_overlapping_success_keeps_it_and_stays_stale() {
        let store = store();
        let cache = cache(&store);
        cache.read(all()).await.unwrap();

        let accepted = spawn_slow(&store, &cache, Duration::from_millis(100), Mutation::Move {
            id: TaskId::new(1),
            column: Column::Review,
        })
        .await;
        let rejected = spawn_slow(&store, &cache, Duration::from_millis(300), Mutation::Update {
            id: TaskId::new(2),
            patch: TaskPatch {
                title: Some("no".into()),
                ..TaskPatch::default()
            },
        })
        .await;

        accepted.await.unwrap().unwrap();
        assert!(matches!(rejected.await.unwrap(), Err(StoreError::Validation(_))));

        let view = cache.peek(&all()).unwrap();
        assert_eq!(view.find(TaskId::new(1)).unwrap().column, Column::Review);
        assert_eq!(view.find(TaskId::new(2)).unwrap().title, "Fix crash");
        assert!(cache.status(&all()).unwrap().stale);

        let reads = store.reads();
        cache.read(all()).await.unwrap();
        assert_eq!(store.reads(), reads + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reads_while_a_mutation_is_pending_keep_the_optimistic_value() {
        let store = store();
        let cache = cache(&store);
        let backlog = QueryKey::page(Column::Backlog, 1, 10, "");
        cache.read(backlog.clone()).await.unwrap();

        let pending = spawn_slow(&store, &cache, Duration::from_millis(200), Mutation::Move {
            id: TaskId::new(1),
            column: Column::Done,
        })
        .await;
        let reads = store.reads();

        let page = cache.read_page(backlog.clone()).await.unwrap();
        assert!(page.items.iter().all(|task| task.id != TaskId::new(1)));
        assert_eq!(page.total, 2);
        assert_eq!(store.reads(), reads);
        assert!(!cache.is_fetching(&backlog));

        pending.await.unwrap().unwrap();
        let page = cache.read_page(backlog).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(store.reads(), reads + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn key_holding_the_wrong_shape_is_a_storage_failure() {
        let store = store();
        let cache = cache(&store);

        let err = cache.read_page(QueryKey::Task(TaskId::new(1))).await.unwrap_err();

        assert!(matches!(err, StoreError::Storage(_)));
        assert_eq!(err.class(), crate::domain::FailureClass::Other);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_drops_the_record_entry() {
        let store = store();
        let cache = cache(&store);
        cache.read_task(TaskId::new(4)).await.unwrap();

        cache.delete(TaskId::new(4)).await.unwrap();

        assert!(cache.peek(&QueryKey::Task(TaskId::new(4))).is_none());
        assert_eq!(
            cache.read_task(TaskId::new(4)).await.unwrap_err(),
            StoreError::NotFound(TaskId::new(4))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_fetch_does_not_overwrite_newer_state() {
        let store = store();
        store.set_latency(Duration::from_millis(100));
        let cache = cache(&store);

        let reader = tokio::spawn({
            let cache = cache.clone();
            async move { cache.read(all()).await }
        });
        tokio::task::yield_now().await;
        assert!(cache.is_fetching(&all()));

        cache.invalidate(|key| key.is_listing());
        reader.await.unwrap().unwrap();

        assert!(cache.peek(&all()).is_none());
        assert!(cache.status(&all()).unwrap().stale);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_fetch_still_populates_the_cache() {
        let store = store();
        store.set_latency(Duration::from_millis(100));
        let cache = cache(&store);

        let reader = tokio::spawn({
            let cache = cache.clone();
            async move { cache.read(all()).await }
        });
        tokio::task::yield_now().await;
        reader.abort();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(cache.peek(&all()).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_a_subscription_stops_notifications() {
        let store = store();
        let cache = cache(&store);
        let (events, subscription) = record(&cache);

        cache.read(all()).await.unwrap();
        drop(subscription);
        cache.invalidate(|_| true);

        let events = events.lock().unwrap();
        assert_eq!(events.as_slice(), &[CacheEvent::Updated(all())]);
    }

    #[tokio::test(start_paused = true)]
    async fn key_subscriptions_only_see_their_key() {
        let store = store();
        let cache = cache(&store);
        let task_key = QueryKey::Task(TaskId::new(4));
        let seen = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&seen);
        let _subscription = cache.subscribe_key(task_key.clone(), move |_| {
            *counter.lock().unwrap() += 1;
        });

        cache.read(all()).await.unwrap();
        cache.read(task_key).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn garbage_collection_spares_observed_entries() {
        let store = store();
        let cache = cache(&store);
        let watched = QueryKey::Task(TaskId::new(1));
        let _subscription = cache.subscribe_key(watched.clone(), |_| {});
        cache.read(all()).await.unwrap();
        cache.read(watched.clone()).await.unwrap();

        assert_eq!(cache.collect_garbage(), 0);
        tokio::time::advance(Duration::from_secs(5 * 60)).await;

        assert_eq!(cache.collect_garbage(), 1);
        assert_eq!(cache.keys(), vec![watched]);
    }

    #[tokio::test(start_paused = true)]
    async fn remove_purges_matching_entries() {
        let store = store();
        let cache = cache(&store);
        cache.read(QueryKey::page(Column::Backlog, 1, 2, "")).await.unwrap();
        cache.read(QueryKey::page(Column::Backlog, 2, 2, "")).await.unwrap();
        cache.read(QueryKey::page(Column::Review, 1, 2, "")).await.unwrap();

        let removed = cache.remove(|key| key.is_page_of(Column::Backlog));

        assert_eq!(removed, 2);
        assert_eq!(cache.keys(), vec![QueryKey::page(Column::Review, 1, 2, "")]);
    }
}
