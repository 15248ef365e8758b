//! Optimistic mutations.
//!
//! A `MutationAttempt` is the only place optimistic state is written and
//! undone. `begin` records the confirmed state of every affected entry and
//! applies the speculative change in one locked step, before the store call is
//! issued. The attempt then ends in exactly one of `settle` (fold into the
//! confirmed state and invalidate) or `roll_back` (replay only the mutations
//! still pending). Overlapping attempts never undo each other.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use super::entry::CacheEntry;
use super::{CacheEvent, CacheState, QueryData, QueryKey};
use crate::domain::query::total_pages;
use crate::domain::{Column, ListFilter, StoreError, Task, TaskDraft, TaskId, TaskPage, TaskPatch};
use crate::ports::TaskStore;

/// A task mutation routed through the query cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Create(TaskDraft),
    Update { id: TaskId, patch: TaskPatch },
    Move { id: TaskId, column: Column },
    Delete(TaskId),
}

/// What the store returned for a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutput {
    Task(Task),
    Deleted(TaskId),
}

impl MutationOutput {
    pub fn into_task(self) -> Option<Task> {
        match self {
            Self::Task(task) => Some(task),
            Self::Deleted(_) => None,
        }
    }
}

impl Mutation {
    pub fn target(&self) -> Option<TaskId> {
        match self {
            Self::Create(_) => None,
            Self::Update { id, .. } | Self::Move { id, .. } | Self::Delete(id) => Some(*id),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Update { .. } => "update",
            Self::Move { .. } => "move",
            Self::Delete(_) => "delete",
        }
    }

    fn patch(&self) -> Option<TaskPatch> {
        match self {
            Self::Update { patch, .. } => Some(patch.clone()),
            Self::Move { column, .. } => Some(TaskPatch::move_to(*column)),
            Self::Create(_) | Self::Delete(_) => None,
        }
    }

    /// Every listing may change membership; a record key only for its own id.
    pub fn affects(&self, key: &QueryKey) -> bool {
        match key {
            QueryKey::Task(id) => self.target() == Some(*id),
            _ => true,
        }
    }

    pub(crate) async fn execute(&self, store: &dyn TaskStore) -> Result<MutationOutput, StoreError> {
        match self {
            Self::Create(draft) => store.create(draft.clone()).await.map(MutationOutput::Task),
            Self::Update { id, patch } => store
                .update(*id, patch.clone())
                .await
                .map(MutationOutput::Task),
            Self::Move { id, column } => store
                .update(*id, TaskPatch::move_to(*column))
                .await
                .map(MutationOutput::Task),
            Self::Delete(id) => store.delete(*id).await.map(|()| MutationOutput::Deleted(*id)),
        }
    }
}

/// A mutation whose store call has not come back yet.
#[derive(Debug, Clone)]
pub(crate) struct PendingMutation {
    mutation: Mutation,
    at: DateTime<Utc>,
}

impl PendingMutation {
    fn project(&self, before: Task) -> Projection {
        let after = self.mutation.patch().map(|patch| {
            let mut after = before.clone();
            after.apply(&patch, self.at);
            after
        });
        Projection { before, after }
    }
}

/// An entry's confirmed state while optimistic writes sit on top of it.
///
/// `data` is what the store last returned plus every mutation that has since
/// settled. The visible value is always `data` with `layers` replayed in order.
#[derive(Debug, Clone)]
pub(crate) struct Overlay {
    data: Option<QueryData>,
    fetched_at: Option<Instant>,
    stale: bool,
    /// Attempt ids still pending against this entry, oldest first.
    layers: Vec<u64>,
}

impl Overlay {
    fn capture(entry: &CacheEntry) -> Self {
        Self {
            data: entry.data.clone(),
            fetched_at: entry.fetched_at,
            stale: entry.stale,
            layers: Vec::new(),
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.layers.len()
    }
}

/// The target record before and after the speculative change.
#[derive(Debug, Clone)]
struct Projection {
    before: Task,
    after: Option<Task>,
}

/// An in-progress optimistic mutation and the keys it wrote to.
#[derive(Debug)]
pub struct MutationAttempt {
    id: u64,
    mutation: Mutation,
    keys: Vec<QueryKey>,
}

impl MutationAttempt {
    /// Register the mutation as pending, then apply it on top of every affected entry.
    pub(crate) fn begin(
        mutation: Mutation,
        state: &mut CacheState,
        now: DateTime<Utc>,
    ) -> (Self, Vec<CacheEvent>) {
        let id = state.bump();
        state.pending.insert(
            id,
            PendingMutation {
                mutation: mutation.clone(),
                at: now,
            },
        );
        let projection = project(state, id);

        let mut keys = Vec::new();
        let mut events = Vec::new();
        let affected: Vec<QueryKey> = state
            .entries
            .iter()
            .filter(|(key, entry)| entry.data.is_some() && mutation.affects(key))
            .map(|(key, _)| key.clone())
            .collect();

        for key in affected {
            let generation = state.bump();
            let Some(entry) = state.entries.get_mut(&key) else {
                continue;
            };
            if entry.overlay.is_none() {
                let confirmed = Overlay::capture(entry);
                entry.overlay = Some(confirmed);
            }
            if let Some(overlay) = entry.overlay.as_mut() {
                overlay.layers.push(id);
            }
            // An older fetch must not land on top of the speculative value.
            entry.generation = generation;
            entry.in_flight = None;

            let changed = match (&mut entry.data, &projection) {
                (Some(data), Some(projection)) => apply_optimistic(&key, data, projection),
                _ => false,
            };
            if changed {
                events.push(CacheEvent::Updated(key.clone()));
            }
            keys.push(key);
        }

        (Self { id, mutation, keys }, events)
    }

    pub fn mutation(&self) -> &Mutation {
        &self.mutation
    }

    pub fn keys(&self) -> impl Iterator<Item = &QueryKey> {
        self.keys.iter()
    }

    /// The store accepted the mutation: fold it into the confirmed state, then
    /// mark every touched key and every listing stale.
    pub(crate) fn settle(self, state: &mut CacheState) -> Vec<CacheEvent> {
        let projection = project(state, self.id);
        state.pending.remove(&self.id);

        for (key, entry) in state.entries.iter_mut() {
            let Some(overlay) = entry.overlay.as_mut() else {
                continue;
            };
            let Some(index) = overlay.layers.iter().position(|layer| *layer == self.id) else {
                continue;
            };
            overlay.layers.remove(index);
            if let (Some(data), Some(projection)) = (overlay.data.as_mut(), &projection) {
                apply_optimistic(key, data, projection);
            }
            overlay.stale = true;
            if overlay.layers.is_empty() {
                entry.overlay = None;
            }
        }

        let mut events = Vec::new();
        if let Mutation::Delete(id) = self.mutation
            && state.entries.remove(&QueryKey::Task(id)).is_some()
        {
            events.push(CacheEvent::Removed(QueryKey::Task(id)));
        }

        let stale: Vec<QueryKey> = state
            .entries
            .keys()
            .filter(|key| key.is_listing() || self.keys.contains(*key))
            .cloned()
            .collect();
        for key in stale {
            let generation = state.bump();
            if let Some(entry) = state.entries.get_mut(&key) {
                entry.invalidate(generation);
                events.push(CacheEvent::Invalidated(key));
            }
        }
        events
    }

    /// The store rejected the mutation: rebuild each touched entry from its
    /// confirmed state and the mutations still pending on it.
    ///
    /// Once no mutation is left on an entry its timestamps are restored too.
    /// Entries purged while the call was pending stay purged.
    pub(crate) fn roll_back(self, state: &mut CacheState) -> Vec<CacheEvent> {
        state.pending.remove(&self.id);

        let mut events = Vec::new();
        for key in self.keys {
            let Some(layers) = state
                .entries
                .get(&key)
                .and_then(|entry| entry.overlay.as_ref())
                .filter(|overlay| overlay.layers.contains(&self.id))
                .map(|overlay| overlay.layers.clone())
            else {
                continue;
            };
            let replay: Vec<Projection> = layers
                .iter()
                .filter(|layer| **layer != self.id)
                .filter_map(|layer| project(state, *layer))
                .collect();

            let generation = state.bump();
            let Some(entry) = state.entries.get_mut(&key) else {
                continue;
            };
            let Some(mut overlay) = entry.overlay.take() else {
                continue;
            };
            overlay.layers.retain(|layer| *layer != self.id);

            let mut data = overlay.data.clone();
            if let Some(data) = data.as_mut() {
                for projection in &replay {
                    apply_optimistic(&key, data, projection);
                }
            }
            entry.data = data;
            entry.generation = generation;
            entry.in_flight = None;
            if overlay.layers.is_empty() {
                entry.fetched_at = overlay.fetched_at;
                entry.stale = overlay.stale || entry.stale;
            } else {
                entry.overlay = Some(overlay);
            }
            events.push(CacheEvent::RolledBack(key));
        }
        events
    }
}

/// Where pending attempt `id` takes its target: the confirmed record with every
/// older pending mutation of the same task replayed on it.
fn project(state: &CacheState, id: u64) -> Option<Projection> {
    let pending = state.pending.get(&id)?;
    let target = pending.mutation.target()?;

    let mut current = confirmed_task(state, target)?;
    for earlier in state.pending.range(..id).map(|(_, earlier)| earlier) {
        if earlier.mutation.target() != Some(target) {
            continue;
        }
        current = earlier.project(current).after?;
    }
    Some(pending.project(current))
}

/// The record as last confirmed, preferring entries that carry an overlay.
fn confirmed_task(state: &CacheState, id: TaskId) -> Option<Task> {
    let confirmed = state
        .entries
        .values()
        .filter_map(|entry| entry.overlay.as_ref()?.data.as_ref())
        .find_map(|data| data.find(id));
    confirmed
        .or_else(|| {
            state
                .entries
                .values()
                .filter(|entry| entry.overlay.is_none())
                .filter_map(|entry| entry.data.as_ref())
                .find_map(|data| data.find(id))
        })
        .cloned()
}

fn apply_optimistic(key: &QueryKey, data: &mut QueryData, projection: &Projection) -> bool {
    match data {
        QueryData::Task(task) => match &projection.after {
            Some(after) if task.id == after.id => {
                *task = after.clone();
                true
            }
            _ => false,
        },
        QueryData::List(page) => {
            let filter = key.filter().unwrap_or_default();
            apply_to_page(page, &filter, projection)
        }
    }
}

fn apply_to_page(page: &mut TaskPage, filter: &ListFilter, projection: &Projection) -> bool {
    let id = projection.before.id;
    let was_member = filter.admits(&projection.before);
    let after = projection.after.as_ref().filter(|after| filter.admits(after));
    let position = page.items.iter().position(|task| task.id == id);

    match (position, after) {
        (Some(index), Some(after)) => {
            page.items[index] = after.clone();
            true
        }
        (Some(index), None) => {
            page.items.remove(index);
            page.total = page.total.saturating_sub(1);
            refresh_total_pages(page, filter);
            true
        }
        (None, Some(after)) if !was_member => {
            page.total += 1;
            if belongs_on_page(page, after.id) {
                let at = page.items.partition_point(|task| task.id < after.id);
                page.items.insert(at, after.clone());
                if let Some(size) = filter.page_size
                    && page.items.len() > size as usize
                {
                    page.items.pop();
                }
            }
            refresh_total_pages(page, filter);
            true
        }
        (None, None) if was_member => {
            // Left the listing from a page that is not cached here.
            page.total = page.total.saturating_sub(1);
            refresh_total_pages(page, filter);
            true
        }
        _ => false,
    }
}

/// Pages are ordered by id: a newcomer lands here if it sorts inside the
/// page's id span, or this is the last page.
fn belongs_on_page(page: &TaskPage, id: TaskId) -> bool {
    let last_page = page.page >= page.total_pages;
    match (page.items.first(), page.items.last()) {
        (Some(first), Some(last)) => (first.id <= id && id <= last.id) || last_page,
        _ => last_page,
    }
}

fn refresh_total_pages(page: &mut TaskPage, filter: &ListFilter) {
    page.total_pages = match filter.page_size {
        Some(size) => total_pages(page.total, size),
        None => u32::from(page.total > 0),
    };
}
