//! LocalTaskStore - a TaskStore kept in memory and written through to a `BoardPersistence`.
//!
//! On first access ever (persisted `seeded == false`) the store pulls its
//! initial records from a `SeedSource`. A failed seed is logged and masked by
//! an empty collection; either way the store marks itself seeded and never
//! asks the seed source again.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::query::paginate;
use crate::domain::validation::{validate_draft, validate_patch};
use crate::domain::{ListFilter, StoreError, Task, TaskDraft, TaskId, TaskPage, TaskPatch};
use crate::ports::{BoardPersistence, Clock, PersistedBoard, SeedSource, TaskStore};

struct StoreState {
    board: PersistedBoard,

    /// Greatest id ever assigned or loaded. New ids start above it.
    /// Persisted with the board, so it survives restarts.
    high_water: TaskId,
}

impl StoreState {
    fn new(board: PersistedBoard) -> Self {
        let high_water = max_id(&board.tasks).max(board.high_water.unwrap_or(TaskId::new(0)));
        Self { board, high_water }
    }

    /// The document to save: `next` stamped with the high-water mark it implies.
    fn stamp(&self, mut next: PersistedBoard) -> PersistedBoard {
        next.high_water = Some(self.high_water.max(max_id(&next.tasks)));
        next
    }

    fn position(&self, id: TaskId) -> Result<usize, StoreError> {
        self.board
            .tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or(StoreError::NotFound(id))
    }
}

fn max_id(tasks: &[Task]) -> TaskId {
    tasks
        .iter()
        .map(|task| task.id)
        .max()
        .unwrap_or(TaskId::new(0))
}

pub struct LocalTaskStore {
    state: Mutex<StoreState>,
    persistence: Arc<dyn BoardPersistence>,
    seed: Arc<dyn SeedSource>,
    clock: Arc<dyn Clock>,
}

impl LocalTaskStore {
    /// Load the persisted board. Seeding is deferred to the first operation.
    pub fn open(
        persistence: Arc<dyn BoardPersistence>,
        seed: Arc<dyn SeedSource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        let board = persistence.load()?;
        tracing::debug!(tasks = board.tasks.len(), seeded = board.seeded, "Opened task store");
        Ok(Self {
            state: Mutex::new(StoreState::new(board)),
            persistence,
            seed,
            clock,
        })
    }

    /// Run the one-time seed step if it has never happened. Idempotent.
    pub async fn ensure_seeded(&self) {
        let mut state = self.state.lock().await;
        self.seed_locked(&mut state).await;
    }

    async fn seed_locked(&self, state: &mut StoreState) {
        if state.board.seeded {
            return;
        }

        let mut next = state.board.clone();
        match self.seed.fetch().await {
            Ok(tasks) => {
                tracing::info!(source = %self.seed.describe(), tasks = tasks.len(), "Seeded task store");
                next.tasks = tasks;
                next.tasks.sort_by_key(|task| task.id);
            }
            Err(e) => {
                tracing::warn!(
                    source = %self.seed.describe(),
                    error = %e,
                    "Seed load failed, starting with an empty board"
                );
                next.tasks.clear();
            }
        }
        next.seeded = true;
        let next = state.stamp(next);

        if let Err(e) = self.persistence.save(&next).await {
            // Seeding is best-effort; the in-memory board is still usable.
            tracing::error!(error = %e, "Failed to persist seeded board");
        }
        state.high_water = next.high_water.unwrap_or(state.high_water);
        state.board = next;
    }

    /// Persist `next`, then make it the live board. On failure nothing changes.
    async fn commit(&self, state: &mut StoreState, next: PersistedBoard) -> Result<(), StoreError> {
        let next = state.stamp(next);
        if let Err(e) = self.persistence.save(&next).await {
            tracing::error!(error = %e, "Failed to persist board");
            return Err(e);
        }
        state.high_water = next.high_water.unwrap_or(state.high_water);
        state.board = next;
        Ok(())
    }
}

#[async_trait]
impl TaskStore for LocalTaskStore {
    async fn list(&self, filter: &ListFilter) -> Result<TaskPage, StoreError> {
        let mut state = self.state.lock().await;
        self.seed_locked(&mut state).await;

        let mut matching: Vec<Task> = state
            .board
            .tasks
            .iter()
            .filter(|task| filter.admits(task))
            .cloned()
            .collect();
        matching.sort_by_key(|task| task.id);
        Ok(paginate(matching, filter.page, filter.page_size))
    }

    async fn get(&self, id: TaskId) -> Result<Task, StoreError> {
        let mut state = self.state.lock().await;
        self.seed_locked(&mut state).await;

        let index = state.position(id)?;
        Ok(state.board.tasks[index].clone())
    }

    async fn create(&self, draft: TaskDraft) -> Result<Task, StoreError> {
        validate_draft(&draft)?;

        let mut state = self.state.lock().await;
        self.seed_locked(&mut state).await;

        let id = state.high_water.next();
        let task = draft.into_task(id, self.clock.now());

        let mut next = state.board.clone();
        next.tasks.push(task.clone());
        self.commit(&mut state, next).await?;

        tracing::info!(id = %task.id, column = %task.column, "Created task");
        Ok(task)
    }

    async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Task, StoreError> {
        validate_patch(&patch)?;

        let mut state = self.state.lock().await;
        self.seed_locked(&mut state).await;

        let index = state.position(id)?;
        let mut next = state.board.clone();
        next.tasks[index].apply(&patch, self.clock.now());
        let task = next.tasks[index].clone();
        self.commit(&mut state, next).await?;

        tracing::info!(id = %task.id, column = %task.column, "Updated task");
        Ok(task)
    }

    async fn delete(&self, id: TaskId) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        self.seed_locked(&mut state).await;

        let index = state.position(id)?;
        let mut next = state.board.clone();
        next.tasks.remove(index);
        self.commit(&mut state, next).await?;

        tracing::info!(id = %id, "Deleted task");
        Ok(())
    }
}
