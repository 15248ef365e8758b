//! BoardSession - UI イベントを core の各コンポーネントへ配線する
//!
//! One session owns the cache handle, the pagination controller, the search
//! filter and the drag reconciler, and turns `BoardEvent`s into calls on them.
//! Every user-initiated mutation ends in a `Notice`.

use tokio::time::Instant;

use crate::cache::QueryCache;
use crate::domain::{Column, StoreError, Task, TaskDraft, TaskId, TaskPatch};
use crate::drag::{DragError, DragReconciler, DropOutcome};
use crate::notice::Notice;
use crate::pagination::PaginationController;
use crate::search::{FocusTarget, KeyOutcome, SearchFilter, SearchKey};

/// Events the board reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardEvent {
    /// Move a task without a drag gesture (e.g. a column picker).
    StageChange { id: TaskId, column: Column },
    Create(TaskDraft),
    Update { id: TaskId, patch: TaskPatch },
    Delete(TaskId),
    SearchInput(String),
    SearchKey { key: SearchKey, focus: FocusTarget },
    DragStart(TaskId),
    DragHover(Option<Column>),
    DragEnd(Option<Column>),
    PageRequest { column: Column, page: u32 },
}

pub struct BoardSession {
    cache: QueryCache,
    pager: PaginationController,
    search: SearchFilter,
    drag: DragReconciler,
    focus_requested: bool,
}

impl BoardSession {
    /// Wires the search commit hook to the pagination reset.
    pub fn new(cache: QueryCache, pager: PaginationController, mut search: SearchFilter) -> Self {
        let on_commit = pager.clone();
        search.on_commit(move |query| on_commit.on_search_changed(query));
        Self {
            cache,
            pager,
            search,
            drag: DragReconciler::new(),
            focus_requested: false,
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn pager(&self) -> &PaginationController {
        &self.pager
    }

    pub fn search(&self) -> &SearchFilter {
        &self.search
    }

    pub fn drag(&self) -> &DragReconciler {
        &self.drag
    }

    /// Set when the focus shortcut fired; cleared by reading it.
    pub fn take_focus_request(&mut self) -> bool {
        std::mem::take(&mut self.focus_requested)
    }

    pub async fn handle(&mut self, event: BoardEvent) -> Option<Notice> {
        match event {
            BoardEvent::StageChange { id, column } => self.change_stage(id, column).await,
            BoardEvent::Create(draft) => Some(match self.cache.create(draft).await {
                Ok(task) => Notice::success(format!("Created \"{}\"", task.title)),
                Err(e) => Notice::failure("create task", &e),
            }),
            BoardEvent::Update { id, patch } => Some(match self.cache.update(id, patch).await {
                Ok(task) => Notice::success(format!("Updated \"{}\"", task.title)),
                Err(e) => Notice::failure("update task", &e),
            }),
            BoardEvent::Delete(id) => Some(match self.cache.delete(id).await {
                Ok(()) => Notice::success(format!("Deleted task {id}")),
                Err(e) => Notice::failure("delete task", &e),
            }),
            BoardEvent::SearchInput(text) => {
                self.search.input(text, Instant::now());
                None
            }
            BoardEvent::SearchKey { key, focus } => {
                if self.search.handle_key(key, focus, Instant::now()) == KeyOutcome::FocusSearch {
                    self.focus_requested = true;
                }
                None
            }
            BoardEvent::DragStart(id) => self.start_drag(id).await,
            BoardEvent::DragHover(column) => {
                if let Err(e) = self.drag.hover(column) {
                    tracing::debug!(error = %e, "Hover ignored");
                }
                None
            }
            BoardEvent::DragEnd(target) => match self.drag.end(target, &self.cache).await {
                Ok(outcome) => self.finish_drop(outcome),
                Err(e) => {
                    tracing::warn!(error = %e, "Drop without an active drag");
                    None
                }
            },
            BoardEvent::PageRequest { column, page } => {
                match self.pager.go_to_page(column, page).await {
                    Ok(_) => None,
                    Err(e) => Some(Notice::failure("load tasks", &e)),
                }
            }
        }
    }

    /// Drive the search debounce. Returns the newly committed query, if any.
    pub fn tick(&mut self, now: Instant) -> Option<String> {
        self.search.tick(now)
    }

    /// Commit pending search input without waiting for the debounce.
    pub fn flush_search(&mut self) -> Option<String> {
        self.search.flush()
    }

    /// Reload the current page of every column.
    pub async fn refresh(&self) -> Result<(), StoreError> {
        for (column, result) in self.pager.refresh_all().await {
            if let Err(e) = result {
                tracing::warn!(%column, error = %e, "Failed to load column");
                return Err(e);
            }
        }
        Ok(())
    }

    /// What a column shows right now: its cached page under the committed
    /// search, plus the dragged task if the search would hide it.
    pub fn column_view(&self, column: Column) -> Vec<Task> {
        let items = self
            .pager
            .current_page_view(column)
            .map(|page| page.items)
            .unwrap_or_default();
        self.search.visible(&items, column, self.drag.dragged())
    }

    /// At most one gesture at a time, whether started by a drag or a stage change.
    fn reject_while_dragging(&self, id: TaskId) -> Option<Notice> {
        let current = self.drag.dragged()?;
        let err = DragError::AlreadyDragging(current.id);
        tracing::warn!(requested = %id, error = %err, "Gesture rejected");
        Some(Notice::error(err.to_string()))
    }

    async fn start_drag(&mut self, id: TaskId) -> Option<Notice> {
        if let Some(notice) = self.reject_while_dragging(id) {
            return Some(notice);
        }
        let task = match self.resolve(id).await {
            Ok(task) => task,
            Err(e) => return Some(Notice::failure("start drag", &e)),
        };
        self.drag.start(task).err().map(|e| Notice::error(e.to_string()))
    }

    /// A programmatic stage change runs the same gesture a drop does.
    async fn change_stage(&mut self, id: TaskId, column: Column) -> Option<Notice> {
        if let Some(notice) = self.reject_while_dragging(id) {
            return Some(notice);
        }
        let task = match self.resolve(id).await {
            Ok(task) => task,
            Err(e) => return Some(Notice::failure("move task", &e)),
        };
        let mut gesture = DragReconciler::new();
        if let Err(e) = gesture.start(task) {
            return Some(Notice::error(e.to_string()));
        }
        match gesture.end(Some(column), &self.cache).await {
            Ok(outcome) => self.finish_drop(outcome),
            Err(e) => Some(Notice::error(e.to_string())),
        }
    }

    fn finish_drop(&self, outcome: DropOutcome) -> Option<Notice> {
        if let DropOutcome::Moved { task, from } = &outcome {
            self.pager.on_task_moved(*from, task.column);
        }
        outcome.notice()
    }

    /// Prefer the copy the board is showing; fall back to the store.
    async fn resolve(&self, id: TaskId) -> Result<Task, StoreError> {
        let shown = Column::ALL.into_iter().find_map(|column| {
            self.pager
                .current_page_view(column)
                .and_then(|page| page.items.into_iter().find(|task| task.id == id))
        });
        match shown {
            Some(task) => Ok(task),
            None => self.cache.read_task(id).await,
        }
    }
}

impl std::fmt::Debug for BoardSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoardSession")
            .field("pager", &self.pager)
            .field("search", &self.search)
            .field("drag", &self.drag)
            .finish_non_exhaustive()
    }
}
