//! Drag-and-drop session state machine.
//!
//! `Idle -> Dragging { task, hover } -> Idle`. The dragged task is a snapshot
//! taken at gesture start. Ending a gesture always returns to `Idle`, before
//! the store call is issued, so no error path can leave a session behind.

use thiserror::Error;

use crate::cache::QueryCache;
use crate::domain::{Column, StoreError, Task, TaskId};
use crate::notice::Notice;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DragError {
    #[error("a drag is already in progress for task {0}")]
    AlreadyDragging(TaskId),

    #[error("no drag in progress")]
    NotDragging,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragSession {
    pub task: Task,
    pub hover: Option<Column>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DragState {
    #[default]
    Idle,
    Dragging(DragSession),
}

/// How a gesture ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    /// Released outside any column.
    Cancelled,
    /// Dropped back onto its own column.
    Unchanged,
    Moved { task: Task, from: Column },
    Failed { task: Task, error: StoreError },
}

impl DropOutcome {
    /// The notice to show, if any. Dropping onto the same column is silent.
    pub fn notice(&self) -> Option<Notice> {
        match self {
            Self::Cancelled => Some(Notice::info("Drop cancelled")),
            Self::Unchanged => None,
            Self::Moved { task, .. } => Some(Notice::success(format!(
                "Moved \"{}\" to {}",
                task.title,
                task.column.label()
            ))),
            Self::Failed { error, .. } => Some(Notice::failure("move task", error)),
        }
    }
}

#[derive(Debug, Default)]
pub struct DragReconciler {
    state: DragState,
}

impl DragReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging(_))
    }

    /// The snapshot of the task being dragged.
    pub fn dragged(&self) -> Option<&Task> {
        match &self.state {
            DragState::Dragging(session) => Some(&session.task),
            DragState::Idle => None,
        }
    }

    pub fn hover_column(&self) -> Option<Column> {
        match &self.state {
            DragState::Dragging(session) => session.hover,
            DragState::Idle => None,
        }
    }

    pub fn start(&mut self, task: Task) -> Result<(), DragError> {
        if let DragState::Dragging(session) = &self.state {
            return Err(DragError::AlreadyDragging(session.task.id));
        }
        tracing::debug!(task = %task.id, column = %task.column, "Drag started");
        self.state = DragState::Dragging(DragSession { task, hover: None });
        Ok(())
    }

    pub fn hover(&mut self, column: Option<Column>) -> Result<(), DragError> {
        match &mut self.state {
            DragState::Dragging(session) => {
                session.hover = column;
                Ok(())
            }
            DragState::Idle => Err(DragError::NotDragging),
        }
    }

    /// Abandon the gesture without a drop.
    pub fn cancel(&mut self) {
        self.state = DragState::Idle;
    }

    /// Finish the gesture. A move goes through the cache's mutation path, so a
    /// failed move is rolled back there.
    pub async fn end(
        &mut self,
        target: Option<Column>,
        cache: &QueryCache,
    ) -> Result<DropOutcome, DragError> {
        let DragState::Dragging(session) = std::mem::take(&mut self.state) else {
            return Err(DragError::NotDragging);
        };
        let task = session.task;

        let Some(target) = target else {
            tracing::debug!(task = %task.id, "Drop cancelled");
            return Ok(DropOutcome::Cancelled);
        };
        if target == task.column {
            return Ok(DropOutcome::Unchanged);
        }

        let from = task.column;
        match cache.move_task(task.id, target).await {
            Ok(moved) => {
                tracing::info!(task = %moved.id, %from, to = %target, "Task moved");
                Ok(DropOutcome::Moved { task: moved, from })
            }
            Err(error) => {
                tracing::warn!(task = %task.id, to = %target, %error, "Move failed");
                Ok(DropOutcome::Failed { task, error })
            }
        }
    }
}
