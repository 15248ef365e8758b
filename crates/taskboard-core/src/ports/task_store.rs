//! TaskStore port - the durable truth the query cache reads from and writes through.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::{ListFilter, StoreError, Task, TaskDraft, TaskId, TaskPage, TaskPatch};

/// CRUD + list contract over the task collection.
///
/// Every call is a suspension point and may fail. Implementations classify
/// failures with `StoreError` so the cache can decide what to retry.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Filter (column, case-insensitive search), order by id, then paginate.
    async fn list(&self, filter: &ListFilter) -> Result<TaskPage, StoreError>;

    async fn get(&self, id: TaskId) -> Result<Task, StoreError>;

    /// Assigns a fresh id and stamps `createdAt == updatedAt == now`.
    async fn create(&self, draft: TaskDraft) -> Result<Task, StoreError>;

    /// Merges the partial onto the record and always refreshes `updatedAt`.
    async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Task, StoreError>;

    async fn delete(&self, id: TaskId) -> Result<(), StoreError>;
}

#[async_trait]
impl<S: TaskStore + ?Sized> TaskStore for Arc<S> {
    async fn list(&self, filter: &ListFilter) -> Result<TaskPage, StoreError> {
        (**self).list(filter).await
    }

    async fn get(&self, id: TaskId) -> Result<Task, StoreError> {
        (**self).get(id).await
    }

    async fn create(&self, draft: TaskDraft) -> Result<Task, StoreError> {
        (**self).create(draft).await
    }

    async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Task, StoreError> {
        (**self).update(id, patch).await
    }

    async fn delete(&self, id: TaskId) -> Result<(), StoreError> {
        (**self).delete(id).await
    }
}
