//! FlakyStore - wraps a TaskStore with injected latency and failures.
//!
//! Used to exercise retry, de-duplication and rollback paths without a real
//! network behind the store.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::domain::{ListFilter, StoreError, Task, TaskDraft, TaskId, TaskPage, TaskPatch};
use crate::ports::TaskStore;

#[derive(Debug, Default)]
struct Injected {
    remaining: u32,
    error: Option<StoreError>,
}

impl Injected {
    fn take(&mut self) -> Option<StoreError> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.error.clone()
    }
}

pub struct FlakyStore<S> {
    inner: S,
    latency: Mutex<Duration>,
    read_failures: Mutex<Injected>,
    write_failures: Mutex<Injected>,
    reads: AtomicU32,
    writes: AtomicU32,
}

impl<S: TaskStore> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            latency: Mutex::new(Duration::ZERO),
            read_failures: Mutex::new(Injected::default()),
            write_failures: Mutex::new(Injected::default()),
            reads: AtomicU32::new(0),
            writes: AtomicU32::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Delay applied before every call.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
    }

    /// Fail the next `times` reads (`list`/`get`) with `error`.
    pub fn fail_reads(&self, times: u32, error: StoreError) {
        *self.read_failures.lock().unwrap_or_else(PoisonError::into_inner) = Injected {
            remaining: times,
            error: Some(error),
        };
    }

    /// Fail the next `times` writes (`create`/`update`/`delete`) with `error`.
    pub fn fail_writes(&self, times: u32, error: StoreError) {
        *self.write_failures.lock().unwrap_or_else(PoisonError::into_inner) = Injected {
            remaining: times,
            error: Some(error),
        };
    }

    /// Read calls that reached this wrapper, failed ones included.
    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    async fn before_read(&self) -> Result<(), StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        let injected = self
            .read_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        injected.map_or(Ok(()), Err)
    }

    async fn before_write(&self) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        let injected = self
            .write_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        injected.map_or(Ok(()), Err)
    }

    async fn delay(&self) {
        let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl<S: TaskStore> TaskStore for FlakyStore<S> {
    async fn list(&self, filter: &ListFilter) -> Result<TaskPage, StoreError> {
        self.before_read().await?;
        self.inner.list(filter).await
    }

    async fn get(&self, id: TaskId) -> Result<Task, StoreError> {
        self.before_read().await?;
        self.inner.get(id).await
    }

    async fn create(&self, draft: TaskDraft) -> Result<Task, StoreError> {
        self.before_write().await?;
        self.inner.create(draft).await
    }

    async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Task, StoreError> {
        self.before_write().await?;
        self.inner.update(id, patch).await
    }

    async fn delete(&self, id: TaskId) -> Result<(), StoreError> {
        self.before_write().await?;
        self.inner.delete(id).await
    }
}
