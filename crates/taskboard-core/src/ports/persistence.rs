//! BoardPersistence port - the backing medium of a local task store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{StoreError, Task, TaskId};

/// Everything a local store persists: the task array, the one-time seeded
/// flag and the greatest id ever handed out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedBoard {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub seeded: bool,
    /// Absent in documents written before it existed; `max(ids)` is used then.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_water: Option<TaskId>,
}

/// Load/save of the whole board document.
///
/// `load` runs once when a store opens. A failed `save` must leave the
/// previously saved document intact and is reported as `StoreError::Storage`.
#[async_trait]
pub trait BoardPersistence: Send + Sync {
    fn load(&self) -> Result<PersistedBoard, StoreError>;

    async fn save(&self, board: &PersistedBoard) -> Result<(), StoreError>;
}
