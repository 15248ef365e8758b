//! SeedSource implementations.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::domain::{StoreError, Task};
use crate::ports::SeedSource;

/// No initial records.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptySeed;

#[async_trait]
impl SeedSource for EmptySeed {
    async fn fetch(&self) -> Result<Vec<Task>, StoreError> {
        Ok(Vec::new())
    }

    fn describe(&self) -> String {
        "empty".to_string()
    }
}

/// Fixed records handed over verbatim.
#[derive(Debug, Clone, Default)]
pub struct StaticSeed {
    tasks: Vec<Task>,
}

impl StaticSeed {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl SeedSource for StaticSeed {
    async fn fetch(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self.tasks.clone())
    }

    fn describe(&self) -> String {
        format!("static({} tasks)", self.tasks.len())
    }
}

/// JSON array of task records read from disk.
///
/// Stands in for the remote seed endpoint, so read and parse failures are
/// reported as transient.
#[derive(Debug, Clone)]
pub struct JsonFileSeed {
    path: PathBuf,
}

impl JsonFileSeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SeedSource for JsonFileSeed {
    async fn fetch(&self) -> Result<Vec<Task>, StoreError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            StoreError::Transient(format!("failed to read seed {}: {e}", self.path.display()))
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            StoreError::Transient(format!("malformed seed {}: {e}", self.path.display()))
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
