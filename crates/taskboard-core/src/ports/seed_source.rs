//! SeedSource port - initial records for a store that has never been initialized.

use async_trait::async_trait;

use crate::domain::{StoreError, Task};

/// Read-only bulk fetch, consulted at most once per store lifetime.
///
/// Failure is never fatal: the store falls back to an empty collection.
#[async_trait]
pub trait SeedSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Task>, StoreError>;

    /// Short name for logs.
    fn describe(&self) -> String {
        "seed".to_string()
    }
}
