//! Domain model (ids, columns, tasks, list queries, validation, errors).
//!
//! Everything in here is plain data plus pure functions. Async work and
//! shared state live in `ports`, `impls` and `cache`.

pub mod column;
pub mod errors;
pub mod ids;
pub mod query;
pub mod task;
pub mod validation;

pub use column::Column;
pub use errors::{ErrorKind, FailureClass, StoreError};
pub use ids::TaskId;
pub use query::{ListFilter, TaskPage};
pub use task::{Priority, Task, TaskDraft, TaskPatch};
pub use validation::ValidationError;
