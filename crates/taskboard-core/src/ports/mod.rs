//! Ports - the seams between the board core and the outside world.
//!
//! The core only talks to durable state through these traits:
//! - `TaskStore`: CRUD + filtered/paginated listing (the durable truth)
//! - `SeedSource`: one-time bulk fetch of initial records
//! - `BoardPersistence`: where a local store keeps its task array and seeded flag
//! - `Clock`: timestamps, swappable in tests

pub mod clock;
pub mod persistence;
pub mod seed_source;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::persistence::{BoardPersistence, PersistedBoard};
pub use self::seed_source::SeedSource;
pub use self::task_store::TaskStore;
