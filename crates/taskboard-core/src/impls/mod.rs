//! Impls - concrete ports for local use and tests.
//!
//! - **LocalTaskStore**: write-through TaskStore over a `BoardPersistence`
//! - **MemoryPersistence** / **JsonFilePersistence**: backing media
//! - **EmptySeed** / **StaticSeed** / **JsonFileSeed**: seed sources
//! - **FlakyStore**: latency and failure injection around any TaskStore

pub mod flaky_store;
pub mod local_store;
pub mod persistence;
pub mod seed;

pub use self::flaky_store::FlakyStore;
pub use self::local_store::LocalTaskStore;
pub use self::persistence::{JsonFilePersistence, MemoryPersistence};
pub use self::seed::{EmptySeed, JsonFileSeed, StaticSeed};
