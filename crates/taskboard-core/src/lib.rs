//! taskboard-core
//!
//! Client-side state synchronization for a four-column task board.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, column, task, query, validation, errors）
//! - **ports**: 抽象化レイヤー（TaskStore, SeedSource, BoardPersistence, Clock）
//! - **impls**: 実装（LocalTaskStore, JSON / in-memory persistence, seed sources, FlakyStore）
//! - **cache**: QueryCache（de-duplicated reads, optimistic mutations, retry, subscriptions）
//! - **pagination**: column ごとの page 状態
//! - **search**: debounce 付き検索と drag 中の可視性
//! - **drag**: drag-and-drop のセッション状態機械
//! - **app**: BoardBuilder / BoardSession / GcLoop
//!
//! Data flows one way: events -> drag / search / pagination -> cache -> store,
//! and back through the cache into the derived column views.

pub mod app;
pub mod cache;
pub mod config;
pub mod domain;
pub mod drag;
pub mod impls;
pub mod notice;
pub mod pagination;
pub mod ports;
pub mod search;

pub use crate::app::{BoardBuilder, BoardEvent, BoardSession, GcLoop};
pub use crate::cache::{QueryCache, QueryKey};
pub use crate::config::BoardConfig;
pub use crate::notice::{Notice, NoticeLevel};
