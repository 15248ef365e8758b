//! BoardBuilder - セッションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）: config と store の欠落は build() で弾く

use std::sync::Arc;

use crate::cache::QueryCache;
use crate::config::{BoardConfig, ConfigError};
use crate::domain::StoreError;
use crate::impls::LocalTaskStore;
use crate::pagination::PaginationController;
use crate::ports::{BoardPersistence, Clock, SeedSource, SystemClock, TaskStore};
use crate::search::SearchFilter;

use super::BoardSession;

/// Where the session's tasks come from.
enum StoreSource {
    Store(Arc<dyn TaskStore>),
    Local {
        persistence: Arc<dyn BoardPersistence>,
        seed: Arc<dyn SeedSource>,
    },
}

/// BoardBuilder は BoardSession を構築
///
/// # 使用例
/// ```ignore
/// let session = BoardBuilder::new(BoardConfig::default())
///     .local(Arc::new(JsonFilePersistence::new("board.json")), Arc::new(EmptySeed))
///     .build()?;
/// ```
pub struct BoardBuilder {
    config: BoardConfig,
    source: Option<StoreSource>,
    clock: Option<Arc<dyn Clock>>,
}

/// BuildError はセッション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("No task store configured. Call `store()` or `local()` before `build()`.")]
    MissingStore,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to open task store: {0}")]
    Store(#[from] StoreError),
}

impl BoardBuilder {
    pub fn new(config: BoardConfig) -> Self {
        Self {
            config,
            source: None,
            clock: None,
        }
    }

    /// Use an existing store.
    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.source = Some(StoreSource::Store(store));
        self
    }

    /// Open a `LocalTaskStore` over `persistence` at build time.
    pub fn local(mut self, persistence: Arc<dyn BoardPersistence>, seed: Arc<dyn SeedSource>) -> Self {
        self.source = Some(StoreSource::Local { persistence, seed });
        self
    }

    /// Clock for store timestamps and optimistic `updatedAt` stamps.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// # 検証
    /// - config が不正なら BuildError::Config
    /// - store 未指定なら BuildError::MissingStore
    pub fn build(self) -> Result<BoardSession, BuildError> {
        self.config.validate()?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store: Arc<dyn TaskStore> = match self.source.ok_or(BuildError::MissingStore)? {
            StoreSource::Store(store) => store,
            StoreSource::Local { persistence, seed } => {
                Arc::new(LocalTaskStore::open(persistence, seed, Arc::clone(&clock))?)
            }
        };

        let cache = QueryCache::with_clock(store, self.config.cache_config(), clock);
        let pager = PaginationController::new(cache.clone(), self.config.page_size);
        let search = SearchFilter::new(self.config.debounce());
        tracing::debug!(page_size = self.config.page_size, "Board session built");
        Ok(BoardSession::new(cache, pager, search))
    }
}
