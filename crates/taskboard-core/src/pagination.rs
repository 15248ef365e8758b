//! Per-column pagination state.
//!
//! Each column cycles `Idle(page 1) -> Loading(p) -> Ready(p, total)`. Page
//! content always comes from the query cache under the key
//! `(column, page, committed search)`; this controller only tracks which page
//! each column is on and what the store last reported about totals.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::cache::{QueryCache, QueryKey};
use crate::domain::{Column, StoreError, TaskPage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagePhase {
    /// Nothing loaded since the last reset.
    Idle,
    Loading,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationState {
    /// 1-based, clamped to `[1, max(1, total_pages)]`.
    pub current_page: u32,
    pub total_pages: u32,
    pub total: usize,
    pub phase: PagePhase,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self {
            current_page: 1,
            total_pages: 0,
            total: 0,
            phase: PagePhase::Idle,
        }
    }
}

impl PaginationState {
    pub fn is_loading(&self) -> bool {
        self.phase == PagePhase::Loading
    }

    /// Totals are only known once a page has come back.
    fn clamp(&self, page: u32) -> u32 {
        match self.phase {
            PagePhase::Idle => page.max(1),
            PagePhase::Loading | PagePhase::Ready => page.clamp(1, self.total_pages.max(1)),
        }
    }
}

#[derive(Default)]
struct PagerState {
    columns: HashMap<Column, PaginationState>,
    search: String,
    /// Bumped on every search commit. Loads started under an older epoch
    /// do not touch the per-column state.
    epoch: u64,
}

impl PagerState {
    fn column(&mut self, column: Column) -> &mut PaginationState {
        self.columns.entry(column).or_default()
    }
}

/// Cloneable handle; clones share state so commit hooks can capture one.
#[derive(Clone)]
pub struct PaginationController {
    cache: QueryCache,
    page_size: u32,
    state: Arc<Mutex<PagerState>>,
}

impl PaginationController {
    pub fn new(cache: QueryCache, page_size: u32) -> Self {
        Self {
            cache,
            page_size: page_size.max(1),
            state: Arc::new(Mutex::new(PagerState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn state(&self, column: Column) -> PaginationState {
        self.lock().columns.get(&column).cloned().unwrap_or_default()
    }

    pub fn search(&self) -> String {
        self.lock().search.clone()
    }

    /// Cache key of the page a column currently shows.
    pub fn current_key(&self, column: Column) -> QueryKey {
        let state = self.lock();
        let page = state
            .columns
            .get(&column)
            .map_or(1, |s| s.current_page);
        QueryKey::page(column, page, self.page_size, &state.search)
    }

    /// Last cached value of the current page, without a store call.
    pub fn current_page_view(&self, column: Column) -> Option<TaskPage> {
        self.cache
            .peek(&self.current_key(column))
            .and_then(|data| data.into_page())
    }

    /// Load `page` of `column` under the committed search.
    ///
    /// The page number is clamped silently before the request. If the store
    /// reports fewer pages than requested (the column shrank), the last valid
    /// page is loaded instead.
    pub async fn go_to_page(&self, column: Column, page: u32) -> Result<TaskPage, StoreError> {
        let (target, search, epoch) = self.begin_load(column, page);
        let result = self
            .cache
            .read_page(QueryKey::page(column, target, self.page_size, &search))
            .await;

        match self.finish_load(column, epoch, &result) {
            Some(clamped) if clamped != target => {
                tracing::debug!(%column, requested = target, clamped, "Page out of range, reloading");
                let (target, search, epoch) = self.begin_load(column, clamped);
                let result = self
                    .cache
                    .read_page(QueryKey::page(column, target, self.page_size, &search))
                    .await;
                self.finish_load(column, epoch, &result);
                result
            }
            _ => result,
        }
    }

    /// Reload the page a column is on.
    pub async fn refresh(&self, column: Column) -> Result<TaskPage, StoreError> {
        let page = self.state(column).current_page;
        self.go_to_page(column, page).await
    }

    /// Reload every column's current page.
    pub async fn refresh_all(&self) -> Vec<(Column, Result<TaskPage, StoreError>)> {
        let mut pages = Vec::with_capacity(Column::ALL.len());
        for column in Column::ALL {
            pages.push((column, self.refresh(column).await));
        }
        pages
    }

    fn begin_load(&self, column: Column, page: u32) -> (u32, String, u64) {
        let mut state = self.lock();
        let epoch = state.epoch;
        let search = state.search.clone();
        let column_state = state.column(column);
        let target = column_state.clamp(page);
        column_state.current_page = target;
        column_state.phase = PagePhase::Loading;
        (target, search, epoch)
    }

    /// Record totals. Returns the page to show if `current_page` fell out of range.
    fn finish_load(
        &self,
        column: Column,
        epoch: u64,
        result: &Result<TaskPage, StoreError>,
    ) -> Option<u32> {
        let mut state = self.lock();
        if state.epoch != epoch {
            return None;
        }
        let column_state = state.column(column);
        match result {
            Ok(page) => {
                column_state.total = page.total;
                column_state.total_pages = page.total_pages;
                column_state.phase = PagePhase::Ready;
                let clamped = column_state.clamp(column_state.current_page);
                column_state.current_page = clamped;
                Some(clamped)
            }
            Err(_) => {
                column_state.phase = if column_state.total_pages > 0 {
                    PagePhase::Ready
                } else {
                    PagePhase::Idle
                };
                None
            }
        }
    }

    /// A new search string was committed: every column goes back to page 1
    /// and every cached page (any page, any earlier search) is purged.
    ///
    /// Runs on every commit, even when the string is unchanged.
    pub fn on_search_changed(&self, search: &str) {
        {
            let mut state = self.lock();
            state.search = search.trim().to_string();
            state.epoch += 1;
            for column in Column::ALL {
                *state.column(column) = PaginationState::default();
            }
        }
        let purged = self.cache.remove(|key| Column::ALL.iter().any(|c| key.is_page_of(*c)));
        tracing::debug!(search = %search.trim(), purged, "Search committed, pagination reset");
    }

    /// Count bookkeeping after a successful move. Page content is refreshed
    /// through cache invalidation, not here.
    pub fn on_task_moved(&self, from: Column, to: Column) {
        if from == to {
            return;
        }
        let mut state = self.lock();
        let source = state.column(from);
        source.total = source.total.saturating_sub(1);
        state.column(to).total += 1;
    }
}

impl std::fmt::Debug for PaginationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaginationController")
            .field("page_size", &self.page_size)
            .field("search", &self.search())
            .finish_non_exhaustive()
    }
}
