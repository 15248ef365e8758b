//! End-to-end board scenarios: store, cache, pagination, search and drag
//! working together through `BoardSession`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use taskboard_core::app::{BoardBuilder, BoardEvent, BoardSession};
use taskboard_core::cache::QueryKey;
use taskboard_core::config::BoardConfig;
use taskboard_core::domain::{Column, ListFilter, StoreError, Task, TaskDraft, TaskId, TaskPatch};
use taskboard_core::impls::{
    FlakyStore, JsonFilePersistence, LocalTaskStore, MemoryPersistence, StaticSeed,
};
use taskboard_core::notice::{Notice, NoticeLevel};
use taskboard_core::pagination::PaginationState;
use taskboard_core::ports::{SeedSource, SystemClock, TaskStore};

type Store = FlakyStore<LocalTaskStore>;

fn seed() -> Vec<Task> {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
    [
        (1, "Write docs", Column::Backlog),
        (2, "Plan sprint", Column::Backlog),
        (3, "Refactor parser", Column::InProgress),
        (4, "Review login flow", Column::Review),
    ]
    .into_iter()
    .map(|(id, title, column)| {
        TaskDraft::new(title, "routine board work item", column).into_task(TaskId::new(id), at)
    })
    .collect()
}

fn board_with(tasks: Vec<Task>, config: BoardConfig) -> (Arc<Store>, BoardSession) {
    let local = LocalTaskStore::open(
        Arc::new(MemoryPersistence::new()),
        Arc::new(StaticSeed::new(tasks)),
        Arc::new(SystemClock),
    )
    .unwrap();
    let store = Arc::new(FlakyStore::new(local));
    let session = BoardBuilder::new(config).store(store.clone()).build().unwrap();
    (store, session)
}

fn board() -> (Arc<Store>, BoardSession) {
    board_with(seed(), BoardConfig::default())
}

fn fix_bug() -> TaskDraft {
    TaskDraft::new("Fix bug", "Investigate crash on startup path", Column::Backlog)
}

fn ids(tasks: &[Task]) -> Vec<u64> {
    tasks.iter().map(|t| t.id.get()).collect()
}

async fn commit_search(session: &mut BoardSession, text: &str) {
    session.handle(BoardEvent::SearchInput(text.to_string())).await;
    session.flush_search();
}

#[tokio::test]
async fn create_assigns_fresh_id_and_store_timestamps() {
    let (store, mut session) = board();

    let notice = session.handle(BoardEvent::Create(fix_bug())).await.unwrap();

    assert_eq!(notice, Notice::success("Created \"Fix bug\""));
    let task = store.get(TaskId::new(5)).await.unwrap();
    assert_eq!(task.column, Column::Backlog);
    assert_eq!(task.created_at, task.updated_at);
    assert_eq!(task.description, "Investigate crash on startup path");
}

#[tokio::test]
async fn dragging_to_done_moves_and_names_destination() {
    let (store, mut session) = board();
    session.handle(BoardEvent::Create(fix_bug())).await;
    session.refresh().await.unwrap();

    session.handle(BoardEvent::DragStart(TaskId::new(5))).await;
    session.handle(BoardEvent::DragHover(Some(Column::Done))).await;
    let notice = session.handle(BoardEvent::DragEnd(Some(Column::Done))).await.unwrap();

    assert_eq!(notice.level, NoticeLevel::Success);
    assert!(notice.message.contains("Fix bug"));
    assert!(notice.message.contains("Done"));
    let task = store.get(TaskId::new(5)).await.unwrap();
    assert_eq!(task.column, Column::Done);
    assert!(task.updated_at >= task.created_at);
    assert!(!session.drag().is_dragging());
    assert_eq!(ids(&session.column_view(Column::Done)), vec![5]);
}

#[tokio::test]
async fn drop_without_target_changes_nothing() {
    let (store, mut session) = board();
    session.handle(BoardEvent::Create(fix_bug())).await;
    let writes = store.writes();

    session.handle(BoardEvent::DragStart(TaskId::new(5))).await;
    let notice = session.handle(BoardEvent::DragEnd(None)).await;

    assert_eq!(notice, Some(Notice::info("Drop cancelled")));
    assert_eq!(store.writes(), writes);
    assert_eq!(store.get(TaskId::new(5)).await.unwrap().column, Column::Backlog);
    assert!(!session.drag().is_dragging());
}

#[tokio::test]
async fn search_finds_task_and_clearing_restores_everything() {
    let (_, mut session) = board();
    session.handle(BoardEvent::Create(fix_bug())).await;

    commit_search(&mut session, "crash").await;
    session.refresh().await.unwrap();
    assert_eq!(ids(&session.column_view(Column::Backlog)), vec![5]);
    assert!(session.column_view(Column::Review).is_empty());

    commit_search(&mut session, "").await;
    session.refresh().await.unwrap();
    assert_eq!(ids(&session.column_view(Column::Backlog)), vec![1, 2, 5]);
    assert_eq!(ids(&session.column_view(Column::Review)), vec![4]);
    assert_eq!(session.pager().state(Column::Backlog).current_page, 1);
}

#[tokio::test]
async fn search_commit_resets_every_column_and_purges_pages() {
    let many: Vec<Task> = (1..=25)
        .map(|i| {
            let column = if i % 2 == 0 { Column::Backlog } else { Column::Done };
            TaskDraft::new(format!("Task number {i}"), "routine board work item", column)
                .into_task(TaskId::new(i), Utc::now())
        })
        .collect();
    let (_, mut session) = board_with(many, BoardConfig { page_size: 5, ..BoardConfig::default() });
    session
        .handle(BoardEvent::PageRequest { column: Column::Backlog, page: 3 })
        .await;
    session
        .handle(BoardEvent::PageRequest { column: Column::Done, page: 2 })
        .await;
    assert_eq!(session.pager().state(Column::Backlog).current_page, 3);

    commit_search(&mut session, "number 1").await;

    for column in Column::ALL {
        assert_eq!(session.pager().state(column), PaginationState::default());
    }
    assert!(
        session
            .cache()
            .keys()
            .iter()
            .all(|key| !matches!(key, QueryKey::Page { .. }))
    );
}

#[tokio::test(start_paused = true)]
async fn failed_mutation_restores_visible_state_exactly() {
    let (store, mut session) = board();
    session.refresh().await.unwrap();
    let all = QueryKey::Tasks(ListFilter::all());
    session.cache().read(all.clone()).await.unwrap();
    let pages_before: Vec<Vec<u8>> = Column::ALL
        .into_iter()
        .map(|c| serde_json::to_vec(&session.pager().current_page_view(c)).unwrap())
        .collect();
    let all_before = session.cache().peek(&all);

    store.fail_writes(5, StoreError::Transient("gateway timeout".into()));
    let notice = session
        .handle(BoardEvent::Update {
            id: TaskId::new(1),
            patch: TaskPatch {
                title: Some("Write better docs".into()),
                column: Some(Column::Done),
                ..TaskPatch::default()
            },
        })
        .await
        .unwrap();

    assert!(notice.is_error());
    let pages_after: Vec<Vec<u8>> = Column::ALL
        .into_iter()
        .map(|c| serde_json::to_vec(&session.pager().current_page_view(c)).unwrap())
        .collect();
    assert_eq!(pages_before, pages_after);
    assert_eq!(session.cache().peek(&all), all_before);
    assert_eq!(store.inner().get(TaskId::new(1)).await.unwrap().title, "Write docs");
    assert_eq!(session.cache().stats().rollbacks, 1);
}

#[tokio::test]
async fn dragged_task_stays_visible_while_search_excludes_it() {
    let (_, mut session) = board();
    session.refresh().await.unwrap();
    session.handle(BoardEvent::DragStart(TaskId::new(1))).await;

    commit_search(&mut session, "parser").await;
    session.refresh().await.unwrap();

    assert_eq!(ids(&session.column_view(Column::Backlog)), vec![1]);
    assert_eq!(ids(&session.column_view(Column::InProgress)), vec![3]);

    session.handle(BoardEvent::DragEnd(None)).await;
    assert!(session.column_view(Column::Backlog).is_empty());
}

struct CountingSeed {
    fetches: AtomicU32,
    tasks: Vec<Task>,
}

#[async_trait]
impl SeedSource for CountingSeed {
    async fn fetch(&self) -> Result<Vec<Task>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.tasks.clone())
    }
}

#[tokio::test]
async fn board_file_survives_restart_without_reseeding() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("board.json");
    let seed = Arc::new(CountingSeed {
        fetches: AtomicU32::new(0),
        tasks: seed(),
    });

    {
        let mut session = BoardBuilder::new(BoardConfig::default())
            .local(Arc::new(JsonFilePersistence::new(&path)), seed.clone())
            .build()
            .unwrap();
        session.handle(BoardEvent::Create(fix_bug())).await;
        session.handle(BoardEvent::Delete(TaskId::new(5))).await;
    }

    let mut session = BoardBuilder::new(BoardConfig::default())
        .local(Arc::new(JsonFilePersistence::new(&path)), seed.clone())
        .build()
        .unwrap();
    session.refresh().await.unwrap();
    assert_eq!(ids(&session.column_view(Column::Backlog)), vec![1, 2]);

    session.handle(BoardEvent::Create(fix_bug())).await;
    assert_eq!(seed.fetches.load(Ordering::SeqCst), 1);
    let page = session
        .cache()
        .read(QueryKey::Tasks(ListFilter::column(Column::Backlog)))
        .await
        .unwrap()
        .into_page()
        .unwrap();
    // Id 5 was deleted before the restart and is never handed out again.
    assert_eq!(ids(&page.items), vec![1, 2, 6]);
}
