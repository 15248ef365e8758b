//! Cache keys and the values stored under them.

use std::fmt;

use crate::domain::{Column, ListFilter, StoreError, Task, TaskId, TaskPage};
use crate::ports::TaskStore;

/// Address of a cached store result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// A collection listing under an arbitrary filter set.
    Tasks(ListFilter),

    /// One page of a column under the committed search string.
    Page {
        column: Column,
        page: u32,
        page_size: u32,
        search: String,
    },

    /// A single record.
    Task(TaskId),
}

impl QueryKey {
    pub fn page(column: Column, page: u32, page_size: u32, search: &str) -> Self {
        Self::Page {
            column,
            page,
            page_size,
            search: search.trim().to_string(),
        }
    }

    /// Keys whose value is a task listing.
    pub fn is_listing(&self) -> bool {
        matches!(self, Self::Tasks(_) | Self::Page { .. })
    }

    pub fn is_page_of(&self, column: Column) -> bool {
        matches!(self, Self::Page { column: c, .. } if *c == column)
    }

    /// The filter a listing key is fetched with.
    pub fn filter(&self) -> Option<ListFilter> {
        match self {
            Self::Tasks(filter) => Some(filter.clone()),
            Self::Page {
                column,
                page,
                page_size,
                search,
            } => Some(
                ListFilter::column(*column)
                    .with_search(search.clone())
                    .with_page(*page, *page_size),
            ),
            Self::Task(_) => None,
        }
    }

    pub(crate) async fn fetch(&self, store: &dyn TaskStore) -> Result<QueryData, StoreError> {
        match self {
            Self::Task(id) => store.get(*id).await.map(QueryData::Task),
            listing => {
                let filter = listing.filter().unwrap_or_default();
                store.list(&filter).await.map(QueryData::List)
            }
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tasks(filter) => {
                write!(f, "tasks")?;
                if let Some(column) = filter.column {
                    write!(f, ":{column}")?;
                }
                if let Some(search) = &filter.search {
                    write!(f, "?q={search}")?;
                }
                if let (Some(page), Some(size)) = (filter.page, filter.page_size) {
                    write!(f, "#{page}/{size}")?;
                }
                Ok(())
            }
            Self::Page {
                column,
                page,
                page_size,
                search,
            } => write!(f, "page:{column}#{page}/{page_size}?q={search}"),
            Self::Task(id) => write!(f, "task:{id}"),
        }
    }
}

/// A cached store result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryData {
    List(TaskPage),
    Task(Task),
}

impl QueryData {
    pub fn as_page(&self) -> Option<&TaskPage> {
        match self {
            Self::List(page) => Some(page),
            Self::Task(_) => None,
        }
    }

    pub fn as_task(&self) -> Option<&Task> {
        match self {
            Self::Task(task) => Some(task),
            Self::List(_) => None,
        }
    }

    pub fn into_page(self) -> Option<TaskPage> {
        match self {
            Self::List(page) => Some(page),
            Self::Task(_) => None,
        }
    }

    pub fn into_task(self) -> Option<Task> {
        match self {
            Self::Task(task) => Some(task),
            Self::List(_) => None,
        }
    }

    /// Find a task by id in whatever this value holds.
    pub fn find(&self, id: TaskId) -> Option<&Task> {
        match self {
            Self::List(page) => page.items.iter().find(|task| task.id == id),
            Self::Task(task) => (task.id == id).then_some(task),
        }
    }
}
