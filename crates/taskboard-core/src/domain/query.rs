//! List filters and paginated results.

use serde::{Deserialize, Serialize};

use super::{Column, Task};

/// Filter set for `TaskStore::list`. Absent `page` means "return everything".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListFilter {
    pub column: Option<Column>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl ListFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn column(column: Column) -> Self {
        Self {
            column: Some(column),
            ..Self::default()
        }
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        let search = search.into();
        self.search = if search.trim().is_empty() {
            None
        } else {
            Some(search)
        };
        self
    }

    pub fn with_page(mut self, page: u32, page_size: u32) -> Self {
        self.page = Some(page);
        self.page_size = Some(page_size);
        self
    }

    pub fn admits(&self, task: &Task) -> bool {
        self.column.is_none_or(|column| task.column == column)
            && self.search.as_deref().is_none_or(|needle| task.matches(needle))
    }
}

/// One page of a filtered listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPage {
    pub items: Vec<Task>,
    pub total: usize,
    pub page: u32,
    pub total_pages: u32,
}

/// `ceil(total / page_size)`; zero when there is nothing to show.
pub fn total_pages(total: usize, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size as usize) as u32
}

/// Slice an already filtered and ordered collection.
///
/// Pages are 1-based. Page 0 is treated as page 1; pages past the end are empty.
pub fn paginate(matching: Vec<Task>, page: Option<u32>, page_size: Option<u32>) -> TaskPage {
    let total = matching.len();
    match (page, page_size) {
        (Some(page), Some(size)) if size > 0 => {
            let page = page.max(1);
            let start = (page as usize - 1).saturating_mul(size as usize);
            let items = matching
                .into_iter()
                .skip(start)
                .take(size as usize)
                .collect();
            TaskPage {
                items,
                total,
                page,
                total_pages: total_pages(total, size),
            }
        }
        _ => TaskPage {
            items: matching,
            total,
            page: 1,
            total_pages: u32::from(total > 0),
        },
    }
}
