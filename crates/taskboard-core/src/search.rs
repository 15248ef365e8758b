//! Debounced search input.
//!
//! Two stages: the raw input the user is typing, and the committed query that
//! drives store requests. The committed value only changes once the input has
//! been stable for the debounce window. Time is passed in explicitly so the
//! owner decides what drives it (a timer, a UI tick, a test).
//!
//! Commit hooks run synchronously with the commit, in registration order.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::domain::{Column, Task};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

pub type CommitHook = Box<dyn FnMut(&str) + Send>;

/// Keys the search box reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKey {
    Escape,
    /// The global "focus search" shortcut.
    FocusShortcut,
}

/// Which element has keyboard focus when a key arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusTarget {
    Nothing,
    SearchInput,
    /// Some other text input; the shortcut must not steal its keystrokes.
    OtherInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Cleared,
    FocusSearch,
    Ignored,
}

pub struct SearchFilter {
    raw: String,
    committed: String,
    debounce: Duration,
    /// Deadline of the pending commit, if input changed since the last one.
    pending: Option<Instant>,
    hooks: Vec<CommitHook>,
}

impl SearchFilter {
    pub fn new(debounce: Duration) -> Self {
        Self {
            raw: String::new(),
            committed: String::new(),
            debounce,
            pending: None,
            hooks: Vec::new(),
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn committed(&self) -> &str {
        &self.committed
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// When the pending commit fires, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn on_commit(&mut self, hook: impl FnMut(&str) + Send + 'static) {
        self.hooks.push(Box::new(hook));
    }

    /// Record a keystroke. Restarts the debounce window.
    pub fn input(&mut self, text: impl Into<String>, now: Instant) {
        self.raw = text.into();
        self.pending = Some(now + self.debounce);
    }

    /// Commit if the debounce window has elapsed. Returns the committed value.
    ///
    /// A pending commit fires even when the value equals the current one;
    /// downstream resets are unconditional.
    pub fn tick(&mut self, now: Instant) -> Option<String> {
        match self.pending {
            Some(deadline) if now >= deadline => Some(self.commit()),
            _ => None,
        }
    }

    /// Commit any pending input immediately.
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_some() {
            Some(self.commit())
        } else {
            None
        }
    }

    fn commit(&mut self) -> String {
        self.pending = None;
        self.committed = self.raw.trim().to_string();
        tracing::debug!(search = %self.committed, "Search committed");
        for hook in &mut self.hooks {
            hook(&self.committed);
        }
        self.committed.clone()
    }

    /// Escape clears the input (through the normal debounce); the focus
    /// shortcut only acts when no other input is being typed into.
    pub fn handle_key(&mut self, key: SearchKey, focus: FocusTarget, now: Instant) -> KeyOutcome {
        match (key, focus) {
            (SearchKey::Escape, FocusTarget::SearchInput) => {
                self.input("", now);
                KeyOutcome::Cleared
            }
            (SearchKey::Escape, _) => KeyOutcome::Ignored,
            (SearchKey::FocusShortcut, FocusTarget::Nothing) => KeyOutcome::FocusSearch,
            (SearchKey::FocusShortcut, _) => KeyOutcome::Ignored,
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        task.matches(&self.committed)
    }

    /// Tasks of `column` the board should show.
    ///
    /// The task being dragged is always kept in its original column, even when
    /// the committed query excludes it.
    pub fn visible(&self, items: &[Task], column: Column, dragged: Option<&Task>) -> Vec<Task> {
        let mut out: Vec<Task> = items
            .iter()
            .filter(|task| task.column == column && self.matches(task))
            .cloned()
            .collect();

        if let Some(task) = dragged {
            let shown = out.iter().any(|t| t.id == task.id);
            let elsewhere = items.iter().any(|t| t.id == task.id && t.column != column);
            if task.column == column && !shown && !elsewhere {
                let at = out.partition_point(|t| t.id < task.id);
                out.insert(at, task.clone());
            }
        }
        out
    }
}

impl Default for SearchFilter {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl fmt::Debug for SearchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchFilter")
            .field("raw", &self.raw)
            .field("committed", &self.committed)
            .field("pending", &self.pending)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
