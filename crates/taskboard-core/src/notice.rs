//! User-facing outcome messages.
//!
//! Every user-initiated mutation ends in exactly one notice: a success or a
//! failure chosen by the error's `FailureClass`.

use std::fmt;

use serde::Serialize;

use crate::domain::{FailureClass, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    /// Failure notice for `action` ("move task", "create task", ...).
    ///
    /// Validation messages are shown verbatim.
    pub fn failure(action: &str, err: &StoreError) -> Self {
        let message = match (err.class(), err) {
            (FailureClass::Network, _) => {
                format!("Could not {action}: the task store is unreachable. Please try again.")
            }
            (FailureClass::NotFound, _) => {
                format!("Could not {action}: the task no longer exists.")
            }
            (FailureClass::InvalidData, StoreError::Validation(detail)) => detail.clone(),
            (FailureClass::InvalidData, _) => format!("Could not {action}: invalid task data."),
            (FailureClass::Other, _) => format!("Could not {action}: {err}"),
        };
        Self::error(message)
    }

    pub fn is_error(&self) -> bool {
        self.level == NoticeLevel::Error
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Success => "ok",
            NoticeLevel::Error => "error",
        };
        write!(f, "[{tag}] {}", self.message)
    }
}
