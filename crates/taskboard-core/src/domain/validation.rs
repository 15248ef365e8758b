//! Field rules every client-authored task must satisfy.

use thiserror::Error;

use super::{TaskDraft, TaskPatch};

pub const TITLE_MIN: usize = 3;
pub const TITLE_MAX: usize = 100;
pub const DESCRIPTION_MIN: usize = 10;
pub const DESCRIPTION_MAX: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("title must be between {TITLE_MIN} and {TITLE_MAX} characters (got {0})")]
    TitleLength(usize),

    #[error("description must be between {DESCRIPTION_MIN} and {DESCRIPTION_MAX} characters (got {0})")]
    DescriptionLength(usize),

    #[error("tags must not be blank")]
    BlankTag,
}

/// Length is measured in chars after trimming surrounding whitespace.
pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    let len = title.trim().chars().count();
    if (TITLE_MIN..=TITLE_MAX).contains(&len) {
        Ok(())
    } else {
        Err(ValidationError::TitleLength(len))
    }
}

pub fn validate_description(description: &str) -> Result<(), ValidationError> {
    let len = description.trim().chars().count();
    if (DESCRIPTION_MIN..=DESCRIPTION_MAX).contains(&len) {
        Ok(())
    } else {
        Err(ValidationError::DescriptionLength(len))
    }
}

fn validate_tags(tags: &[String]) -> Result<(), ValidationError> {
    if tags.iter().any(|tag| tag.trim().is_empty()) {
        return Err(ValidationError::BlankTag);
    }
    Ok(())
}

pub fn validate_draft(draft: &TaskDraft) -> Result<(), ValidationError> {
    validate_title(&draft.title)?;
    validate_description(&draft.description)?;
    validate_tags(&draft.tags)
}

/// Only the fields present in the patch are checked.
pub fn validate_patch(patch: &TaskPatch) -> Result<(), ValidationError> {
    if let Some(title) = &patch.title {
        validate_title(title)?;
    }
    if let Some(description) = &patch.description {
        validate_description(description)?;
    }
    if let Some(tags) = &patch.tags {
        validate_tags(tags)?;
    }
    Ok(())
}
