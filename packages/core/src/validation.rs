// ABOUTME: Local input validation for tasks and account addresses
// ABOUTME: Runs before any request is issued and returns normalised values

use thiserror::Error;

use crate::constants::{
    MAX_DESCRIPTION_LENGTH, MAX_TAGS_PER_TASK, MAX_TAG_LENGTH, MAX_TITLE_LENGTH,
};
use crate::types::{TaskCreateInput, TaskUpdateInput};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Task title cannot be empty")]
    EmptyTitle,

    #[error("Task title is too long ({0} characters, max {max})", max = MAX_TITLE_LENGTH)]
    TitleTooLong(usize),

    #[error("Task description is too long ({0} characters, max {max})", max = MAX_DESCRIPTION_LENGTH)]
    DescriptionTooLong(usize),

    #[error("Too many tags ({0}, max {max})", max = MAX_TAGS_PER_TASK)]
    TooManyTags(usize),

    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    #[error("Update contains no fields")]
    EmptyUpdate,

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("{0}")]
    Rejected(String),
}

/// Validate and normalise a create request
pub fn validate_task_create(input: &TaskCreateInput) -> Result<TaskCreateInput, ValidationError> {
    let title = validate_title(&input.title)?;
    let description = match &input.description {
        Some(description) => validate_description(description)?,
        None => None,
    };
    let tags = match &input.tags {
        Some(tags) => Some(validate_tags(tags)?),
        None => None,
    };

    Ok(TaskCreateInput {
        title,
        description,
        status: input.status,
        priority: input.priority,
        due_date: input.due_date,
        tags,
    })
}

/// Validate and normalise a partial update; an update with no fields is rejected
pub fn validate_task_update(input: &TaskUpdateInput) -> Result<TaskUpdateInput, ValidationError> {
    if input.is_empty() {
        return Err(ValidationError::EmptyUpdate);
    }

    let title = match &input.title {
        Some(title) => Some(validate_title(title)?),
        None => None,
    };
    let description = match &input.description {
        Some(Some(description)) => Some(validate_description(description)?),
        Some(None) => Some(None),
        None => None,
    };
    let tags = match &input.tags {
        Some(tags) => Some(validate_tags(tags)?),
        None => None,
    };

    Ok(TaskUpdateInput {
        title,
        description,
        status: input.status,
        priority: input.priority,
        due_date: input.due_date,
        tags,
    })
}

/// Validate an email address and return it trimmed
pub fn validate_email(email: &str) -> Result<String, ValidationError> {
    let email = email.trim();
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None)
            if !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace) =>
        {
            Ok(email.to_string())
        }
        _ => Err(ValidationError::InvalidEmail(email.to_string())),
    }
}

fn validate_title(title: &str) -> Result<String, ValidationError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    let length = title.chars().count();
    if length > MAX_TITLE_LENGTH {
        return Err(ValidationError::TitleTooLong(length));
    }
    Ok(title.to_string())
}

// Blank descriptions are stored as absent.
fn validate_description(description: &str) -> Result<Option<String>, ValidationError> {
    let description = description.trim();
    if description.is_empty() {
        return Ok(None);
    }
    let length = description.chars().count();
    if length > MAX_DESCRIPTION_LENGTH {
        return Err(ValidationError::DescriptionTooLong(length));
    }
    Ok(Some(description.to_string()))
}

fn validate_tags(tags: &[String]) -> Result<Vec<String>, ValidationError> {
    if tags.len() > MAX_TAGS_PER_TASK {
        return Err(ValidationError::TooManyTags(tags.len()));
    }

    let mut normalised: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() || tag.chars().count() > MAX_TAG_LENGTH {
            return Err(ValidationError::InvalidTag(tag.to_string()));
        }
        if !normalised.iter().any(|existing| existing == tag) {
            normalised.push(tag.to_string());
        }
    }
    Ok(normalised)
}
