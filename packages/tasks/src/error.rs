// ABOUTME: Error types for the task store
// ABOUTME: Separates local validation, read, write, and ownership failures

use taskmaster_core::{TaskId, ValidationError};
use thiserror::Error;

use crate::table::StoreError;

pub type TaskResult<T> = Result<T, TaskError>;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Invalid task: {0}")]
    Validation(#[from] ValidationError),

    #[error("Failed to load tasks: {0}")]
    Fetch(String),

    #[error("Task change rejected: {0}")]
    Write(String),

    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Sign in to change tasks")]
    NotAuthenticated,
}

impl TaskError {
    pub fn fetch(err: StoreError) -> Self {
        Self::Fetch(err.to_string())
    }

    pub fn write(err: StoreError) -> Self {
        Self::Write(err.to_string())
    }

    /// Whether the request never reached a decision at the table store
    pub fn is_transport_error(&self) -> bool {
        matches!(self, TaskError::Fetch(_) | TaskError::Write(_))
    }
}
