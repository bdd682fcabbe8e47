// ABOUTME: Core types, validation, and constants for Task Master
// ABOUTME: Foundational package shared by the auth, tasks, and cloud packages

pub mod constants;
pub mod types;
pub mod validation;

// Re-export main types
pub use types::{
    Identity, ProfileFields, Session, Task, TaskCreateInput, TaskId, TaskPriority, TaskStatus,
    TaskUpdateInput, UserId,
};

// Re-export constants
pub use constants::{session_file, taskmaster_dir, TASKS_TABLE};

// Re-export validation
pub use validation::{validate_email, validate_task_create, validate_task_update, ValidationError};
