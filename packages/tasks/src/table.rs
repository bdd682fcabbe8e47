// ABOUTME: Boundary trait for the hosted task table
// ABOUTME: Every call is scoped to an owner so one identity can never touch another's rows

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskmaster_core::{Task, TaskId, TaskPriority, TaskStatus, UserId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Not authorized for this table")]
    Unauthorized,

    #[error("Rejected by table store: {0}")]
    Rejected(String),

    #[error("Table store error ({status}): {message}")]
    Service { status: u16, message: String },

    #[error("Could not reach table store: {0}")]
    Transport(String),

    #[error("Unexpected response from table store: {0}")]
    Decode(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

impl TaskOrder {
    /// Order the rows the way the table store would
    pub fn sort(&self, tasks: &mut [Task]) {
        match self {
            TaskOrder::NewestFirst => tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            TaskOrder::OldestFirst => tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskQuery {
    pub owner: UserId,
    pub status: Option<TaskStatus>,
    pub order: TaskOrder,
}

impl TaskQuery {
    pub fn owned_by(owner: UserId) -> Self {
        Self {
            owner,
            status: None,
            order: TaskOrder::default(),
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        task.user_id == self.owner && self.status.map_or(true, |status| task.status == status)
    }
}

/// Row sent on insert. Id and timestamps are assigned by the table store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTaskRow {
    pub user_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Partial update. `None` leaves a column alone; `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Option<DateTime<Utc>>>,
    pub updated_at: DateTime<Utc>,
}

impl TaskPatch {
    /// Apply the patch to a row, the way the table store does
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(tags) = &self.tags {
            task.tags = tags.clone();
        }
        if let Some(completed_at) = self.completed_at {
            task.completed_at = completed_at;
        }
        task.updated_at = self.updated_at;
    }
}

/// The hosted task table
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn query(&self, query: &TaskQuery) -> StoreResult<Vec<Task>>;

    /// Insert a row and return it as stored
    async fn insert(&self, row: &NewTaskRow) -> StoreResult<Task>;

    /// Update the row matching both `id` and `owner`. `None` when no such row exists.
    async fn update(&self, id: &TaskId, owner: &UserId, patch: &TaskPatch)
        -> StoreResult<Option<Task>>;

    /// Delete the row matching both `id` and `owner`. `false` when no such row exists.
    async fn delete(&self, id: &TaskId, owner: &UserId) -> StoreResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn task(id: &str, owner: &str, created_offset: i64) -> Task {
        let created_at = Utc::now() + Duration::seconds(created_offset);
        Task {
            id: TaskId::new(id),
            user_id: UserId::new(owner),
            title: id.to_string(),
            description: None,
            status: TaskStatus::Todo,
            priority: TaskPriority::Medium,
            due_date: None,
            tags: Vec::new(),
            created_at,
            updated_at: created_at,
            completed_at: None,
        }
    }

    #[test]
    fn test_newest_first_is_default_order() {
        let mut tasks = vec![task("old", "u", 0), task("new", "u", 10), task("mid", "u", 5)];
        TaskQuery::owned_by(UserId::new("u")).order.sort(&mut tasks);
        let ids: Vec<_> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[test]
    fn test_query_matches_owner_and_status() {
        let query = TaskQuery::owned_by(UserId::new("u")).with_status(TaskStatus::Todo);
        let mut done = task("b", "u", 0);
        done.status = TaskStatus::Completed;

        assert!(query.matches(&task("a", "u", 0)));
        assert!(!query.matches(&done));
        assert!(!query.matches(&task("c", "someone-else", 0)));
    }

    #[test]
    fn test_patch_only_touches_given_fields() {
        let mut row = task("a", "u", 0);
        row.description = Some("keep me".to_string());
        let later = row.created_at + Duration::seconds(1);

        TaskPatch {
            status: Some(TaskStatus::Completed),
            completed_at: Some(Some(later)),
            updated_at: later,
            ..Default::default()
        }
        .apply_to(&mut row);

        assert_eq!(row.status, TaskStatus::Completed);
        assert_eq!(row.description.as_deref(), Some("keep me"));
        assert_eq!(row.completed_at, Some(later));
        assert_eq!(row.updated_at, later);
    }

    #[test]
    fn test_patch_serializes_only_set_fields() {
        let patch = TaskPatch {
            description: Some(None),
            updated_at: Utc::now(),
            ..Default::default()
        };
        let json = serde_json::to_value(&patch).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert!(object["description"].is_null());
    }
}
