// ABOUTME: In-memory table store for tests and offline runs
// ABOUTME: Assigns ids and timestamps like the hosted table and can be told to fail

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use taskmaster_core::{Task, TaskId, UserId};

use crate::table::{NewTaskRow, StoreError, StoreResult, TableStore, TaskPatch, TaskQuery};

#[derive(Debug, Default)]
struct State {
    rows: Vec<Task>,
    last_timestamp: Option<DateTime<Utc>>,
    failure: Option<StoreError>,
}

/// Rows live in a `Vec` in insertion order. Ownership filtering matches the
/// row-level policy of the hosted table.
#[derive(Debug, Default)]
pub struct InMemoryTableStore {
    state: Mutex<State>,
    requests: AtomicUsize,
}

impl InMemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count the request and fail it if a failure is armed
    fn begin(&self) -> StoreResult<std::sync::MutexGuard<'_, State>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        match &state.failure {
            Some(error) => Err(error.clone()),
            None => Ok(state),
        }
    }

    /// Server clock that never repeats or goes backwards
    fn tick(state: &mut State) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match state.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        state.last_timestamp = Some(next);
        next
    }

    /// Make every request fail with `error` until cleared with `None`
    pub fn fail_with(&self, error: Option<StoreError>) {
        self.lock().failure = error;
    }

    /// Number of requests received, including failed ones
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Insert a row directly, bypassing the request counter
    pub fn seed(&self, owner: &UserId, title: &str) -> Task {
        let mut state = self.lock();
        let now = Self::tick(&mut state);
        let task = Task {
            id: TaskId::new(uuid::Uuid::new_v4().to_string()),
            user_id: owner.clone(),
            title: title.to_string(),
            description: None,
            status: Default::default(),
            priority: Default::default(),
            due_date: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        state.rows.push(task.clone());
        task
    }

    /// Every stored row regardless of owner
    pub fn rows(&self) -> Vec<Task> {
        self.lock().rows.clone()
    }
}

#[async_trait]
impl TableStore for InMemoryTableStore {
    async fn query(&self, query: &TaskQuery) -> StoreResult<Vec<Task>> {
        let state = self.begin()?;
        let mut tasks: Vec<Task> = state
            .rows
            .iter()
            .filter(|task| query.matches(task))
            .cloned()
            .collect();
        query.order.sort(&mut tasks);
        Ok(tasks)
    }

    async fn insert(&self, row: &NewTaskRow) -> StoreResult<Task> {
        let mut state = self.begin()?;
        if row.title.trim().is_empty() {
            return Err(StoreError::Rejected("title must not be empty".to_string()));
        }

        let now = Self::tick(&mut state);
        let task = Task {
            id: TaskId::new(uuid::Uuid::new_v4().to_string()),
            user_id: row.user_id.clone(),
            title: row.title.clone(),
            description: row.description.clone(),
            status: row.status,
            priority: row.priority,
            due_date: row.due_date,
            tags: row.tags.clone(),
            created_at: now,
            updated_at: now,
            completed_at: row.completed_at,
        };
        state.rows.push(task.clone());
        Ok(task)
    }

    async fn update(
        &self,
        id: &TaskId,
        owner: &UserId,
        patch: &TaskPatch,
    ) -> StoreResult<Option<Task>> {
        let mut state = self.begin()?;
        let now = Self::tick(&mut state);

        let Some(row) = state
            .rows
            .iter_mut()
            .find(|task| &task.id == id && &task.user_id == owner)
        else {
            return Ok(None);
        };

        patch.apply_to(row);
        // Never let a client clock move the row backwards.
        if row.updated_at <= row.created_at {
            row.updated_at = now.max(row.created_at + Duration::microseconds(1));
        }
        Ok(Some(row.clone()))
    }

    async fn delete(&self, id: &TaskId, owner: &UserId) -> StoreResult<bool> {
        let mut state = self.begin()?;
        let before = state.rows.len();
        state
            .rows
            .retain(|task| !(&task.id == id && &task.user_id == owner));
        Ok(state.rows.len() < before)
    }
}
