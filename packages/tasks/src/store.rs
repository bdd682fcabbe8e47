// ABOUTME: Task store caching the signed-in identity's tasks
// ABOUTME: Follows the session manager and applies only confirmed table store results

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Duration, Utc};
use taskmaster_auth::{AuthState, SessionManager};
use taskmaster_core::{
    validate_task_create, validate_task_update, Task, TaskCreateInput, TaskId, TaskStatus,
    TaskUpdateInput, UserId, ValidationError,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{TaskError, TaskResult};
use crate::table::{NewTaskRow, TableStore, TaskPatch, TaskQuery};

/// What consumers see of the store at a point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskSnapshot {
    /// Identity the tasks belong to; `None` while signed out
    pub owner: Option<UserId>,
    /// Newest first
    pub tasks: Vec<Task>,
    pub loading: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl TaskSnapshot {
    fn owned_by(owner: Option<UserId>) -> Self {
        Self {
            owner,
            ..Default::default()
        }
    }

    /// Tasks that are neither completed nor cancelled
    pub fn active_tasks(&self) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|task| task.status.is_open())
            .cloned()
            .collect()
    }

    pub fn completed_tasks(&self) -> Vec<Task> {
        self.tasks_by_status(TaskStatus::Completed)
    }

    pub fn tasks_by_status(&self, status: TaskStatus) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|task| task.status == status)
            .cloned()
            .collect()
    }

    pub fn find(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| &task.id == id)
    }
}

/// Clears the loading flag once the last in-flight request finishes
struct Busy<'a> {
    store: &'a TaskStore,
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        if self.store.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.store.state.send_if_modified(|snapshot| {
                let was_loading = snapshot.loading;
                snapshot.loading = false;
                was_loading
            });
        }
    }
}

pub struct TaskStore {
    table: Arc<dyn TableStore>,
    auth: watch::Receiver<AuthState>,
    state: watch::Sender<TaskSnapshot>,
    in_flight: AtomicUsize,
    follower: Mutex<Option<JoinHandle<()>>>,
}

impl TaskStore {
    /// Create the store and spawn the task that reloads it whenever the
    /// signed-in identity changes.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(table: Arc<dyn TableStore>, sessions: &SessionManager) -> Arc<Self> {
        let auth = sessions.subscribe();
        let (state, _) = watch::channel(TaskSnapshot::default());

        let store = Arc::new(Self {
            table,
            auth: auth.clone(),
            state,
            in_flight: AtomicUsize::new(0),
            follower: Mutex::new(None),
        });

        let handle = tokio::spawn(Self::follow(Arc::downgrade(&store), auth));
        if let Ok(mut follower) = store.follower.lock() {
            *follower = Some(handle);
        }

        store
    }

    async fn follow(store: Weak<Self>, mut auth: watch::Receiver<AuthState>) {
        loop {
            let owner = auth
                .borrow_and_update()
                .identity()
                .map(|identity| identity.id.clone());

            match store.upgrade() {
                Some(store) => store.identity_changed(owner).await,
                None => break,
            }

            if auth.changed().await.is_err() {
                debug!("Session manager gone, task store stops following");
                break;
            }
        }
    }

    async fn identity_changed(&self, owner: Option<UserId>) {
        let switched = self.state.send_if_modified(|snapshot| {
            if snapshot.owner == owner {
                return false;
            }
            *snapshot = TaskSnapshot::owned_by(owner.clone());
            snapshot.loading = self.in_flight.load(Ordering::SeqCst) > 0;
            true
        });
        if !switched {
            return;
        }

        match owner {
            Some(owner) => {
                debug!("Identity changed to {}, reloading tasks", owner);
                if let Err(e) = self.load().await {
                    warn!("Automatic task reload failed: {}", e);
                }
            }
            None => debug!("Signed out, task list cleared"),
        }
    }

    fn current_owner(&self) -> Option<UserId> {
        self.auth
            .borrow()
            .identity()
            .map(|identity| identity.id.clone())
    }

    fn require_owner(&self) -> TaskResult<UserId> {
        self.current_owner().ok_or(TaskError::NotAuthenticated)
    }

    fn begin(&self) -> Busy<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.state.send_if_modified(|snapshot| {
            let was_loading = snapshot.loading;
            snapshot.loading = true;
            !was_loading
        });
        Busy { store: self }
    }

    /// Apply `change` only while `owner` is still the signed-in identity.
    /// A response that arrives after a sign-out or account switch is dropped.
    fn apply_for(&self, owner: &UserId, change: impl FnOnce(&mut TaskSnapshot)) -> bool {
        if self.current_owner().as_ref() != Some(owner) {
            debug!("Discarding task result for previous identity {}", owner);
            return false;
        }

        self.state.send_modify(|snapshot| {
            if snapshot.owner.as_ref() != Some(owner) {
                *snapshot = TaskSnapshot::owned_by(Some(owner.clone()));
            }
            change(snapshot);
        });
        true
    }

    /// Fetch every task owned by the signed-in identity, newest first.
    /// Signed out, the list is cleared and nothing is requested. On failure
    /// the cached list is kept.
    pub async fn load(&self) -> TaskResult<Vec<Task>> {
        let Some(owner) = self.current_owner() else {
            self.state.send_if_modified(|snapshot| {
                if snapshot.owner.is_none() && snapshot.tasks.is_empty() {
                    return false;
                }
                let loading = snapshot.loading;
                *snapshot = TaskSnapshot::owned_by(None);
                snapshot.loading = loading;
                true
            });
            return Ok(Vec::new());
        };

        let _busy = self.begin();
        let tasks = self
            .table
            .query(&TaskQuery::owned_by(owner.clone()))
            .await
            .map_err(TaskError::fetch)?;

        debug!("Loaded {} tasks for {}", tasks.len(), owner);
        self.apply_for(&owner, |snapshot| {
            snapshot.tasks = tasks.clone();
            snapshot.last_synced_at = Some(Utc::now());
        });
        Ok(tasks)
    }

    /// Create a task owned by the signed-in identity. Status defaults to
    /// todo and priority to medium.
    pub async fn create(&self, input: TaskCreateInput) -> TaskResult<Task> {
        let input = validate_task_create(&input)?;
        let owner = self.require_owner()?;

        let status = input.status.unwrap_or_default();
        let row = NewTaskRow {
            user_id: owner.clone(),
            title: input.title,
            description: input.description,
            status,
            priority: input.priority.unwrap_or_default(),
            due_date: input.due_date,
            tags: input.tags.unwrap_or_default(),
            completed_at: (status == TaskStatus::Completed).then(Utc::now),
        };

        let _busy = self.begin();
        let task = self.table.insert(&row).await.map_err(TaskError::write)?;
        if task.user_id != owner {
            return Err(TaskError::Write(format!(
                "task {} was stored for a different owner",
                task.id
            )));
        }

        info!("Created task {} ({})", task.id, task.title);
        self.apply_for(&owner, |snapshot| snapshot.tasks.insert(0, task.clone()));
        Ok(task)
    }

    /// Change fields of a task owned by the signed-in identity
    pub async fn update(&self, id: &TaskId, input: TaskUpdateInput) -> TaskResult<Task> {
        let input = validate_task_update(&input)?;
        let owner = self.require_owner()?;
        let cached = self.find(id);
        let now = Self::next_update_time(cached.as_ref());

        let completed_at = match (input.status, cached.as_ref().map(|task| task.status)) {
            (Some(TaskStatus::Completed), Some(TaskStatus::Completed)) => None,
            (Some(TaskStatus::Completed), _) => Some(Some(now)),
            (Some(_), _) => Some(None),
            (None, _) => None,
        };
        let patch = TaskPatch {
            title: input.title,
            description: input.description,
            status: input.status,
            priority: input.priority,
            due_date: input.due_date,
            tags: input.tags,
            completed_at,
            updated_at: now,
        };

        let _busy = self.begin();
        let task = self
            .table
            .update(id, &owner, &patch)
            .await
            .map_err(TaskError::write)?
            .ok_or_else(|| TaskError::NotFound(id.clone()))?;

        debug!("Updated task {}", task.id);
        self.apply_for(&owner, |snapshot| {
            if let Some(entry) = snapshot.tasks.iter_mut().find(|entry| entry.id == task.id) {
                *entry = task.clone();
            }
        });
        Ok(task)
    }

    /// Delete a task owned by the signed-in identity
    pub async fn delete(&self, id: &TaskId) -> TaskResult<()> {
        let owner = self.require_owner()?;

        let _busy = self.begin();
        let deleted = self
            .table
            .delete(id, &owner)
            .await
            .map_err(TaskError::write)?;
        if !deleted {
            return Err(TaskError::NotFound(id.clone()));
        }

        info!("Deleted task {}", id);
        self.apply_for(&owner, |snapshot| snapshot.tasks.retain(|task| &task.id != id));
        Ok(())
    }

    /// Flip a task between completed and todo. Cancelled tasks must be
    /// reopened with an explicit status change.
    pub async fn toggle_complete(&self, id: &TaskId) -> TaskResult<Task> {
        self.require_owner()?;
        let task = self.find(id).ok_or_else(|| TaskError::NotFound(id.clone()))?;

        let next = match task.status {
            TaskStatus::Cancelled => {
                return Err(ValidationError::Rejected(
                    "cancelled tasks must be reopened explicitly".to_string(),
                )
                .into())
            }
            TaskStatus::Completed => TaskStatus::Todo,
            TaskStatus::Todo | TaskStatus::InProgress => TaskStatus::Completed,
        };
        self.update(id, TaskUpdateInput::status(next)).await
    }

    /// Strictly after both the creation and the previous update of `task`
    fn next_update_time(task: Option<&Task>) -> DateTime<Utc> {
        let now = Utc::now();
        match task {
            Some(task) => {
                let floor = task.updated_at.max(task.created_at) + Duration::microseconds(1);
                now.max(floor)
            }
            None => now,
        }
    }

    /// Raw feed of snapshots. Compare `owner` with the current identity
    /// before trusting `tasks`; the list is re-owned just after a switch.
    pub fn subscribe(&self) -> watch::Receiver<TaskSnapshot> {
        self.state.subscribe()
    }

    /// Run `view` over the snapshot if it belongs to the signed-in identity,
    /// otherwise over an empty one. The follower may not have cleared the
    /// list yet right after a sign-out or switch.
    fn read<R>(&self, view: impl FnOnce(&TaskSnapshot) -> R) -> R {
        let owner = self.current_owner();
        let snapshot = self.state.borrow();
        if snapshot.owner == owner {
            return view(&snapshot);
        }

        let mut pending = TaskSnapshot::owned_by(owner);
        pending.loading = snapshot.loading;
        drop(snapshot);
        view(&pending)
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        self.read(TaskSnapshot::clone)
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.read(|snapshot| snapshot.tasks.clone())
    }

    pub fn find(&self, id: &TaskId) -> Option<Task> {
        self.read(|snapshot| snapshot.find(id).cloned())
    }

    pub fn active_tasks(&self) -> Vec<Task> {
        self.read(TaskSnapshot::active_tasks)
    }

    pub fn completed_tasks(&self) -> Vec<Task> {
        self.read(TaskSnapshot::completed_tasks)
    }

    pub fn tasks_by_status(&self, status: TaskStatus) -> Vec<Task> {
        self.read(|snapshot| snapshot.tasks_by_status(status))
    }

    pub fn loading(&self) -> bool {
        self.state.borrow().loading
    }
}

impl Drop for TaskStore {
    fn drop(&mut self) {
        if let Ok(mut follower) = self.follower.lock() {
            if let Some(handle) = follower.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use taskmaster_core::TaskPriority;

    fn task(id: &str, status: TaskStatus) -> Task {
        let created_at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        Task {
            id: TaskId::new(id),
            user_id: UserId::new("owner"),
            title: id.to_string(),
            description: None,
            status,
            priority: TaskPriority::Medium,
            due_date: None,
            tags: Vec::new(),
            created_at,
            updated_at: created_at,
            completed_at: None,
        }
    }

    fn snapshot() -> TaskSnapshot {
        TaskSnapshot {
            owner: Some(UserId::new("owner")),
            tasks: vec![
                task("a", TaskStatus::Todo),
                task("b", TaskStatus::InProgress),
                task("c", TaskStatus::Completed),
                task("d", TaskStatus::Cancelled),
            ],
            loading: false,
            last_synced_at: None,
        }
    }

    fn ids(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|task| task.id.as_str()).collect()
    }

    #[test]
    fn test_active_tasks_excludes_completed_and_cancelled() {
        assert_eq!(ids(&snapshot().active_tasks()), vec!["a", "b"]);
    }

    #[test]
    fn test_completed_tasks() {
        assert_eq!(ids(&snapshot().completed_tasks()), vec!["c"]);
    }

    #[test]
    fn test_tasks_by_status() {
        assert_eq!(ids(&snapshot().tasks_by_status(TaskStatus::Cancelled)), vec!["d"]);
        assert!(TaskSnapshot::default().tasks_by_status(TaskStatus::Todo).is_empty());
    }

    #[test]
    fn test_find() {
        let snapshot = snapshot();
        assert_eq!(snapshot.find(&TaskId::new("b")).map(|t| t.status), Some(TaskStatus::InProgress));
        assert!(snapshot.find(&TaskId::new("zzz")).is_none());
    }

    #[test]
    fn test_next_update_time_is_after_previous_timestamps() {
        let mut cached = task("a", TaskStatus::Todo);
        cached.created_at = Utc::now() + Duration::hours(1);
        cached.updated_at = cached.created_at;

        let next = TaskStore::next_update_time(Some(&cached));
        assert!(next > cached.created_at);
        assert!(next > cached.updated_at);
    }
}
