// ABOUTME: Wires the session manager and task store to a backend for one CLI run
// ABOUTME: Also sets up logging and resolves short task ids typed by the user

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use taskmaster_auth::{AuthService, SessionManager};
use taskmaster_cloud::SupabaseClient;
use taskmaster_config::BackendConfig;
use taskmaster_core::{Identity, Task, TaskId};
use taskmaster_tasks::{TableStore, TaskStore};
use tracing::debug;

/// Log level used when `RUST_LOG` is unset
const DEFAULT_LOG_FILTER: &str = "warn";

/// Shortest id prefix accepted on the command line
pub const MIN_ID_PREFIX: usize = 4;

/// Send logs to stderr, filtered by `RUST_LOG`
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

pub struct App {
    pub sessions: Arc<SessionManager>,
    pub tasks: Arc<TaskStore>,
}

impl App {
    /// Connect to the configured hosted backend and restore any saved session
    pub async fn connect(config: &BackendConfig) -> Result<Self> {
        let client = Arc::new(
            SupabaseClient::new(config).context("Could not set up the backend client")?,
        );
        debug!("Using backend at {}", client.base_url());
        Ok(Self::start(client.clone(), client).await)
    }

    pub async fn start(auth: Arc<dyn AuthService>, table: Arc<dyn TableStore>) -> Self {
        let sessions = SessionManager::start(auth).await;
        let tasks = TaskStore::start(table, &sessions);
        Self { sessions, tasks }
    }

    pub fn require_identity(&self) -> Result<Identity> {
        self.sessions
            .identity()
            .ok_or_else(|| anyhow!("Not signed in. Run `taskmaster auth login` first."))
    }

    /// Load the signed-in user's tasks, failing when signed out
    pub async fn load_tasks(&self) -> Result<Vec<Task>> {
        self.require_identity()?;
        Ok(self.tasks.load().await?)
    }

    /// Resolve a full id or a unique prefix of one among the loaded tasks
    pub fn resolve_id(&self, input: &str) -> Result<TaskId> {
        resolve_id(&self.tasks.tasks(), input)
    }
}

pub fn resolve_id(tasks: &[Task], input: &str) -> Result<TaskId> {
    let input = input.trim();
    if let Some(task) = tasks.iter().find(|task| task.id.as_str() == input) {
        return Ok(task.id.clone());
    }
    if input.len() < MIN_ID_PREFIX {
        bail!("Task id '{}' is too short; give at least {} characters", input, MIN_ID_PREFIX);
    }

    let matches: Vec<&Task> = tasks
        .iter()
        .filter(|task| task.id.as_str().starts_with(input))
        .collect();
    match matches.as_slice() {
        [task] => Ok(task.id.clone()),
        [] => bail!("No task matches '{}'", input),
        _ => bail!("'{}' matches {} tasks; give more of the id", input, matches.len()),
    }
}
