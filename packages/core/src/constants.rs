use std::env;
use std::path::PathBuf;

/// Name of the hosted table holding task rows
pub const TASKS_TABLE: &str = "tasks";

pub const MAX_TITLE_LENGTH: usize = 200;
pub const MAX_DESCRIPTION_LENGTH: usize = 5000;
pub const MAX_TAGS_PER_TASK: usize = 20;
pub const MAX_TAG_LENGTH: usize = 50;

/// Get the path to the Task Master directory (~/.taskmaster)
pub fn taskmaster_dir() -> PathBuf {
    // First try HOME environment variable (useful for tests)
    if let Ok(home) = env::var("HOME") {
        PathBuf::from(home).join(".taskmaster")
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".taskmaster")
    }
}

/// Get the path to the persisted session file (~/.taskmaster/session.toml)
pub fn session_file() -> PathBuf {
    taskmaster_dir().join("session.toml")
}
