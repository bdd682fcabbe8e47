// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names used across Task Master

// Backend Configuration
pub const TASKMASTER_SUPABASE_URL: &str = "TASKMASTER_SUPABASE_URL";
pub const TASKMASTER_SUPABASE_ANON_KEY: &str = "TASKMASTER_SUPABASE_ANON_KEY";
pub const TASKMASTER_TASKS_TABLE: &str = "TASKMASTER_TASKS_TABLE";

// Session Persistence
pub const TASKMASTER_SESSION_FILE: &str = "TASKMASTER_SESSION_FILE";

// OAuth Redirect Configuration
pub const TASKMASTER_OAUTH_CALLBACK_PORT: &str = "TASKMASTER_OAUTH_CALLBACK_PORT";

// HTTP Configuration
pub const TASKMASTER_HTTP_TIMEOUT_SECS: &str = "TASKMASTER_HTTP_TIMEOUT_SECS";

// Config File Location
pub const TASKMASTER_CONFIG: &str = "TASKMASTER_CONFIG";
