// ABOUTME: Task Master authentication library
// ABOUTME: Session manager, auth service boundary, in-memory service, and redirect sign-in helpers

pub mod error;
pub mod memory;
pub mod oauth;
pub mod service;
pub mod session;

// Re-export main types
pub use error::{AuthError, AuthResult};
pub use memory::InMemoryAuthService;
pub use oauth::{CallbackParams, CallbackServer, OAuthProvider, PkceChallenge};
pub use service::{AuthService, SessionChange, SessionEvent, SignUpOutcome};
pub use session::{AuthState, SessionManager};
