// ABOUTME: Boundary trait for the hosted authentication service
// ABOUTME: Defines session change notifications and sign-up outcomes

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use taskmaster_core::{ProfileFields, Session};
use tokio::sync::broadcast;

use crate::error::AuthResult;
use crate::oauth::OAuthProvider;

/// Kind of session change pushed by the auth service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

static SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Next value of the process-wide order of session transitions. Change
/// notifications and results applied by the session manager both draw
/// from it, so either can tell which came first.
pub(crate) fn next_sequence() -> u64 {
    SEQUENCE.fetch_add(1, Ordering::SeqCst)
}

/// A pushed notification: what happened and the session that is now current
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionChange {
    pub event: SessionEvent,
    pub session: Option<Session>,
    /// Stamped when the change is created, before it is sent
    pub sequence: u64,
}

impl SessionChange {
    fn new(event: SessionEvent, session: Option<Session>) -> Self {
        Self {
            event,
            session,
            sequence: next_sequence(),
        }
    }

    pub fn signed_in(session: Session) -> Self {
        Self::new(SessionEvent::SignedIn, Some(session))
    }

    pub fn signed_out() -> Self {
        Self::new(SessionEvent::SignedOut, None)
    }

    pub fn token_refreshed(session: Session) -> Self {
        Self::new(SessionEvent::TokenRefreshed, Some(session))
    }

    pub fn user_updated(session: Session) -> Self {
        Self::new(SessionEvent::UserUpdated, Some(session))
    }
}

/// Result of registering a new account
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// The service issued a session straight away
    SignedIn(Session),
    /// The address must be confirmed before a session is issued
    PendingVerification { email: String },
}

/// The hosted auth service, accessed only through request/response calls
/// and a push feed of session changes.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Restore the session the service already holds, if any
    async fn get_session(&self) -> AuthResult<Option<Session>>;

    /// Subscribe to session changes. Fired at least on sign-in, sign-out,
    /// and token refresh.
    fn subscribe(&self) -> broadcast::Receiver<SessionChange>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session>;

    async fn sign_up_with_password(
        &self,
        email: &str,
        password: &str,
        profile: &ProfileFields,
    ) -> AuthResult<SignUpOutcome>;

    /// Start a redirect flow. Completion arrives through `subscribe`.
    async fn sign_in_with_oauth_redirect(&self, provider: OAuthProvider) -> AuthResult<()>;

    async fn sign_out(&self) -> AuthResult<()>;

    async fn send_password_reset(&self, email: &str) -> AuthResult<()>;

    /// Update display attributes of the signed-in user
    async fn update_profile(&self, profile: &ProfileFields) -> AuthResult<Session>;
}
