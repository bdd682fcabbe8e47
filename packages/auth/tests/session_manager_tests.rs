// ABOUTME: Integration tests for the session manager against the in-memory auth service
// ABOUTME: Covers sign-in/up/out flows, redirects, out-of-band changes, and the loading flag

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use taskmaster_auth::{
    AuthError, AuthResult, AuthService, AuthState, InMemoryAuthService, OAuthProvider,
    SessionChange, SessionManager, SignUpOutcome,
};
use taskmaster_core::{ProfileFields, Session};
use tokio::sync::{broadcast, watch};
use tokio::time::{sleep, timeout};

async fn wait_until<F>(rx: &mut watch::Receiver<AuthState>, predicate: F) -> AuthState
where
    F: FnMut(&AuthState) -> bool,
{
    timeout(Duration::from_secs(2), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for auth state")
        .expect("session manager dropped")
        .clone()
}

async fn setup() -> (Arc<InMemoryAuthService>, Arc<SessionManager>) {
    let service = Arc::new(InMemoryAuthService::new());
    service.register("ada@example.com", "correct-horse", Some("Ada"));
    let manager = SessionManager::start(service.clone()).await;
    (service, manager)
}

#[tokio::test]
async fn test_starts_anonymous_without_session() {
    let (_service, manager) = setup().await;
    assert_eq!(manager.state(), AuthState::Anonymous);
    assert!(!manager.loading());
}

#[tokio::test]
async fn test_sign_in_and_out() {
    let (service, manager) = setup().await;

    let session = manager
        .sign_in("ada@example.com", "correct-horse")
        .await
        .unwrap();
    assert_eq!(session.user.name.as_deref(), Some("Ada"));
    assert_eq!(manager.identity(), Some(session.user.clone()));
    assert_eq!(manager.session(), Some(session));

    manager.sign_out().await.unwrap();
    assert_eq!(manager.state(), AuthState::Anonymous);
    assert!(service.current_session().is_none());
}

#[tokio::test]
async fn test_late_sign_in_notification_does_not_undo_sign_out() {
    let (_service, manager) = setup().await;

    // Both calls finish before the change feed is read.
    manager
        .sign_in("ada@example.com", "correct-horse")
        .await
        .unwrap();
    manager.sign_out().await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(manager.state(), AuthState::Anonymous);
    assert!(manager.identity().is_none());
}

#[tokio::test]
async fn test_retry_after_rejected_credentials() {
    let (_service, manager) = setup().await;

    let err = manager
        .sign_in("ada@example.com", "wrong")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
    assert!(!manager.is_authenticated());

    manager
        .sign_in("ada@example.com", "correct-horse")
        .await
        .unwrap();
    assert!(manager.is_authenticated());
}

#[tokio::test]
async fn test_restores_existing_session_on_start() {
    let service = Arc::new(InMemoryAuthService::new());
    service.register("ada@example.com", "correct-horse", None);
    let first = SessionManager::start(service.clone()).await;
    first
        .sign_in("ada@example.com", "correct-horse")
        .await
        .unwrap();

    let second = SessionManager::start(service.clone()).await;
    assert_eq!(second.identity(), first.identity());
}

#[tokio::test]
async fn test_sign_up_with_confirmation_required() {
    let service = Arc::new(InMemoryAuthService::with_email_confirmation());
    let manager = SessionManager::start(service.clone()).await;

    let outcome = manager
        .sign_up("grace@example.com", "hopper123", "Grace")
        .await
        .unwrap();
    assert_eq!(
        outcome,
        SignUpOutcome::PendingVerification {
            email: "grace@example.com".to_string()
        }
    );
    assert!(!manager.is_authenticated());

    let err = manager
        .sign_in("grace@example.com", "hopper123")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Rejected(_)));

    assert!(service.confirm_email("grace@example.com"));
    let session = manager
        .sign_in("grace@example.com", "hopper123")
        .await
        .unwrap();
    assert_eq!(session.user.name.as_deref(), Some("Grace"));
}

#[tokio::test]
async fn test_sign_up_without_confirmation_signs_in() {
    let (_service, manager) = setup().await;

    let outcome = manager
        .sign_up("grace@example.com", "hopper123", "Grace")
        .await
        .unwrap();
    assert!(matches!(outcome, SignUpOutcome::SignedIn(_)));
    assert!(manager.is_authenticated());
}

#[tokio::test]
async fn test_duplicate_sign_up_rejected() {
    let (_service, manager) = setup().await;

    let err = manager
        .sign_up("ada@example.com", "another-pass", "Ada")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AccountExists(_)));
    assert!(!manager.is_authenticated());
}

#[tokio::test]
async fn test_out_of_band_expiry_is_reflected() {
    let (service, manager) = setup().await;
    manager
        .sign_in("ada@example.com", "correct-horse")
        .await
        .unwrap();

    let mut rx = manager.subscribe();
    service.expire_session();

    wait_until(&mut rx, |state| *state == AuthState::Anonymous).await;
    assert!(manager.identity().is_none());
}

#[tokio::test]
async fn test_token_refresh_keeps_identity() {
    let (service, manager) = setup().await;
    let original = manager
        .sign_in("ada@example.com", "correct-horse")
        .await
        .unwrap();

    let mut rx = manager.subscribe();
    let refreshed = service.refresh_session().unwrap();

    let state = wait_until(&mut rx, |state| {
        state.session().map(|s| s.access_token.as_str()) == Some(refreshed.access_token.as_str())
    })
    .await;
    assert_eq!(state.identity(), Some(&original.user));
}

#[tokio::test]
async fn test_redirect_completion_arrives_through_notifications() {
    let (service, manager) = setup().await;

    manager
        .sign_in_with_provider(OAuthProvider::Google)
        .await
        .unwrap();
    assert!(!manager.is_authenticated());

    let mut rx = manager.subscribe();
    service.complete_redirect("lin@gmail.com").unwrap();

    let state = wait_until(&mut rx, AuthState::is_authenticated).await;
    assert_eq!(
        state.identity().unwrap().email.as_deref(),
        Some("lin@gmail.com")
    );
}

#[tokio::test]
async fn test_reset_password_succeeds_for_any_address() {
    let (service, manager) = setup().await;

    manager.reset_password("ada@example.com").await.unwrap();
    manager.reset_password("ghost@example.com").await.unwrap();

    assert_eq!(service.password_resets(), vec!["ada@example.com".to_string()]);
}

#[tokio::test]
async fn test_sign_out_while_unreachable_still_clears() {
    let (service, manager) = setup().await;
    manager
        .sign_in("ada@example.com", "correct-horse")
        .await
        .unwrap();

    service.set_unreachable(true);
    let err = manager.sign_out().await.unwrap_err();
    assert!(err.is_network_error());
    assert_eq!(manager.state(), AuthState::Anonymous);
}

#[tokio::test]
async fn test_update_profile() {
    let (_service, manager) = setup().await;
    manager
        .sign_in("ada@example.com", "correct-horse")
        .await
        .unwrap();

    let identity = manager
        .update_profile(ProfileFields::with_name("Ada Lovelace"))
        .await
        .unwrap();
    assert_eq!(identity.name.as_deref(), Some("Ada Lovelace"));
    assert_eq!(
        manager.identity().unwrap().name.as_deref(),
        Some("Ada Lovelace")
    );
}

/// Announces sign-in and sign-out before the call returns, then keeps the
/// caller waiting, as a hosted service does while its request completes.
struct SlowToReturn {
    inner: Arc<InMemoryAuthService>,
}

impl SlowToReturn {
    async fn settle() {
        sleep(Duration::from_millis(20)).await;
    }
}

#[async_trait]
impl AuthService for SlowToReturn {
    async fn get_session(&self) -> AuthResult<Option<Session>> {
        self.inner.get_session().await
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.inner.subscribe()
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session> {
        let session = self.inner.sign_in_with_password(email, password).await;
        Self::settle().await;
        session
    }

    async fn sign_up_with_password(
        &self,
        email: &str,
        password: &str,
        profile: &ProfileFields,
    ) -> AuthResult<SignUpOutcome> {
        self.inner
            .sign_up_with_password(email, password, profile)
            .await
    }

    async fn sign_in_with_oauth_redirect(&self, provider: OAuthProvider) -> AuthResult<()> {
        self.inner.sign_in_with_oauth_redirect(provider).await
    }

    async fn sign_out(&self) -> AuthResult<()> {
        let result = self.inner.sign_out().await;
        Self::settle().await;
        result
    }

    async fn send_password_reset(&self, email: &str) -> AuthResult<()> {
        self.inner.send_password_reset(email).await
    }

    async fn update_profile(&self, profile: &ProfileFields) -> AuthResult<Session> {
        self.inner.update_profile(profile).await
    }
}

#[tokio::test]
async fn test_out_of_band_sign_out_after_announced_calls() {
    let inner = Arc::new(InMemoryAuthService::new());
    inner.register("ada@example.com", "correct-horse", Some("Ada"));
    let manager = SessionManager::start(Arc::new(SlowToReturn {
        inner: inner.clone(),
    }))
    .await;

    manager
        .sign_in("ada@example.com", "correct-horse")
        .await
        .unwrap();
    manager.sign_out().await.unwrap();
    manager
        .sign_in("ada@example.com", "correct-horse")
        .await
        .unwrap();
    assert!(manager.is_authenticated());

    let mut rx = manager.subscribe();
    inner.expire_session();

    wait_until(&mut rx, |state| *state == AuthState::Anonymous).await;
    assert!(inner.current_session().is_none());
    assert!(manager.identity().is_none());
}

#[tokio::test]
async fn test_announced_sign_out_is_not_undone_by_earlier_notifications() {
    let inner = Arc::new(InMemoryAuthService::new());
    inner.register("ada@example.com", "correct-horse", Some("Ada"));
    let manager = SessionManager::start(Arc::new(SlowToReturn {
        inner: inner.clone(),
    }))
    .await;

    manager
        .sign_in("ada@example.com", "correct-horse")
        .await
        .unwrap();
    manager.sign_out().await.unwrap();

    sleep(Duration::from_millis(50)).await;
    assert_eq!(manager.state(), AuthState::Anonymous);
    assert!(inner.current_session().is_none());
}
