// ABOUTME: Session manager owning the current authentication state
// ABOUTME: Single caller of the auth service; republishes session changes to the application

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use taskmaster_core::{validate_email, Identity, ProfileFields, Session};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{AuthError, AuthResult};
use crate::oauth::OAuthProvider;
use crate::service::{next_sequence, AuthService, SessionChange, SignUpOutcome};

/// Who is logged in. The identity is always read from the session, so the
/// two are set and cleared together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Initializing,
    Authenticated(Session),
    Anonymous,
}

impl AuthState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthState::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.session().map(Session::identity)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated(_))
    }

    pub fn is_initializing(&self) -> bool {
        matches!(self, AuthState::Initializing)
    }
}

impl From<Option<Session>> for AuthState {
    fn from(session: Option<Session>) -> Self {
        match session {
            Some(session) => AuthState::Authenticated(session),
            None => AuthState::Anonymous,
        }
    }
}

/// Decrements the in-flight counter when an operation finishes, including on error
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct SessionManager {
    service: Arc<dyn AuthService>,
    state: watch::Sender<AuthState>,
    in_flight: AtomicUsize,
    /// Sequence stamped when the latest call result was applied. Change
    /// notifications created before it are superseded by that result.
    applied_through: AtomicU64,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Create the manager in `Initializing` and spawn the task that restores
    /// the existing session and then follows the service's change feed.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(service: Arc<dyn AuthService>) -> Arc<Self> {
        // Subscribe before restoring so no change between the two is lost.
        let changes = service.subscribe();
        let (state, _) = watch::channel(AuthState::Initializing);

        let manager = Arc::new(Self {
            service,
            state,
            in_flight: AtomicUsize::new(0),
            applied_through: AtomicU64::new(0),
            driver: Mutex::new(None),
        });

        let handle = tokio::spawn(Self::drive(Arc::downgrade(&manager), changes));
        if let Ok(mut driver) = manager.driver.lock() {
            *driver = Some(handle);
        }

        manager
    }

    /// Create the manager and wait until the restored session is known
    pub async fn start(service: Arc<dyn AuthService>) -> Arc<Self> {
        let manager = Self::new(service);
        manager.ready().await;
        manager
    }

    async fn drive(manager: Weak<Self>, mut changes: broadcast::Receiver<SessionChange>) {
        let service = match manager.upgrade() {
            Some(manager) => manager.service.clone(),
            None => return,
        };

        let restored = match service.get_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!("Could not restore session: {}", e);
                None
            }
        };
        match manager.upgrade() {
            Some(manager) => manager.set_session(restored, "restored"),
            None => return,
        }

        loop {
            match changes.recv().await {
                Ok(change) => {
                    let Some(manager) = manager.upgrade() else {
                        break;
                    };
                    manager.apply_notification(change);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "Missed {} session changes, re-reading session from auth service",
                        skipped
                    );
                    let session = service.get_session().await.unwrap_or_else(|e| {
                        warn!("Could not re-read session: {}", e);
                        None
                    });
                    let Some(manager) = manager.upgrade() else {
                        break;
                    };
                    manager.set_session(session, "resync");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Auth service change feed closed");
                    break;
                }
            }
        }
    }

    /// Wait until the initial session restore has resolved
    pub async fn ready(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| !state.is_initializing()).await;
    }

    fn set_session(&self, session: Option<Session>, cause: &str) {
        let next = AuthState::from(session);
        self.state
            .send_if_modified(|current| Self::transition(current, next, cause));
    }

    /// Apply the session returned by a call this manager made. Notifications
    /// the service created before this point, the call's own included, are
    /// older than the result and will be skipped.
    fn apply_result(&self, session: Option<Session>, cause: &str) {
        let next = AuthState::from(session);
        self.state.send_if_modified(|current| {
            self.applied_through
                .fetch_max(next_sequence(), Ordering::SeqCst);
            Self::transition(current, next, cause)
        });
    }

    fn apply_notification(&self, change: SessionChange) {
        self.state.send_if_modified(|current| {
            if change.sequence < self.applied_through.load(Ordering::SeqCst) {
                debug!("Session change {:?} superseded by a call result", change.event);
                return false;
            }
            debug!("Session change from auth service: {:?}", change.event);
            let next = AuthState::from(change.session);
            Self::transition(current, next, "auth service notification")
        });
    }

    fn transition(current: &mut AuthState, next: AuthState, cause: &str) -> bool {
        if *current == next {
            return false;
        }

        let previous_id = current.identity().map(|identity| &identity.id);
        match (previous_id, next.identity()) {
            (previous, Some(identity)) if previous != Some(&identity.id) => {
                info!("Signed in as {} ({})", identity.display_name(), cause)
            }
            (Some(_), None) => info!("Signed out ({})", cause),
            (None, None) => debug!("No active session ({})", cause),
            _ => debug!("Session refreshed ({})", cause),
        }

        *current = next;
        true
    }

    fn begin(&self) -> InFlight<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlight(&self.in_flight)
    }

    /// Sign in with email and password
    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Session> {
        let email = validate_email(email)?;
        let _in_flight = self.begin();

        let session = self
            .service
            .sign_in_with_password(&email, password)
            .await
            .inspect_err(|e| warn!("Sign-in failed: {}", e))?;

        self.apply_result(Some(session.clone()), "sign-in");
        Ok(session)
    }

    /// Register a new account. The service may require the address to be
    /// confirmed first, in which case the state stays anonymous.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> AuthResult<SignUpOutcome> {
        let email = validate_email(email)?;
        let display_name = display_name.trim();
        let profile = if display_name.is_empty() {
            ProfileFields::default()
        } else {
            ProfileFields::with_name(display_name)
        };
        let _in_flight = self.begin();

        let outcome = self
            .service
            .sign_up_with_password(&email, password, &profile)
            .await
            .inspect_err(|e| warn!("Sign-up failed: {}", e))?;

        match &outcome {
            SignUpOutcome::SignedIn(session) => {
                self.apply_result(Some(session.clone()), "sign-up");
            }
            SignUpOutcome::PendingVerification { email } => {
                info!("Sign-up for {} is waiting for email confirmation", email);
            }
        }
        Ok(outcome)
    }

    /// Start a redirect sign-in. The resulting session arrives through the
    /// service's change feed, not through this call.
    pub async fn sign_in_with_provider(&self, provider: OAuthProvider) -> AuthResult<()> {
        let _in_flight = self.begin();
        info!("Starting {} sign-in", provider);
        self.service
            .sign_in_with_oauth_redirect(provider)
            .await
            .inspect_err(|e| warn!("Could not start {} sign-in: {}", provider, e))
    }

    /// Sign out. The local state becomes anonymous even when the remote
    /// call fails; the remote error is still returned to the caller.
    pub async fn sign_out(&self) -> AuthResult<()> {
        let _in_flight = self.begin();
        let result = self.service.sign_out().await;

        if let Err(e) = &result {
            warn!("Remote sign-out failed, local session cleared anyway: {}", e);
        }
        self.apply_result(None, "sign-out");
        result
    }

    /// Request a password reset email. Succeeds whether or not an account
    /// exists for the address.
    pub async fn reset_password(&self, email: &str) -> AuthResult<()> {
        let email = validate_email(email)?;
        let _in_flight = self.begin();

        match self.service.send_password_reset(&email).await {
            Ok(()) | Err(AuthError::AccountNotFound) => {
                info!("Password reset requested");
                Ok(())
            }
            Err(e) => {
                warn!("Password reset failed: {}", e);
                Err(e)
            }
        }
    }

    /// Update display attributes of the signed-in user
    pub async fn update_profile(&self, profile: ProfileFields) -> AuthResult<Identity> {
        if !self.is_authenticated() {
            return Err(AuthError::NotAuthenticated);
        }
        let _in_flight = self.begin();

        let session = self.service.update_profile(&profile).await?;
        let identity = session.user.clone();
        self.apply_result(Some(session), "profile update");
        Ok(identity)
    }

    /// Receiver for state transitions; the current state is readable at once
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn session(&self) -> Option<Session> {
        self.state.borrow().session().cloned()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().identity().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// True while initializing or while any operation is in flight
    pub fn loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0 || self.state.borrow().is_initializing()
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Ok(mut driver) = self.driver.lock() {
            if let Some(handle) = driver.take() {
                handle.abort();
            }
        }
    }
}
