// ABOUTME: In-memory auth service for tests and offline runs
// ABOUTME: Simulates accounts, email confirmation, redirects, and out-of-band session changes

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use taskmaster_core::{Identity, ProfileFields, Session, UserId};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{AuthError, AuthResult};
use crate::oauth::OAuthProvider;
use crate::service::{AuthService, SessionChange, SignUpOutcome};

const MIN_PASSWORD_LENGTH: usize = 6;
const EVENT_CHANNEL_SIZE: usize = 64;

#[derive(Debug, Clone)]
struct Account {
    identity: Identity,
    password: Option<String>,
    confirmed: bool,
}

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<String, Account>,
    session: Option<Session>,
    pending_redirect: Option<OAuthProvider>,
    password_resets: Vec<String>,
    unreachable: bool,
}

pub struct InMemoryAuthService {
    state: Mutex<State>,
    events: broadcast::Sender<SessionChange>,
    require_confirmation: bool,
}

impl Default for InMemoryAuthService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuthService {
    /// Accounts are usable immediately after sign-up
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            state: Mutex::new(State::default()),
            events,
            require_confirmation: false,
        }
    }

    /// Sign-ups must be confirmed with [`confirm_email`](Self::confirm_email)
    /// before they can sign in
    pub fn with_email_confirmation() -> Self {
        Self {
            require_confirmation: true,
            ..Self::new()
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panic while holding the lock only happens in a failing test.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, change: SessionChange) {
        debug!("Emitting {:?}", change.event);
        // No subscribers is not an error.
        let _ = self.events.send(change);
    }

    fn issue_session(identity: &Identity) -> Session {
        Session {
            access_token: uuid::Uuid::new_v4().to_string(),
            refresh_token: Some(uuid::Uuid::new_v4().to_string()),
            token_type: "bearer".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
            user: identity.clone(),
        }
    }

    fn check_reachable(state: &State) -> AuthResult<()> {
        if state.unreachable {
            return Err(AuthError::Network("auth service unreachable".to_string()));
        }
        Ok(())
    }

    /// Add a confirmed account and return its identity
    pub fn register(&self, email: &str, password: &str, name: Option<&str>) -> Identity {
        let identity = Identity {
            id: UserId::new(uuid::Uuid::new_v4().to_string()),
            email: Some(email.to_string()),
            name: name.map(str::to_string),
            avatar_url: None,
        };
        self.lock().accounts.insert(
            email.to_string(),
            Account {
                identity: identity.clone(),
                password: Some(password.to_string()),
                confirmed: true,
            },
        );
        identity
    }

    pub fn confirm_email(&self, email: &str) -> bool {
        match self.lock().accounts.get_mut(email) {
            Some(account) => {
                account.confirmed = true;
                true
            }
            None => false,
        }
    }

    /// Make every call fail with a network error until reset
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Drop the current session as if the token had expired or another
    /// tab had signed out
    pub fn expire_session(&self) {
        let had_session = self.lock().session.take().is_some();
        if had_session {
            self.emit(SessionChange::signed_out());
        }
    }

    /// Rotate the access token of the current session
    pub fn refresh_session(&self) -> Option<Session> {
        let session = {
            let mut state = self.lock();
            let identity = state.session.as_ref()?.user.clone();
            let session = Self::issue_session(&identity);
            state.session = Some(session.clone());
            session
        };
        self.emit(SessionChange::token_refreshed(session.clone()));
        Some(session)
    }

    /// Finish a redirect started with `sign_in_with_oauth_redirect`, as the
    /// browser returning from the provider would
    pub fn complete_redirect(&self, email: &str) -> AuthResult<Session> {
        let session = {
            let mut state = self.lock();
            let provider = state
                .pending_redirect
                .take()
                .ok_or_else(|| AuthError::OAuthFailed("No redirect in progress".to_string()))?;

            let account = state
                .accounts
                .entry(email.to_string())
                .or_insert_with(|| Account {
                    identity: Identity {
                        id: UserId::new(format!("{}-{}", provider, uuid::Uuid::new_v4())),
                        email: Some(email.to_string()),
                        name: None,
                        avatar_url: None,
                    },
                    password: None,
                    confirmed: true,
                });
            let session = Self::issue_session(&account.identity);
            state.session = Some(session.clone());
            session
        };

        self.emit(SessionChange::signed_in(session.clone()));
        Ok(session)
    }

    /// Addresses that received a reset email, in order
    pub fn password_resets(&self) -> Vec<String> {
        self.lock().password_resets.clone()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.lock().session.clone()
    }
}

#[async_trait]
impl AuthService for InMemoryAuthService {
    async fn get_session(&self) -> AuthResult<Option<Session>> {
        let state = self.lock();
        Self::check_reachable(&state)?;
        Ok(state.session.clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.events.subscribe()
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session> {
        let session = {
            let mut state = self.lock();
            Self::check_reachable(&state)?;

            let account = state
                .accounts
                .get(email)
                .filter(|account| account.password.as_deref() == Some(password))
                .ok_or(AuthError::InvalidCredentials)?;
            if !account.confirmed {
                return Err(AuthError::Rejected("Email not confirmed".to_string()));
            }

            let session = Self::issue_session(&account.identity);
            state.session = Some(session.clone());
            session
        };

        self.emit(SessionChange::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_up_with_password(
        &self,
        email: &str,
        password: &str,
        profile: &ProfileFields,
    ) -> AuthResult<SignUpOutcome> {
        let session = {
            let mut state = self.lock();
            Self::check_reachable(&state)?;

            if password.chars().count() < MIN_PASSWORD_LENGTH {
                return Err(AuthError::Rejected(format!(
                    "Password should be at least {} characters",
                    MIN_PASSWORD_LENGTH
                )));
            }
            if state.accounts.contains_key(email) {
                return Err(AuthError::AccountExists(email.to_string()));
            }

            let identity = Identity {
                id: UserId::new(uuid::Uuid::new_v4().to_string()),
                email: Some(email.to_string()),
                name: profile.name.clone(),
                avatar_url: profile.avatar_url.clone(),
            };
            state.accounts.insert(
                email.to_string(),
                Account {
                    identity: identity.clone(),
                    password: Some(password.to_string()),
                    confirmed: !self.require_confirmation,
                },
            );

            if self.require_confirmation {
                return Ok(SignUpOutcome::PendingVerification {
                    email: email.to_string(),
                });
            }

            let session = Self::issue_session(&identity);
            state.session = Some(session.clone());
            session
        };

        self.emit(SessionChange::signed_in(session.clone()));
        Ok(SignUpOutcome::SignedIn(session))
    }

    async fn sign_in_with_oauth_redirect(&self, provider: OAuthProvider) -> AuthResult<()> {
        let mut state = self.lock();
        Self::check_reachable(&state)?;
        state.pending_redirect = Some(provider);
        Ok(())
    }

    async fn sign_out(&self) -> AuthResult<()> {
        {
            let mut state = self.lock();
            Self::check_reachable(&state)?;
            state.session = None;
        }
        self.emit(SessionChange::signed_out());
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> AuthResult<()> {
        let mut state = self.lock();
        Self::check_reachable(&state)?;
        if !state.accounts.contains_key(email) {
            return Err(AuthError::AccountNotFound);
        }
        state.password_resets.push(email.to_string());
        Ok(())
    }

    async fn update_profile(&self, profile: &ProfileFields) -> AuthResult<Session> {
        let session = {
            let mut state = self.lock();
            Self::check_reachable(&state)?;

            let mut session = state.session.clone().ok_or(AuthError::NotAuthenticated)?;
            if let Some(name) = &profile.name {
                session.user.name = Some(name.clone());
            }
            if let Some(avatar_url) = &profile.avatar_url {
                session.user.avatar_url = Some(avatar_url.clone());
            }

            let user_id = session.user.id.clone();
            if let Some(account) = state
                .accounts
                .values_mut()
                .find(|account| account.identity.id == user_id)
            {
                account.identity = session.user.clone();
            }
            state.session = Some(session.clone());
            session
        };

        self.emit(SessionChange::user_updated(session.clone()));
        Ok(session)
    }
}
