//! Auth service implementation over the hosted auth endpoints

use async_trait::async_trait;
use reqwest::Method;
use taskmaster_auth::{
    AuthError, AuthResult, AuthService, CallbackServer, OAuthProvider, PkceChallenge,
    SessionChange, SignUpOutcome,
};
use taskmaster_core::{ProfileFields, Session};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::api::{
    PasswordGrant, PkceGrant, RecoverRequest, SignUpRequest, SignUpResponse, TokenResponse,
    UpdateUserRequest, User,
};
use crate::client::SupabaseClient;
use crate::error::{CloudError, CloudResult};

impl SupabaseClient {
    /// Persist a freshly issued session and announce it
    async fn establish(&self, session: Session) -> AuthResult<Session> {
        self.store_session(Some(session.clone())).await?;
        self.emit(SessionChange::signed_in(session.clone()));
        Ok(session)
    }

    /// URL the browser is sent to for a provider sign-in
    pub fn authorize_url(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
        pkce: &PkceChallenge,
    ) -> String {
        format!(
            "{}?provider={}&redirect_to={}&scopes={}&code_challenge={}&code_challenge_method={}",
            self.auth_url("authorize"),
            provider.as_str(),
            urlencoding::encode(redirect_to),
            urlencoding::encode(&provider.scopes().join(" ")),
            pkce.code_challenge,
            pkce.code_challenge_method,
        )
    }

    /// Trade the code from a provider redirect for a session
    pub async fn exchange_code(&self, auth_code: &str, code_verifier: &str) -> CloudResult<Session> {
        let request = self
            .request(Method::POST, &self.auth_url("token?grant_type=pkce"), None)
            .json(&PkceGrant {
                auth_code,
                code_verifier,
            });
        Ok(Self::send_json::<TokenResponse>(request)
            .await?
            .into_session())
    }

    async fn complete_redirect(
        &self,
        server: CallbackServer,
        pkce: PkceChallenge,
    ) -> AuthResult<Session> {
        let params = server.wait_for_callback(None).await?;
        let session = self
            .exchange_code(&params.code, &pkce.code_verifier)
            .await?;
        self.establish(session).await
    }
}

#[async_trait]
impl AuthService for SupabaseClient {
    async fn get_session(&self) -> AuthResult<Option<Session>> {
        if let Some(session) = self.current_session().await {
            return Ok(Some(session));
        }

        let Some(saved) = self.read_session_file().await? else {
            return Ok(None);
        };
        if !saved.is_expired() {
            debug!("Restored session for {}", saved.user_id());
            self.store_session(Some(saved.clone())).await?;
            return Ok(Some(saved));
        }

        debug!("Saved session expired, refreshing");
        match self.refresh(&saved).await {
            Ok(session) => Ok(Some(session)),
            Err(e) if e.is_network_error() => Err(e.into()),
            Err(e) => {
                warn!("Could not refresh saved session: {}", e);
                self.store_session(None).await?;
                Ok(None)
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.events.subscribe()
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session> {
        let request = self
            .request(
                Method::POST,
                &self.auth_url("token?grant_type=password"),
                None,
            )
            .json(&PasswordGrant { email, password });
        let session = Self::send_json::<TokenResponse>(request)
            .await?
            .into_session();

        info!("Signed in as {}", session.user.display_name());
        self.establish(session).await
    }

    async fn sign_up_with_password(
        &self,
        email: &str,
        password: &str,
        profile: &ProfileFields,
    ) -> AuthResult<SignUpOutcome> {
        let request = self
            .request(Method::POST, &self.auth_url("signup"), None)
            .json(&SignUpRequest {
                email,
                password,
                data: profile,
            });
        let response = Self::send_json::<SignUpResponse>(request)
            .await
            .map_err(|e| match AuthError::from(e) {
                AuthError::AccountExists(_) => AuthError::AccountExists(email.to_string()),
                other => other,
            })?;

        match response {
            SignUpResponse::Session(token) => {
                let session = self.establish(token.into_session()).await?;
                Ok(SignUpOutcome::SignedIn(session))
            }
            SignUpResponse::User(user) => {
                info!("Sign-up for {} awaits email confirmation", email);
                Ok(SignUpOutcome::PendingVerification {
                    email: user.email.unwrap_or_else(|| email.to_string()),
                })
            }
        }
    }

    async fn sign_in_with_oauth_redirect(&self, provider: OAuthProvider) -> AuthResult<()> {
        let pkce = PkceChallenge::generate()?;
        let server = CallbackServer::bind(self.callback_port).await?;
        let url = self.authorize_url(provider, &server.callback_url(), &pkce);

        info!("Opening browser for {} sign-in", provider);
        open::that(&url).map_err(|e| AuthError::BrowserOpen(e.to_string()))?;

        let client = self.clone();
        tokio::spawn(async move {
            if let Err(e) = client.complete_redirect(server, pkce).await {
                error!("{} sign-in did not complete: {}", provider, e);
            }
        });
        Ok(())
    }

    async fn sign_out(&self) -> AuthResult<()> {
        let token = self.current_session().await.map(|s| s.access_token);
        // The local session goes regardless of what the server says.
        self.store_session(None).await?;
        self.emit(SessionChange::signed_out());

        let Some(token) = token else {
            return Ok(());
        };
        let request = self.request(Method::POST, &self.auth_url("logout"), Some(&token));
        match Self::check(request.send().await.map_err(CloudError::from)?).await {
            Ok(_) => Ok(()),
            // Already revoked counts as signed out.
            Err(CloudError::Api { status: 401 | 403 | 404, .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn send_password_reset(&self, email: &str) -> AuthResult<()> {
        let request = self
            .request(Method::POST, &self.auth_url("recover"), None)
            .json(&RecoverRequest { email });
        Self::check(request.send().await.map_err(CloudError::from)?).await?;
        Ok(())
    }

    async fn update_profile(&self, profile: &ProfileFields) -> AuthResult<Session> {
        let token = self.access_token().await?;
        let request = self
            .request(Method::PUT, &self.auth_url("user"), Some(&token))
            .json(&UpdateUserRequest { data: profile });
        let user = Self::send_json::<User>(request).await?;

        let mut session = self
            .current_session()
            .await
            .ok_or(AuthError::NotAuthenticated)?;
        session.user = user.into();
        self.store_session(Some(session.clone())).await?;
        self.emit(SessionChange::user_updated(session.clone()));
        Ok(session)
    }
}
