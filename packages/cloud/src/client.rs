//! HTTP client for the hosted backend: shared session state, request
//! plumbing, and the session file

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use taskmaster_auth::SessionChange;
use taskmaster_config::BackendConfig;
use taskmaster_core::Session;
use tokio::fs;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, warn};

use crate::api::{ErrorBody, RefreshGrant, TokenResponse};
use crate::error::{CloudError, CloudResult};

const EVENT_CHANNEL_SIZE: usize = 32;

/// Client for one Supabase project. Cheap to clone; clones share the
/// session and the change feed.
#[derive(Clone)]
pub struct SupabaseClient {
    pub(crate) http: Client,
    base_url: String,
    anon_key: String,
    pub(crate) tasks_table: String,
    pub(crate) callback_port: u16,
    session_file: Option<PathBuf>,
    session: Arc<RwLock<Option<Session>>>,
    refresh_lock: Arc<Mutex<()>>,
    pub(crate) events: broadcast::Sender<SessionChange>,
}

impl SupabaseClient {
    pub fn new(config: &BackendConfig) -> CloudResult<Self> {
        config
            .validate()
            .map_err(|e| CloudError::config(e.to_string()))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CloudError::Network(e.to_string()))?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        Ok(Self {
            http,
            base_url: config.base_url().to_string(),
            anon_key: config.anon_key.clone(),
            tasks_table: config.tasks_table.clone(),
            callback_port: config.oauth_callback_port,
            session_file: config.session_file.clone(),
            session: Arc::new(RwLock::new(None)),
            refresh_lock: Arc::new(Mutex::new(())),
            events,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    pub(crate) fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Request carrying the project key, authorized as `bearer` or anonymously
    pub(crate) fn request(&self, method: Method, url: &str, bearer: Option<&str>) -> RequestBuilder {
        let token = bearer.unwrap_or(&self.anon_key);
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", token))
    }

    /// Turn a non-success response into a `CloudError`
    pub(crate) async fn check(response: Response) -> CloudResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let body = ErrorBody::parse(&text);
        debug!("Request failed with {}: {}", status, body.message());
        Err(CloudError::api(status.as_u16(), body))
    }

    pub(crate) async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> CloudResult<T> {
        let response = Self::check(request.send().await?).await?;
        Ok(response.json::<T>().await?)
    }

    pub(crate) fn emit(&self, change: SessionChange) {
        debug!("Session change: {:?}", change.event);
        // Nobody listening is fine.
        let _ = self.events.send(change);
    }

    pub async fn current_session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    /// Replace the session in memory and on disk
    pub(crate) async fn store_session(&self, session: Option<Session>) -> CloudResult<()> {
        *self.session.write().await = session.clone();

        let Some(path) = &self.session_file else {
            return Ok(());
        };
        match session {
            Some(session) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).await?;
                }
                let content = toml::to_string_pretty(&session)
                    .map_err(|e| CloudError::Serialization(e.to_string()))?;
                fs::write(path, content).await?;
                restrict_permissions(path).await;
            }
            None => match fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }
        Ok(())
    }

    /// Session saved by a previous run, if any
    pub(crate) async fn read_session_file(&self) -> CloudResult<Option<Session>> {
        let Some(path) = &self.session_file else {
            return Ok(None);
        };
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match toml::from_str::<Session>(&content) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!("Ignoring unreadable session file {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    /// Exchange the refresh token for a new session and announce it
    pub(crate) async fn refresh(&self, expired: &Session) -> CloudResult<Session> {
        let refresh_token = expired
            .refresh_token
            .as_deref()
            .ok_or(CloudError::TokenExpired)?;

        let request = self
            .request(
                Method::POST,
                &self.auth_url("token?grant_type=refresh_token"),
                None,
            )
            .json(&RefreshGrant { refresh_token });
        let session = Self::send_json::<TokenResponse>(request)
            .await?
            .into_session();

        self.store_session(Some(session.clone())).await?;
        self.emit(SessionChange::token_refreshed(session.clone()));
        Ok(session)
    }

    /// Access token for a data request, refreshing it first when expired.
    /// A refresh the server refuses ends the session.
    pub(crate) async fn access_token(&self) -> CloudResult<String> {
        let _guard = self.refresh_lock.lock().await;

        let session = self
            .current_session()
            .await
            .ok_or(CloudError::NotAuthenticated)?;
        if !session.is_expired() {
            return Ok(session.access_token);
        }

        debug!("Access token expired, refreshing");
        match self.refresh(&session).await {
            Ok(session) => Ok(session.access_token),
            Err(e) if e.is_network_error() => Err(e),
            Err(e) => {
                warn!("Token refresh rejected, signing out: {}", e);
                self.store_session(None).await?;
                self.emit(SessionChange::signed_out());
                Err(CloudError::TokenExpired)
            }
        }
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await {
        warn!("Could not restrict permissions on {}: {}", path.display(), e);
    }
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &std::path::Path) {}
