//! Wire models for the hosted auth (GoTrue) and REST (PostgREST) endpoints

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use taskmaster_core::{Identity, ProfileFields, Session, UserId};

/// `POST /auth/v1/token?grant_type=password`
#[derive(Debug, Serialize)]
pub struct PasswordGrant<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// `POST /auth/v1/token?grant_type=refresh_token`
#[derive(Debug, Serialize)]
pub struct RefreshGrant<'a> {
    pub refresh_token: &'a str,
}

/// `POST /auth/v1/token?grant_type=pkce`
#[derive(Debug, Serialize)]
pub struct PkceGrant<'a> {
    pub auth_code: &'a str,
    pub code_verifier: &'a str,
}

/// `POST /auth/v1/signup`
#[derive(Debug, Serialize)]
pub struct SignUpRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    /// Stored as the user's metadata
    pub data: &'a ProfileFields,
}

/// `POST /auth/v1/recover`
#[derive(Debug, Serialize)]
pub struct RecoverRequest<'a> {
    pub email: &'a str,
}

/// `PUT /auth/v1/user`
#[derive(Debug, Serialize)]
pub struct UpdateUserRequest<'a> {
    pub data: &'a ProfileFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// User object returned by the auth endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

impl From<User> for Identity {
    fn from(user: User) -> Self {
        // Password sign-ups store `name`; OAuth providers fill `full_name`/`picture`.
        let metadata = user.user_metadata;
        Identity {
            id: UserId::new(user.id),
            email: user.email,
            name: metadata.name.or(metadata.full_name),
            avatar_url: metadata.avatar_url.or(metadata.picture),
        }
    }
}

/// Session issued by any token grant or by sign-up
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: i64,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl TokenResponse {
    pub fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_else(|| Utc::now() + Duration::seconds(self.expires_in));

        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type,
            expires_at,
            user: self.user.into(),
        }
    }
}

/// Sign-up answers with a session, or with just the user when the address
/// must be confirmed first
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SignUpResponse {
    Session(TokenResponse),
    User(User),
}

/// Error body from either service. The auth service uses
/// `error`/`error_description` or `error_code`/`msg`; the REST service uses
/// `code`/`message`/`details`/`hint`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

impl ErrorBody {
    /// Parse a body, keeping the raw text as the message when it isn't JSON
    pub fn parse(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or_else(|_| ErrorBody {
            message: (!text.trim().is_empty()).then(|| text.trim().to_string()),
            ..Default::default()
        })
    }

    /// Machine-readable code, if the service sent one
    pub fn code(&self) -> Option<String> {
        let code = match &self.code {
            Some(serde_json::Value::String(code)) => Some(code.clone()),
            _ => None,
        };
        self.error_code.clone().or(code).or_else(|| {
            let description = self.error_description.as_deref().unwrap_or_default();
            match self.error.as_deref() {
                // Older auth servers only say this in prose.
                Some("invalid_grant") if description.contains("Invalid login credentials") => {
                    Some("invalid_credentials".to_string())
                }
                Some(error) => Some(error.to_string()),
                None => None,
            }
        })
    }

    pub fn message(&self) -> String {
        let mut message = self
            .msg
            .clone()
            .or_else(|| self.error_description.clone())
            .or_else(|| self.message.clone())
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "unknown error".to_string());
        if let Some(details) = &self.details {
            message = format!("{} ({})", message, details);
        }
        message
    }
}

/// PostgREST filter value for equality
pub fn eq(value: &str) -> String {
    format!("eq.{}", value)
}
