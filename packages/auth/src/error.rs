// ABOUTME: Error types for sessions, sign-in flows, and OAuth redirects
// ABOUTME: Every auth service failure surfaces to callers as one of these variants

use taskmaster_core::ValidationError;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("An account already exists for {0}")]
    AccountExists(String),

    #[error("No account found for this address")]
    AccountNotFound,

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Token expired or invalid")]
    TokenExpired,

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("OAuth authentication failed: {0}")]
    OAuthFailed(String),

    #[error("PKCE error: {0}")]
    Pkce(String),

    #[error("Callback server error: {0}")]
    CallbackServer(String),

    #[error("State mismatch: CSRF protection failed")]
    StateMismatch,

    #[error("Failed to open browser: {0}")]
    BrowserOpen(String),

    #[error("Session storage error: {0}")]
    Storage(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthError {
    /// Check if this is a transport failure rather than a rejection by the service
    pub fn is_network_error(&self) -> bool {
        matches!(self, AuthError::Network(_))
    }

    /// Check if retrying with the same credentials cannot succeed
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredentials
                | AuthError::AccountExists(_)
                | AuthError::AccountNotFound
                | AuthError::Rejected(_)
        )
    }
}

impl From<ValidationError> for AuthError {
    fn from(err: ValidationError) -> Self {
        AuthError::Rejected(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(AuthError::Network("timeout".into()).is_network_error());
        assert!(!AuthError::InvalidCredentials.is_network_error());
        assert!(AuthError::InvalidCredentials.is_rejection());
        assert!(!AuthError::TokenExpired.is_rejection());
    }

    #[test]
    fn test_validation_error_becomes_rejection() {
        let err: AuthError = ValidationError::InvalidEmail("nope".into()).into();
        assert_eq!(err.to_string(), "Request rejected: Invalid email address: nope");
    }
}
