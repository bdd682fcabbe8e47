//! Cloud error types
use taskmaster_auth::AuthError;
use taskmaster_tasks::StoreError;
use thiserror::Error;

use crate::api::ErrorBody;

/// Result type for cloud operations
pub type CloudResult<T> = Result<T, CloudError>;

/// Failures talking to the hosted backend
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Token expired or invalid")]
    TokenExpired,

    #[error("Not signed in")]
    NotAuthenticated,
}

impl CloudError {
    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Build an API error from a status code and whatever error body came back
    pub fn api(status: u16, body: ErrorBody) -> Self {
        Self::Api {
            status,
            code: body.code(),
            message: body.message(),
        }
    }

    /// Check if this is a network-related error
    pub fn is_network_error(&self) -> bool {
        matches!(self, CloudError::Network(_))
    }

    /// Check if this is an authentication error
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            CloudError::Authentication(_) | CloudError::TokenExpired | CloudError::NotAuthenticated
        ) || matches!(self, CloudError::Api { status: 401, .. })
    }

    fn code(&self) -> Option<&str> {
        match self {
            CloudError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CloudError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Serialization(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CloudError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for CloudError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<CloudError> for AuthError {
    fn from(err: CloudError) -> Self {
        match err.code() {
            Some("invalid_credentials" | "invalid_grant") => return AuthError::InvalidCredentials,
            Some("user_already_exists" | "email_exists") => {
                return AuthError::AccountExists(err.to_string())
            }
            Some("user_not_found") => return AuthError::AccountNotFound,
            _ => {}
        }

        match err {
            CloudError::Network(msg) => AuthError::Network(msg),
            CloudError::TokenExpired => AuthError::TokenExpired,
            CloudError::NotAuthenticated => AuthError::NotAuthenticated,
            CloudError::Authentication(msg) => AuthError::OAuthFailed(msg),
            CloudError::Io(msg) | CloudError::Configuration(msg) => AuthError::Storage(msg),
            CloudError::Api { status: 401, .. } => AuthError::TokenExpired,
            CloudError::Api { message, .. } | CloudError::Serialization(message) => {
                AuthError::Rejected(message)
            }
        }
    }
}

impl From<CloudError> for StoreError {
    fn from(err: CloudError) -> Self {
        match err {
            CloudError::Network(msg) => StoreError::Transport(msg),
            CloudError::Serialization(msg) => StoreError::Decode(msg),
            CloudError::TokenExpired
            | CloudError::NotAuthenticated
            | CloudError::Authentication(_)
            | CloudError::Api {
                status: 401 | 403, ..
            } => StoreError::Unauthorized,
            CloudError::Api {
                status, message, ..
            } if (400..500).contains(&status) => StoreError::Rejected(message),
            CloudError::Api {
                status, message, ..
            } => StoreError::Service { status, message },
            CloudError::Io(msg) | CloudError::Configuration(msg) => StoreError::Transport(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16, code: Option<&str>) -> CloudError {
        CloudError::Api {
            status,
            code: code.map(str::to_string),
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_auth_error_mapping() {
        assert!(matches!(
            AuthError::from(api(400, Some("invalid_credentials"))),
            AuthError::InvalidCredentials
        ));
        assert!(matches!(
            AuthError::from(api(422, Some("user_already_exists"))),
            AuthError::AccountExists(_)
        ));
        assert!(matches!(
            AuthError::from(api(422, Some("weak_password"))),
            AuthError::Rejected(_)
        ));
        assert!(AuthError::from(CloudError::Network("reset".into())).is_network_error());
    }

    #[test]
    fn test_store_error_mapping() {
        assert_eq!(StoreError::from(api(401, None)), StoreError::Unauthorized);
        assert_eq!(StoreError::from(api(403, None)), StoreError::Unauthorized);
        assert_eq!(
            StoreError::from(api(409, Some("23505"))),
            StoreError::Rejected("boom".to_string())
        );
        assert_eq!(
            StoreError::from(api(503, None)),
            StoreError::Service {
                status: 503,
                message: "boom".to_string()
            }
        );
    }

    #[test]
    fn test_is_auth_error() {
        assert!(CloudError::auth("nope").is_auth_error());
        assert!(api(401, None).is_auth_error());
        assert!(!api(500, None).is_auth_error());
        assert!(!CloudError::config("missing").is_auth_error());
    }
}
