//! Error type shared by every service operation.
//!
//! Each variant belongs to exactly one [`ErrorKind`]. Callers branch on the kind (or on the
//! variant) and never on message text. Only [`ErrorKind::TransientStore`] is worth retrying.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error as ThisError;

use crate::{db::errors::DbError, types::Role};

/// Classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input the caller can correct.
    Validation,
    NotFound,
    /// Uniqueness violation.
    Conflict,
    /// Role or ownership violation.
    Authorization,
    /// Bad credentials, code or token.
    Authentication,
    RateLimited,
    /// Store failure; the only retryable kind.
    TransientStore,
    /// Hashing or signing failure, or a store constraint that should never fire.
    Internal,
}

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("Email is required")]
    EmailRequired,

    #[error("Email is invalid")]
    EmailInvalid,

    #[error("Password is required")]
    PasswordRequired,

    #[error("A password is required unless signing up with a provider")]
    PasswordOrProviderRequired,

    #[error("Password must be between {min} and {max} characters")]
    PasswordLength { min: usize, max: usize },

    #[error("Role {role} cannot be assigned here")]
    RoleNotProvisionable { role: Role },

    #[error("Office is required")]
    OfficeRequired,

    #[error("User not found")]
    UserNotFound,

    /// Federated sign-in for an email with no account. Kept apart from credential failures so
    /// callers can tell the user to register first.
    #[error("User is not registered")]
    FederatedUserNotRegistered,

    #[error("Creating user not found")]
    CreatorNotFound,

    #[error("Requesting user not found")]
    RequesterNotFound,

    #[error("No account exists for this email")]
    AccountNotFound,

    #[error("Email is already registered")]
    EmailTaken,

    #[error("User account is inactive")]
    UserInactive,

    #[error("Sign-up through an identity provider is not allowed")]
    FederatedSignupNotAllowed,

    #[error("Managers can only create employees")]
    ManagerCanOnlyCreateEmployee,

    #[error("Insufficient permissions to {action}")]
    Forbidden { action: &'static str },

    #[error("Manager has no office assigned")]
    ManagerHasNoOffice,

    #[error("This account signs in through an identity provider")]
    InvalidLoginMethod,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Not authenticated")]
    Unauthenticated,

    /// Wrong code, expired code and already-used code are reported identically.
    #[error("Invalid or expired code")]
    InvalidOrExpiredCode,

    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("Token does not match this request")]
    TokenMismatch,

    #[error("Token was not validated or has already been used")]
    TokenNotValidatedOrUsed,

    #[error("Please wait {retry_after_secs}s before requesting a new code")]
    TooSoon { retry_after_secs: i64 },

    #[error(transparent)]
    Store(#[from] DbError),

    #[error("Failed to {operation}")]
    Internal { operation: String },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::EmailRequired
            | Error::EmailInvalid
            | Error::PasswordRequired
            | Error::PasswordOrProviderRequired
            | Error::PasswordLength { .. }
            | Error::RoleNotProvisionable { .. }
            | Error::OfficeRequired => ErrorKind::Validation,

            Error::UserNotFound
            | Error::FederatedUserNotRegistered
            | Error::CreatorNotFound
            | Error::RequesterNotFound
            | Error::AccountNotFound => ErrorKind::NotFound,

            Error::EmailTaken => ErrorKind::Conflict,

            Error::UserInactive
            | Error::FederatedSignupNotAllowed
            | Error::ManagerCanOnlyCreateEmployee
            | Error::Forbidden { .. }
            | Error::ManagerHasNoOffice => ErrorKind::Authorization,

            Error::InvalidLoginMethod
            | Error::InvalidCredentials
            | Error::Unauthenticated
            | Error::InvalidOrExpiredCode
            | Error::InvalidOrExpiredToken
            | Error::TokenMismatch
            | Error::TokenNotValidatedOrUsed => ErrorKind::Authentication,

            Error::TooSoon { .. } => ErrorKind::RateLimited,

            Error::Store(db_err) => match db_err {
                DbError::NotFound => ErrorKind::NotFound,
                DbError::UniqueViolation { .. } => ErrorKind::Conflict,
                DbError::ForeignKeyViolation { .. } | DbError::CheckViolation { .. } => ErrorKind::Internal,
                DbError::Other(_) => ErrorKind::TransientStore,
            },

            Error::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransientStore
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::TransientStore => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Store(DbError::UniqueViolation { .. }) => "Resource already exists".to_string(),
            Error::Store(DbError::NotFound) => "Resource not found".to_string(),
            Error::Store(_) => "Storage is temporarily unavailable".to_string(),
            Error::Internal { .. } => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let kind = self.kind();
        match kind {
            ErrorKind::TransientStore | ErrorKind::Internal => {
                tracing::error!("Internal service error: {:#}", self);
            }
            ErrorKind::Conflict | ErrorKind::RateLimited => {
                tracing::warn!("Client error: {}", self);
            }
            ErrorKind::Authentication | ErrorKind::Authorization => {
                tracing::info!("Authorization error: {}", self);
            }
            ErrorKind::Validation | ErrorKind::NotFound => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let body = Json(json!({
            "error": kind,
            "message": self.user_message(),
        }));
        let mut response = (self.status_code(), body).into_response();

        if let Error::TooSoon { retry_after_secs } = self
            && let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_store_failures_are_retryable() {
        assert!(Error::Store(DbError::Other(anyhow::anyhow!("connection reset"))).is_retryable());
        assert!(!Error::InvalidCredentials.is_retryable());
        assert!(!Error::TooSoon { retry_after_secs: 10 }.is_retryable());
        assert!(!Error::Store(DbError::NotFound).is_retryable());
    }

    #[test]
    fn test_credential_and_registration_failures_are_distinct_kinds() {
        assert_eq!(Error::InvalidCredentials.kind(), ErrorKind::Authentication);
        assert_eq!(Error::FederatedUserNotRegistered.kind(), ErrorKind::NotFound);
        assert_ne!(Error::InvalidCredentials.status_code(), Error::FederatedUserNotRegistered.status_code());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::EmailInvalid.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::EmailTaken.status_code(), StatusCode::CONFLICT);
        assert_eq!(Error::ManagerCanOnlyCreateEmployee.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(Error::TokenNotValidatedOrUsed.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(Error::TooSoon { retry_after_secs: 5 }.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            Error::Store(DbError::Other(anyhow::anyhow!("down"))).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_internal_details_not_exposed() {
        let err = Error::Internal {
            operation: "hash password: out of memory".to_string(),
        };
        assert_eq!(err.user_message(), "Internal server error");

        let err = Error::Store(DbError::Other(anyhow::anyhow!("password authentication failed for user postgres")));
        assert!(!err.user_message().contains("postgres"));
    }

    #[test]
    fn test_too_soon_sets_retry_after() {
        let response = Error::TooSoon { retry_after_secs: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "42");
    }
}
