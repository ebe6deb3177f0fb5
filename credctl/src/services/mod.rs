//! Credential lifecycle operations.
//!
//! Each service is cheap to clone and holds its collaborators behind `Arc`s. Every public
//! operation opens one [`UnitOfWork`](crate::db::UnitOfWork), does all of its reads and writes
//! through it and commits at the end; an early return drops the unit of work and rolls it back.
//!
//! - [`AuthService`]: sign-in, sign-up, change-password
//! - [`ProvisioningService`]: admin and manager initiated account creation and listing
//! - [`PasswordResetFlow`]: request, validate and confirm a password reset

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::password::{HashError, PasswordHasher},
    config::PasswordConfig,
    db::models::users::UserDBResponse,
    errors::{Error, Result},
    types::{Role, UserId},
};

pub mod auth;
pub mod password_reset;
pub mod provisioning;

pub use auth::AuthService;
pub use password_reset::PasswordResetFlow;
pub use provisioning::ProvisioningService;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid"));

/// How the caller authenticated the user, as asserted by the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoginProvider {
    /// Email and password checked by this service.
    #[default]
    Credentials,
    /// An upstream identity provider has already authenticated the user.
    #[serde(alias = "google")]
    Federated,
}

/// Public view of a user. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub role: Role,
    pub office: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<UserDBResponse> for UserProfile {
    fn from(user: UserDBResponse) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            image: user.image,
            role: user.role,
            office: user.office,
            phone: user.phone,
            is_active: user.is_active,
            last_login: user.last_login,
            created_at: user.created_at,
        }
    }
}

/// Check an email is present and well formed, returning it without surrounding whitespace.
pub(crate) fn validate_email(email: &str) -> Result<&str> {
    let email = email.trim();
    if email.is_empty() {
        return Err(Error::EmailRequired);
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err(Error::EmailInvalid);
    }
    Ok(email)
}

/// Length policy for passwords chosen through reset or change-password. Counted in characters.
pub(crate) fn check_password_policy(password: &str, policy: &PasswordConfig) -> Result<()> {
    let len = password.chars().count();
    if len < policy.min_length || len > policy.max_length {
        return Err(Error::PasswordLength {
            min: policy.min_length,
            max: policy.max_length,
        });
    }
    Ok(())
}

/// Hash on the blocking pool; Argon2 with production parameters takes tens of milliseconds.
pub(crate) async fn hash_password(hasher: &PasswordHasher, password: &str) -> Result<String> {
    let hasher = hasher.clone();
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hasher.hash(&password))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("join hashing task: {e}"),
        })?
        .map_err(|e| Error::Internal {
            operation: format!("hash password: {e}"),
        })
}

/// Verify on the blocking pool. `Ok(false)` covers both a wrong password and a stored hash this
/// build cannot read; the latter is logged since it means the row needs attention.
pub(crate) async fn verify_password(hasher: &PasswordHasher, user_id: UserId, encoded: &str, password: &str) -> Result<bool> {
    let hasher = hasher.clone();
    let encoded = encoded.to_string();
    let password = password.to_string();
    let outcome = tokio::task::spawn_blocking(move || hasher.verify(&encoded, &password))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("join verification task: {e}"),
        })?;

    match outcome {
        Ok(()) => Ok(true),
        Err(HashError::InvalidPassword) => Ok(false),
        Err(e @ (HashError::MalformedHash | HashError::UnsupportedVersion)) => {
            tracing::warn!(user_id = %crate::types::abbrev_uuid(&user_id), "Stored password hash is unusable: {}", e);
            Ok(false)
        }
        Err(e @ HashError::InvalidInput(_)) => Err(Error::Internal {
            operation: format!("verify password: {e}"),
        }),
    }
}
