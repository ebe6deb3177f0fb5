//! Database models for users.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::types::{Role, UserId};

/// A user row.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct UserDBResponse {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
    /// Absent for accounts that can only sign in through a federated identity provider.
    pub password_hash: Option<String>,
    pub role: Role,
    pub office: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub email_verified: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserDBResponse {
    /// The stored hash, treating an empty string as absent.
    pub fn password_hash(&self) -> Option<&str> {
        self.password_hash.as_deref().filter(|h| !h.is_empty())
    }
}

/// Database request for creating a new user
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub password_hash: Option<String>,
    pub role: Role,
    pub office: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub email_verified: Option<DateTime<Utc>>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// Database request for updating a user. `None` fields are left unchanged.
#[derive(Debug, Clone)]
pub struct UserUpdateDBRequest {
    pub password_hash: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
    pub updated_at: DateTime<Utc>,
}

impl UserUpdateDBRequest {
    pub fn at(updated_at: DateTime<Utc>) -> Self {
        Self {
            password_hash: None,
            last_login: None,
            is_active: None,
            updated_at,
        }
    }

    pub fn password_hash(mut self, hash: String) -> Self {
        self.password_hash = Some(hash);
        self
    }

    pub fn last_login(mut self, at: DateTime<Utc>) -> Self {
        self.last_login = Some(at);
        self
    }
}

/// Filter for listing users. Results are ordered newest first.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Only these roles; empty means any role.
    pub roles: Vec<Role>,
    pub office: Option<String>,
    pub exclude_id: Option<UserId>,
    pub active_only: bool,
}

impl UserFilter {
    pub fn matches(&self, user: &UserDBResponse) -> bool {
        (self.roles.is_empty() || self.roles.contains(&user.role))
            && self.office.as_ref().is_none_or(|office| user.office.as_ref() == Some(office))
            && self.exclude_id != Some(user.id)
            && (!self.active_only || user.is_active)
    }
}
