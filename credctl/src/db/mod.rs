//! Persistence for users and password reset tokens.
//!
//! The services never talk to a database directly. They open a [`UnitOfWork`] through
//! [`Database::begin`], use its [`CredentialStore`] and [`ResetTokenStore`] views, and
//! [`UnitOfWork::commit`] at the end. Dropping a unit of work without committing rolls it back,
//! so an operation that fails or is cancelled part-way leaves nothing behind.
//!
//! ```text
//! ┌──────────────┐
//! │   Services   │  (services::*)
//! └──────┬───────┘
//!        │ Database::begin
//!        ↓
//! ┌──────────────┐
//! │  UnitOfWork  │  users() / reset_tokens() / lock_user() / commit()
//! └──────┬───────┘
//!        ↓
//! ┌──────────────┬──────────────────┐
//! │  PgDatabase  │  InMemoryDatabase │
//! └──────────────┴──────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`handlers`]: Postgres repositories over a single connection
//! - [`models`]: row and request structures
//! - [`errors`]: store error type
//! - [`postgres`]: transactional [`Database`] over a `PgPool`
//! - [`memory`]: in-process [`Database`] used by tests and `database.type: memory`

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{ResetTokenId, UserId};

pub mod errors;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod postgres;

use errors::Result;
use models::{
    password_reset_tokens::{PasswordResetToken, PasswordResetTokenCreateRequest, PasswordResetTokenFlags, PasswordResetTokenUpdateRequest},
    users::{UserCreateDBRequest, UserDBResponse, UserFilter, UserUpdateDBRequest},
};

pub use memory::InMemoryDatabase;
pub use postgres::PgDatabase;

/// User records. Absence is reported as `Ok(None)`, never as an error.
#[async_trait]
pub trait CredentialStore: Send {
    async fn find_by_email(&mut self, email: &str) -> Result<Option<UserDBResponse>>;

    async fn find_by_id(&mut self, id: UserId) -> Result<Option<UserDBResponse>>;

    /// Fails with `DbError::UniqueViolation` if the email is taken.
    async fn create(&mut self, request: &UserCreateDBRequest) -> Result<UserDBResponse>;

    /// Fails with `DbError::NotFound` if the user does not exist.
    async fn update(&mut self, id: UserId, request: &UserUpdateDBRequest) -> Result<UserDBResponse>;

    async fn count_all(&mut self) -> Result<i64>;

    /// Newest first, ties broken by id.
    async fn list(&mut self, filter: &UserFilter) -> Result<Vec<UserDBResponse>>;
}

/// Password reset rows. "Latest" always means highest `(created_at, seq)`.
#[async_trait]
pub trait ResetTokenStore: Send {
    /// Latest row for the email regardless of state.
    async fn find_latest_by_email(&mut self, email: &str) -> Result<Option<PasswordResetToken>>;

    /// Latest unused row for the email whose code matches and which is unexpired at `now`.
    async fn find_live_by_code(&mut self, email: &str, code: &str, now: DateTime<Utc>) -> Result<Option<PasswordResetToken>>;

    /// Latest row matching all of the given flags.
    async fn find_by_user_and_flags(&mut self, flags: &PasswordResetTokenFlags) -> Result<Option<PasswordResetToken>>;

    async fn create(&mut self, request: &PasswordResetTokenCreateRequest) -> Result<PasswordResetToken>;

    /// Fails with `DbError::NotFound` if the row does not exist.
    async fn update(&mut self, id: ResetTokenId, request: &PasswordResetTokenUpdateRequest) -> Result<PasswordResetToken>;

    /// Set `expires_at` on every unused, still-live row of the user except `except`.
    /// Returns the number of rows changed.
    async fn bulk_expire_except(&mut self, user_id: UserId, except: Option<ResetTokenId>, expires_at: DateTime<Utc>) -> Result<u64>;
}

/// One atomic interaction with the store.
#[async_trait]
pub trait UnitOfWork: Send {
    fn users(&mut self) -> &mut dyn CredentialStore;

    fn reset_tokens(&mut self) -> &mut dyn ResetTokenStore;

    /// Serialize with other units of work touching the same user until this one ends.
    async fn lock_user(&mut self, id: UserId) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait Database: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;
}
