//! Postgres-backed [`Database`]. Each unit of work is one `sqlx` transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use super::{
    CredentialStore, Database, ResetTokenStore, UnitOfWork,
    errors::Result,
    handlers::{PasswordResetTokens, Users},
    models::{
        password_reset_tokens::{PasswordResetToken, PasswordResetTokenCreateRequest, PasswordResetTokenFlags, PasswordResetTokenUpdateRequest},
        users::{UserCreateDBRequest, UserDBResponse, UserFilter, UserUpdateDBRequest},
    },
};
use crate::types::{ResetTokenId, UserId};

#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

/// An open transaction. Rolled back by sqlx on drop unless committed.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    fn users(&mut self) -> &mut dyn CredentialStore {
        self
    }

    fn reset_tokens(&mut self) -> &mut dyn ResetTokenStore {
        self
    }

    async fn lock_user(&mut self, id: UserId) -> Result<()> {
        Users::new(&mut self.tx).lock(id).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PgUnitOfWork {
    async fn find_by_email(&mut self, email: &str) -> Result<Option<UserDBResponse>> {
        Users::new(&mut self.tx).get_user_by_email(email).await
    }

    async fn find_by_id(&mut self, id: UserId) -> Result<Option<UserDBResponse>> {
        Users::new(&mut self.tx).get_by_id(id).await
    }

    async fn create(&mut self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        Users::new(&mut self.tx).create(request).await
    }

    async fn update(&mut self, id: UserId, request: &UserUpdateDBRequest) -> Result<UserDBResponse> {
        Users::new(&mut self.tx).update(id, request).await
    }

    async fn count_all(&mut self) -> Result<i64> {
        Users::new(&mut self.tx).count().await
    }

    async fn list(&mut self, filter: &UserFilter) -> Result<Vec<UserDBResponse>> {
        Users::new(&mut self.tx).list(filter).await
    }
}

#[async_trait]
impl ResetTokenStore for PgUnitOfWork {
    async fn find_latest_by_email(&mut self, email: &str) -> Result<Option<PasswordResetToken>> {
        PasswordResetTokens::new(&mut self.tx).find_latest_by_email(email).await
    }

    async fn find_live_by_code(&mut self, email: &str, code: &str, now: DateTime<Utc>) -> Result<Option<PasswordResetToken>> {
        PasswordResetTokens::new(&mut self.tx).find_live_by_code(email, code, now).await
    }

    async fn find_by_user_and_flags(&mut self, flags: &PasswordResetTokenFlags) -> Result<Option<PasswordResetToken>> {
        PasswordResetTokens::new(&mut self.tx).find_by_user_and_flags(flags).await
    }

    async fn create(&mut self, request: &PasswordResetTokenCreateRequest) -> Result<PasswordResetToken> {
        PasswordResetTokens::new(&mut self.tx).create(request).await
    }

    async fn update(&mut self, id: ResetTokenId, request: &PasswordResetTokenUpdateRequest) -> Result<PasswordResetToken> {
        PasswordResetTokens::new(&mut self.tx).update(id, request).await
    }

    async fn bulk_expire_except(&mut self, user_id: UserId, except: Option<ResetTokenId>, expires_at: DateTime<Utc>) -> Result<u64> {
        PasswordResetTokens::new(&mut self.tx)
            .bulk_expire_except(user_id, except, expires_at)
            .await
    }
}
