//! Database repository for password reset tokens.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    db::{
        errors::{DbError, Result},
        models::password_reset_tokens::{
            PasswordResetToken, PasswordResetTokenCreateRequest, PasswordResetTokenFlags, PasswordResetTokenUpdateRequest,
        },
    },
    types::{ResetTokenId, UserId, abbrev_uuid},
};

const TOKEN_COLUMNS: &str =
    "id, seq, user_id, email, code, token, expires_at, last_sent_at, is_used, is_validated, used_at, created_at";

const LATEST_FIRST: &str = "ORDER BY created_at DESC, seq DESC LIMIT 1";

pub struct PasswordResetTokens<'c> {
    db: &'c mut PgConnection,
}

impl<'c> PasswordResetTokens<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id)), err)]
    pub async fn create(&mut self, request: &PasswordResetTokenCreateRequest) -> Result<PasswordResetToken> {
        let query = format!(
            "INSERT INTO password_reset_tokens (id, user_id, email, code, token, expires_at, last_sent_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {TOKEN_COLUMNS}"
        );

        let token = sqlx::query_as::<_, PasswordResetToken>(&query)
            .bind(Uuid::new_v4())
            .bind(request.user_id)
            .bind(&request.email)
            .bind(&request.code)
            .bind(&request.token)
            .bind(request.expires_at)
            .bind(request.last_sent_at)
            .bind(request.created_at)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(token)
    }

    #[instrument(skip(self, email), err)]
    pub async fn find_latest_by_email(&mut self, email: &str) -> Result<Option<PasswordResetToken>> {
        let query = format!("SELECT {TOKEN_COLUMNS} FROM password_reset_tokens WHERE email = $1 {LATEST_FIRST}");
        let token = sqlx::query_as::<_, PasswordResetToken>(&query)
            .bind(email)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(token)
    }

    #[instrument(skip(self, email, code), err)]
    pub async fn find_live_by_code(&mut self, email: &str, code: &str, now: DateTime<Utc>) -> Result<Option<PasswordResetToken>> {
        let query = format!(
            "SELECT {TOKEN_COLUMNS} FROM password_reset_tokens
             WHERE email = $1 AND code = $2 AND expires_at > $3 AND is_used = FALSE
             {LATEST_FIRST}"
        );
        let token = sqlx::query_as::<_, PasswordResetToken>(&query)
            .bind(email)
            .bind(code)
            .bind(now)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(token)
    }

    #[instrument(skip(self, flags), fields(user_id = %abbrev_uuid(&flags.user_id)), err)]
    pub async fn find_by_user_and_flags(&mut self, flags: &PasswordResetTokenFlags) -> Result<Option<PasswordResetToken>> {
        let query = format!(
            "SELECT {TOKEN_COLUMNS} FROM password_reset_tokens
             WHERE user_id = $1 AND email = $2 AND is_validated = $3 AND is_used = $4 AND expires_at > $5
             {LATEST_FIRST}"
        );
        let token = sqlx::query_as::<_, PasswordResetToken>(&query)
            .bind(flags.user_id)
            .bind(&flags.email)
            .bind(flags.is_validated)
            .bind(flags.is_used)
            .bind(flags.live_at)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(token)
    }

    #[instrument(skip(self, request), err)]
    pub async fn update(&mut self, id: ResetTokenId, request: &PasswordResetTokenUpdateRequest) -> Result<PasswordResetToken> {
        let query = format!(
            "UPDATE password_reset_tokens SET
                token = COALESCE($2, token),
                is_validated = COALESCE($3, is_validated),
                is_used = COALESCE($4, is_used),
                used_at = COALESCE($5, used_at)
             WHERE id = $1
             RETURNING {TOKEN_COLUMNS}"
        );

        sqlx::query_as::<_, PasswordResetToken>(&query)
            .bind(id)
            .bind(&request.token)
            .bind(request.is_validated)
            .bind(request.is_used)
            .bind(request.used_at)
            .fetch_optional(&mut *self.db)
            .await?
            .ok_or(DbError::NotFound)
    }

    /// Expire the user's unused live rows, optionally sparing one.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn bulk_expire_except(&mut self, user_id: UserId, except: Option<ResetTokenId>, expires_at: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE password_reset_tokens SET expires_at = $3
             WHERE user_id = $1 AND is_used = FALSE AND expires_at > $3 AND ($2::uuid IS NULL OR id <> $2)",
        )
        .bind(user_id)
        .bind(except)
        .bind(expires_at)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected())
    }
}
