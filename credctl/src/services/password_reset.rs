//! Three-step password reset.
//!
//! ```text
//! Request(email)            Validate(email, code)           Confirm(email, token, password)
//!      │                          │                                │
//!      ↓                          ↓                                ↓
//!  REQUESTED ──code matches──→ VALIDATED ──final token, unused──→ CONSUMED
//! ```
//!
//! `Request` hands back a six digit code and an initial-stage token; delivering the code to the
//! user is the caller's job. `Validate` trades the code for a final-stage token, and `Confirm`
//! spends that token to set the new password. A new `Request` expires every earlier row of the
//! user, so at most one cycle is live at a time.
//!
//! All three steps lock the user inside their unit of work. Two `Confirm` calls racing on the
//! same token serialize on that lock and the second sees the row already used.

use std::{sync::Arc, time::Duration as StdDuration};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

use super::{check_password_policy, hash_password, validate_email};
use crate::{
    auth::{
        password::PasswordHasher,
        random::{RandomSource, generate_code},
        tokens::{ResetTokenSigner, TokenError, TokenStage},
    },
    clock::Clock,
    config::{PasswordConfig, PasswordResetConfig},
    db::{
        Database,
        models::{
            password_reset_tokens::{PasswordResetTokenCreateRequest, PasswordResetTokenFlags, PasswordResetTokenUpdateRequest, ResetStage},
            users::UserUpdateDBRequest,
        },
    },
    errors::{Error, Result},
    types::{UserId, abbrev_uuid},
};

/// Outcome of a reset request. Carries the secrets the caller must deliver to the user.
#[derive(Clone, Serialize, ToSchema)]
pub struct ResetRequested {
    pub code: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub name: Option<String>,
}

impl std::fmt::Debug for ResetRequested {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResetRequested")
            .field("expires_at", &self.expires_at)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Serialize, ToSchema)]
pub struct ResetValidated {
    pub success: bool,
    pub email: String,
    /// Final-stage token to pass to confirm.
    pub token: String,
}

impl std::fmt::Debug for ResetValidated {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResetValidated").field("email", &self.email).finish_non_exhaustive()
    }
}

/// Minimal public facts about an active account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct AccountSummary {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
}

#[derive(Clone)]
pub struct PasswordResetFlow {
    db: Arc<dyn Database>,
    hasher: PasswordHasher,
    signer: ResetTokenSigner,
    random: Arc<dyn RandomSource>,
    clock: Arc<dyn Clock>,
    policy: PasswordConfig,
    config: PasswordResetConfig,
}

impl PasswordResetFlow {
    pub fn new(
        db: Arc<dyn Database>,
        hasher: PasswordHasher,
        signer: ResetTokenSigner,
        random: Arc<dyn RandomSource>,
        clock: Arc<dyn Clock>,
        policy: PasswordConfig,
        config: PasswordResetConfig,
    ) -> Self {
        Self {
            db,
            hasher,
            signer,
            random,
            clock,
            policy,
            config,
        }
    }

    /// Start a reset cycle for an active account.
    #[instrument(skip_all, err)]
    pub async fn request(&self, email: &str) -> Result<ResetRequested> {
        let email = validate_email(email)?;

        let mut uow = self.db.begin().await?;
        let user = uow
            .users()
            .find_by_email(email)
            .await?
            .filter(|u| u.is_active)
            .ok_or(Error::AccountNotFound)?;
        uow.lock_user(user.id).await?;

        let now = self.clock.now();
        let cooldown = self.config.resend_cooldown.as_secs() as i64;
        if let Some(last_sent_at) = uow.reset_tokens().find_latest_by_email(email).await?.and_then(|t| t.last_sent_at) {
            let elapsed = now.timestamp() - last_sent_at;
            if elapsed < cooldown {
                debug!(user_id = %abbrev_uuid(&user.id), elapsed, "Reset requested inside cooldown");
                return Err(Error::TooSoon {
                    retry_after_secs: cooldown - elapsed,
                });
            }
        }

        let expired = uow
            .reset_tokens()
            .bulk_expire_except(user.id, None, DateTime::<Utc>::UNIX_EPOCH)
            .await?;

        let code = generate_code(self.random.as_ref());
        let (token, expires_at) = self
            .signer
            .issue(user.id, &user.email, TokenStage::Initial, to_chrono(self.config.code_ttl)?)
            .map_err(signing_failed)?;

        uow.reset_tokens()
            .create(&PasswordResetTokenCreateRequest {
                user_id: user.id,
                email: user.email.clone(),
                code: code.clone(),
                token: token.clone(),
                expires_at,
                last_sent_at: now.timestamp(),
                created_at: now,
            })
            .await?;
        uow.commit().await?;

        info!(user_id = %abbrev_uuid(&user.id), superseded = expired, "Password reset requested");
        Ok(ResetRequested {
            code,
            token,
            expires_at,
            user_id: user.id,
            name: user.name,
        })
    }

    /// Exchange a code for a final-stage token.
    ///
    /// A wrong, expired, superseded or already validated code are all reported as
    /// [`Error::InvalidOrExpiredCode`], as is an unknown email.
    #[instrument(skip_all, err)]
    pub async fn validate(&self, email: &str, code: &str) -> Result<ResetValidated> {
        let email = validate_email(email)?;

        let mut uow = self.db.begin().await?;
        let user = uow.users().find_by_email(email).await?.ok_or(Error::InvalidOrExpiredCode)?;
        uow.lock_user(user.id).await?;

        let now = self.clock.now();
        let row = uow
            .reset_tokens()
            .find_live_by_code(email, code, now)
            .await?
            .filter(|row| row.stage() == ResetStage::Requested)
            .ok_or(Error::InvalidOrExpiredCode)?;

        match self.signer.verify(&row.token) {
            Ok(claims) if claims.stage == TokenStage::Initial && claims.user_id == row.user_id => {}
            Ok(_) | Err(TokenError::Invalid | TokenError::Expired) => {
                warn!(user_id = %abbrev_uuid(&row.user_id), "Stored reset token failed verification");
                return Err(Error::InvalidOrExpiredToken);
            }
            Err(e @ TokenError::Signing(_)) => return Err(signing_failed(e)),
        }

        // the row keeps its original expiry, so confirm must land inside the code window
        let (token, _) = self
            .signer
            .issue(row.user_id, &row.email, TokenStage::Final, to_chrono(self.config.final_token_ttl)?)
            .map_err(signing_failed)?;

        uow.reset_tokens()
            .update(
                row.id,
                &PasswordResetTokenUpdateRequest {
                    token: Some(token.clone()),
                    is_validated: Some(true),
                    ..Default::default()
                },
            )
            .await?;
        uow.reset_tokens()
            .bulk_expire_except(row.user_id, Some(row.id), DateTime::<Utc>::UNIX_EPOCH)
            .await?;
        uow.commit().await?;

        info!(user_id = %abbrev_uuid(&row.user_id), "Password reset code validated");
        Ok(ResetValidated {
            success: true,
            email: row.email,
            token,
        })
    }

    /// Spend a final-stage token to set a new password.
    #[instrument(skip_all, err)]
    pub async fn confirm(&self, email: &str, token: &str, new_password: &str) -> Result<()> {
        let email = validate_email(email)?;

        let claims = self.signer.verify(token).map_err(|e| match e {
            TokenError::Invalid | TokenError::Expired => Error::InvalidOrExpiredToken,
            e @ TokenError::Signing(_) => signing_failed(e),
        })?;
        if claims.stage != TokenStage::Final || claims.email != email {
            return Err(Error::TokenMismatch);
        }

        check_password_policy(new_password, &self.policy)?;

        let mut uow = self.db.begin().await?;
        uow.lock_user(claims.user_id).await?;

        let now = self.clock.now();
        let row = uow
            .reset_tokens()
            .find_by_user_and_flags(&PasswordResetTokenFlags {
                user_id: claims.user_id,
                email: email.to_string(),
                is_validated: true,
                is_used: false,
                live_at: now,
            })
            .await?
            .ok_or(Error::TokenNotValidatedOrUsed)?;

        let password_hash = hash_password(&self.hasher, new_password).await?;
        uow.users()
            .update(row.user_id, &UserUpdateDBRequest::at(now).password_hash(password_hash))
            .await?;
        uow.reset_tokens()
            .update(
                row.id,
                &PasswordResetTokenUpdateRequest {
                    is_used: Some(true),
                    used_at: Some(now),
                    ..Default::default()
                },
            )
            .await?;
        uow.commit().await?;

        info!(user_id = %abbrev_uuid(&row.user_id), "Password reset completed");
        Ok(())
    }

    /// Whether an active account exists for `email`.
    #[instrument(skip_all, err)]
    pub async fn lookup_account(&self, email: &str) -> Result<AccountSummary> {
        let email = validate_email(email)?;

        let mut uow = self.db.begin().await?;
        let user = uow
            .users()
            .find_by_email(email)
            .await?
            .filter(|u| u.is_active)
            .ok_or(Error::AccountNotFound)?;

        Ok(AccountSummary {
            id: user.id,
            email: user.email,
            name: user.name,
        })
    }
}

fn to_chrono(ttl: StdDuration) -> Result<Duration> {
    Duration::from_std(ttl).map_err(|e| Error::Internal {
        operation: format!("convert token lifetime: {e}"),
    })
}

fn signing_failed(err: TokenError) -> Error {
    Error::Internal {
        operation: format!("sign reset token: {err}"),
    }
}
