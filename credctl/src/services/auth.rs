//! Sign-in, sign-up and change-password.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::{LoginProvider, UserProfile, check_password_policy, hash_password, validate_email, verify_password};
use crate::{
    auth::password::PasswordHasher,
    clock::Clock,
    config::PasswordConfig,
    db::{
        Database,
        errors::DbError,
        models::users::{UserCreateDBRequest, UserUpdateDBRequest},
    },
    errors::{Error, Result},
    types::{Role, UserId, abbrev_uuid},
};

/// Role given to self-registered accounts.
pub const SIGNUP_ROLE: Role = Role::Employee;

#[derive(Debug, Clone)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,
    pub provider: LoginProvider,
}

#[derive(Debug, Clone)]
pub struct SignupRequest {
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub password: String,
    pub provider: LoginProvider,
}

#[derive(Clone)]
pub struct AuthService {
    db: Arc<dyn Database>,
    hasher: PasswordHasher,
    clock: Arc<dyn Clock>,
    policy: PasswordConfig,
}

impl AuthService {
    pub fn new(db: Arc<dyn Database>, hasher: PasswordHasher, clock: Arc<dyn Clock>, policy: PasswordConfig) -> Self {
        Self {
            db,
            hasher,
            clock,
            policy,
        }
    }

    /// Authenticate a user and record the login.
    ///
    /// Federated sign-in trusts the upstream identity provider and skips the password check, but
    /// never creates an account: an unknown email yields [`Error::FederatedUserNotRegistered`].
    #[instrument(skip_all, fields(provider = ?request.provider), err)]
    pub async fn signin(&self, request: SigninRequest) -> Result<UserProfile> {
        let email = validate_email(&request.email)?;

        if request.provider == LoginProvider::Federated {
            let mut uow = self.db.begin().await?;
            let user = uow.users().find_by_email(email).await?.ok_or(Error::FederatedUserNotRegistered)?;
            if !user.is_active {
                return Err(Error::UserInactive);
            }

            let now = self.clock.now();
            let user = uow.users().update(user.id, &UserUpdateDBRequest::at(now).last_login(now)).await?;
            uow.commit().await?;

            info!(user_id = %abbrev_uuid(&user.id), "Federated sign-in");
            return Ok(user.into());
        }

        if request.password.is_empty() {
            return Err(Error::PasswordRequired);
        }

        let mut uow = self.db.begin().await?;
        let user = uow.users().find_by_email(email).await?.ok_or(Error::UserNotFound)?;
        if !user.is_active {
            return Err(Error::UserInactive);
        }
        let stored_hash = user.password_hash().ok_or(Error::InvalidLoginMethod)?.to_string();

        if !verify_password(&self.hasher, user.id, &stored_hash, &request.password).await? {
            return Err(Error::InvalidCredentials);
        }

        let now = self.clock.now();
        let mut update = UserUpdateDBRequest::at(now).last_login(now);
        if self.hasher.needs_rehash(&stored_hash) {
            info!(user_id = %abbrev_uuid(&user.id), "Upgrading password hash parameters");
            update = update.password_hash(hash_password(&self.hasher, &request.password).await?);
        }

        let user = uow.users().update(user.id, &update).await?;
        uow.commit().await?;

        info!(user_id = %abbrev_uuid(&user.id), "Signed in");
        Ok(user.into())
    }

    /// Register a credential-only account with the lowest-privilege role and no office.
    #[instrument(skip_all, fields(provider = ?request.provider), err)]
    pub async fn signup(&self, request: SignupRequest) -> Result<UserProfile> {
        let email = validate_email(&request.email)?;

        if request.provider == LoginProvider::Federated {
            return Err(Error::FederatedSignupNotAllowed);
        }

        let mut uow = self.db.begin().await?;
        if uow.users().find_by_email(email).await?.is_some() {
            return Err(Error::EmailTaken);
        }

        if request.password.is_empty() {
            return Err(Error::PasswordOrProviderRequired);
        }
        let password_hash = hash_password(&self.hasher, &request.password).await?;

        let now = self.clock.now();
        let created = uow
            .users()
            .create(&UserCreateDBRequest {
                email: email.to_string(),
                name: request.name,
                image: request.image,
                password_hash: Some(password_hash),
                role: SIGNUP_ROLE,
                office: None,
                phone: None,
                is_active: true,
                email_verified: Some(now),
                created_by: None,
                created_at: now,
            })
            .await
            .map_err(map_email_conflict)?;
        uow.commit().await?;

        info!(user_id = %abbrev_uuid(&created.id), "Registered new user");
        Ok(created.into())
    }

    /// Replace the password of a signed-in user after checking the current one.
    #[instrument(skip_all, fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn change_password(&self, user_id: UserId, current_password: &str, new_password: &str) -> Result<()> {
        let mut uow = self.db.begin().await?;
        uow.lock_user(user_id).await?;

        let user = uow.users().find_by_id(user_id).await?.ok_or(Error::UserNotFound)?;
        if !user.is_active {
            return Err(Error::UserInactive);
        }
        let stored_hash = user.password_hash().ok_or(Error::InvalidLoginMethod)?.to_string();

        if current_password.is_empty() {
            return Err(Error::PasswordRequired);
        }
        if !verify_password(&self.hasher, user.id, &stored_hash, current_password).await? {
            warn!("Change-password rejected: current password mismatch");
            return Err(Error::InvalidCredentials);
        }

        check_password_policy(new_password, &self.policy)?;
        let password_hash = hash_password(&self.hasher, new_password).await?;

        let now = self.clock.now();
        uow.users()
            .update(user.id, &UserUpdateDBRequest::at(now).password_hash(password_hash))
            .await?;
        uow.commit().await?;

        info!("Password changed");
        Ok(())
    }
}

/// A unique violation on insert means another request registered the email first.
pub(crate) fn map_email_conflict(err: DbError) -> Error {
    if err.is_email_conflict() {
        Error::EmailTaken
    } else {
        Error::Store(err)
    }
}
