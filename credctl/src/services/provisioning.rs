//! Role-scoped account provisioning.
//!
//! The hierarchy is ADMIN > MANAGER > EMPLOYEE:
//!
//! | requester | may create          | sees in listings                         |
//! |-----------|---------------------|------------------------------------------|
//! | ADMIN     | MANAGER, EMPLOYEE   | every active MANAGER and EMPLOYEE        |
//! | MANAGER   | EMPLOYEE            | active EMPLOYEEs of its own office       |
//! | EMPLOYEE  | nothing             | nothing                                  |
//!
//! Legacy OBSERVER accounts and deactivated accounts are treated like EMPLOYEE.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};
use utoipa::ToSchema;

use super::{UserProfile, auth::map_email_conflict, hash_password, validate_email};
use crate::{
    auth::{
        password::PasswordHasher,
        random::{RandomSource, generate_password},
    },
    clock::Clock,
    config::ProvisioningConfig,
    db::{
        Database,
        models::users::{UserCreateDBRequest, UserDBResponse, UserFilter},
    },
    errors::{Error, Result},
    types::{Role, UserId, abbrev_uuid},
};

#[derive(Debug, Clone)]
pub struct CreateUserRequest {
    pub email: String,
    pub role: Role,
    pub office: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
}

/// A freshly provisioned account. `generated_password` is the only copy of the plaintext.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProvisionedUser {
    #[serde(flatten)]
    pub user: UserProfile,
    pub generated_password: String,
}

/// What a requester is allowed to do, derived from its stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Capability {
    Admin,
    Manager { office: Option<String> },
    None,
}

impl Capability {
    fn of(user: &UserDBResponse) -> Self {
        if !user.is_active {
            return Capability::None;
        }
        match user.role {
            Role::Admin => Capability::Admin,
            Role::Manager => Capability::Manager {
                office: user.office.clone().filter(|o| !o.trim().is_empty()),
            },
            Role::Employee | Role::Observer => Capability::None,
        }
    }
}

#[derive(Clone)]
pub struct ProvisioningService {
    db: Arc<dyn Database>,
    hasher: PasswordHasher,
    random: Arc<dyn RandomSource>,
    clock: Arc<dyn Clock>,
    config: ProvisioningConfig,
}

impl ProvisioningService {
    pub fn new(
        db: Arc<dyn Database>,
        hasher: PasswordHasher,
        random: Arc<dyn RandomSource>,
        clock: Arc<dyn Clock>,
        config: ProvisioningConfig,
    ) -> Self {
        Self {
            db,
            hasher,
            random,
            clock,
            config,
        }
    }

    /// Create a MANAGER or EMPLOYEE account on behalf of `requester_id` and return it with a
    /// generated one-time password.
    #[instrument(skip_all, fields(requester = %abbrev_uuid(&requester_id), role = %request.role), err)]
    pub async fn create_user(&self, requester_id: UserId, request: CreateUserRequest) -> Result<ProvisionedUser> {
        let email = validate_email(&request.email)?;
        if !request.role.is_office_scoped() {
            return Err(Error::RoleNotProvisionable { role: request.role });
        }
        let office = request
            .office
            .as_deref()
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .ok_or(Error::OfficeRequired)?
            .to_string();

        let mut uow = self.db.begin().await?;
        let requester = uow.users().find_by_id(requester_id).await?.ok_or(Error::CreatorNotFound)?;

        match Capability::of(&requester) {
            Capability::Admin => {}
            Capability::Manager { .. } if request.role == Role::Employee => {}
            Capability::Manager { .. } => return Err(Error::ManagerCanOnlyCreateEmployee),
            Capability::None => return Err(Error::Forbidden { action: "create users" }),
        }

        if uow.users().find_by_email(email).await?.is_some() {
            return Err(Error::EmailTaken);
        }

        let generated_password = generate_password(self.random.as_ref(), self.config.generated_password_length);
        let password_hash = hash_password(&self.hasher, &generated_password).await?;

        let now = self.clock.now();
        let created = uow
            .users()
            .create(&UserCreateDBRequest {
                email: email.to_string(),
                name: request.name,
                image: None,
                password_hash: Some(password_hash),
                role: request.role,
                office: Some(office),
                phone: request.phone,
                is_active: true,
                email_verified: Some(now),
                created_by: Some(requester.id),
                created_at: now,
            })
            .await
            .map_err(map_email_conflict)?;
        uow.commit().await?;

        info!(user_id = %abbrev_uuid(&created.id), "Provisioned user");
        Ok(ProvisionedUser {
            user: created.into(),
            generated_password,
        })
    }

    /// Accounts visible to `requester_id`, newest first.
    #[instrument(skip_all, fields(requester = %abbrev_uuid(&requester_id)), err)]
    pub async fn list_users(&self, requester_id: UserId) -> Result<Vec<UserProfile>> {
        let mut uow = self.db.begin().await?;
        let requester = uow.users().find_by_id(requester_id).await?.ok_or(Error::RequesterNotFound)?;

        let filter = match Capability::of(&requester) {
            Capability::Admin => UserFilter {
                roles: vec![Role::Manager, Role::Employee],
                active_only: true,
                ..Default::default()
            },
            Capability::Manager { office: Some(office) } => UserFilter {
                roles: vec![Role::Employee],
                office: Some(office),
                exclude_id: Some(requester.id),
                active_only: true,
            },
            Capability::Manager { office: None } => return Err(Error::ManagerHasNoOffice),
            Capability::None => return Err(Error::Forbidden { action: "list users" }),
        };

        let users = uow.users().list(&filter).await?;
        // read-only, nothing to commit
        drop(uow);

        Ok(users.into_iter().map(UserProfile::from).collect())
    }
}
