//! Shared identifier and role types.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub type UserId = Uuid;
pub type ResetTokenId = Uuid;

/// First eight characters of a UUID, for log fields.
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

/// Account role. The hierarchy is ADMIN > MANAGER > EMPLOYEE.
///
/// `Observer` only appears on rows written by older deployments; it carries no capabilities and
/// cannot be assigned by this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Manager,
    Employee,
    Observer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Manager => "MANAGER",
            Role::Employee => "EMPLOYEE",
            Role::Observer => "OBSERVER",
        }
    }

    /// Roles that are bound to an office and may be created through provisioning.
    pub fn is_office_scoped(self) -> bool {
        matches!(self, Role::Manager | Role::Employee)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
