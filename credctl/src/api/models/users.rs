//! API request models for user provisioning.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{services::provisioning::CreateUserRequest, types::Role};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserCreate {
    pub email: String,
    /// MANAGER or EMPLOYEE.
    pub role: Role,
    pub office: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
}

impl From<UserCreate> for CreateUserRequest {
    fn from(body: UserCreate) -> Self {
        Self {
            email: body.email,
            role: body.role,
            office: body.office,
            name: body.name,
            phone: body.phone,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}
