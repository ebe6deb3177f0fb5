//! API request models for sign-in and sign-up.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::services::{
    LoginProvider,
    auth::{SigninRequest, SignupRequest},
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SigninBody {
    pub email: String,
    /// Ignored for federated sign-in.
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub provider: LoginProvider,
}

impl From<SigninBody> for SigninRequest {
    fn from(body: SigninBody) -> Self {
        Self {
            email: body.email,
            password: body.password,
            provider: body.provider,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SignupBody {
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub provider: LoginProvider,
}

impl From<SignupBody> for SignupRequest {
    fn from(body: SignupBody) -> Self {
        Self {
            email: body.email,
            name: body.name,
            image: body.image,
            password: body.password,
            provider: body.provider,
        }
    }
}
