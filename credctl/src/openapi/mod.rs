//! OpenAPI documentation for the credctl HTTP surface.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
};

use crate::{
    api::{
        handlers,
        models::{
            auth::{SigninBody, SignupBody},
            password_resets::{PasswordResetConfirmRequest, PasswordResetRequest, PasswordResetValidateRequest},
            users::{ChangePasswordRequest, UserCreate},
        },
    },
    services::{
        LoginProvider, UserProfile,
        password_reset::{AccountSummary, ResetRequested, ResetValidated},
        provisioning::ProvisionedUser,
    },
    types::Role,
};

/// Documents the gateway-supplied requester header used by the admin routes.
struct RequesterHeaderAddon;

impl Modify for RequesterHeaderAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "RequesterHeader".to_string(),
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "x-credctl-user-id",
                    "UUID of the authenticated caller, set by the gateway in front of credctl. The header name is configurable.",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "credctl API",
        description = "Sign-in, sign-up, role-scoped user provisioning and password reset."
    ),
    paths(
        handlers::auth::signin,
        handlers::auth::signup,
        handlers::password_resets::request_password_reset,
        handlers::password_resets::validate_password_reset,
        handlers::password_resets::confirm_password_reset,
        handlers::password_resets::lookup_account,
        handlers::users::create_user,
        handlers::users::list_users,
        handlers::users::change_password,
    ),
    components(schemas(
        SigninBody,
        SignupBody,
        LoginProvider,
        UserProfile,
        Role,
        PasswordResetRequest,
        PasswordResetValidateRequest,
        PasswordResetConfirmRequest,
        ResetRequested,
        ResetValidated,
        AccountSummary,
        UserCreate,
        ProvisionedUser,
        ChangePasswordRequest,
    )),
    modifiers(&RequesterHeaderAddon),
    tags(
        (name = "authentication", description = "Sign-in and sign-up"),
        (name = "password-resets", description = "Code-based password reset"),
        (name = "users", description = "User provisioning, under /admin/api/v1"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        for expected in [
            "/authentication/signin",
            "/authentication/signup",
            "/authentication/password-resets",
            "/authentication/password-resets/validate",
            "/authentication/password-resets/confirm",
            "/authentication/accounts/lookup",
            "/users",
            "/users/me/password",
        ] {
            assert!(paths.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn test_user_ids_are_uuid_strings() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let schemas = &doc["components"]["schemas"];
        for (schema, field) in [("UserProfile", "id"), ("ResetRequested", "user_id"), ("AccountSummary", "id")] {
            let property = &schemas[schema]["properties"][field];
            assert_eq!(property["type"], "string", "{schema}.{field}");
            assert_eq!(property["format"], "uuid", "{schema}.{field}");
        }
    }

    #[test]
    fn test_requester_security_scheme_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("RequesterHeader"));
    }
}
