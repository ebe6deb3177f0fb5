use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};

use crate::{
    AppState,
    api::models::auth::{SigninBody, SignupBody},
    errors::Error,
    services::{LoginProvider, UserProfile},
};

/// The gateway asserts the email its identity provider verified. Anything else is unauthenticated.
fn check_federated_identity(headers: &HeaderMap, header: &str, email: &str) -> Result<(), Error> {
    let asserted = headers
        .get(header)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .ok_or(Error::Unauthenticated)?;
    if asserted.is_empty() || !asserted.eq_ignore_ascii_case(email.trim()) {
        return Err(Error::Unauthenticated);
    }
    Ok(())
}

/// Sign in with email and password, or on behalf of a federated identity provider
///
/// Federated sign-in returns the full profile for a registered email. It is only honoured when
/// the request carries `federated_identity_header` naming the same email, which the gateway in
/// front of credctl sets after its provider has authenticated the user and strips from client
/// requests.
#[utoipa::path(
    post,
    path = "/authentication/signin",
    request_body = SigninBody,
    tag = "authentication",
    responses(
        (status = 200, description = "Signed in", body = UserProfile),
        (status = 400, description = "Missing or malformed email or password"),
        (status = 401, description = "Invalid credentials, the account only signs in through a provider, or federated sign-in without a matching gateway identity"),
        (status = 403, description = "Account is inactive"),
        (status = 404, description = "No account for this email"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn signin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SigninBody>,
) -> Result<Json<UserProfile>, Error> {
    if body.provider == LoginProvider::Federated {
        check_federated_identity(&headers, &state.config.federated_identity_header, &body.email)?;
    }
    let profile = state.auth.signin(body.into()).await?;
    Ok(Json(profile))
}

/// Register a new account with email and password
#[utoipa::path(
    post,
    path = "/authentication/signup",
    request_body = SignupBody,
    tag = "authentication",
    responses(
        (status = 201, description = "Account created", body = UserProfile),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Sign-up through an identity provider is not allowed"),
        (status = 409, description = "Email is already registered"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn signup(State(state): State<AppState>, Json(body): Json<SignupBody>) -> Result<(StatusCode, Json<UserProfile>), Error> {
    let profile = state.auth.signup(body.into()).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{services::UserProfile, test_utils::TestContext, types::Role};

    const FEDERATED: &str = "x-credctl-federated-email";

    #[test_log::test(tokio::test)]
    async fn test_signup_and_signin() {
        let ctx = TestContext::new();
        let server = ctx.server();

        let response = server
            .post("/authentication/signup")
            .json(&json!({"email": "a@x.com", "name": "Ana", "password": "secret123"}))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        let created: UserProfile = response.json();
        assert_eq!(created.role, Role::Employee);
        assert!(created.office.is_none());

        let body: serde_json::Value = response.json();
        assert!(body.get("password_hash").is_none());
        assert!(body.get("office").is_some());

        let response = server
            .post("/authentication/signin")
            .json(&json!({"email": "a@x.com", "password": "secret123"}))
            .await;
        response.assert_status_ok();
        let profile: UserProfile = response.json();
        assert_eq!(profile.id, created.id);
        assert!(profile.last_login.is_some());

        let response = server
            .post("/authentication/signin")
            .json(&json!({"email": "a@x.com", "password": "wrong"}))
            .await;
        response.assert_status_unauthorized();
        let body: serde_json::Value = response.json();
        assert_eq!(body["error"], "authentication");
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let ctx = TestContext::new();
        let server = ctx.server();

        server
            .post("/authentication/signup")
            .json(&json!({"email": "a@x.com", "password": "secret123"}))
            .await
            .assert_status(axum::http::StatusCode::CREATED);

        server
            .post("/authentication/signup")
            .json(&json!({"email": "a@x.com", "password": "secret123"}))
            .await
            .assert_status(axum::http::StatusCode::CONFLICT);

        server
            .post("/authentication/signup")
            .json(&json!({"email": "b@x.com", "provider": "federated"}))
            .await
            .assert_status_forbidden();

        server
            .post("/authentication/signin")
            .json(&json!({"email": "nope", "password": "secret123"}))
            .await
            .assert_status_bad_request();

        server
            .post("/authentication/signin")
            .add_header(FEDERATED, "new@x.com")
            .json(&json!({"email": "new@x.com", "provider": "federated"}))
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn test_federated_signin_requires_gateway_identity() {
        let ctx = TestContext::new();
        let id = ctx.create_user("fed@x.com", Role::Employee, Some("Lima"), None).await;
        let server = ctx.server();

        // a bare request cannot fetch someone else's profile
        let response = server
            .post("/authentication/signin")
            .json(&json!({"email": "fed@x.com", "provider": "federated"}))
            .await;
        response.assert_status_unauthorized();
        assert!(response.text().find(&id.to_string()).is_none());

        server
            .post("/authentication/signin")
            .add_header(FEDERATED, "other@x.com")
            .json(&json!({"email": "fed@x.com", "provider": "federated"}))
            .await
            .assert_status_unauthorized();

        let response = server
            .post("/authentication/signin")
            .add_header(FEDERATED, "FED@x.com")
            .json(&json!({"email": "fed@x.com", "provider": "google"}))
            .await;
        response.assert_status_ok();
        let profile: UserProfile = response.json();
        assert_eq!(profile.id, id);
    }
}
