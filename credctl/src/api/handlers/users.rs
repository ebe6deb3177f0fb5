use axum::{Json, extract::State, http::StatusCode};

use crate::{
    AppState,
    api::models::users::{ChangePasswordRequest, UserCreate},
    auth::current_user::Requester,
    errors::Error,
    services::{UserProfile, provisioning::ProvisionedUser},
};

/// Provision a MANAGER or EMPLOYEE account
#[utoipa::path(
    post,
    path = "/users",
    request_body = UserCreate,
    tag = "users",
    responses(
        (status = 201, description = "User created; the generated password is returned only here", body = ProvisionedUser),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Missing requester"),
        (status = 403, description = "Requester may not create this user"),
        (status = 404, description = "Requester does not exist"),
        (status = 409, description = "Email is already registered"),
    ),
    security(("RequesterHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_user(
    State(state): State<AppState>,
    Requester(requester): Requester,
    Json(body): Json<UserCreate>,
) -> Result<(StatusCode, Json<ProvisionedUser>), Error> {
    let created = state.provisioning.create_user(requester, body.into()).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// List the users visible to the requester
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    responses(
        (status = 200, description = "Visible users, newest first", body = [UserProfile]),
        (status = 401, description = "Missing requester"),
        (status = 403, description = "Requester may not list users"),
        (status = 404, description = "Requester does not exist"),
    ),
    security(("RequesterHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(State(state): State<AppState>, Requester(requester): Requester) -> Result<Json<Vec<UserProfile>>, Error> {
    let users = state.provisioning.list_users(requester).await?;
    Ok(Json(users))
}

/// Change the requester's own password
#[utoipa::path(
    post,
    path = "/users/me/password",
    request_body = ChangePasswordRequest,
    tag = "users",
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "New password does not meet the length policy"),
        (status = 401, description = "Missing requester or wrong current password"),
    ),
    security(("RequesterHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    Requester(requester): Requester,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<StatusCode, Error> {
    state
        .auth
        .change_password(requester, &body.current_password, &body.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
