use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::password_resets::{AccountLookupQuery, PasswordResetConfirmRequest, PasswordResetRequest, PasswordResetValidateRequest},
    errors::Error,
    services::password_reset::{AccountSummary, ResetRequested, ResetValidated},
};

/// Start a password reset. Returns the code for the caller to deliver to the user.
#[utoipa::path(
    post,
    path = "/authentication/password-resets",
    request_body = PasswordResetRequest,
    tag = "password-resets",
    responses(
        (status = 201, description = "Reset code issued", body = ResetRequested),
        (status = 404, description = "No active account for this email"),
        (status = 429, description = "A code was issued too recently; see Retry-After"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetRequest>,
) -> Result<(StatusCode, Json<ResetRequested>), Error> {
    let requested = state.password_resets.request(&request.email).await?;
    Ok((StatusCode::CREATED, Json(requested)))
}

/// Exchange a reset code for a confirmation token
#[utoipa::path(
    post,
    path = "/authentication/password-resets/validate",
    request_body = PasswordResetValidateRequest,
    tag = "password-resets",
    responses(
        (status = 200, description = "Code accepted", body = ResetValidated),
        (status = 401, description = "Invalid or expired code"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn validate_password_reset(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetValidateRequest>,
) -> Result<Json<ResetValidated>, Error> {
    let validated = state.password_resets.validate(&request.email, &request.code).await?;
    Ok(Json(validated))
}

/// Set a new password using the confirmation token
#[utoipa::path(
    post,
    path = "/authentication/password-resets/confirm",
    request_body = PasswordResetConfirmRequest,
    tag = "password-resets",
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "New password does not meet the length policy"),
        (status = 401, description = "Token invalid, expired, mismatched or already used"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetConfirmRequest>,
) -> Result<StatusCode, Error> {
    state
        .password_resets
        .confirm(&request.email, &request.token, &request.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Check that an active account exists for an email
#[utoipa::path(
    get,
    path = "/authentication/accounts/lookup",
    params(AccountLookupQuery),
    tag = "password-resets",
    responses(
        (status = 200, description = "Account exists", body = AccountSummary),
        (status = 404, description = "No active account for this email"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn lookup_account(State(state): State<AppState>, Query(query): Query<AccountLookupQuery>) -> Result<Json<AccountSummary>, Error> {
    let account = state.password_resets.lookup_account(&query.email).await?;
    Ok(Json(account))
}
