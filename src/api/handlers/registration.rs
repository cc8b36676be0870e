//! Sign-up endpoints: register, check, resend and finish.

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::api::dto::{
    CheckRegistrationResponse, OneTimeTokenParams, RegistrationRequest, RegistrationResponse,
    ResendByEmailRequest,
};
use crate::api::AppState;
use crate::error::ApiError;
use crate::service::ResendTarget;

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegistrationRequest,
    responses(
        (status = 200, description = "Registration accepted, confirmation email sent", body = RegistrationResponse),
        (status = 403, description = "Email already in use"),
        (status = 409, description = "Username is already taken"),
        (status = 422, description = "Malformed request"),
        (status = 429, description = "Too many attempts")
    ),
    tag = "registration"
)]
pub async fn register(
    state: Extension<Arc<AppState>>,
    Json(request): Json<RegistrationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    request.validate()?;
    let receipt = state
        .registration
        .register(request.to_new_registration(), &request.password)
        .await?;
    Ok(Json(RegistrationResponse {
        email: receipt.email,
        registered_on: receipt.registered_on,
    }))
}

#[utoipa::path(
    get,
    path = "/auth/register/check",
    params(("ott" = String, Query, description = "One-time token from the confirmation link")),
    responses(
        (status = 200, description = "Registration status", body = CheckRegistrationResponse),
        (status = 401, description = "Invalid or expired one-time token"),
        (status = 404, description = "Registration not found")
    ),
    tag = "registration"
)]
pub async fn check(
    state: Extension<Arc<AppState>>,
    Query(params): Query<OneTimeTokenParams>,
) -> Result<impl IntoResponse, ApiError> {
    params.validate()?;
    let is_confirmed = state.registration.check_registration(&params.ott).await?;
    Ok(Json(CheckRegistrationResponse { is_confirmed }))
}

#[utoipa::path(
    get,
    path = "/auth/register/resend",
    params(("ott" = String, Query, description = "One-time token, accepted even when expired")),
    responses(
        (status = 204, description = "A new confirmation email was sent"),
        (status = 401, description = "Invalid one-time token"),
        (status = 404, description = "Registration not found"),
        (status = 422, description = "Resend throttled or already confirmed")
    ),
    tag = "registration"
)]
pub async fn resend_by_token(
    state: Extension<Arc<AppState>>,
    Query(params): Query<OneTimeTokenParams>,
) -> Result<impl IntoResponse, ApiError> {
    params.validate()?;
    state
        .registration
        .resend_link(ResendTarget::OneTimeToken(params.ott))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/auth/register/resend",
    request_body = ResendByEmailRequest,
    responses(
        (status = 204, description = "A new confirmation email was sent"),
        (status = 404, description = "Registration not found"),
        (status = 422, description = "Resend throttled or already confirmed")
    ),
    tag = "registration"
)]
pub async fn resend_by_email(
    state: Extension<Arc<AppState>>,
    Json(request): Json<ResendByEmailRequest>,
) -> Result<impl IntoResponse, ApiError> {
    request.validate()?;
    state
        .registration
        .resend_link(ResendTarget::Email(request.email))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/auth/register/finish",
    params(("ott" = String, Query, description = "One-time token from the confirmation link")),
    responses(
        (status = 204, description = "Registration confirmed, accounts created"),
        (status = 401, description = "Invalid or expired one-time token"),
        (status = 404, description = "Registration not found"),
        (status = 422, description = "Already confirmed"),
        (status = 500, description = "Account creation failed and was rolled back")
    ),
    tag = "registration"
)]
pub async fn finish(
    state: Extension<Arc<AppState>>,
    Query(params): Query<OneTimeTokenParams>,
) -> Result<impl IntoResponse, ApiError> {
    params.validate()?;
    state.registration.finish_registration(&params.ott).await?;
    Ok(StatusCode::NO_CONTENT)
}
