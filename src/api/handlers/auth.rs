//! Session endpoints: login, logout, verify, refresh and continue.

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::api::dto::{
    ContinueResponse, LoginRequest, LoginResponse, LogoutRequest, RefreshResponse, TokenStrings,
    VerifyParams,
};
use crate::api::AppState;
use crate::error::ApiError;

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session tokens or a pending-confirmation token", body = LoginResponse),
        (status = 401, description = "Incorrect username or password"),
        (status = 422, description = "Malformed request"),
        (status = 429, description = "Too many attempts")
    ),
    tag = "auth"
)]
pub async fn login(
    state: Extension<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    request.validate()?;
    let outcome = state.auth.login(&request.username, &request.password).await?;
    Ok(Json(LoginResponse::from(outcome)))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Invalid refresh token"),
        (status = 422, description = "Malformed request")
    ),
    tag = "auth"
)]
pub async fn logout(
    state: Extension<Arc<AppState>>,
    Json(request): Json<LogoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    request.validate()?;
    state.auth.logout(&request.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/auth/verify",
    params(
        ("token" = String, Query, description = "Access token"),
        ("route_name" = String, Query, description = "Route the client wants to access"),
        ("customer_id" = Option<String>, Query, description = "Customer named in the request"),
        ("account_id" = Option<String>, Query, description = "Account named in the request")
    ),
    responses(
        (status = 204, description = "Request is authorized"),
        (status = 401, description = "Invalid token or identity mismatch"),
        (status = 403, description = "Role not allowed for route or account not owned")
    ),
    tag = "auth"
)]
pub async fn verify(
    state: Extension<Arc<AppState>>,
    Query(params): Query<VerifyParams>,
) -> Result<impl IntoResponse, ApiError> {
    params.validate()?;
    state
        .auth
        .verify(
            &params.token,
            &params.route_name,
            &params.customer_id,
            &params.account_id,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = TokenStrings,
    responses(
        (status = 200, description = "A fresh access token", body = RefreshResponse),
        (status = 401, description = "Access token not expired yet, or refresh token invalid"),
        (status = 422, description = "Malformed request")
    ),
    tag = "auth"
)]
pub async fn refresh(
    state: Extension<Arc<AppState>>,
    Json(request): Json<TokenStrings>,
) -> Result<impl IntoResponse, ApiError> {
    request.validate()?;
    let new_access_token = state
        .auth
        .refresh(&request.access_token, &request.refresh_token)
        .await?;
    Ok(Json(RefreshResponse { new_access_token }))
}

#[utoipa::path(
    post,
    path = "/auth/continue",
    request_body = TokenStrings,
    responses(
        (status = 200, description = "Session is still live", body = ContinueResponse),
        (status = 401, description = "Session cannot be resumed"),
        (status = 422, description = "Malformed request")
    ),
    tag = "auth"
)]
pub async fn continue_session(
    state: Extension<Arc<AppState>>,
    Json(request): Json<TokenStrings>,
) -> Result<impl IntoResponse, ApiError> {
    request.validate()?;
    let homepage = state
        .auth
        .continue_session(&request.access_token, &request.refresh_token)
        .await?;
    Ok(Json(ContinueResponse { homepage }))
}
