//! HTTP adapter: router, middleware and server bootstrap.

use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::{ConnectInfo, MatchedPath, Request},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use sqlx::PgPool;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use url::Url;
use utoipa::OpenApi;

pub mod dto;
pub mod handlers;

use crate::error::ApiError;
use crate::rate_limit::VisitorRegistry;
use crate::service::{AuthService, RegistrationService};

/// Shared handler dependencies.
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub registration: Arc<RegistrationService>,
    pub visitors: Arc<VisitorRegistry>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::auth::login,
        handlers::auth::logout,
        handlers::auth::verify,
        handlers::auth::refresh,
        handlers::auth::continue_session,
        handlers::registration::register,
        handlers::registration::check,
        handlers::registration::resend_by_token,
        handlers::registration::resend_by_email,
        handlers::registration::finish,
    ),
    components(schemas(
        handlers::health::Health,
        dto::LoginRequest,
        dto::LoginResponse,
        dto::LogoutRequest,
        dto::TokenStrings,
        dto::RefreshResponse,
        dto::ContinueResponse,
        dto::RegistrationRequest,
        dto::RegistrationResponse,
        dto::CheckRegistrationResponse,
        dto::ResendByEmailRequest,
    )),
    tags(
        (name = "auth", description = "Session issuance and authorization"),
        (name = "registration", description = "Account sign-up and confirmation"),
        (name = "health", description = "Service health")
    )
)]
struct ApiDoc;

/// Build the full application router. Only the credential-accepting routes
/// (login, register) sit behind the per-IP limiter.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    let gated = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/register", post(handlers::registration::register))
        .route_layer(middleware::from_fn(rate_limit));

    Router::new()
        .merge(gated)
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/verify", get(handlers::auth::verify))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/continue", post(handlers::auth::continue_session))
        .route(
            "/auth/register/check",
            get(handlers::registration::check),
        )
        .route(
            "/auth/register/resend",
            get(handlers::registration::resend_by_token)
                .post(handlers::registration::resend_by_email),
        )
        .route(
            "/auth/register/finish",
            post(handlers::registration::finish),
        )
        .route("/health", get(handlers::health::health))
        .route(
            "/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .layer(Extension(state))
}

/// Admission check for credential-accepting routes. Preflight requests pass
/// through; the browser retries the real request anyway.
async fn rate_limit(
    Extension(state): Extension<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let ip = extract_client_ip(request.headers()).or_else(|| {
        connect_info.map(|ConnectInfo(addr)| addr.ip().to_string())
    });
    let Some(ip) = ip else {
        // No way to attribute the request; fail closed.
        return ApiError::RateLimited.into_response();
    };

    if !state.visitors.admit(&ip) {
        return ApiError::RateLimited.into_response();
    }
    next.run(request).await
}

/// Extract a client IP for rate limiting from common proxy headers.
pub(crate) fn extract_client_ip(headers: &axum::http::HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    pool: PgPool,
    frontend_base_url: &str,
) -> Result<()> {
    let origin = frontend_origin(frontend_base_url)?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_origin(AllowOrigin::exact(origin));

    let app = router(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors),
        )
        .layer(Extension(pool));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;
    info!("Listening on [::]:{port}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}
