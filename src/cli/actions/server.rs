use crate::api::{self, AppState};
use crate::authz::RolePermissions;
use crate::email::LogEmailSender;
use crate::rate_limit::VisitorRegistry;
use crate::service::{AuthService, RegistrationService, ServiceConfig};
use crate::store::{PgCredentialStore, PgRegistrationStore};
use crate::token::{KeyMaterial, TokenCodec};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{path::Path, sync::Arc, time::Duration};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: SecretString,
    pub key_path: String,
    pub frontend_base_url: String,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the signing key cannot be loaded, the database is
/// unreachable, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let keys = KeyMaterial::load_or_generate(Path::new(&args.key_path))?;
    let codec = Arc::new(TokenCodec::new(keys));

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(args.dsn.expose_secret())
        .await
        .context("Failed to connect to database")?;

    let credentials = Arc::new(PgCredentialStore::new(pool.clone()));
    let registrations = Arc::new(PgRegistrationStore::new(pool.clone()));

    let auth = Arc::new(AuthService::new(
        credentials,
        registrations.clone(),
        codec.clone(),
        RolePermissions::new(),
    ));

    let config = ServiceConfig::new(args.frontend_base_url.clone());
    let registration = Arc::new(RegistrationService::new(
        registrations,
        Arc::new(LogEmailSender),
        codec,
        config,
    ));

    let visitors = VisitorRegistry::new();
    let _sweeper = visitors.spawn_sweeper();

    let state = Arc::new(AppState {
        auth,
        registration,
        visitors,
    });

    api::serve(args.port, state, pool, &args.frontend_base_url).await
}
