//! Persistence seams and their Postgres adapters.

pub mod credentials;
pub mod registrations;

pub use credentials::{Credential, CredentialStore, PgCredentialStore};
pub use registrations::{
    NewRegistration, PgRegistrationStore, Registration, RegistrationStatus, RegistrationStore,
};

use tracing::error;

use crate::error::ApiError;

pub(crate) fn db_error(context: &str, err: &sqlx::Error) -> ApiError {
    error!("{context}: {err}");
    ApiError::unexpected("Unexpected database error")
}
