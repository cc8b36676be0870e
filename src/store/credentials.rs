//! Credential records, the refresh-token store and their Postgres adapter.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{error, Instrument};

use crate::authz::Role;
use crate::error::ApiError;
use crate::password::verify_password;
use crate::token::AccessClaims;

/// A persisted login identity. `customer_id` is present iff the role is
/// `user`; the pairing is checked by [`Credential::is_role_valid`] before any
/// token is minted from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub role: Role,
    pub customer_id: Option<String>,
}

impl Credential {
    #[must_use]
    pub fn is_role_valid(&self) -> bool {
        match (self.role, &self.customer_id) {
            (Role::User, None) => {
                error!("Credential has user role but no customer ID");
                false
            }
            (Role::Admin, Some(_)) => {
                error!("Credential has admin role but has a customer ID");
                false
            }
            _ => true,
        }
    }

    #[must_use]
    pub fn access_claims(&self) -> AccessClaims {
        AccessClaims::new(
            self.username.clone(),
            self.role,
            self.customer_id.clone().unwrap_or_default(),
        )
    }

    /// The frontend route this identity lands on after login.
    pub fn homepage(&self) -> Result<String, ApiError> {
        match (self.role, &self.customer_id) {
            (Role::Admin, None) => Ok("/customers".to_string()),
            (Role::User, Some(id)) if !id.is_empty() => Ok(format!("/customers/{id}")),
            _ => {
                error!("Unknown role or no customer ID");
                Err(ApiError::unexpected("Unexpected server-side error"))
            }
        }
    }
}

/// Persistence seam for credentials, the refresh-token hash set and account
/// ownership checks.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Resolve and password-check a credential. Wrong username and wrong
    /// password collapse into the same authentication error.
    async fn authenticate(&self, username: &str, password: &str) -> Result<Credential, ApiError>;

    async fn save_refresh_hash(&self, hash: &str) -> Result<(), ApiError>;

    /// Returns the number of rows removed; callers decide whether zero is an
    /// inconsistency.
    async fn delete_refresh_hash(&self, hash: &str) -> Result<u64, ApiError>;

    async fn refresh_hash_exists(&self, hash: &str) -> Result<bool, ApiError>;

    /// Re-resolve a credential by full identity (used when resuming a
    /// session, to confirm the account still exists).
    async fn find_credential(
        &self,
        username: &str,
        role: Role,
        customer_id: Option<&str>,
    ) -> Result<Credential, ApiError>;

    async fn account_belongs_to_customer(
        &self,
        account_id: &str,
        customer_id: &str,
    ) -> Result<bool, ApiError>;
}

/// Postgres-backed credential store.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

use super::db_error;

fn row_to_credential(row: &sqlx::postgres::PgRow) -> Credential {
    let role: String = row.get("role");
    Credential {
        username: row.get("username"),
        role: role.parse().unwrap_or(Role::User),
        customer_id: row.get("customer_id"),
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn authenticate(&self, username: &str, password: &str) -> Result<Credential, ApiError> {
        let query = "SELECT username, password, role, customer_id FROM users WHERE username = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| db_error("Error while querying user", &err))?;

        let Some(row) = row else {
            return Err(ApiError::authentication("Incorrect username or password"));
        };

        let hashed: String = row.get("password");
        if !verify_password(&hashed, password) {
            return Err(ApiError::authentication("Incorrect username or password"));
        }

        Ok(row_to_credential(&row))
    }

    async fn save_refresh_hash(&self, hash: &str) -> Result<(), ApiError> {
        let query = "INSERT INTO refresh_token_store (refresh_token_hash) VALUES ($1)";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| db_error("Error while storing refresh token hash", &err))?;
        Ok(())
    }

    async fn delete_refresh_hash(&self, hash: &str) -> Result<u64, ApiError> {
        let query = "DELETE FROM refresh_token_store WHERE refresh_token_hash = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| db_error("Error while deleting refresh token hash", &err))?;
        Ok(result.rows_affected())
    }

    async fn refresh_hash_exists(&self, hash: &str) -> Result<bool, ApiError> {
        let query =
            "SELECT EXISTS(SELECT 1 FROM refresh_token_store WHERE refresh_token_hash = $1)";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(hash)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| db_error("Error while checking if refresh token exists", &err))?;
        Ok(row.get::<bool, _>(0))
    }

    async fn find_credential(
        &self,
        username: &str,
        role: Role,
        customer_id: Option<&str>,
    ) -> Result<Credential, ApiError> {
        let query = "SELECT username, role, customer_id FROM users \
                     WHERE username = $1 AND role = $2 AND customer_id IS NOT DISTINCT FROM $3";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(username)
            .bind(role.to_string())
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| db_error("Error while checking if user exists", &err))?;

        match row {
            Some(row) => Ok(row_to_credential(&row)),
            None => {
                error!("User does not exist");
                Err(ApiError::authentication("Cannot continue"))
            }
        }
    }

    async fn account_belongs_to_customer(
        &self,
        account_id: &str,
        customer_id: &str,
    ) -> Result<bool, ApiError> {
        let query =
            "SELECT EXISTS(SELECT 1 FROM accounts WHERE customer_id = $1::bigint AND account_id = $2::bigint)";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(customer_id)
            .bind(account_id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| db_error("Error while checking if account belongs to customer", &err))?;
        Ok(row.get::<bool, _>(0))
    }
}
