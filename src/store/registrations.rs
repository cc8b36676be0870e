//! Registration records, the resend-throttle policy and their Postgres
//! adapter.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use tracing::{error, Instrument};

use super::db_error;
use crate::authz::Role;
use crate::error::ApiError;
use crate::token::OneTimeClaims;

/// Lifecycle of a registration. Pending rows have no customer yet; confirmed
/// rows point at the customer created for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    Pending,
    Confirmed,
}

impl RegistrationStatus {
    #[must_use]
    pub fn as_db_value(self) -> &'static str {
        match self {
            Self::Pending => "0",
            Self::Confirmed => "1",
        }
    }

    fn from_db_value(value: &str) -> Self {
        if value == "1" {
            Self::Confirmed
        } else {
            Self::Pending
        }
    }
}

/// Identity fields collected at sign-up, before any record exists.
#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub email: String,
    pub name: String,
    pub date_of_birth: String,
    pub country: String,
    pub zipcode: String,
    pub username: String,
}

/// A sign-up in progress or completed. `customer_id` and `confirmed_on` stay
/// empty until [`Registration::confirm`] runs.
#[derive(Debug, Clone)]
pub struct Registration {
    pub email: String,
    pub customer_id: Option<String>,
    pub name: String,
    pub date_of_birth: String,
    pub country: String,
    pub zipcode: String,
    pub status: RegistrationStatus,

    pub username: String,
    pub hashed_password: String,
    pub role: Role,

    pub email_attempts: i32,

    pub registered_on: DateTime<Utc>,
    pub last_emailed_on: DateTime<Utc>,
    pub confirmed_on: Option<DateTime<Utc>>,
}

impl Registration {
    /// Builds a pending registration with zero email attempts; the send path
    /// records every email, including the first one.
    #[must_use]
    pub fn pending(details: NewRegistration, hashed_password: String, now: DateTime<Utc>) -> Self {
        Self {
            email: details.email,
            customer_id: None,
            name: details.name,
            date_of_birth: details.date_of_birth,
            country: details.country,
            zipcode: details.zipcode,
            status: RegistrationStatus::Pending,
            username: details.username,
            hashed_password,
            role: Role::User,
            email_attempts: 0,
            registered_on: now,
            last_emailed_on: now,
            confirmed_on: None,
        }
    }

    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.customer_id.is_some()
            && self.status == RegistrationStatus::Confirmed
            && self.confirmed_on.is_some()
    }

    /// Marks the registration confirmed against the customer created for it.
    #[must_use]
    pub fn confirm(mut self, customer_id: String, at: DateTime<Utc>) -> Self {
        self.customer_id = Some(customer_id);
        self.status = RegistrationStatus::Confirmed;
        self.confirmed_on = Some(at);
        self
    }

    /// The resend throttle: no resends once confirmed, at most
    /// `max_attempts` emails per day, and at least `cooldown_secs` between
    /// consecutive sends.
    pub fn ensure_can_resend(
        &self,
        now: DateTime<Utc>,
        max_attempts: i32,
        cooldown_secs: i64,
    ) -> Result<(), ApiError> {
        if self.is_confirmed() {
            error!("Cannot resend email as registration is already confirmed");
            return Err(ApiError::validation("Already confirmed"));
        }
        if self.email_attempts >= max_attempts {
            error!("Cannot resend email as maximum daily attempts reached");
            return Err(ApiError::validation("Maximum daily attempts reached"));
        }
        if now - self.last_emailed_on <= Duration::seconds(cooldown_secs) {
            error!("Cannot resend email as attempts made are too frequent");
            return Err(ApiError::validation("Too many attempts"));
        }
        Ok(())
    }

    #[must_use]
    pub fn one_time_claims(&self) -> OneTimeClaims {
        OneTimeClaims::new(self.email.clone())
    }
}

/// Persistence seam for the registration lifecycle.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Errors when the email already belongs to a customer or to another
    /// registration; the message distinguishes confirmed from unconfirmed so
    /// the client can suggest resending the link.
    async fn is_email_used(&self, email: &str) -> Result<(), ApiError>;

    /// Errors when the username exists either as a credential or in another
    /// registration.
    async fn is_username_taken(&self, username: &str) -> Result<(), ApiError>;

    async fn save(&self, registration: &Registration) -> Result<(), ApiError>;

    /// Bumps the attempt counter and stamps the send time after another
    /// confirmation email goes out.
    async fn update_last_emailed(&self, email: &str, at: DateTime<Utc>) -> Result<(), ApiError>;

    /// A registration may or may not exist for a username during login, so
    /// absence is not an error here.
    async fn find_by_login_details(&self, username: &str)
        -> Result<Option<Registration>, ApiError>;

    /// The registration is expected to exist; absence maps to a not-found
    /// error.
    async fn find_by_email(&self, email: &str) -> Result<Registration, ApiError>;

    /// Atomically creates the customer, the credential and two starter bank
    /// accounts for a confirmed registration. Returns the new customer id.
    /// All inserts roll back together on any failure.
    async fn create_accounts_transaction(
        &self,
        registration: &Registration,
        at: DateTime<Utc>,
    ) -> Result<String, ApiError>;

    /// Writes the confirmed state back to the registration row and flips the
    /// customer record active.
    async fn update(&self, registration: &Registration) -> Result<(), ApiError>;
}

/// Postgres-backed registration store.
#[derive(Clone)]
pub struct PgRegistrationStore {
    pool: PgPool,
}

impl PgRegistrationStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_registration(row: &sqlx::postgres::PgRow) -> Registration {
    let status: String = row.get("status");
    let role: String = row.get("role");
    Registration {
        email: row.get("email"),
        customer_id: row.get("customer_id"),
        name: row.get("name"),
        date_of_birth: row.get("date_of_birth"),
        country: row.get("country"),
        zipcode: row.get("zipcode"),
        status: RegistrationStatus::from_db_value(&status),
        username: row.get("username"),
        hashed_password: row.get("password"),
        role: role.parse().unwrap_or(Role::User),
        email_attempts: row.get("email_attempts"),
        registered_on: row.get("created_on"),
        last_emailed_on: row.get("last_emailed_on"),
        confirmed_on: row.get("confirmed_on"),
    }
}

const REGISTRATION_COLUMNS: &str = "email, customer_id, name, date_of_birth, country, zipcode, \
     status, username, password, role, email_attempts, created_on, last_emailed_on, confirmed_on";

#[async_trait]
impl RegistrationStore for PgRegistrationStore {
    async fn is_email_used(&self, email: &str) -> Result<(), ApiError> {
        let query = "SELECT EXISTS(SELECT 1 FROM customers WHERE email = $1)";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let customer_exists: bool = sqlx::query(query)
            .bind(email)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| {
                db_error(
                    "Error while checking if customer with given email already exists",
                    &err,
                )
            })?
            .get(0);
        if customer_exists {
            error!("Customer with given email already exists");
            return Err(ApiError::authorization("Email is already used"));
        }

        let query = "SELECT confirmed_on FROM registrations WHERE email = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| {
                db_error(
                    "Error while checking if registration with given email already exists",
                    &err,
                )
            })?;

        if let Some(row) = row {
            error!("Registration with given email already exists");
            let confirmed_on: Option<DateTime<Utc>> = row.get("confirmed_on");
            let suffix = if confirmed_on.is_some() {
                "and already confirmed"
            } else {
                "but not confirmed"
            };
            return Err(ApiError::authorization(format!(
                "Email is already registered for an account {suffix}"
            )));
        }

        Ok(())
    }

    async fn is_username_taken(&self, username: &str) -> Result<(), ApiError> {
        let query = "SELECT EXISTS((SELECT 1 FROM users WHERE username = $1) \
                     UNION (SELECT 1 FROM registrations WHERE username = $1))";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let taken: bool = sqlx::query(query)
            .bind(username)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| db_error("Error while checking if username is taken", &err))?
            .get(0);

        if taken {
            error!("User or registration with given username already exists");
            return Err(ApiError::conflict("Username is already taken"));
        }
        Ok(())
    }

    async fn save(&self, registration: &Registration) -> Result<(), ApiError> {
        let query = "INSERT INTO registrations \
             (email, name, date_of_birth, country, zipcode, username, password, role, \
              email_attempts, created_on, last_emailed_on, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(&registration.email)
            .bind(&registration.name)
            .bind(&registration.date_of_birth)
            .bind(&registration.country)
            .bind(&registration.zipcode)
            .bind(&registration.username)
            .bind(&registration.hashed_password)
            .bind(registration.role.to_string())
            .bind(registration.email_attempts)
            .bind(registration.registered_on)
            .bind(registration.last_emailed_on)
            .bind(registration.status.as_db_value())
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| db_error("Error while saving registration", &err))?;
        Ok(())
    }

    async fn update_last_emailed(&self, email: &str, at: DateTime<Utc>) -> Result<(), ApiError> {
        let query = "UPDATE registrations \
                     SET email_attempts = email_attempts + 1, last_emailed_on = $1 \
                     WHERE email = $2";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(at)
            .bind(email)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| {
                db_error(
                    "Error while updating last emailed information for a registration",
                    &err,
                )
            })?;
        Ok(())
    }

    async fn find_by_login_details(
        &self,
        username: &str,
    ) -> Result<Option<Registration>, ApiError> {
        let query =
            format!("SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE username = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| {
                db_error(
                    "Error while checking if a registration exists for the given login details",
                    &err,
                )
            })?;
        Ok(row.as_ref().map(row_to_registration))
    }

    async fn find_by_email(&self, email: &str) -> Result<Registration, ApiError> {
        let query = format!("SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE email = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| {
                db_error(
                    "Error while checking if a given registration indeed exists",
                    &err,
                )
            })?;

        match row {
            Some(row) => Ok(row_to_registration(&row)),
            None => {
                error!("The given registration does not exist");
                Err(ApiError::not_found("Registration not found"))
            }
        }
    }

    async fn create_accounts_transaction(
        &self,
        registration: &Registration,
        at: DateTime<Utc>,
    ) -> Result<String, ApiError> {
        let span = tracing::info_span!(
            "db.transaction",
            db.system = "postgresql",
            db.operation = "INSERT"
        );

        async {
            let mut tx = self.pool.begin().await.map_err(|err| {
                db_error(
                    "Error while starting db transaction for creating accounts for new registration",
                    &err,
                )
            })?;

            // The customer starts inactive; update() flips it once the
            // registration row is confirmed.
            let customer_id: i64 = sqlx::query(
                "INSERT INTO customers (name, date_of_birth, email, country, zipcode, status) \
                 VALUES ($1, $2, $3, $4, $5, $6) RETURNING customer_id",
            )
            .bind(&registration.name)
            .bind(&registration.date_of_birth)
            .bind(&registration.email)
            .bind(&registration.country)
            .bind(&registration.zipcode)
            .bind(RegistrationStatus::Pending.as_db_value())
            .fetch_one(&mut *tx)
            .await
            .map_err(|err| db_error("Error while creating customer", &err))?
            .get("customer_id");

            sqlx::query(
                "INSERT INTO users (username, password, role, customer_id, created_on) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(&registration.username)
            .bind(&registration.hashed_password)
            .bind(registration.role.to_string())
            .bind(customer_id.to_string())
            .bind(at)
            .execute(&mut *tx)
            .await
            .map_err(|err| db_error("Error while creating user", &err))?;

            // Two starter accounts so a fresh customer has something to
            // transact with.
            let starter_accounts: [(&str, f64); 2] = [("saving", 30_000.0), ("checking", 6_000.0)];
            for (account_type, amount) in starter_accounts {
                sqlx::query(
                    "INSERT INTO accounts (customer_id, opening_date, account_type, amount, status) \
                     VALUES ($1, $2, $3, $4, '1')",
                )
                .bind(customer_id)
                .bind(at)
                .bind(account_type)
                .bind(amount)
                .execute(&mut *tx)
                .await
                .map_err(|err| {
                    db_error(&format!("Error while creating new {account_type} account"), &err)
                })?;
            }

            tx.commit().await.map_err(|err| {
                db_error(
                    "Error while committing transaction for creating accounts for new registration",
                    &err,
                )
            })?;

            Ok(customer_id.to_string())
        }
        .instrument(span)
        .await
    }

    async fn update(&self, registration: &Registration) -> Result<(), ApiError> {
        let query = "UPDATE registrations SET customer_id = $1, status = $2, confirmed_on = $3 \
                     WHERE email = $4";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(&registration.customer_id)
            .bind(registration.status.as_db_value())
            .bind(registration.confirmed_on)
            .bind(&registration.email)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| {
                db_error("Error while updating registration to confirmed status", &err)
            })?;

        let query = "UPDATE customers SET status = $1 WHERE customer_id = $2::bigint";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(registration.status.as_db_value())
            .bind(&registration.customer_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| {
                db_error("Error while updating customer record to confirmed status", &err)
            })?;
        Ok(())
    }
}
