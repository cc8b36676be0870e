//! Sign-up lifecycle: register, poll status, resend the link, finish.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use super::ServiceConfig;
use crate::email::EmailSender;
use crate::error::ApiError;
use crate::password::hash_password;
use crate::store::{NewRegistration, Registration, RegistrationStore};
use crate::token::TokenCodec;

/// Returned to a fresh registrant; enough for the client to show a "check
/// your inbox" page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationReceipt {
    pub email: String,
    pub registered_on: DateTime<Utc>,
}

/// How a resend request names the registration it wants another link for.
/// Tokens are accepted even when expired; the point of resending is to mint a
/// fresh one.
#[derive(Debug, Clone)]
pub enum ResendTarget {
    OneTimeToken(String),
    Email(String),
}

pub struct RegistrationService {
    registrations: Arc<dyn RegistrationStore>,
    email: Arc<dyn EmailSender>,
    codec: Arc<TokenCodec>,
    config: ServiceConfig,
}

impl RegistrationService {
    #[must_use]
    pub fn new(
        registrations: Arc<dyn RegistrationStore>,
        email: Arc<dyn EmailSender>,
        codec: Arc<TokenCodec>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            registrations,
            email,
            codec,
            config,
        }
    }

    /// Accepts a sign-up: uniqueness checks, hash the password, persist the
    /// pending registration, then email the confirmation link.
    pub async fn register(
        &self,
        details: NewRegistration,
        password: &str,
    ) -> Result<RegistrationReceipt, ApiError> {
        self.registrations.is_email_used(&details.email).await?;
        self.registrations
            .is_username_taken(&details.username)
            .await?;

        let hashed = hash_password(password)?;
        let registration = Registration::pending(details, hashed, Utc::now());
        self.registrations.save(&registration).await?;

        self.create_and_send_link(&registration).await?;

        Ok(RegistrationReceipt {
            email: registration.email,
            registered_on: registration.registered_on,
        })
    }

    /// Reports whether the registration behind a one-time token is confirmed.
    /// Read-only, safe to poll.
    pub async fn check_registration(&self, one_time_token: &str) -> Result<bool, ApiError> {
        let claims = self.codec.decode_one_time(one_time_token)?;
        claims.check_expiry()?;

        let registration = self.registrations.find_by_email(&claims.email).await?;
        Ok(registration.is_confirmed())
    }

    /// Sends another confirmation link, subject to the registration's resend
    /// throttle.
    pub async fn resend_link(&self, target: ResendTarget) -> Result<(), ApiError> {
        let email = match target {
            // Expiry deliberately unchecked here.
            ResendTarget::OneTimeToken(token) => self.codec.decode_one_time(&token)?.email,
            ResendTarget::Email(email) => email,
        };

        let registration = self.registrations.find_by_email(&email).await?;
        registration.ensure_can_resend(
            Utc::now(),
            self.config.resend_max_attempts(),
            self.config.resend_cooldown_seconds(),
        )?;

        self.create_and_send_link(&registration).await
    }

    /// Confirms the registration behind a one-time token: creates the
    /// customer, credential and starter accounts in one transaction, then
    /// stamps the registration confirmed.
    pub async fn finish_registration(&self, one_time_token: &str) -> Result<(), ApiError> {
        let claims = self.codec.decode_one_time(one_time_token)?;
        claims.check_expiry()?;

        let registration = self.registrations.find_by_email(&claims.email).await?;
        if registration.is_confirmed() {
            return Err(ApiError::validation("Already confirmed"));
        }

        let now = Utc::now();
        let customer_id = self
            .registrations
            .create_accounts_transaction(&registration, now)
            .await?;

        let confirmed = registration.confirm(customer_id, now);
        self.registrations.update(&confirmed).await?;
        info!(email = confirmed.email, "Registration confirmed");
        Ok(())
    }

    /// Mint a one-time token, email the confirmation link and record the
    /// send.
    async fn create_and_send_link(&self, registration: &Registration) -> Result<(), ApiError> {
        let ott = self.codec.issue_one_time(&registration.one_time_claims())?;
        let link = self.config.confirmation_url(&ott);

        let sent_at = self
            .email
            .send_confirmation(&registration.email, &link)
            .await?;
        self.registrations
            .update_last_emailed(&registration.email, sent_at)
            .await
    }
}
