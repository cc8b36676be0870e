//! Session lifecycle: login, logout, verify, refresh and session resume.

use std::sync::Arc;

use tracing::{error, info};

use crate::authz::{Role, RolePermissions};
use crate::error::ApiError;
use crate::password::verify_password;
use crate::store::{CredentialStore, RegistrationStore};
use crate::token::{hash_token, private_claims_match, TokenCodec};

/// What a successful login call produces: either a full session or, for a
/// registrant who never confirmed their email, a fresh one-time token so they
/// can pick the confirmation flow back up from the login screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Session {
        access_token: String,
        refresh_token: String,
        homepage: String,
    },
    PendingConfirmation {
        one_time_token: String,
    },
}

pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    registrations: Arc<dyn RegistrationStore>,
    codec: Arc<TokenCodec>,
    permissions: RolePermissions,
}

impl AuthService {
    #[must_use]
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        registrations: Arc<dyn RegistrationStore>,
        codec: Arc<TokenCodec>,
        permissions: RolePermissions,
    ) -> Self {
        Self {
            credentials,
            registrations,
            codec,
            permissions,
        }
    }

    /// Authenticates and mints a token pair, or redirects an unconfirmed
    /// registrant into the confirmation flow.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, ApiError> {
        let credential = match self.credentials.authenticate(username, password).await {
            Ok(credential) => credential,
            Err(err @ ApiError::Authentication(_)) => {
                return self.pending_confirmation(username, password, err).await;
            }
            Err(err) => return Err(err),
        };

        if !credential.is_role_valid() {
            return Err(ApiError::unexpected("Unexpected server-side error"));
        }

        let access_claims = credential.access_claims();
        let refresh_claims = access_claims.as_refresh_claims();
        let access_token = self.codec.issue_access(&access_claims)?;
        let refresh_token = self.codec.issue_refresh(&refresh_claims)?;
        self.credentials
            .save_refresh_hash(&hash_token(&refresh_token))
            .await?;
        let homepage = credential.homepage()?;

        Ok(LoginOutcome::Session {
            access_token,
            refresh_token,
            homepage,
        })
    }

    /// Login fell through the credential store; if an unconfirmed
    /// registration matches the same login details, hand out a one-time token
    /// instead of the authentication error.
    async fn pending_confirmation(
        &self,
        username: &str,
        password: &str,
        original: ApiError,
    ) -> Result<LoginOutcome, ApiError> {
        let Some(registration) = self.registrations.find_by_login_details(username).await? else {
            return Err(original);
        };
        if registration.is_confirmed()
            || !verify_password(&registration.hashed_password, password)
        {
            return Err(original);
        }

        info!("Login matches an unconfirmed registration, issuing one-time token");
        let one_time_token = self.codec.issue_one_time(&registration.one_time_claims())?;
        Ok(LoginOutcome::PendingConfirmation { one_time_token })
    }

    /// Revokes a session by removing the refresh token's hash. Expired
    /// refresh tokens are accepted; a client logging out may already hold
    /// one.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), ApiError> {
        let claims = self.codec.decode_refresh(refresh_token)?;
        claims.validate(true)?;

        let rows = self
            .credentials
            .delete_refresh_hash(&hash_token(refresh_token))
            .await?;
        if rows == 0 {
            error!("Refresh token hash was not in the store during logout");
            return Err(ApiError::unexpected("Failed to log out"));
        }
        Ok(())
    }

    /// Authorizes one request: non-expired access token, role allowed for the
    /// route, identity matching the request, and (when an account is named)
    /// account ownership. Side-effect free.
    pub async fn verify(
        &self,
        access_token: &str,
        route_name: &str,
        customer_id: &str,
        account_id: &str,
    ) -> Result<(), ApiError> {
        let claims = self.codec.decode_access(access_token)?;
        claims.validate(false)?;

        if !self.permissions.is_authorized_for(claims.role, route_name) {
            return Err(ApiError::authorization("Trying to access unauthorized route"));
        }

        if claims.is_identity_mismatch(customer_id) {
            return Err(ApiError::authentication(
                "Identity mismatch between token claims and request",
            ));
        }

        if claims.role == Role::User && !account_id.is_empty() {
            let owned = self
                .credentials
                .account_belongs_to_customer(account_id, &claims.customer_id)
                .await?;
            if !owned {
                error!("Account does not belong to client");
                return Err(ApiError::authorization(
                    "Identity mismatch between token claims and request",
                ));
            }
        }

        Ok(())
    }

    /// Exchanges an expired access token plus a live refresh token for a new
    /// access token. The refresh token is not rotated.
    pub async fn refresh(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<String, ApiError> {
        let access_claims = self.codec.decode_access(access_token)?;
        access_claims.validate(true)?;

        let refresh_claims = self.codec.decode_refresh(refresh_token)?;
        refresh_claims.validate(false)?;
        private_claims_match(&access_claims, &refresh_claims)?;
        self.ensure_session_active(refresh_token).await?;

        self.codec.issue_access(&refresh_claims.as_access_claims())
    }

    /// Resumes a session on client reload: same binding and store checks as
    /// refresh but the access token must still be live, and the credential is
    /// re-resolved to confirm the account still exists. Returns the landing
    /// route.
    pub async fn continue_session(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<String, ApiError> {
        let access_claims = self.codec.decode_access(access_token)?;
        access_claims.validate(false)?;

        let refresh_claims = self.codec.decode_refresh(refresh_token)?;
        refresh_claims.validate(false)?;
        private_claims_match(&access_claims, &refresh_claims)?;
        self.ensure_session_active(refresh_token).await?;

        let customer_id = if access_claims.customer_id.is_empty() {
            None
        } else {
            Some(access_claims.customer_id.as_str())
        };
        let credential = self
            .credentials
            .find_credential(&access_claims.username, access_claims.role, customer_id)
            .await?;

        credential.homepage()
    }

    /// The session is active iff the refresh token's hash is still in the
    /// store (logout removes it).
    async fn ensure_session_active(&self, refresh_token: &str) -> Result<(), ApiError> {
        let exists = self
            .credentials
            .refresh_hash_exists(&hash_token(refresh_token))
            .await?;
        if !exists {
            error!("Refresh token is not in the store, session was logged out");
            return Err(ApiError::invalid_refresh_token());
        }
        Ok(())
    }
}
