//! Claim payloads for the three token kinds and their validity rules.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::authz::Role;
use crate::error::ApiError;

pub const ACCESS_TOKEN_TTL_SECS: i64 = 60 * 60;
pub const REFRESH_TOKEN_TTL_SECS: i64 = 30 * 24 * 60 * 60;
pub const ONE_TIME_TOKEN_TTL_SECS: i64 = 60 * 60;

/// Discriminator embedded in refresh claims so an access token can never be
/// replayed as a refresh token.
pub const TOKEN_TYPE_REFRESH: &str = "refresh token";

/// Short-lived claims attached to most requests. `customer_id` is empty for
/// admins; the pairing is enforced by [`AccessClaims::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub exp: i64,
    pub username: String,
    pub role: Role,
    pub customer_id: String,
}

/// Long-lived claims that can mint new access tokens; revocable through the
/// refresh-token store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub exp: i64,
    pub token_type: String,
    pub username: String,
    pub role: Role,
    pub customer_id: String,
}

/// Claims binding a registration's email to a single confirmation action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneTimeClaims {
    pub exp: i64,
    pub email: String,
}

fn now_unix() -> i64 {
    Utc::now().timestamp()
}

fn is_role_valid(role: Role, customer_id: &str) -> bool {
    match role {
        Role::User if customer_id.is_empty() => {
            error!("Token claims has user role but no customer ID");
            false
        }
        Role::Admin if !customer_id.is_empty() => {
            error!("Token claims has admin role but has a customer ID");
            false
        }
        _ => true,
    }
}

impl AccessClaims {
    #[must_use]
    pub fn new(username: String, role: Role, customer_id: String) -> Self {
        Self {
            exp: now_unix() + ACCESS_TOKEN_TTL_SECS,
            username,
            role,
            customer_id,
        }
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.exp <= now_unix()
    }

    /// Checks expiry and the role/customer-id invariant.
    ///
    /// `want_expired` is true only while refreshing: presenting a still-valid
    /// access token to the refresh endpoint is itself an error.
    pub fn validate(&self, want_expired: bool) -> Result<(), ApiError> {
        let expired = self.is_expired();
        if !expired && want_expired {
            error!("Cannot generate new access token until current one expires");
            return Err(ApiError::authentication("Access token not expired yet"));
        }
        if expired && !want_expired {
            error!("Expired access token");
            return Err(ApiError::authentication("Expired access token"));
        }
        if !is_role_valid(self.role, &self.customer_id) {
            return Err(ApiError::authentication("Invalid access token"));
        }
        Ok(())
    }

    /// Checks, for users, the identity named in the request against the token
    /// claims. Route-independent: callers pass an empty string when the route
    /// carries no customer id, which skips the check. Admins never mismatch.
    #[must_use]
    pub fn is_identity_mismatch(&self, customer_id: &str) -> bool {
        if self.role == Role::Admin {
            return false;
        }
        if !customer_id.is_empty() && customer_id != self.customer_id {
            error!("Customer ID does not belong to client");
            return true;
        }
        false
    }

    /// Derives refresh claims carrying the same identity, stamped with a
    /// fresh 30-day expiry.
    #[must_use]
    pub fn as_refresh_claims(&self) -> RefreshClaims {
        RefreshClaims {
            exp: now_unix() + REFRESH_TOKEN_TTL_SECS,
            token_type: TOKEN_TYPE_REFRESH.to_string(),
            username: self.username.clone(),
            role: self.role,
            customer_id: self.customer_id.clone(),
        }
    }
}

impl RefreshClaims {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.exp <= now_unix()
    }

    /// Checks expiry, the type discriminator and the role/customer-id
    /// invariant. Expiry is ignored only while logging out (`allow_expired`);
    /// an expired refresh token is otherwise always invalid.
    pub fn validate(&self, allow_expired: bool) -> Result<(), ApiError> {
        if self.is_expired() && !allow_expired {
            error!("Expired refresh token");
            return Err(ApiError::invalid_refresh_token());
        }
        if self.token_type != TOKEN_TYPE_REFRESH
            || !is_role_valid(self.role, &self.customer_id)
        {
            return Err(ApiError::invalid_refresh_token());
        }
        Ok(())
    }

    /// Inverse derivation, stamped with a fresh 1-hour expiry.
    #[must_use]
    pub fn as_access_claims(&self) -> AccessClaims {
        AccessClaims {
            exp: now_unix() + ACCESS_TOKEN_TTL_SECS,
            username: self.username.clone(),
            role: self.role,
            customer_id: self.customer_id.clone(),
        }
    }
}

impl OneTimeClaims {
    #[must_use]
    pub fn new(email: String) -> Self {
        Self {
            exp: now_unix() + ONE_TIME_TOKEN_TTL_SECS,
            email,
        }
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.exp <= now_unix()
    }

    pub fn check_expiry(&self) -> Result<(), ApiError> {
        if self.is_expired() {
            error!("Expired OTT");
            return Err(ApiError::authentication("Expired OTT"));
        }
        Ok(())
    }
}

/// The binding check that prevents mixing an access token from one session
/// with a refresh token from another: username, role and customer id must be
/// identical across both claim sets.
pub fn private_claims_match(
    access: &AccessClaims,
    refresh: &RefreshClaims,
) -> Result<(), ApiError> {
    if access.username != refresh.username
        || access.role != refresh.role
        || access.customer_id != refresh.customer_id
    {
        error!("Access token claims and refresh token claims do not match");
        return Err(ApiError::invalid_refresh_token());
    }
    Ok(())
}
