//! Request and response bodies for the HTTP adapter.

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::error;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::service::LoginOutcome;
use crate::store::NewRegistration;

const USERNAME_MAX_LEN: usize = 20;
const PASSWORD_MAX_LEN: usize = 64;

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid pattern"));

// Starts with a letter, then word characters, 6 to 20 total.
static USERNAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]\w{5,19}$").expect("valid pattern"));

fn valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

fn valid_username(username: &str) -> bool {
    USERNAME_REGEX.is_match(username)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    /// Shape-only checks; the response never reveals which field was wrong.
    pub fn validate(&self) -> Result<(), ApiError> {
        let username_ok = !self.username.is_empty()
            && self.username.len() <= USERNAME_MAX_LEN
            && self.username.is_ascii();
        let password_ok = !self.password.is_empty()
            && self.password.len() <= PASSWORD_MAX_LEN
            && self.password.is_ascii();
        if !username_ok || !password_ok {
            error!("Login request is invalid");
            return Err(ApiError::validation("Incorrect username or password"));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub is_pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_time_token: Option<String>,
}

impl From<LoginOutcome> for LoginResponse {
    fn from(outcome: LoginOutcome) -> Self {
        match outcome {
            LoginOutcome::Session {
                access_token,
                refresh_token,
                homepage,
            } => Self {
                is_pending: false,
                access_token: Some(access_token),
                refresh_token: Some(refresh_token),
                homepage: Some(homepage),
                one_time_token: None,
            },
            LoginOutcome::PendingConfirmation { one_time_token } => Self {
                is_pending: true,
                access_token: None,
                refresh_token: None,
                homepage: None,
                one_time_token: Some(one_time_token),
            },
        }
    }
}

/// Body shared by the refresh and continue endpoints.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenStrings {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
}

impl TokenStrings {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.access_token.is_empty() || self.refresh_token.is_empty() {
            error!("Field(s) missing or empty in request body");
            return Err(ApiError::validation(
                "Field(s) missing or empty in request body: access_token, refresh_token",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: String,
}

impl LogoutRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.refresh_token.is_empty() {
            error!("Refresh token missing or empty in request body");
            return Err(ApiError::validation(
                "Field missing or empty in request body: refresh_token",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub new_access_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ContinueResponse {
    pub homepage: String,
}

/// Query parameters of the verify endpoint. Identity parameters default to
/// empty, which skips the corresponding check for routes that carry none.
#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyParams {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub route_name: String,
    #[serde(default)]
    pub customer_id: String,
    #[serde(default)]
    pub account_id: String,
}

impl VerifyParams {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.token.is_empty() || self.route_name.is_empty() {
            error!("Field(s) missing or empty in request query");
            return Err(ApiError::validation(
                "Field(s) missing or empty in request: token, route_name",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegistrationRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub zipcode: String,
    #[serde(default)]
    pub date_of_birth: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl RegistrationRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        let fields_present = !self.first_name.is_empty()
            && !self.last_name.is_empty()
            && !self.country.is_empty()
            && !self.zipcode.is_empty();
        if !fields_present {
            error!("Field(s) missing or empty in registration request");
            return Err(ApiError::validation(
                "Field(s) missing or empty in request body",
            ));
        }
        if !valid_email(&self.email) {
            error!("Registration request has an invalid email");
            return Err(ApiError::validation("Invalid email"));
        }
        if NaiveDate::parse_from_str(&self.date_of_birth, "%Y-%m-%d").is_err() {
            error!("Registration request has an invalid date of birth");
            return Err(ApiError::validation("Invalid date of birth"));
        }
        if !valid_username(&self.username) {
            error!("Registration request has an invalid username");
            return Err(ApiError::validation("Invalid username"));
        }
        if self.password.is_empty()
            || self.password.len() > PASSWORD_MAX_LEN
            || !self.password.is_ascii()
        {
            error!("Registration request has an invalid password");
            return Err(ApiError::validation("Invalid password"));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_new_registration(&self) -> NewRegistration {
        NewRegistration {
            email: self.email.clone(),
            name: format!("{} {}", self.first_name, self.last_name),
            date_of_birth: self.date_of_birth.clone(),
            country: self.country.clone(),
            zipcode: self.zipcode.clone(),
            username: self.username.clone(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegistrationResponse {
    pub email: String,
    pub registered_on: DateTime<Utc>,
}

/// Query parameter carrying a one-time token (check, resend-by-token,
/// finish).
#[derive(Debug, Deserialize, ToSchema)]
pub struct OneTimeTokenParams {
    #[serde(default)]
    pub ott: String,
}

impl OneTimeTokenParams {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.ott.is_empty() {
            error!("One-time token missing or empty in request");
            return Err(ApiError::validation("Field missing or empty in request: ott"));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckRegistrationResponse {
    pub is_confirmed: bool,
}

/// Resend request addressed by raw email instead of a token.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ResendByEmailRequest {
    #[serde(default)]
    pub email: String,
}

impl ResendByEmailRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if !valid_email(&self.email) {
            error!("Resend request has an invalid email");
            return Err(ApiError::validation("Invalid email"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration_request() -> RegistrationRequest {
        RegistrationRequest {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            country: "Singapore".to_string(),
            zipcode: "123456".to_string(),
            date_of_birth: "1990-01-02".to_string(),
            email: "a@b.com".to_string(),
            username: "ada0101".to_string(),
            password: "correct horse battery".to_string(),
        }
    }

    #[test]
    fn matchers_hold_across_repeated_calls() {
        for _ in 0..3 {
            assert!(valid_email("a@b.com"));
            assert!(!valid_email("a@b"));
            assert!(valid_username("ada0101"));
            assert!(!valid_username("1short"));
        }
    }

    #[test]
    fn login_request_limits() {
        let ok = LoginRequest {
            username: "alice01".to_string(),
            password: "s3cret".to_string(),
        };
        assert!(ok.validate().is_ok());

        let long_username = LoginRequest {
            username: "a".repeat(21),
            password: "s3cret".to_string(),
        };
        assert_eq!(
            long_username.validate(),
            Err(ApiError::validation("Incorrect username or password"))
        );

        let empty_password = LoginRequest {
            username: "alice01".to_string(),
            password: String::new(),
        };
        assert!(empty_password.validate().is_err());
    }

    #[test]
    fn token_strings_require_both_fields() {
        let missing = TokenStrings {
            access_token: "a".to_string(),
            refresh_token: String::new(),
        };
        assert!(missing.validate().is_err());

        let both = TokenStrings {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
        };
        assert!(both.validate().is_ok());
    }

    #[test]
    fn verify_params_require_token_and_route() {
        let params = VerifyParams {
            token: "t".to_string(),
            route_name: String::new(),
            customer_id: String::new(),
            account_id: String::new(),
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn registration_request_accepts_valid_input() {
        assert!(registration_request().validate().is_ok());
    }

    #[test]
    fn registration_request_rejects_bad_fields() {
        let mut bad = registration_request();
        bad.email = "not-an-email".to_string();
        assert_eq!(bad.validate(), Err(ApiError::validation("Invalid email")));

        let mut bad = registration_request();
        bad.date_of_birth = "02/01/1990".to_string();
        assert_eq!(
            bad.validate(),
            Err(ApiError::validation("Invalid date of birth"))
        );

        let mut bad = registration_request();
        bad.username = "1short".to_string();
        assert_eq!(bad.validate(), Err(ApiError::validation("Invalid username")));

        let mut bad = registration_request();
        bad.password = "p".repeat(65);
        assert_eq!(bad.validate(), Err(ApiError::validation("Invalid password")));
    }

    #[test]
    fn new_registration_joins_names() {
        let details = registration_request().to_new_registration();
        assert_eq!(details.name, "Ada Lovelace");
        assert_eq!(details.username, "ada0101");
    }

    #[test]
    fn login_response_from_outcomes() {
        let session: LoginResponse = LoginOutcome::Session {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            homepage: "/customers".to_string(),
        }
        .into();
        assert!(!session.is_pending);
        assert_eq!(session.homepage.as_deref(), Some("/customers"));
        assert!(session.one_time_token.is_none());

        let pending: LoginResponse = LoginOutcome::PendingConfirmation {
            one_time_token: "ott".to_string(),
        }
        .into();
        assert!(pending.is_pending);
        assert!(pending.access_token.is_none());
        assert_eq!(pending.one_time_token.as_deref(), Some("ott"));
    }
}
