//! Orchestrators sitting between the HTTP adapter and the stores.

pub mod auth;
pub mod registration;

pub use auth::{AuthService, LoginOutcome};
pub use registration::{RegistrationReceipt, RegistrationService, ResendTarget};

const DEFAULT_RESEND_COOLDOWN_SECONDS: i64 = 60;
// One more than the allowed resends, since the first confirmation email goes
// out during registration itself.
const DEFAULT_RESEND_MAX_ATTEMPTS: i32 = 11;

/// Tunables shared by the orchestrators.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    frontend_base_url: String,
    resend_cooldown_seconds: i64,
    resend_max_attempts: i32,
}

impl ServiceConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            resend_cooldown_seconds: DEFAULT_RESEND_COOLDOWN_SECONDS,
            resend_max_attempts: DEFAULT_RESEND_MAX_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_resend_cooldown_seconds(mut self, seconds: i64) -> Self {
        self.resend_cooldown_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_resend_max_attempts(mut self, attempts: i32) -> Self {
        self.resend_max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn resend_cooldown_seconds(&self) -> i64 {
        self.resend_cooldown_seconds
    }

    #[must_use]
    pub fn resend_max_attempts(&self) -> i32 {
        self.resend_max_attempts
    }

    /// The link emailed to a registrant; tokens are base64url so they need no
    /// further escaping.
    #[must_use]
    pub fn confirmation_url(&self, ott: &str) -> String {
        let base = self.frontend_base_url.trim_end_matches('/');
        format!("{base}/register/check?ott={ott}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_url_trims_trailing_slash() {
        let config = ServiceConfig::new("https://bank.test/".to_string());
        assert_eq!(
            config.confirmation_url("abc"),
            "https://bank.test/register/check?ott=abc"
        );
    }

    #[test]
    fn builders_override_defaults() {
        let config = ServiceConfig::new("https://bank.test".to_string())
            .with_resend_cooldown_seconds(5)
            .with_resend_max_attempts(2);
        assert_eq!(config.resend_cooldown_seconds(), 5);
        assert_eq!(config.resend_max_attempts(), 2);
    }
}
