//! Confirmation email delivery abstraction.
//!
//! The registration flow only needs "send this link to this address and tell
//! me when it went out"; the transport (SMTP, API, broker) stays pluggable
//! behind [`EmailSender`]. The default sender for local development logs the
//! message and reports success.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::ApiError;

/// Delivery abstraction for registration confirmation emails.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a confirmation link and return the time it was sent.
    async fn send_confirmation(
        &self,
        recipient: &str,
        link: &str,
    ) -> Result<DateTime<Utc>, ApiError>;
}

/// Forms the body sent to a new registrant. The one-hour deadline matches the
/// one-time token lifetime.
#[must_use]
pub fn confirmation_body(recipient: &str, link: &str) -> String {
    format!(
        "To: {recipient}\r\n\
         Subject: Email Confirmation [action required]\r\n\
         \r\n\
         Please click on the link below within the next 1 hour to complete your account registration:\n\
         {link}\n\
         If it cannot be clicked, copy and paste it into the address bar of your web browser.\r\n"
    )
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send_confirmation(
        &self,
        recipient: &str,
        link: &str,
    ) -> Result<DateTime<Utc>, ApiError> {
        let body = confirmation_body(recipient, link);
        info!(recipient, "confirmation email send stub:\n{body}");
        Ok(Utc::now())
    }
}
