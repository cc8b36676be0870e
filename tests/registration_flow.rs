//! End-to-end sign-up scenarios against in-memory stores: register, poll the
//! confirmation status, resend the link and finish.

mod common;

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;

use bankd::error::ApiError;
use bankd::service::{RegistrationService, ResendTarget, ServiceConfig};
use bankd::store::NewRegistration;
use bankd::token::{KeyMaterial, OneTimeClaims, TokenCodec};

use common::{InMemoryRegistrationStore, RecordingEmailSender};

struct Harness {
    service: RegistrationService,
    registrations: Arc<InMemoryRegistrationStore>,
    email: Arc<RecordingEmailSender>,
    codec: Arc<TokenCodec>,
}

fn harness() -> Result<Harness> {
    let registrations = InMemoryRegistrationStore::new();
    let email = RecordingEmailSender::new();
    let codec = Arc::new(TokenCodec::new(KeyMaterial::generate()?));
    let service = RegistrationService::new(
        registrations.clone(),
        email.clone(),
        codec.clone(),
        ServiceConfig::new("https://bank.test".to_string()),
    );
    Ok(Harness {
        service,
        registrations,
        email,
        codec,
    })
}

fn details() -> NewRegistration {
    NewRegistration {
        email: "ada@bank.test".to_string(),
        name: "Ada Lovelace".to_string(),
        date_of_birth: "1990-01-02".to_string(),
        country: "Singapore".to_string(),
        zipcode: "123456".to_string(),
        username: "ada001".to_string(),
    }
}

fn ott_from_link(link: &str) -> String {
    link.split_once("ott=")
        .map(|(_, ott)| ott.to_string())
        .unwrap()
}

#[tokio::test]
async fn register_stores_pending_row_and_emails_the_link() -> Result<()> {
    let h = harness()?;

    let receipt = h.service.register(details(), "adapassword1").await?;
    assert_eq!(receipt.email, "ada@bank.test");

    let row = h.registrations.get("ada@bank.test").unwrap();
    assert!(!row.is_confirmed());
    assert_eq!(row.email_attempts, 1);

    let sent = h.email.sent();
    assert_eq!(sent.len(), 1);
    let (recipient, link) = &sent[0];
    assert_eq!(recipient, "ada@bank.test");
    assert!(link.starts_with("https://bank.test/register/check?ott="));

    // The mailed token resolves back to the registration's email.
    let claims = h.codec.decode_one_time(&ott_from_link(link))?;
    assert_eq!(claims.email, "ada@bank.test");
    Ok(())
}

#[tokio::test]
async fn register_rejects_reused_email_and_username() -> Result<()> {
    let h = harness()?;
    h.service.register(details(), "adapassword1").await?;

    let result = h.service.register(details(), "adapassword1").await;
    assert_eq!(
        result,
        Err(ApiError::authorization(
            "Email is already registered for an account but not confirmed"
        ))
    );

    let mut other = details();
    other.email = "other@bank.test".to_string();
    let result = h.service.register(other, "adapassword1").await;
    assert_eq!(result, Err(ApiError::conflict("Username is already taken")));
    Ok(())
}

#[tokio::test]
async fn finish_confirms_and_check_reports_it() -> Result<()> {
    let h = harness()?;
    h.service.register(details(), "adapassword1").await?;
    let ott = ott_from_link(&h.email.sent()[0].1);

    assert!(!h.service.check_registration(&ott).await?);

    h.service.finish_registration(&ott).await?;
    assert!(h.service.check_registration(&ott).await?);

    let row = h.registrations.get("ada@bank.test").unwrap();
    assert!(row.is_confirmed());
    assert!(row.customer_id.is_some());

    // Finishing again must not create a second customer.
    let again = h.service.finish_registration(&ott).await;
    assert_eq!(again, Err(ApiError::validation("Already confirmed")));
    Ok(())
}

#[tokio::test]
async fn registering_a_finished_email_hits_the_customer_check_first() -> Result<()> {
    let h = harness()?;
    h.service.register(details(), "adapassword1").await?;
    let ott = ott_from_link(&h.email.sent()[0].1);
    h.service.finish_registration(&ott).await?;

    // Finishing created a customer with this email, so the customer-table
    // check fires before the registration row is ever consulted.
    let result = h.service.register(details(), "adapassword1").await;
    assert_eq!(result, Err(ApiError::authorization("Email is already used")));
    Ok(())
}

#[tokio::test]
async fn registering_a_confirmed_email_names_the_confirmation() -> Result<()> {
    let h = harness()?;

    // A confirmed registration row whose customer email never made it into
    // the customers table falls through to the registration check.
    let registration = common::pending_registration("ada@bank.test", "ada001", "adapassword1")
        .confirm("2000".to_string(), Utc::now());
    h.registrations.insert(registration);

    let result = h.service.register(details(), "adapassword1").await;
    assert_eq!(
        result,
        Err(ApiError::authorization(
            "Email is already registered for an account and already confirmed"
        ))
    );
    Ok(())
}

#[tokio::test]
async fn resend_is_throttled_then_allowed_after_cooldown() -> Result<()> {
    let h = harness()?;
    h.service.register(details(), "adapassword1").await?;
    let ott = ott_from_link(&h.email.sent()[0].1);

    // Right after registration the cooldown has not lapsed.
    let result = h
        .service
        .resend_link(ResendTarget::OneTimeToken(ott.clone()))
        .await;
    assert_eq!(result, Err(ApiError::validation("Too many attempts")));

    h.registrations.rewind_last_emailed("ada@bank.test", 120);
    h.service
        .resend_link(ResendTarget::OneTimeToken(ott))
        .await?;

    assert_eq!(h.email.sent().len(), 2);
    let row = h.registrations.get("ada@bank.test").unwrap();
    assert_eq!(row.email_attempts, 2);
    Ok(())
}

#[tokio::test]
async fn resend_stops_at_the_daily_cap() -> Result<()> {
    let h = harness()?;
    h.service.register(details(), "adapassword1").await?;

    h.registrations.rewind_last_emailed("ada@bank.test", 120);
    h.registrations.set_email_attempts("ada@bank.test", 11);

    let result = h
        .service
        .resend_link(ResendTarget::Email("ada@bank.test".to_string()))
        .await;
    assert_eq!(
        result,
        Err(ApiError::validation("Maximum daily attempts reached"))
    );
    Ok(())
}

#[tokio::test]
async fn resend_accepts_an_expired_token_but_check_does_not() -> Result<()> {
    let h = harness()?;
    h.service.register(details(), "adapassword1").await?;
    h.registrations.rewind_last_emailed("ada@bank.test", 120);

    let expired = OneTimeClaims {
        exp: Utc::now().timestamp() - 10,
        email: "ada@bank.test".to_string(),
    };
    let token = h.codec.issue_one_time(&expired)?;

    assert_eq!(
        h.service.check_registration(&token).await,
        Err(ApiError::authentication("Expired OTT"))
    );

    // The whole point of resending is replacing an expired link.
    h.service
        .resend_link(ResendTarget::OneTimeToken(token))
        .await?;
    assert_eq!(h.email.sent().len(), 2);
    Ok(())
}

#[tokio::test]
async fn resend_for_unknown_email_is_not_found() -> Result<()> {
    let h = harness()?;
    let result = h
        .service
        .resend_link(ResendTarget::Email("ghost@bank.test".to_string()))
        .await;
    assert_eq!(result, Err(ApiError::not_found("Registration not found")));
    Ok(())
}
