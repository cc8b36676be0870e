//! In-memory store and sender doubles for exercising the orchestrators
//! without a database.

// Not every test binary uses every helper.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use bankd::authz::Role;
use bankd::email::EmailSender;
use bankd::error::ApiError;
use bankd::password::{hash_password, verify_password};
use bankd::store::{Credential, CredentialStore, NewRegistration, Registration, RegistrationStore};

/// A pending registration row, password already hashed.
pub fn pending_registration(email: &str, username: &str, password: &str) -> Registration {
    Registration::pending(
        NewRegistration {
            email: email.to_string(),
            name: "Ada Lovelace".to_string(),
            date_of_birth: "1990-01-02".to_string(),
            country: "Singapore".to_string(),
            zipcode: "123456".to_string(),
            username: username.to_string(),
        },
        hash_password(password).unwrap(),
        Utc::now(),
    )
}

#[derive(Clone)]
struct StoredUser {
    username: String,
    hashed_password: String,
    role: Role,
    customer_id: Option<String>,
}

/// Credential store backed by vectors and sets behind mutexes.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    users: Mutex<Vec<StoredUser>>,
    refresh_hashes: Mutex<HashSet<String>>,
    accounts: Mutex<Vec<(String, String)>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_user(
        &self,
        username: &str,
        password: &str,
        role: Role,
        customer_id: Option<&str>,
    ) {
        let hashed = hash_password(password).unwrap();
        self.users.lock().unwrap().push(StoredUser {
            username: username.to_string(),
            hashed_password: hashed,
            role,
            customer_id: customer_id.map(str::to_string),
        });
    }

    /// (account_id, customer_id) pair for ownership checks.
    pub fn add_account(&self, account_id: &str, customer_id: &str) {
        self.accounts
            .lock()
            .unwrap()
            .push((account_id.to_string(), customer_id.to_string()));
    }

    pub fn refresh_hash_count(&self) -> usize {
        self.refresh_hashes.lock().unwrap().len()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn authenticate(&self, username: &str, password: &str) -> Result<Credential, ApiError> {
        let users = self.users.lock().unwrap();
        let user = users
            .iter()
            .find(|user| user.username == username)
            .ok_or_else(|| ApiError::authentication("Incorrect username or password"))?;
        if !verify_password(&user.hashed_password, password) {
            return Err(ApiError::authentication("Incorrect username or password"));
        }
        Ok(Credential {
            username: user.username.clone(),
            role: user.role,
            customer_id: user.customer_id.clone(),
        })
    }

    async fn save_refresh_hash(&self, hash: &str) -> Result<(), ApiError> {
        self.refresh_hashes.lock().unwrap().insert(hash.to_string());
        Ok(())
    }

    async fn delete_refresh_hash(&self, hash: &str) -> Result<u64, ApiError> {
        let removed = self.refresh_hashes.lock().unwrap().remove(hash);
        Ok(u64::from(removed))
    }

    async fn refresh_hash_exists(&self, hash: &str) -> Result<bool, ApiError> {
        Ok(self.refresh_hashes.lock().unwrap().contains(hash))
    }

    async fn find_credential(
        &self,
        username: &str,
        role: Role,
        customer_id: Option<&str>,
    ) -> Result<Credential, ApiError> {
        let users = self.users.lock().unwrap();
        users
            .iter()
            .find(|user| {
                user.username == username
                    && user.role == role
                    && user.customer_id.as_deref() == customer_id
            })
            .map(|user| Credential {
                username: user.username.clone(),
                role: user.role,
                customer_id: user.customer_id.clone(),
            })
            .ok_or_else(|| ApiError::authentication("Cannot continue"))
    }

    async fn account_belongs_to_customer(
        &self,
        account_id: &str,
        customer_id: &str,
    ) -> Result<bool, ApiError> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .any(|(account, customer)| account == account_id && customer == customer_id))
    }
}

/// Registration store keyed by email, mirroring the SQL adapter's semantics.
#[derive(Default)]
pub struct InMemoryRegistrationStore {
    rows: Mutex<HashMap<String, Registration>>,
    customer_emails: Mutex<HashSet<String>>,
    taken_usernames: Mutex<HashSet<String>>,
    next_customer_id: Mutex<i64>,
}

impl InMemoryRegistrationStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_customer_id: Mutex::new(2000),
            ..Self::default()
        })
    }

    pub fn insert(&self, registration: Registration) {
        self.rows
            .lock()
            .unwrap()
            .insert(registration.email.clone(), registration);
    }

    pub fn get(&self, email: &str) -> Option<Registration> {
        self.rows.lock().unwrap().get(email).cloned()
    }

    /// Pushes the last-emailed stamp back so the resend cooldown has lapsed.
    pub fn rewind_last_emailed(&self, email: &str, seconds: i64) {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.get_mut(email) {
            row.last_emailed_on -= chrono::Duration::seconds(seconds);
        }
    }

    pub fn set_email_attempts(&self, email: &str, attempts: i32) {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.get_mut(email) {
            row.email_attempts = attempts;
        }
    }
}

#[async_trait]
impl RegistrationStore for InMemoryRegistrationStore {
    async fn is_email_used(&self, email: &str) -> Result<(), ApiError> {
        if self.customer_emails.lock().unwrap().contains(email) {
            return Err(ApiError::authorization("Email is already used"));
        }
        if let Some(row) = self.rows.lock().unwrap().get(email) {
            let suffix = if row.confirmed_on.is_some() {
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
        let in_rows = self
            .rows
            .lock()
            .unwrap()
            .values()
            .any(|row| row.username == username);
        if in_rows || self.taken_usernames.lock().unwrap().contains(username) {
            return Err(ApiError::conflict("Username is already taken"));
        }
        Ok(())
    }

    async fn save(&self, registration: &Registration) -> Result<(), ApiError> {
        self.insert(registration.clone());
        Ok(())
    }

    async fn update_last_emailed(&self, email: &str, at: DateTime<Utc>) -> Result<(), ApiError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.get_mut(email) {
            row.email_attempts += 1;
            row.last_emailed_on = at;
        }
        Ok(())
    }

    async fn find_by_login_details(
        &self,
        username: &str,
    ) -> Result<Option<Registration>, ApiError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|row| row.username == username)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Registration, ApiError> {
        self.get(email)
            .ok_or_else(|| ApiError::not_found("Registration not found"))
    }

    async fn create_accounts_transaction(
        &self,
        registration: &Registration,
        _at: DateTime<Utc>,
    ) -> Result<String, ApiError> {
        let mut next = self.next_customer_id.lock().unwrap();
        let customer_id = *next;
        *next += 1;
        self.customer_emails
            .lock()
            .unwrap()
            .insert(registration.email.clone());
        self.taken_usernames
            .lock()
            .unwrap()
            .insert(registration.username.clone());
        Ok(customer_id.to_string())
    }

    async fn update(&self, registration: &Registration) -> Result<(), ApiError> {
        self.insert(registration.clone());
        Ok(())
    }
}

/// Email sender that records every (recipient, link) pair.
#[derive(Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingEmailSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send_confirmation(
        &self,
        recipient: &str,
        link: &str,
    ) -> Result<DateTime<Utc>, ApiError> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), link.to_string()));
        Ok(Utc::now())
    }
}
