//! Mercato Store — in-memory implementations of the credential-store
//! and mailer contracts.
//!
//! The production credential store is a relational database owned by
//! another team; this crate is the reference implementation used by the
//! default server wiring and the integration tests.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use chrono::Utc;
use mercato_core::error::{CoreError, CoreResult};
use mercato_core::models::user::{CreateUser, UpdateUser, User, UserFilter};
use mercato_core::store::{Mailer, UserStore};
use uuid::Uuid;

/// In-memory [`UserStore`]. Every operation takes the lock once, so
/// each mutation is atomic, matching the single-statement contract.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct snapshot of a user row, for test assertions.
    pub fn get(&self, id: Uuid) -> Option<User> {
        self.users.read().expect("store lock poisoned").get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.users.read().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn matches(user: &User, filter: &UserFilter) -> bool {
    if let Some(id) = filter.id {
        if user.id != id {
            return false;
        }
    }
    if let Some(email) = &filter.email {
        if &user.email != email {
            return false;
        }
    }
    if let Some(federation_id) = &filter.federation_id {
        if user.federation_id.as_ref() != Some(federation_id) {
            return false;
        }
    }
    true
}

fn apply(user: &mut User, input: UpdateUser) {
    if let Some(username) = input.username {
        user.username = username;
    }
    if let Some(full_name) = input.full_name {
        user.full_name = Some(full_name);
    }
    if let Some(password_hash) = input.password_hash {
        user.password_hash = Some(password_hash);
    }
    if let Some(enabled) = input.two_factor_enabled {
        user.two_factor_enabled = enabled;
    }
    if let Some(secret) = input.two_factor_secret {
        user.two_factor_secret = secret;
    }
    user.updated_at = Utc::now();
}

impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> CoreResult<Option<User>> {
        let users = self.users.read().expect("store lock poisoned");
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_filter(&self, filter: UserFilter) -> CoreResult<Vec<User>> {
        let users = self.users.read().expect("store lock poisoned");
        Ok(users.values().filter(|u| matches(u, &filter)).cloned().collect())
    }

    async fn create(&self, input: CreateUser) -> CoreResult<User> {
        let mut users = self.users.write().expect("store lock poisoned");
        if users.values().any(|u| u.email == input.email) {
            return Err(CoreError::AlreadyExists {
                entity: format!("user with email {}", input.email),
            });
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: input.email,
            username: input.username,
            full_name: input.full_name,
            password_hash: input.password_hash,
            role: input.role,
            two_factor_secret: None,
            two_factor_enabled: false,
            federation_id: input.federation_id,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, id: Uuid, input: UpdateUser) -> CoreResult<u64> {
        let mut users = self.users.write().expect("store lock poisoned");
        match users.get_mut(&id) {
            Some(user) => {
                apply(user, input);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn update_password_by_email(&self, email: &str, password_hash: &str) -> CoreResult<u64> {
        let mut users = self.users.write().expect("store lock poisoned");
        match users.values_mut().find(|u| u.email == email) {
            Some(user) => {
                user.password_hash = Some(password_hash.to_string());
                user.updated_at = Utc::now();
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

/// A delivered (or rather, captured) mail message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailMessage {
    Registration { email: String },
    PasswordReset { email: String, token: String },
}

/// [`Mailer`] that records every message, for test assertions.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<MailMessage>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().expect("mailer lock poisoned").clone()
    }
}

impl Mailer for RecordingMailer {
    async fn send_registration_email(&self, email: &str) -> CoreResult<()> {
        self.sent
            .lock()
            .expect("mailer lock poisoned")
            .push(MailMessage::Registration {
                email: email.to_string(),
            });
        Ok(())
    }

    async fn send_reset_password_email(&self, email: &str, token: &str) -> CoreResult<()> {
        self.sent
            .lock()
            .expect("mailer lock poisoned")
            .push(MailMessage::PasswordReset {
                email: email.to_string(),
                token: token.to_string(),
            });
        Ok(())
    }
}

/// [`Mailer`] that only logs. Default wiring until the real mail
/// gateway client is plugged in.
#[derive(Debug, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    async fn send_registration_email(&self, email: &str) -> CoreResult<()> {
        tracing::info!(%email, "registration email dispatched");
        Ok(())
    }

    async fn send_reset_password_email(&self, email: &str, _token: &str) -> CoreResult<()> {
        tracing::info!(%email, "reset password email dispatched");
        Ok(())
    }
}

/// [`Mailer`] whose sends always fail, for fire-and-forget tests.
#[derive(Debug, Default)]
pub struct FailingMailer;

impl Mailer for FailingMailer {
    async fn send_registration_email(&self, _email: &str) -> CoreResult<()> {
        Err(CoreError::MailDelivery("smtp unreachable".into()))
    }

    async fn send_reset_password_email(&self, _email: &str, _token: &str) -> CoreResult<()> {
        Err(CoreError::MailDelivery("smtp unreachable".into()))
    }
}
