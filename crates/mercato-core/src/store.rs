//! Collaborator trait definitions for the token authority.
//!
//! The relational credential store and the mail gateway live outside
//! this repository; these traits are the full contract the authority
//! requires from them. All operations are async.

use uuid::Uuid;

use crate::error::CoreResult;
use crate::models::user::{CreateUser, UpdateUser, User, UserFilter};

/// Durable user/credential storage.
///
/// Every mutation is a single atomic statement on the store side; the
/// authority never composes multi-step transactions across this
/// boundary.
pub trait UserStore: Send + Sync {
    fn find_by_email(&self, email: &str) -> impl Future<Output = CoreResult<Option<User>>> + Send;

    fn find_by_filter(&self, filter: UserFilter)
    -> impl Future<Output = CoreResult<Vec<User>>> + Send;

    /// Create a user with a freshly generated identifier.
    fn create(&self, input: CreateUser) -> impl Future<Output = CoreResult<User>> + Send;

    /// Apply a partial update; returns the number of affected rows
    /// (0 when the user does not exist).
    fn update(&self, id: Uuid, input: UpdateUser)
    -> impl Future<Output = CoreResult<u64>> + Send;

    /// Rewrite the password hash of the row matching `email`; returns
    /// the number of affected rows.
    fn update_password_by_email(
        &self,
        email: &str,
        password_hash: &str,
    ) -> impl Future<Output = CoreResult<u64>> + Send;
}

impl<T: UserStore> UserStore for std::sync::Arc<T> {
    fn find_by_email(&self, email: &str) -> impl Future<Output = CoreResult<Option<User>>> + Send {
        (**self).find_by_email(email)
    }

    fn find_by_filter(
        &self,
        filter: UserFilter,
    ) -> impl Future<Output = CoreResult<Vec<User>>> + Send {
        (**self).find_by_filter(filter)
    }

    fn create(&self, input: CreateUser) -> impl Future<Output = CoreResult<User>> + Send {
        (**self).create(input)
    }

    fn update(
        &self,
        id: Uuid,
        input: UpdateUser,
    ) -> impl Future<Output = CoreResult<u64>> + Send {
        (**self).update(id, input)
    }

    fn update_password_by_email(
        &self,
        email: &str,
        password_hash: &str,
    ) -> impl Future<Output = CoreResult<u64>> + Send {
        (**self).update_password_by_email(email, password_hash)
    }
}

/// Outbound mail gateway.
pub trait Mailer: Send + Sync {
    fn send_registration_email(&self, email: &str) -> impl Future<Output = CoreResult<()>> + Send;

    fn send_reset_password_email(
        &self,
        email: &str,
        token: &str,
    ) -> impl Future<Output = CoreResult<()>> + Send;
}

impl<T: Mailer> Mailer for std::sync::Arc<T> {
    fn send_registration_email(&self, email: &str) -> impl Future<Output = CoreResult<()>> + Send {
        (**self).send_registration_email(email)
    }

    fn send_reset_password_email(
        &self,
        email: &str,
        token: &str,
    ) -> impl Future<Output = CoreResult<()>> + Send {
        (**self).send_reset_password_email(email, token)
    }
}
