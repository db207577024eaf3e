//! User domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account role. Roles are stored uppercase but compared
/// case-insensitively; claims always carry the lowercase form.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Operator,
}

impl Role {
    /// Parse a stored role string, case-insensitively. Anything that is
    /// not recognizably an operator falls back to `User`.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("operator") {
            Role::Operator
        } else {
            Role::User
        }
    }

    /// Lowercase form used in access-token claims.
    pub fn as_claim(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Operator => "operator",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    /// Argon2id PHC-format hash. `None` for federation-only accounts.
    pub password_hash: Option<String>,
    pub role: Role,
    /// Base32-encoded TOTP secret, present once enrollment has started.
    pub two_factor_secret: Option<String>,
    pub two_factor_enabled: bool,
    /// External identity-provider subject id (e.g. a Google `sub`).
    pub federation_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    /// Already-hashed password; the store never sees plaintext.
    pub password_hash: Option<String>,
    pub role: Role,
    pub federation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateUser {
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub password_hash: Option<String>,
    pub two_factor_enabled: Option<bool>,
    /// `Some(Some(val))` = set, `Some(None)` = clear, `None` = no change.
    pub two_factor_secret: Option<Option<String>>,
}

/// Lookup filter for [`crate::store::UserStore::find_by_filter`].
/// All populated fields must match.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub id: Option<Uuid>,
    pub email: Option<String>,
    pub federation_id: Option<String>,
}

/// Profile asserted by an external identity provider after its own
/// authentication ceremony.
#[derive(Debug, Clone)]
pub struct FederatedProfile {
    /// Provider-side subject identifier.
    pub subject_id: String,
    pub email: String,
    pub username: Option<String>,
    pub full_name: Option<String>,
}
