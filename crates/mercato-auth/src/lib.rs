//! Mercato Auth — the credential & session-token authority of the
//! marketplace backend: password authentication, JWT access/refresh
//! issuance and rotation, password reset, and TOTP enrollment.

pub mod config;
pub mod error;
pub mod password;
pub mod service;
pub mod token;
pub mod totp;

pub use config::{AuthConfig, SecretDomain};
pub use error::AuthError;
pub use service::{Ack, AuthService, TwoFactorEnrollment};
pub use token::{AccessClaims, RefreshClaims, ResetClaims, RolePolicy, TokenIssuer, TokenPair};
