//! Authentication error taxonomy.
//!
//! Every operation surfaces exactly one of these variants; no flow
//! swallows an error into a generic success. The reset flow's soft
//! `{success: false}` responses are modeled on [`crate::service::Ack`],
//! not here.

use mercato_core::error::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing or mismatched email/password.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Wrong role for the operator path, or missing federation fields.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Bad or expired token, failed TOTP check, or decode failure.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Signature-invalid token, distinguished from expiry.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Duplicate registration.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Validation failure: missing fields, password policy, zero-row
    /// updates.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// User missing during change-password.
    #[error("not found: {0}")]
    NotFound(String),

    /// Token signing failed (config missing, algorithm mismatch).
    #[error("token issuance failed: {0}")]
    TokenIssuance(String),

    /// Startup configuration is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Cryptographic primitive failure (malformed stored hash, TOTP
    /// secret decode).
    #[error("cryptography error: {0}")]
    Crypto(String),

    /// Failure reported by the credential store collaborator.
    #[error("store error: {0}")]
    Store(#[from] CoreError),
}
