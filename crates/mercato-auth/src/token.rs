//! JWT issuance, rotation, and verification for the session and
//! password-reset signing domains.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation};
use mercato_core::models::user::Role;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{AuthConfig, SecretDomain};
use crate::error::AuthError;

/// Claims embedded in every access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject — user ID (UUID string).
    pub sub: String,
    /// Lowercase role the caller acts under.
    pub default_role: String,
    /// Roles the caller may assume; always `[default_role]`.
    pub allowed_roles: Vec<String>,
    /// Issued-at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
}

/// Claims embedded in refresh tokens — identity only, no role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Claims embedded in password-reset tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetClaims {
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// An access/refresh pair. Ephemeral — never persisted, never tracked
/// for revocation; validity is solely signature plus expiry.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Role defaulting applied when a token payload carries no role — i.e.
/// on every refresh, whose input token holds only a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolePolicy {
    User,
    Operator,
}

impl RolePolicy {
    fn default_role(self) -> Role {
        match self {
            RolePolicy::User => Role::User,
            RolePolicy::Operator => Role::Operator,
        }
    }
}

/// Mints access/refresh pairs under the session domain.
///
/// One issuer is instantiated per role context (user or operator) so
/// the two contexts cannot be confused at the call site; the issuance
/// logic itself is shared.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    domain: SecretDomain,
    policy: RolePolicy,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig, policy: RolePolicy) -> Self {
        Self {
            domain: config.session.clone(),
            policy,
            access_ttl_secs: config.access_token_lifetime_secs,
            refresh_ttl_secs: config.refresh_token_lifetime_secs,
        }
    }

    /// Issue a fresh access/refresh pair for `subject`.
    ///
    /// The refresh token is minted first; the access token's subject is
    /// then re-derived by verifying that refresh token, so issuance and
    /// rotation ([`TokenIssuer::refresh`]) run the identical code path.
    /// `role` is the stored account role; `None` falls back to the
    /// issuer's policy default (the refresh case).
    pub fn issue(&self, subject: Uuid, role: Option<Role>) -> Result<TokenPair, AuthError> {
        let now = Utc::now().timestamp();
        let refresh_claims = RefreshClaims {
            sub: subject.to_string(),
            iat: now,
            exp: now + self.refresh_ttl_secs as i64,
        };
        let refresh_token = self.sign(&refresh_claims)?;

        // Freshly minted, so a failure here is a config inconsistency,
        // not a caller error.
        let verified = self
            .decode_refresh(&refresh_token)
            .map_err(|e| AuthError::TokenIssuance(format!("refresh re-verify: {e}")))?;

        let default_role = role.unwrap_or(self.policy.default_role()).as_claim();
        let access_claims = AccessClaims {
            sub: verified.sub,
            default_role: default_role.to_string(),
            allowed_roles: vec![default_role.to_string()],
            iat: now,
            exp: now + self.access_ttl_secs as i64,
        };
        let access_token = self.sign(&access_claims)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Rotate a refresh token into a new pair.
    ///
    /// Any verification failure (expired, malformed, wrong signature)
    /// is `Unauthorized`. The reissued access token's role defaults per
    /// this issuer's policy — the store is deliberately not re-read.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.verify_refresh(refresh_token)?;
        let subject = Uuid::parse_str(&claims.sub)
            .map_err(|_| AuthError::Unauthorized("refresh token subject is not a UUID".into()))?;
        self.issue(subject, None)
    }

    /// Verify a refresh token under the session domain.
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        self.decode_refresh(token)
            .map_err(|e| AuthError::Unauthorized(format!("refresh token rejected: {e}")))
    }

    /// Decode and verify an access token under the session domain.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let validation = Validation::new(self.domain.algorithm);
        jsonwebtoken::decode::<AccessClaims>(token, &self.domain.decoding_key(), &validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::Unauthorized(format!("access token rejected: {e}")))
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String, AuthError> {
        let header = Header::new(self.domain.algorithm);
        jsonwebtoken::encode(&header, claims, &self.domain.encoding_key())
            .map_err(|e| AuthError::TokenIssuance(format!("JWT encode: {e}")))
    }

    fn decode_refresh(&self, token: &str) -> Result<RefreshClaims, jsonwebtoken::errors::Error> {
        let validation = Validation::new(self.domain.algorithm);
        jsonwebtoken::decode::<RefreshClaims>(token, &self.domain.decoding_key(), &validation)
            .map(|data| data.claims)
    }
}

/// Mint a single-purpose password-reset token bound to `email`, signed
/// under the reset domain.
pub fn issue_reset_token(email: &str, config: &AuthConfig) -> Result<String, AuthError> {
    let now = Utc::now().timestamp();
    let claims = ResetClaims {
        email: email.to_string(),
        iat: now,
        exp: now + config.reset_token_lifetime_secs as i64,
    };
    let header = Header::new(config.reset.algorithm);
    jsonwebtoken::encode(&header, &claims, &config.reset.encoding_key())
        .map_err(|e| AuthError::TokenIssuance(format!("JWT encode: {e}")))
}

/// Verify a password-reset token under the reset domain.
///
/// Expiry maps to `Unauthorized`; every other verification failure
/// (tampered signature, malformed token) maps to `Forbidden`.
pub fn verify_reset_token(token: &str, config: &AuthConfig) -> Result<ResetClaims, AuthError> {
    let validation = Validation::new(config.reset.algorithm);
    jsonwebtoken::decode::<ResetClaims>(token, &config.reset.decoding_key(), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                AuthError::Unauthorized("reset token expired".into())
            }
            _ => AuthError::Forbidden(format!("reset token rejected: {e}")),
        })
}

/// Extract the `sub` claim from a session token without verifying its
/// signature or expiry.
///
/// The change-password flow is specified as decode-only: the token is
/// an opaque envelope for the subject id, and the old-password check is
/// the actual authentication factor.
pub fn decode_subject_unverified(token: &str) -> Result<Uuid, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data =
        jsonwebtoken::decode::<serde_json::Value>(token, &DecodingKey::from_secret(&[]), &validation)
            .map_err(|e| AuthError::Unauthorized(format!("token decode: {e}")))?;

    let sub = data
        .claims
        .get("sub")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AuthError::Unauthorized("token carries no subject".into()))?;

    Uuid::parse_str(sub).map_err(|_| AuthError::Unauthorized("token subject is not a UUID".into()))
}
