//! Authentication configuration.
//!
//! All signing material is resolved exactly once at process start;
//! nothing in the hot path reads the environment.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};

use crate::error::AuthError;

/// Signing material for one token domain (session or reset).
#[derive(Debug, Clone)]
pub struct SecretDomain {
    /// HMAC signing key.
    pub key: String,
    /// Signing algorithm (HMAC family only).
    pub algorithm: Algorithm,
}

impl SecretDomain {
    pub fn new(key: impl Into<String>, algorithm: Algorithm) -> Self {
        Self {
            key: key.into(),
            algorithm,
        }
    }

    pub fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_secret(self.key.as_bytes())
    }

    pub fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_secret(self.key.as_bytes())
    }

    fn validate(&self, name: &str) -> Result<(), AuthError> {
        if self.key.is_empty() {
            return Err(AuthError::Config(format!("{name}: signing key is empty")));
        }
        match self.algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(()),
            other => Err(AuthError::Config(format!(
                "{name}: unsupported algorithm {other:?}, expected an HMAC variant"
            ))),
        }
    }
}

/// Configuration for the token authority.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Signing domain for access and refresh tokens.
    pub session: SecretDomain,
    /// Signing domain for password-reset tokens. Must be distinct from
    /// the session domain so a leaked reset token cannot be replayed as
    /// a refresh token.
    pub reset: SecretDomain,
    /// Access token lifetime in seconds (default: 86_400 = 1 day).
    pub access_token_lifetime_secs: u64,
    /// Refresh token lifetime in seconds (default: 864_000 = 10 days).
    pub refresh_token_lifetime_secs: u64,
    /// Reset token lifetime in seconds (default: 3_600 = 1 hour).
    pub reset_token_lifetime_secs: u64,
    /// Issuer name shown in authenticator apps.
    pub totp_issuer: String,
    /// Minimum password length for policy enforcement.
    pub min_password_length: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session: SecretDomain::new(String::new(), Algorithm::HS256),
            reset: SecretDomain::new(String::new(), Algorithm::HS256),
            access_token_lifetime_secs: 86_400,
            refresh_token_lifetime_secs: 864_000,
            reset_token_lifetime_secs: 3_600,
            totp_issuer: "Mercato".into(),
            min_password_length: 8,
        }
    }
}

impl AuthConfig {
    /// Resolve configuration from the process environment, failing fast
    /// on missing or malformed values.
    ///
    /// Required: `MERCATO_SESSION_KEY`, `MERCATO_RESET_KEY`.
    /// Optional: `MERCATO_SESSION_ALGORITHM`, `MERCATO_RESET_ALGORITHM`
    /// (default `HS256`), `MERCATO_ACCESS_TTL_SECS`,
    /// `MERCATO_REFRESH_TTL_SECS`, `MERCATO_RESET_TTL_SECS`,
    /// `MERCATO_TOTP_ISSUER`, `MERCATO_MIN_PASSWORD_LENGTH`.
    pub fn from_env() -> Result<Self, AuthError> {
        let defaults = Self::default();

        let config = Self {
            session: SecretDomain::new(
                require_env("MERCATO_SESSION_KEY")?,
                parse_algorithm("MERCATO_SESSION_ALGORITHM")?,
            ),
            reset: SecretDomain::new(
                require_env("MERCATO_RESET_KEY")?,
                parse_algorithm("MERCATO_RESET_ALGORITHM")?,
            ),
            access_token_lifetime_secs: parse_env(
                "MERCATO_ACCESS_TTL_SECS",
                defaults.access_token_lifetime_secs,
            )?,
            refresh_token_lifetime_secs: parse_env(
                "MERCATO_REFRESH_TTL_SECS",
                defaults.refresh_token_lifetime_secs,
            )?,
            reset_token_lifetime_secs: parse_env(
                "MERCATO_RESET_TTL_SECS",
                defaults.reset_token_lifetime_secs,
            )?,
            totp_issuer: std::env::var("MERCATO_TOTP_ISSUER").unwrap_or(defaults.totp_issuer),
            min_password_length: parse_env(
                "MERCATO_MIN_PASSWORD_LENGTH",
                defaults.min_password_length,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check invariants the rest of the authority relies on.
    pub fn validate(&self) -> Result<(), AuthError> {
        self.session.validate("session domain")?;
        self.reset.validate("reset domain")?;
        if self.session.key == self.reset.key {
            return Err(AuthError::Config(
                "session and reset domains must use distinct signing keys".into(),
            ));
        }
        Ok(())
    }
}

fn require_env(name: &str) -> Result<String, AuthError> {
    std::env::var(name).map_err(|_| AuthError::Config(format!("{name} is not set")))
}

fn parse_algorithm(name: &str) -> Result<Algorithm, AuthError> {
    match std::env::var(name) {
        Err(_) => Ok(Algorithm::HS256),
        Ok(raw) => raw
            .parse::<Algorithm>()
            .map_err(|_| AuthError::Config(format!("{name}: unknown algorithm {raw:?}"))),
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AuthError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| AuthError::Config(format!("{name}: invalid value {raw:?}"))),
    }
}
