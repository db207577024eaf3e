//! TOTP secret generation and code verification (RFC 6238).

use totp_rs::{Algorithm, Secret, TOTP};

use crate::error::AuthError;

fn build_totp(
    secret_bytes: Vec<u8>,
    issuer: &str,
    account: &str,
) -> Result<TOTP, AuthError> {
    TOTP::new(
        Algorithm::SHA1, // RFC 6238 default
        6,               // digits
        1,               // skew (±1 step)
        30,              // step seconds
        secret_bytes,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|e| AuthError::Crypto(format!("TOTP init: {e}")))
}

/// Generate a TOTP enrollment: secret + otpauth URI.
///
/// Returns `(base32_secret, otpauth_uri)`. The base32 form is what the
/// store persists; the URI is what the user scans.
pub fn generate_enrollment(issuer: &str, account: &str) -> Result<(String, String), AuthError> {
    let secret = Secret::generate_secret();
    let secret_bytes = secret
        .to_bytes()
        .map_err(|e| AuthError::Crypto(format!("secret bytes: {e}")))?;

    let totp = build_totp(secret_bytes, issuer, account)?;

    let base32 = secret.to_encoded().to_string();
    let uri = totp.get_url();

    Ok((base32, uri))
}

/// Verify a TOTP code against a stored base32 secret.
pub fn verify_code(
    base32_secret: &str,
    code: &str,
    issuer: &str,
    account: &str,
) -> Result<bool, AuthError> {
    let secret_bytes = Secret::Encoded(base32_secret.to_string())
        .to_bytes()
        .map_err(|e| AuthError::Crypto(format!("secret decode: {e}")))?;

    let totp = build_totp(secret_bytes, issuer, account)?;

    totp.check_current(code)
        .map_err(|e| AuthError::Crypto(format!("TOTP check: {e}")))
}

/// Compute the current-window code for a stored base32 secret.
///
/// Exists for enrollment tests; the service itself only checks codes.
pub fn current_code(
    base32_secret: &str,
    issuer: &str,
    account: &str,
) -> Result<String, AuthError> {
    let secret_bytes = Secret::Encoded(base32_secret.to_string())
        .to_bytes()
        .map_err(|e| AuthError::Crypto(format!("secret decode: {e}")))?;

    let totp = build_totp(secret_bytes, issuer, account)?;

    totp.generate_current()
        .map_err(|e| AuthError::Crypto(format!("TOTP generate: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrollment_produces_valid_uri() {
        let (base32, uri) = generate_enrollment("Mercato", "alice@example.com").unwrap();
        assert!(!base32.is_empty());
        assert!(uri.starts_with("otpauth://totp/"));
        assert!(uri.contains("Mercato"));
        assert!(uri.contains("alice"));
    }

    #[test]
    fn current_code_verifies() {
        let (base32, _) = generate_enrollment("Mercato", "test@test.com").unwrap();
        let code = current_code(&base32, "Mercato", "test@test.com").unwrap();
        assert!(verify_code(&base32, &code, "Mercato", "test@test.com").unwrap());
    }

    #[test]
    fn wrong_code_fails() {
        let (base32, _) = generate_enrollment("Mercato", "test@test.com").unwrap();
        assert!(!verify_code(&base32, "000000", "Mercato", "test@test.com").unwrap());
    }

    #[test]
    fn malformed_secret_is_an_error() {
        assert!(verify_code("&&&not-base32&&&", "000000", "Mercato", "t@t.com").is_err());
    }

    #[test]
    fn repeated_enrollments_differ() {
        let (s1, _) = generate_enrollment("Mercato", "a@a.com").unwrap();
        let (s2, _) = generate_enrollment("Mercato", "a@a.com").unwrap();
        assert_ne!(s1, s2);
    }
}
