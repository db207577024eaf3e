//! Authentication service — orchestration of every credential and
//! token flow.
//!
//! Generic over the store and mailer collaborators so that the auth
//! layer has no dependency on any persistence or transport crate.

use mercato_core::error::CoreError;
use mercato_core::models::user::{
    CreateUser, FederatedProfile, Role, UpdateUser, User, UserFilter,
};
use mercato_core::store::{Mailer, UserStore};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::password;
use crate::token::{self, RolePolicy, TokenIssuer, TokenPair};
use crate::totp;

/// Acknowledgement for flows whose failure mode is deliberately soft
/// (password reset existence checks degrade to `success: false` rather
/// than a typed error, to reduce account-enumeration signal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub success: bool,
}

impl Ack {
    pub const OK: Ack = Ack { success: true };
    pub const FAILED: Ack = Ack { success: false };
}

/// Result of starting a 2FA enrollment.
#[derive(Debug, Clone)]
pub struct TwoFactorEnrollment {
    /// Base32 secret, as persisted.
    pub secret: String,
    /// Scannable otpauth URI.
    pub provisioning_uri: String,
}

/// The credential & session-token authority.
///
/// Stateless: all durable state lives behind the [`UserStore`]
/// collaborator, and every operation is an independent request.
pub struct AuthService<S: UserStore, M: Mailer> {
    store: S,
    mailer: M,
    config: AuthConfig,
    user_tokens: TokenIssuer,
    operator_tokens: TokenIssuer,
}

impl<S: UserStore, M: Mailer> AuthService<S, M> {
    pub fn new(store: S, mailer: M, config: AuthConfig) -> Self {
        let user_tokens = TokenIssuer::new(&config, RolePolicy::User);
        let operator_tokens = TokenIssuer::new(&config, RolePolicy::Operator);
        Self {
            store,
            mailer,
            config,
            user_tokens,
            operator_tokens,
        }
    }

    /// Issuer for the ordinary-user context.
    pub fn user_tokens(&self) -> &TokenIssuer {
        &self.user_tokens
    }

    /// Issuer for the operator context.
    pub fn operator_tokens(&self) -> &TokenIssuer {
        &self.operator_tokens
    }

    // -------------------------------------------------------------------
    // Credential verification
    // -------------------------------------------------------------------

    /// Authenticate a user with email + password and issue a token pair.
    ///
    /// Missing fields, unknown email, a password-less (federation-only)
    /// account, and a hash mismatch are all `InvalidCredentials` — the
    /// caller learns nothing beyond "no".
    pub async fn login(&self, email: &str, pass: &str) -> Result<TokenPair, AuthError> {
        let user = self.verify_credentials(email, pass).await?;
        self.user_tokens.issue(user.id, Some(user.role))
    }

    /// Operator login: identical to [`AuthService::login`], but the
    /// resolved account's role must be exactly `Operator`.
    ///
    /// The role check runs after the email lookup and before token
    /// issuance; a correct password for a non-operator account is still
    /// `AccessDenied`.
    pub async fn operator_login(&self, email: &str, pass: &str) -> Result<TokenPair, AuthError> {
        if email.is_empty() || pass.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }
        let user = self
            .store
            .find_by_email(email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if user.role != Role::Operator {
            return Err(AuthError::AccessDenied(
                "operator role required for this login path".into(),
            ));
        }

        let hash = user
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidCredentials)?;
        if !password::verify_password(pass, hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        self.operator_tokens.issue(user.id, Some(user.role))
    }

    /// Register a new account and trigger the welcome email.
    pub async fn register(
        &self,
        email: &str,
        pass: &str,
        username: &str,
    ) -> Result<Ack, AuthError> {
        if email.is_empty() || pass.is_empty() || username.is_empty() {
            return Err(AuthError::BadRequest(
                "email, password and username are required".into(),
            ));
        }
        self.check_password_policy(pass)?;

        if self.store.find_by_email(email).await?.is_some() {
            return Err(AuthError::Conflict(format!(
                "an account with email {email} already exists"
            )));
        }

        let hash = password::hash_password(pass)?;
        let user = self
            .store
            .create(CreateUser {
                email: email.to_string(),
                username: username.to_string(),
                full_name: None,
                password_hash: Some(hash),
                role: Role::User,
                federation_id: None,
            })
            .await
            .map_err(|e| match e {
                CoreError::AlreadyExists { entity } => {
                    AuthError::Conflict(format!("{entity} already exists"))
                }
                other => other.into(),
            })?;

        // Fire-and-forget: a mail outage must not fail registration.
        if let Err(e) = self.mailer.send_registration_email(&user.email).await {
            tracing::warn!(email = %user.email, error = %e, "welcome email failed");
        }

        tracing::info!(user_id = %user.id, "user registered");
        Ok(Ack::OK)
    }

    /// Find-or-create login for an externally authenticated identity.
    ///
    /// Idempotent: repeated calls with the same email resolve to the
    /// same account. Accounts created here carry no password hash.
    pub async fn validate_federated_user(
        &self,
        profile: FederatedProfile,
    ) -> Result<TokenPair, AuthError> {
        if profile.subject_id.is_empty() || profile.email.is_empty() {
            return Err(AuthError::AccessDenied(
                "federated profile is missing subject id or email".into(),
            ));
        }

        let user = match self.store.find_by_email(&profile.email).await? {
            Some(user) => user,
            None => {
                let username = profile
                    .username
                    .clone()
                    .unwrap_or_else(|| local_part(&profile.email));
                self.store
                    .create(CreateUser {
                        email: profile.email.clone(),
                        username,
                        full_name: profile.full_name.clone(),
                        password_hash: None,
                        role: Role::User,
                        federation_id: Some(profile.subject_id.clone()),
                    })
                    .await?
            }
        };

        self.user_tokens.issue(user.id, Some(user.role))
    }

    // -------------------------------------------------------------------
    // Token rotation
    // -------------------------------------------------------------------

    /// Rotate a refresh token in the ordinary-user context.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        self.user_tokens.refresh(refresh_token)
    }

    /// Rotate a refresh token in the operator context.
    pub fn operator_refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        self.operator_tokens.refresh(refresh_token)
    }

    // -------------------------------------------------------------------
    // Two-factor enrollment
    // -------------------------------------------------------------------

    /// Start (or restart) TOTP enrollment for a user.
    ///
    /// A fresh secret always overwrites any prior one and resets the
    /// enabled flag — re-enrolling demotes an `Enabled` account back to
    /// pending until the new secret is verified.
    pub async fn enroll_two_factor(
        &self,
        user_id: Uuid,
    ) -> Result<TwoFactorEnrollment, AuthError> {
        let user = self.find_by_id(user_id).await?.ok_or_else(|| {
            AuthError::NotFound(format!("user {user_id} not found"))
        })?;

        let (secret, provisioning_uri) =
            totp::generate_enrollment(&self.config.totp_issuer, &user.email)?;

        let affected = self
            .store
            .update(
                user.id,
                UpdateUser {
                    two_factor_secret: Some(Some(secret.clone())),
                    two_factor_enabled: Some(false),
                    ..Default::default()
                },
            )
            .await?;
        if affected == 0 {
            return Err(AuthError::NotFound(format!("user {user_id} not found")));
        }

        Ok(TwoFactorEnrollment {
            secret,
            provisioning_uri,
        })
    }

    /// Complete enrollment by checking one TOTP code.
    ///
    /// This is enrollment-completion only, not a login-time check: an
    /// account that is already enabled is rejected, as is a missing
    /// user, a missing secret, or a wrong code — all `Unauthorized`.
    pub async fn verify_two_factor(&self, user_id: Uuid, code: &str) -> Result<bool, AuthError> {
        let user = self
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::Unauthorized("unknown user".into()))?;

        if user.two_factor_enabled {
            return Err(AuthError::Unauthorized(
                "two-factor is already enabled".into(),
            ));
        }
        let secret = user
            .two_factor_secret
            .as_deref()
            .ok_or_else(|| AuthError::Unauthorized("two-factor is not enrolled".into()))?;

        if !totp::verify_code(secret, code, &self.config.totp_issuer, &user.email)? {
            return Err(AuthError::Unauthorized("invalid two-factor code".into()));
        }

        self.store
            .update(
                user.id,
                UpdateUser {
                    two_factor_enabled: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        tracing::info!(user_id = %user.id, "two-factor enabled");
        Ok(true)
    }

    // -------------------------------------------------------------------
    // Password reset
    // -------------------------------------------------------------------

    /// Request a password-reset token for `email`.
    ///
    /// An unknown email yields a soft `Ack::FAILED` rather than a typed
    /// error. On success the token is handed to the mail collaborator;
    /// mail failures are logged and do not fail the request.
    pub async fn request_password_reset(&self, email: &str) -> Result<Ack, AuthError> {
        let Some(user) = self.store.find_by_email(email).await? else {
            return Ok(Ack::FAILED);
        };

        let reset_token = token::issue_reset_token(&user.email, &self.config)?;

        if let Err(e) = self
            .mailer
            .send_reset_password_email(&user.email, &reset_token)
            .await
        {
            tracing::warn!(email = %user.email, error = %e, "reset email failed");
        }

        Ok(Ack::OK)
    }

    /// Redeem a reset token and rewrite the password hash.
    ///
    /// Expired tokens are `Unauthorized`; tampered or malformed tokens
    /// are `Forbidden`. A redemption whose email no longer matches a
    /// row degrades to a soft failure.
    pub async fn reset_password(
        &self,
        reset_token: &str,
        new_password: &str,
    ) -> Result<Ack, AuthError> {
        let claims = token::verify_reset_token(reset_token, &self.config)?;
        self.check_password_policy(new_password)?;

        let hash = password::hash_password(new_password)?;
        let affected = self
            .store
            .update_password_by_email(&claims.email, &hash)
            .await?;
        if affected == 0 {
            return Ok(Ack::FAILED);
        }

        tracing::info!(email = %claims.email, "password reset");
        Ok(Ack::OK)
    }

    // -------------------------------------------------------------------
    // Change password
    // -------------------------------------------------------------------

    /// Change a password for the holder of `session_token`.
    ///
    /// The token is decoded, not verified — it serves only to name the
    /// subject; the old password is the authentication factor. Accounts
    /// without a stored hash (federation-only) skip the old-password
    /// check.
    pub async fn change_password(
        &self,
        session_token: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<Ack, AuthError> {
        let subject = token::decode_subject_unverified(session_token)?;

        let user = self
            .find_by_id(subject)
            .await?
            .ok_or_else(|| AuthError::NotFound(format!("user {subject} not found")))?;

        if let Some(hash) = user.password_hash.as_deref() {
            if !password::verify_password(old_password, hash)? {
                return Err(AuthError::BadRequest("old password does not match".into()));
            }
            if old_password == new_password {
                return Err(AuthError::BadRequest(
                    "new password must differ from the old one".into(),
                ));
            }
        }
        self.check_password_policy(new_password)?;

        let new_hash = password::hash_password(new_password)?;
        let affected = self
            .store
            .update(
                user.id,
                UpdateUser {
                    password_hash: Some(new_hash),
                    ..Default::default()
                },
            )
            .await?;
        if affected == 0 {
            return Err(AuthError::BadRequest("password update affected no rows".into()));
        }

        tracing::info!(user_id = %user.id, "password changed");
        Ok(Ack::OK)
    }

    // -------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------

    async fn verify_credentials(&self, email: &str, pass: &str) -> Result<User, AuthError> {
        if email.is_empty() || pass.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }
        let user = self
            .store
            .find_by_email(email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let hash = user
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidCredentials)?;
        if !password::verify_password(pass, hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError> {
        let mut users = self
            .store
            .find_by_filter(UserFilter {
                id: Some(id),
                ..Default::default()
            })
            .await?;
        Ok(if users.is_empty() {
            None
        } else {
            Some(users.swap_remove(0))
        })
    }

    fn check_password_policy(&self, pass: &str) -> Result<(), AuthError> {
        if pass.len() < self.config.min_password_length {
            return Err(AuthError::BadRequest(format!(
                "password must be at least {} characters",
                self.config.min_password_length
            )));
        }
        Ok(())
    }
}

fn local_part(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}
