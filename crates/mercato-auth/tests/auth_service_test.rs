//! Integration tests for the authentication service, driven against
//! the in-memory store.

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use mercato_auth::config::{AuthConfig, SecretDomain};
use mercato_auth::error::AuthError;
use mercato_auth::service::{Ack, AuthService};
use mercato_auth::token::{RefreshClaims, ResetClaims};
use mercato_auth::totp;
use mercato_core::models::user::{CreateUser, FederatedProfile, Role};
use mercato_core::store::UserStore;
use mercato_store::{FailingMailer, MailMessage, MemoryUserStore, RecordingMailer};
use std::sync::Arc;
use uuid::Uuid;

const SESSION_KEY: &str = "session-test-key";
const RESET_KEY: &str = "reset-test-key";

fn test_config() -> AuthConfig {
    AuthConfig {
        session: SecretDomain::new(SESSION_KEY, Algorithm::HS256),
        reset: SecretDomain::new(RESET_KEY, Algorithm::HS256),
        ..AuthConfig::default()
    }
}

type Service = AuthService<Arc<MemoryUserStore>, Arc<RecordingMailer>>;

/// Service plus handles on its collaborators for direct assertions.
fn setup() -> (Service, Arc<MemoryUserStore>, Arc<RecordingMailer>) {
    let store = Arc::new(MemoryUserStore::new());
    let mailer = Arc::new(RecordingMailer::new());
    let svc = AuthService::new(store.clone(), mailer.clone(), test_config());
    (svc, store, mailer)
}

async fn register_alice(svc: &Service) {
    svc.register("alice@example.com", "Abc12345!", "alice")
        .await
        .unwrap();
}

/// Seed an operator directly — registration always creates plain users.
async fn seed_operator(store: &MemoryUserStore) -> Uuid {
    let hash = mercato_auth::password::hash_password("OpSecret99!").unwrap();
    store
        .create(CreateUser {
            email: "op@example.com".into(),
            username: "op".into(),
            full_name: None,
            password_hash: Some(hash),
            role: Role::Operator,
            federation_id: None,
        })
        .await
        .unwrap()
        .id
}

// ---------------------------------------------------------------------
// Login & registration
// ---------------------------------------------------------------------

#[tokio::test]
async fn login_happy_path() {
    let (svc, _, _) = setup();
    register_alice(&svc).await;

    let pair = svc.login("alice@example.com", "Abc12345!").await.unwrap();
    assert!(!pair.access_token.is_empty());
    assert!(!pair.refresh_token.is_empty());

    let claims = svc.user_tokens().verify_access(&pair.access_token).unwrap();
    assert_eq!(claims.default_role, "user");
    assert_eq!(claims.allowed_roles, vec!["user".to_string()]);
    assert!(Uuid::parse_str(&claims.sub).is_ok());
}

#[tokio::test]
async fn login_wrong_password() {
    let (svc, _, _) = setup();
    register_alice(&svc).await;

    let err = svc
        .login("alice@example.com", "wrong-password")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn login_unknown_email() {
    let (svc, _, _) = setup();
    let err = svc.login("nobody@example.com", "whatever1").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn login_missing_fields() {
    let (svc, _, _) = setup();
    assert!(matches!(
        svc.login("", "pw").await.unwrap_err(),
        AuthError::InvalidCredentials
    ));
    assert!(matches!(
        svc.login("alice@example.com", "").await.unwrap_err(),
        AuthError::InvalidCredentials
    ));
}

#[tokio::test]
async fn login_federated_account_has_no_password() {
    let (svc, _, _) = setup();
    svc.validate_federated_user(FederatedProfile {
        subject_id: "google-sub-1".into(),
        email: "fed@example.com".into(),
        username: None,
        full_name: None,
    })
    .await
    .unwrap();

    let err = svc.login("fed@example.com", "anything1").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn register_duplicate_email_conflicts() {
    let (svc, _, _) = setup();
    register_alice(&svc).await;

    let err = svc
        .register("alice@example.com", "Other123!", "alice2")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Conflict(_)));
}

#[tokio::test]
async fn register_enforces_password_policy() {
    let (svc, _, _) = setup();
    let err = svc
        .register("short@example.com", "abc", "shorty")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::BadRequest(_)));
}

#[tokio::test]
async fn register_sends_welcome_email() {
    let (svc, _, mailer) = setup();
    register_alice(&svc).await;

    assert_eq!(
        mailer.sent(),
        vec![MailMessage::Registration {
            email: "alice@example.com".into()
        }]
    );
}

#[tokio::test]
async fn register_survives_mail_outage() {
    let store = Arc::new(MemoryUserStore::new());
    let svc = AuthService::new(store.clone(), FailingMailer, test_config());

    let ack = svc
        .register("alice@example.com", "Abc12345!", "alice")
        .await
        .unwrap();
    assert_eq!(ack, Ack::OK);
    assert_eq!(store.len(), 1);
}

// ---------------------------------------------------------------------
// Operator login
// ---------------------------------------------------------------------

#[tokio::test]
async fn operator_login_happy_path() {
    let (svc, store, _) = setup();
    let op_id = seed_operator(&store).await;

    let pair = svc
        .operator_login("op@example.com", "OpSecret99!")
        .await
        .unwrap();
    let claims = svc
        .operator_tokens()
        .verify_access(&pair.access_token)
        .unwrap();
    assert_eq!(claims.default_role, "operator");
    assert_eq!(claims.sub, op_id.to_string());
}

#[tokio::test]
async fn operator_login_rejects_plain_users() {
    let (svc, _, _) = setup();
    register_alice(&svc).await;

    // Correct password, wrong role.
    let err = svc
        .operator_login("alice@example.com", "Abc12345!")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AccessDenied(_)));
}

#[tokio::test]
async fn operator_login_wrong_password() {
    let (svc, store, _) = setup();
    seed_operator(&store).await;

    let err = svc
        .operator_login("op@example.com", "wrong-password")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn ordinary_login_accepts_operators() {
    // The ordinary path carries no role restriction; the tokens keep
    // the stored role.
    let (svc, store, _) = setup();
    seed_operator(&store).await;

    let pair = svc.login("op@example.com", "OpSecret99!").await.unwrap();
    let claims = svc.user_tokens().verify_access(&pair.access_token).unwrap();
    assert_eq!(claims.default_role, "operator");
}

// ---------------------------------------------------------------------
// Federated login
// ---------------------------------------------------------------------

#[tokio::test]
async fn federated_login_is_idempotent() {
    let (svc, store, _) = setup();
    let profile = FederatedProfile {
        subject_id: "google-sub-1".into(),
        email: "fed@example.com".into(),
        username: Some("fed".into()),
        full_name: Some("Fede Rated".into()),
    };

    let first = svc.validate_federated_user(profile.clone()).await.unwrap();
    let second = svc.validate_federated_user(profile).await.unwrap();
    assert_eq!(store.len(), 1);

    let c1 = svc.user_tokens().verify_access(&first.access_token).unwrap();
    let c2 = svc.user_tokens().verify_access(&second.access_token).unwrap();
    assert_eq!(c1.sub, c2.sub);
    assert_eq!(c1.default_role, "user");
}

#[tokio::test]
async fn federated_login_requires_subject_and_email() {
    let (svc, _, _) = setup();

    let err = svc
        .validate_federated_user(FederatedProfile {
            subject_id: "".into(),
            email: "fed@example.com".into(),
            username: None,
            full_name: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AccessDenied(_)));

    let err = svc
        .validate_federated_user(FederatedProfile {
            subject_id: "google-sub-1".into(),
            email: "".into(),
            username: None,
            full_name: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AccessDenied(_)));
}

// ---------------------------------------------------------------------
// Refresh
// ---------------------------------------------------------------------

#[tokio::test]
async fn refresh_returns_a_new_valid_pair() {
    let (svc, _, _) = setup();
    register_alice(&svc).await;
    let pair = svc.login("alice@example.com", "Abc12345!").await.unwrap();

    let rotated = svc.refresh(&pair.refresh_token).unwrap();
    let claims = svc
        .user_tokens()
        .verify_access(&rotated.access_token)
        .unwrap();
    assert_eq!(claims.default_role, "user");

    // And the rotated refresh token itself rotates again.
    assert!(svc.refresh(&rotated.refresh_token).is_ok());
}

#[tokio::test]
async fn refresh_is_not_revocation_tracked() {
    // Explicit design property: a refresh token stays valid until its
    // natural expiry, even after being used.
    let (svc, _, _) = setup();
    register_alice(&svc).await;
    let pair = svc.login("alice@example.com", "Abc12345!").await.unwrap();

    assert!(svc.refresh(&pair.refresh_token).is_ok());
    assert!(svc.refresh(&pair.refresh_token).is_ok());
}

#[tokio::test]
async fn refresh_rejects_garbage() {
    let (svc, _, _) = setup();
    let err = svc.refresh("totally-bogus-token").unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized(_)));
}

#[tokio::test]
async fn refresh_rejects_expired_tokens() {
    let (svc, _, _) = setup();
    let now = Utc::now().timestamp();
    let claims = RefreshClaims {
        sub: Uuid::new_v4().to_string(),
        iat: now - 864_000,
        exp: now - 120,
    };
    let token = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SESSION_KEY.as_bytes()),
    )
    .unwrap();

    let err = svc.refresh(&token).unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized(_)));
}

#[tokio::test]
async fn operator_refresh_defaults_to_operator_role() {
    let (svc, store, _) = setup();
    seed_operator(&store).await;
    let pair = svc
        .operator_login("op@example.com", "OpSecret99!")
        .await
        .unwrap();

    let rotated = svc.operator_refresh(&pair.refresh_token).unwrap();
    let claims = svc
        .operator_tokens()
        .verify_access(&rotated.access_token)
        .unwrap();
    assert_eq!(claims.default_role, "operator");
}

// ---------------------------------------------------------------------
// Two-factor enrollment
// ---------------------------------------------------------------------

async fn alice_id(store: &MemoryUserStore) -> Uuid {
    store
        .find_by_email("alice@example.com")
        .await
        .unwrap()
        .unwrap()
        .id
}

#[tokio::test]
async fn two_factor_enroll_then_verify_enables_once() {
    let (svc, store, _) = setup();
    register_alice(&svc).await;
    let user_id = alice_id(&store).await;

    let enrollment = svc.enroll_two_factor(user_id).await.unwrap();
    assert!(enrollment.provisioning_uri.starts_with("otpauth://totp/"));

    let row = store.get(user_id).unwrap();
    assert_eq!(row.two_factor_secret.as_deref(), Some(enrollment.secret.as_str()));
    assert!(!row.two_factor_enabled);

    let code = totp::current_code(&enrollment.secret, "Mercato", "alice@example.com").unwrap();
    assert!(svc.verify_two_factor(user_id, &code).await.unwrap());
    assert!(store.get(user_id).unwrap().two_factor_enabled);

    // Enrollment completion is single-shot: once enabled, verify is
    // rejected even with a correct code.
    let code = totp::current_code(&enrollment.secret, "Mercato", "alice@example.com").unwrap();
    let err = svc.verify_two_factor(user_id, &code).await.unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized(_)));
}

#[tokio::test]
async fn two_factor_verify_wrong_code() {
    let (svc, store, _) = setup();
    register_alice(&svc).await;
    let user_id = alice_id(&store).await;

    svc.enroll_two_factor(user_id).await.unwrap();
    let err = svc.verify_two_factor(user_id, "000000").await.unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized(_)));
    assert!(!store.get(user_id).unwrap().two_factor_enabled);
}

#[tokio::test]
async fn two_factor_verify_without_enrollment() {
    let (svc, store, _) = setup();
    register_alice(&svc).await;
    let user_id = alice_id(&store).await;

    let err = svc.verify_two_factor(user_id, "123456").await.unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized(_)));
}

#[tokio::test]
async fn two_factor_verify_unknown_user() {
    let (svc, _, _) = setup();
    let err = svc
        .verify_two_factor(Uuid::new_v4(), "123456")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized(_)));
}

#[tokio::test]
async fn two_factor_reenroll_overwrites_secret() {
    let (svc, store, _) = setup();
    register_alice(&svc).await;
    let user_id = alice_id(&store).await;

    let first = svc.enroll_two_factor(user_id).await.unwrap();
    let code = totp::current_code(&first.secret, "Mercato", "alice@example.com").unwrap();
    svc.verify_two_factor(user_id, &code).await.unwrap();

    // Re-enrollment drops back to pending with a fresh secret; the old
    // code no longer completes it.
    let second = svc.enroll_two_factor(user_id).await.unwrap();
    assert_ne!(first.secret, second.secret);
    let row = store.get(user_id).unwrap();
    assert!(!row.two_factor_enabled);
    assert_eq!(row.two_factor_secret.as_deref(), Some(second.secret.as_str()));
}

#[tokio::test]
async fn two_factor_enroll_unknown_user() {
    let (svc, _, _) = setup();
    let err = svc.enroll_two_factor(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, AuthError::NotFound(_)));
}

// ---------------------------------------------------------------------
// Password reset
// ---------------------------------------------------------------------

#[tokio::test]
async fn reset_flow_end_to_end() {
    let (svc, _, mailer) = setup();
    register_alice(&svc).await;

    let ack = svc.request_password_reset("alice@example.com").await.unwrap();
    assert_eq!(ack, Ack::OK);

    let token = match &mailer.sent()[..] {
        [MailMessage::Registration { .. }, MailMessage::PasswordReset { token, .. }] => {
            token.clone()
        }
        other => panic!("unexpected mail log: {other:?}"),
    };

    let ack = svc.reset_password(&token, "NewPass123!").await.unwrap();
    assert_eq!(ack, Ack::OK);

    // New password works, old one is gone.
    assert!(svc.login("alice@example.com", "NewPass123!").await.is_ok());
    let err = svc.login("alice@example.com", "Abc12345!").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn reset_request_soft_fails_for_unknown_email() {
    let (svc, _, mailer) = setup();

    let ack = svc
        .request_password_reset("nobody@example.com")
        .await
        .unwrap();
    assert_eq!(ack, Ack::FAILED);
    assert!(mailer.sent().is_empty());
}

#[tokio::test]
async fn reset_with_expired_token_is_unauthorized() {
    let (svc, _, _) = setup();
    register_alice(&svc).await;

    let now = Utc::now().timestamp();
    let claims = ResetClaims {
        email: "alice@example.com".into(),
        iat: now - 7_200,
        exp: now - 3_600,
    };
    let token = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(RESET_KEY.as_bytes()),
    )
    .unwrap();

    let err = svc.reset_password(&token, "NewPass123!").await.unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized(_)));
}

#[tokio::test]
async fn reset_with_tampered_token_is_forbidden() {
    let (svc, _, mailer) = setup();
    register_alice(&svc).await;
    svc.request_password_reset("alice@example.com").await.unwrap();

    let token = match mailer.sent().last() {
        Some(MailMessage::PasswordReset { token, .. }) => token.clone(),
        other => panic!("unexpected mail log: {other:?}"),
    };

    let tampered = format!("{token}x");
    let err = svc
        .reset_password(&tampered, "NewPass123!")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Forbidden(_)));
}

#[tokio::test]
async fn reset_soft_fails_when_row_vanishes() {
    // Token for an email that matches no row: verification passes, the
    // update affects nothing.
    let (svc, _, _) = setup();
    let now = Utc::now().timestamp();
    let claims = ResetClaims {
        email: "ghost@example.com".into(),
        iat: now,
        exp: now + 3_600,
    };
    let token = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(RESET_KEY.as_bytes()),
    )
    .unwrap();

    let ack = svc.reset_password(&token, "NewPass123!").await.unwrap();
    assert_eq!(ack, Ack::FAILED);
}

// ---------------------------------------------------------------------
// Change password
// ---------------------------------------------------------------------

#[tokio::test]
async fn change_password_happy_path() {
    let (svc, _, _) = setup();
    register_alice(&svc).await;
    let pair = svc.login("alice@example.com", "Abc12345!").await.unwrap();

    let ack = svc
        .change_password(&pair.access_token, "Abc12345!", "NewPass123!")
        .await
        .unwrap();
    assert_eq!(ack, Ack::OK);

    assert!(svc.login("alice@example.com", "NewPass123!").await.is_ok());
}

#[tokio::test]
async fn change_password_rejects_wrong_old_password() {
    let (svc, _, _) = setup();
    register_alice(&svc).await;
    let pair = svc.login("alice@example.com", "Abc12345!").await.unwrap();

    let err = svc
        .change_password(&pair.access_token, "not-the-old-one", "NewPass123!")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::BadRequest(_)));
}

#[tokio::test]
async fn change_password_rejects_unchanged_password() {
    let (svc, _, _) = setup();
    register_alice(&svc).await;
    let pair = svc.login("alice@example.com", "Abc12345!").await.unwrap();

    let err = svc
        .change_password(&pair.access_token, "Abc12345!", "Abc12345!")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::BadRequest(_)));
}

#[tokio::test]
async fn change_password_rejects_undecodable_token() {
    let (svc, _, _) = setup();
    let err = svc
        .change_password("not-a-jwt", "old", "NewPass123!")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized(_)));
}

#[tokio::test]
async fn change_password_unknown_subject_is_not_found() {
    let (svc, _, _) = setup();

    // Decode-only: any well-formed token names a subject, even one
    // signed under a foreign key.
    let now = Utc::now().timestamp();
    let claims = RefreshClaims {
        sub: Uuid::new_v4().to_string(),
        iat: now,
        exp: now + 3_600,
    };
    let token = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(b"some-foreign-key"),
    )
    .unwrap();

    let err = svc
        .change_password(&token, "old", "NewPass123!")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotFound(_)));
}

#[tokio::test]
async fn change_password_federated_account_skips_old_check() {
    let (svc, store, _) = setup();
    svc.validate_federated_user(FederatedProfile {
        subject_id: "google-sub-1".into(),
        email: "fed@example.com".into(),
        username: None,
        full_name: None,
    })
    .await
    .unwrap();
    let pair = svc
        .validate_federated_user(FederatedProfile {
            subject_id: "google-sub-1".into(),
            email: "fed@example.com".into(),
            username: None,
            full_name: None,
        })
        .await
        .unwrap();

    let ack = svc
        .change_password(&pair.access_token, "", "NewPass123!")
        .await
        .unwrap();
    assert_eq!(ack, Ack::OK);

    let user = store.find_by_email("fed@example.com").await.unwrap().unwrap();
    assert!(user.password_hash.is_some());
    assert!(svc.login("fed@example.com", "NewPass123!").await.is_ok());
}
