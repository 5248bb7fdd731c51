mod helpers;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use authportal::claims::ClaimSet;
use authportal::errors::PortalError;
use authportal::ids::{AuthenticationError, Credentials, IdentityStore};
use authportal::log::Logger;
use authportal::portal::{AuthRequest, PortalConfig};
use authportal::token::keys::SigningKeyConfig;
use authportal::token::options::TokenValidatorOptions;
use authportal::token::validator::ValidationError;
use helpers::{PortalBuilder, UserBuilder};

fn cookie_header_from(set_cookie: &str) -> String {
    // The Cookie request header carries only the name=value pair.
    set_cookie
        .split(';')
        .next()
        .expect("Set-Cookie header has a value")
        .to_string()
}

#[tokio::test]
async fn test_login_then_authorize_via_cookie() {
    let portal = PortalBuilder::new("myportal")
        .with_user(UserBuilder::new("alice").with_password("s3cret"))
        .build();

    let session = portal
        .authenticate(&Credentials::new("alice", "s3cret"))
        .await
        .expect("login should succeed");
    assert_eq!(session.claims.first("sub"), Some("alice"));
    assert_eq!(session.claims.first("iss"), Some("myportal"));

    let request = AuthRequest::with_cookie(cookie_header_from(&session.set_cookie));
    let result = portal.authorize(&request).expect("cookie session is valid");
    assert_eq!(result.claims.first("sub"), Some("alice"));
    assert!(result.decision.allowed());
}

#[tokio::test]
async fn test_authorize_via_bearer_header() {
    let portal = PortalBuilder::new("myportal")
        .with_user(UserBuilder::new("alice"))
        .build();

    let session = portal
        .authenticate(&Credentials::new("alice", "password123"))
        .await
        .unwrap();

    let request = AuthRequest::with_bearer(session.token.raw.clone());
    let result = portal.authorize(&request).expect("bearer token is valid");
    assert_eq!(result.claims.first("sub"), Some("alice"));
}

#[tokio::test]
async fn test_bearer_header_outranks_cookie() {
    let portal = PortalBuilder::new("myportal")
        .with_user(UserBuilder::new("alice"))
        .build();
    let session = portal
        .authenticate(&Credentials::new("alice", "password123"))
        .await
        .unwrap();

    // A garbage bearer header is picked over a valid cookie session.
    let mut request = AuthRequest::with_cookie(cookie_header_from(&session.set_cookie));
    request.authorization_header = Some("Bearer not-a-token".to_string());
    let err = portal.authorize(&request).unwrap_err();
    assert!(matches!(
        err,
        PortalError::Validation(ValidationError::MalformedToken)
    ));

    // A valid bearer token wins over a garbage cookie.
    let mut request = AuthRequest::with_bearer(session.token.raw.clone());
    request.cookie_header = Some("authportal_token=not-a-token".to_string());
    portal.authorize(&request).expect("bearer token is honored");
}

#[tokio::test]
async fn test_bearer_header_ignored_when_not_validated() {
    let portal = PortalBuilder::new("myportal")
        .with_user(UserBuilder::new("alice"))
        .with_validator_options(TokenValidatorOptions {
            validate_bearer_header: false,
            ..TokenValidatorOptions::default()
        })
        .build();
    let session = portal
        .authenticate(&Credentials::new("alice", "password123"))
        .await
        .unwrap();

    // The bearer carrier is not consulted at all; only the cookie counts.
    let err = portal
        .authorize(&AuthRequest::with_bearer(session.token.raw.clone()))
        .unwrap_err();
    assert!(matches!(
        err,
        PortalError::Validation(ValidationError::TokenNotFound)
    ));

    let request = AuthRequest::with_cookie(cookie_header_from(&session.set_cookie));
    portal.authorize(&request).expect("cookie session is honored");
}

#[tokio::test]
async fn test_authorize_without_token_fails() {
    let portal = PortalBuilder::new("myportal")
        .with_user(UserBuilder::new("alice"))
        .build();

    let err = portal.authorize(&AuthRequest::default()).unwrap_err();
    assert!(matches!(err, PortalError::Validation(_)));
}

#[tokio::test]
async fn test_wrong_password_rejected_without_naming_stores() {
    let portal = PortalBuilder::new("myportal")
        .with_user(UserBuilder::new("alice").with_password("s3cret"))
        .build();

    let err = portal
        .authenticate(&Credentials::new("alice", "wrong"))
        .await
        .unwrap_err();
    let message = err.to_string();
    assert_eq!(message, "all identity stores rejected the authentication request");
}

#[tokio::test]
async fn test_access_list_gates_login() {
    let portal = PortalBuilder::new("myportal")
        .with_user(UserBuilder::new("alice").with_role("viewer"))
        .with_user(UserBuilder::new("root").with_role("admin"))
        .with_rule("allow", &["match roles admin"])
        .build();

    let err = portal
        .authenticate(&Credentials::new("alice", "password123"))
        .await
        .unwrap_err();
    assert!(matches!(err, PortalError::AccessDenied { .. }));

    let session = portal
        .authenticate(&Credentials::new("root", "password123"))
        .await
        .expect("admin passes the access list");
    assert!(session.claims.has_value("roles", "admin"));
}

#[tokio::test]
async fn test_transformer_enriches_claims_before_acl() {
    let portal = PortalBuilder::new("myportal")
        .with_user(UserBuilder::new("alice").with_email("alice@corp.example"))
        .with_transformer(
            &["regex match email @corp\\.example$"],
            &["add roles staff"],
        )
        .with_rule("allow", &["match roles staff"])
        .build();

    let session = portal
        .authenticate(&Credentials::new("alice", "password123"))
        .await
        .expect("transformed claims pass the access list");
    assert!(session.claims.has_value("roles", "staff"));
}

#[tokio::test]
async fn test_transformer_deny_blocks_login() {
    let portal = PortalBuilder::new("myportal")
        .with_user(UserBuilder::new("mallory"))
        .with_transformer(&["exact match sub mallory"], &["deny"])
        .build();

    let err = portal
        .authenticate(&Credentials::new("mallory", "password123"))
        .await
        .unwrap_err();
    assert!(matches!(err, PortalError::Transform(_)));
}

struct SlowStore;

#[async_trait]
impl IdentityStore for SlowStore {
    fn name(&self) -> &str {
        "slow_backend"
    }

    fn kind(&self) -> &str {
        "slow"
    }

    fn realm(&self) -> &str {
        "slow"
    }

    fn configure(&self) -> Result<(), AuthenticationError> {
        Ok(())
    }

    async fn authenticate(
        &self,
        _credentials: &Credentials,
    ) -> Result<ClaimSet, AuthenticationError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(AuthenticationError::CredentialsRejected {
            store: "slow_backend".to_string(),
        })
    }
}

#[tokio::test]
async fn test_slow_store_times_out_the_login() {
    let portal = PortalBuilder::new("myportal")
        .with_store(Arc::new(SlowStore))
        .with_user(UserBuilder::new("alice"))
        .with_auth_timeout_secs(1)
        .build();

    let err = portal
        .authenticate(&Credentials::new("alice", "password123"))
        .await
        .unwrap_err();
    match err {
        PortalError::Authentication(AuthenticationError::Timeout { store, .. }) => {
            assert_eq!(store, "slow_backend");
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[derive(Clone)]
struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn capture_logger() -> (Logger, Arc<Mutex<Vec<u8>>>) {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let writer = CaptureWriter(buffer.clone());
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .finish();
    (Logger::new(tracing::Dispatch::new(subscriber)), buffer)
}

struct ParkingStore;

#[async_trait]
impl IdentityStore for ParkingStore {
    fn name(&self) -> &str {
        "parking_backend"
    }

    fn kind(&self) -> &str {
        "static"
    }

    fn realm(&self) -> &str {
        "test"
    }

    fn configure(&self) -> Result<(), AuthenticationError> {
        Ok(())
    }

    async fn authenticate(
        &self,
        _credentials: &Credentials,
    ) -> Result<ClaimSet, AuthenticationError> {
        // Suspend so the login future parks and may resume on another
        // worker thread.
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(ClaimSet::new())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_audit_log_follows_login_across_worker_threads() {
    let (logger, buffer) = capture_logger();
    let portal = Arc::new(
        PortalBuilder::new("myportal")
            .with_store(Arc::new(ParkingStore))
            .with_user(UserBuilder::new("alice"))
            .with_logger(logger)
            .build(),
    );

    let handle = tokio::spawn({
        let portal = portal.clone();
        async move {
            portal
                .authenticate(&Credentials::new("alice", "password123"))
                .await
        }
    });
    // Logged outside any portal operation; must not reach the portal's
    // logger even while the login future is parked.
    tracing::info!("unrelated event");

    let session = handle.await.unwrap().unwrap();
    assert_eq!(session.claims.first("sub"), Some("alice"));

    let log = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
    assert!(log.contains("session issued"), "portal log was: {log}");
    assert!(!log.contains("unrelated event"), "portal log was: {log}");
}

#[tokio::test]
async fn test_key_rotation_keeps_old_sessions_until_retired() {
    let portal = PortalBuilder::new("myportal")
        .with_user(UserBuilder::new("alice"))
        .with_key(SigningKeyConfig::random_shared())
        .build();

    let old_session = portal
        .authenticate(&Credentials::new("alice", "password123"))
        .await
        .unwrap();
    let old_key_id = old_session.token.header.key_id.clone().expect("kid is set");

    portal
        .rotate_signing_key(&SigningKeyConfig::random_shared())
        .expect("rotation succeeds");

    // Old token still validates, new tokens use the new key.
    let old_request = AuthRequest::with_bearer(old_session.token.raw.clone());
    portal
        .authorize(&old_request)
        .expect("old token survives rotation");

    let new_session = portal
        .authenticate(&Credentials::new("alice", "password123"))
        .await
        .unwrap();
    assert_ne!(new_session.token.header.key_id, old_session.token.header.key_id);
    portal
        .authorize(&AuthRequest::with_bearer(new_session.token.raw.clone()))
        .expect("new token validates");

    portal.retire_signing_key(&old_key_id);
    assert!(portal.authorize(&old_request).is_err());
    portal
        .authorize(&AuthRequest::with_bearer(new_session.token.raw))
        .expect("new token unaffected by retirement");
}

#[tokio::test]
async fn test_logout_cookie_clears_session() {
    let portal = PortalBuilder::new("myportal")
        .with_user(UserBuilder::new("alice"))
        .build();

    let header = portal.logout_cookie();
    assert!(header.starts_with("authportal_token=;"));
    assert!(header.contains("Max-Age=0"));
}

#[test]
fn test_config_from_file() {
    use std::io::Write;

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config_path = dir.path().join("portal.toml");
    let mut file = std::fs::File::create(&config_path).expect("Failed to create config file");
    writeln!(
        file,
        r#"
name = "fileportal"
identity_stores = ["local_backend"]

[ui]
theme = "dark"

[[access_list_configs]]
conditions = ["match roles admin"]
action = "allow stop"
"#
    )
    .expect("Failed to write config file");

    let mut config = PortalConfig::from_file(config_path.to_str().unwrap())
        .expect("Failed to load portal config");
    config.validate().expect("config is valid");

    assert_eq!(config.name, "fileportal");
    assert_eq!(config.ui.theme, "dark");
    assert_eq!(config.identity_stores, vec!["local_backend".to_string()]);
    assert_eq!(config.access_list_configs.len(), 1);
    assert_eq!(config.access_list_configs[0].action, "allow stop");
}
