//! Identity store capability and router.
//!
//! Identity stores are opaque backends exposing a narrow contract:
//! `configure` for startup validation and `authenticate` mapping credentials
//! to claims. Built-in kinds come from [`new_identity_store`]; external
//! implementations register by handing trait objects to the portal.

pub mod local;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::claims::ClaimSet;

#[derive(Debug, Error, Diagnostic)]
pub enum AuthenticationError {
    #[error("credentials rejected by identity store `{store}`")]
    #[diagnostic(code(authportal::ids::credentials_rejected))]
    CredentialsRejected { store: String },

    #[error("authentication timed out after {timeout_secs}s in identity store `{store}`")]
    #[diagnostic(
        code(authportal::ids::timeout),
        help("Distinct from a credential rejection; callers may retry")
    )]
    Timeout { store: String, timeout_secs: u64 },

    /// Unified rejection. The per-store attempts are retained for
    /// diagnostics but deliberately absent from the message, so callers
    /// cannot learn which backends exist.
    #[error("all identity stores rejected the authentication request")]
    #[diagnostic(code(authportal::ids::all_stores_rejected))]
    AllStoresRejected { attempts: Vec<String> },

    #[error("identity store `{store}` is misconfigured: {reason}")]
    #[diagnostic(code(authportal::ids::store_config))]
    StoreConfig { store: String, reason: String },
}

/// Login credentials, opaque to the core.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub realm: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            realm: None,
        }
    }

    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }
}

/// Configuration record for a built-in identity store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityStoreConfig {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The identity store capability.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> &str;
    fn realm(&self) -> &str;

    /// Startup validation; a portal refuses to construct over a store that
    /// fails here.
    fn configure(&self) -> Result<(), AuthenticationError>;

    async fn authenticate(&self, credentials: &Credentials)
        -> Result<ClaimSet, AuthenticationError>;
}

/// Instantiate a built-in identity store from configuration.
pub fn new_identity_store(
    config: &IdentityStoreConfig,
) -> Result<Arc<dyn IdentityStore>, AuthenticationError> {
    match config.kind.as_str() {
        "local" => Ok(Arc::new(local::LocalIdentityStore::from_config(config)?)),
        other => Err(AuthenticationError::StoreConfig {
            store: config.name.clone(),
            reason: format!("unknown identity store kind `{other}`"),
        }),
    }
}

/// Tries identity stores in declared order; the first success wins.
pub struct IdentityStoreRouter {
    stores: Vec<Arc<dyn IdentityStore>>,
    timeout: Duration,
}

impl std::fmt::Debug for IdentityStoreRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityStoreRouter")
            .field("stores", &self.stores.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl IdentityStoreRouter {
    pub fn new(stores: Vec<Arc<dyn IdentityStore>>, timeout: Duration) -> Self {
        Self { stores, timeout }
    }

    pub fn store_count(&self) -> usize {
        self.stores.len()
    }

    /// Authenticate against the configured stores in order. Each store call
    /// is time-bounded; a timeout aborts the attempt with its own error
    /// kind so callers can apply different retry policy. When every store
    /// rejects, one unified failure is returned.
    pub async fn authenticate(
        &self,
        credentials: &Credentials,
    ) -> Result<ClaimSet, AuthenticationError> {
        let mut attempts = Vec::with_capacity(self.stores.len());

        for store in &self.stores {
            match tokio::time::timeout(self.timeout, store.authenticate(credentials)).await {
                Err(_elapsed) => {
                    tracing::warn!(store = store.name(), "identity store timed out");
                    return Err(AuthenticationError::Timeout {
                        store: store.name().to_string(),
                        timeout_secs: self.timeout.as_secs(),
                    });
                }
                Ok(Ok(claims)) => {
                    tracing::debug!(
                        store = store.name(),
                        username = credentials.username.as_str(),
                        "identity store authenticated user"
                    );
                    return Ok(normalize(claims, credentials, store.as_ref()));
                }
                Ok(Err(err)) => {
                    attempts.push(format!("{}: {err}", store.name()));
                }
            }
        }

        tracing::debug!(
            username = credentials.username.as_str(),
            stores = self.stores.len(),
            "all identity stores rejected the credentials"
        );
        Err(AuthenticationError::AllStoresRejected { attempts })
    }
}

/// Normalize raw store output into the common claims shape: subject, realm
/// and at least one role are always present.
fn normalize(mut claims: ClaimSet, credentials: &Credentials, store: &dyn IdentityStore) -> ClaimSet {
    if !claims.contains_key("sub") {
        claims.insert("sub", credentials.username.clone());
    }
    if !claims.contains_key("realm") {
        claims.insert("realm", store.realm().to_string());
    }
    if !claims.contains_key("roles") {
        claims.insert("roles", "user");
    }
    claims
}
