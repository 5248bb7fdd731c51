//! Signing key material and rotation.
//!
//! A [`SigningKeySet`] holds one active signing key plus the keys accepted
//! for verification. Rotation replaces the whole set atomically through a
//! [`SigningKeyRing`], so in-flight validations only ever observe a complete
//! snapshot. Rotation is an explicit administrative operation.

use std::sync::{Arc, RwLock};

use base64ct::{Base64UrlUnpadded, Encoding};
use josekit::jwk::Jwk;
use josekit::jws::{JwsSigner, JwsVerifier, HS512, RS256};
use miette::Diagnostic;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KeyError {
    #[error("invalid signing key configuration: {0}")]
    #[diagnostic(
        code(authportal::token::key_config),
        help("Supported kinds: `shared` (HS512 secret) and `generate-rsa` (ephemeral RS256 key pair)")
    )]
    Config(String),

    #[error("JOSE error: {0}")]
    #[diagnostic(code(authportal::token::jose))]
    Jose(String),
}

impl From<josekit::JoseError> for KeyError {
    fn from(value: josekit::JoseError) -> Self {
        KeyError::Jose(value.to_string())
    }
}

/// Raw key material configuration, consumed once at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SigningKeyConfig {
    /// HS512 shared secret. The secret's UTF-8 bytes are the HMAC key.
    Shared {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key_id: Option<String>,
        secret: String,
    },
    /// Generate an ephemeral RSA-2048 key pair signing RS256.
    GenerateRsa {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key_id: Option<String>,
    },
}

impl SigningKeyConfig {
    /// A fresh random shared secret, used when a portal is constructed
    /// without any key configuration.
    pub fn random_shared() -> Self {
        let mut bytes = [0u8; 64];
        rand::thread_rng().fill_bytes(&mut bytes);
        SigningKeyConfig::Shared {
            key_id: None,
            secret: Base64UrlUnpadded::encode_string(&bytes),
        }
    }
}

#[derive(Debug, Clone)]
enum KeyMaterial {
    Shared(Vec<u8>),
    Rsa { private: Option<Jwk>, public: Jwk },
}

/// A single key, usable for signing (when it carries private material) and
/// verification.
#[derive(Debug, Clone)]
pub struct SigningKey {
    key_id: String,
    algorithm: &'static str,
    material: KeyMaterial,
}

impl SigningKey {
    pub fn from_config(config: &SigningKeyConfig) -> Result<Self, KeyError> {
        match config {
            SigningKeyConfig::Shared { key_id, secret } => {
                if secret.is_empty() {
                    return Err(KeyError::Config("shared secret is empty".to_string()));
                }
                let bytes = secret.as_bytes().to_vec();
                let key_id = key_id.clone().unwrap_or_else(|| derived_key_id(&bytes));
                Ok(SigningKey {
                    key_id,
                    algorithm: "HS512",
                    material: KeyMaterial::Shared(bytes),
                })
            }
            SigningKeyConfig::GenerateRsa { key_id } => {
                let mut jwk = Jwk::generate_rsa_key(2048)?;
                let key_id = key_id.clone().unwrap_or_else(random_key_id);
                jwk.set_key_id(&key_id);
                jwk.set_algorithm("RS256");
                jwk.set_key_use("sig");
                let public = jwk.to_public_key()?;
                Ok(SigningKey {
                    key_id,
                    algorithm: "RS256",
                    material: KeyMaterial::Rsa {
                        private: Some(jwk),
                        public,
                    },
                })
            }
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn algorithm(&self) -> &'static str {
        self.algorithm
    }

    pub(crate) fn signer(&self) -> Result<Box<dyn JwsSigner>, KeyError> {
        match &self.material {
            KeyMaterial::Shared(bytes) => Ok(Box::new(HS512.signer_from_bytes(bytes)?)),
            KeyMaterial::Rsa { private, .. } => {
                let jwk = private.as_ref().ok_or_else(|| {
                    KeyError::Config(format!(
                        "key `{}` has no private material and cannot sign",
                        self.key_id
                    ))
                })?;
                Ok(Box::new(RS256.signer_from_jwk(jwk)?))
            }
        }
    }

    pub(crate) fn verifier(&self) -> Result<Box<dyn JwsVerifier>, KeyError> {
        match &self.material {
            KeyMaterial::Shared(bytes) => Ok(Box::new(HS512.verifier_from_bytes(bytes)?)),
            KeyMaterial::Rsa { public, .. } => Ok(Box::new(RS256.verifier_from_jwk(public)?)),
        }
    }

    /// A verification-only copy, with private RSA material dropped.
    pub fn verification_key(&self) -> SigningKey {
        match &self.material {
            KeyMaterial::Shared(_) => self.clone(),
            KeyMaterial::Rsa { public, .. } => SigningKey {
                key_id: self.key_id.clone(),
                algorithm: self.algorithm,
                material: KeyMaterial::Rsa {
                    private: None,
                    public: public.clone(),
                },
            },
        }
    }
}

/// One active signing key plus the keys accepted for verification.
#[derive(Debug, Clone)]
pub struct SigningKeySet {
    active: SigningKey,
    verification: Vec<SigningKey>,
}

impl SigningKeySet {
    /// Build from configuration. The first config becomes the active key;
    /// every config contributes a verification key.
    pub fn from_configs(configs: &[SigningKeyConfig]) -> Result<Self, KeyError> {
        if configs.is_empty() {
            return Err(KeyError::Config(
                "at least one signing key is required".to_string(),
            ));
        }
        let keys = configs
            .iter()
            .map(SigningKey::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        let active = keys[0].clone();
        let verification = keys.iter().map(SigningKey::verification_key).collect();
        Ok(SigningKeySet {
            active,
            verification,
        })
    }

    pub fn active(&self) -> &SigningKey {
        &self.active
    }

    pub fn verification_keys(&self) -> &[SigningKey] {
        &self.verification
    }

    /// A new set with `new_active` signing and every previous verification
    /// key retained, so tokens signed before the rotation keep verifying.
    pub fn rotated(&self, new_active: SigningKey) -> SigningKeySet {
        let mut verification = vec![new_active.verification_key()];
        for key in &self.verification {
            if key.key_id != new_active.key_id {
                verification.push(key.clone());
            }
        }
        SigningKeySet {
            active: new_active,
            verification,
        }
    }

    /// A set with the given key id retired from verification. Tokens signed
    /// with it stop validating once this set is installed.
    pub fn without_key(&self, key_id: &str) -> SigningKeySet {
        SigningKeySet {
            active: self.active.clone(),
            verification: self
                .verification
                .iter()
                .filter(|k| k.key_id != key_id)
                .cloned()
                .collect(),
        }
    }
}

/// Shared handle over the current [`SigningKeySet`]. Readers take a cheap
/// snapshot; [`install`](Self::install) swaps the whole set in one step.
#[derive(Debug)]
pub struct SigningKeyRing {
    inner: RwLock<Arc<SigningKeySet>>,
}

impl SigningKeyRing {
    pub fn new(set: SigningKeySet) -> Self {
        Self {
            inner: RwLock::new(Arc::new(set)),
        }
    }

    /// Snapshot of the current key set.
    pub fn current(&self) -> Arc<SigningKeySet> {
        self.inner.read().expect("key ring lock poisoned").clone()
    }

    /// Replace the whole key set.
    pub fn install(&self, set: SigningKeySet) {
        *self.inner.write().expect("key ring lock poisoned") = Arc::new(set);
    }

    /// Build a key from `config`, make it the active signing key and retain
    /// the previous keys for verification.
    pub fn rotate(&self, config: &SigningKeyConfig) -> Result<(), KeyError> {
        let new_active = SigningKey::from_config(config)?;
        let rotated = self.current().rotated(new_active);
        tracing::info!(
            active_key = rotated.active().key_id(),
            verification_keys = rotated.verification_keys().len(),
            "rotated signing key set"
        );
        self.install(rotated);
        Ok(())
    }
}

fn derived_key_id(material: &[u8]) -> String {
    let digest = Sha256::digest(material);
    Base64UrlUnpadded::encode_string(&digest[..12])
}

fn random_key_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}
