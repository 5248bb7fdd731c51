//! Built-in local identity store backed by an in-memory user table.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::claims::ClaimSet;
use crate::ids::{AuthenticationError, Credentials, IdentityStore, IdentityStoreConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct LocalUserConfig {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Deserialize)]
struct LocalStoreParams {
    #[serde(default)]
    realm: Option<String>,
    #[serde(default)]
    users: Vec<LocalUserConfig>,
}

struct LocalUser {
    password_hash: String,
    email: Option<String>,
    roles: Vec<String>,
    disabled: bool,
}

pub struct LocalIdentityStore {
    name: String,
    realm: String,
    users: HashMap<String, LocalUser>,
}

impl LocalIdentityStore {
    pub fn from_config(config: &IdentityStoreConfig) -> Result<Self, AuthenticationError> {
        let params: LocalStoreParams = serde_json::from_value(config.params.clone())
            .map_err(|e| AuthenticationError::StoreConfig {
                store: config.name.clone(),
                reason: format!("invalid local store parameters: {e}"),
            })?;

        let mut store = Self {
            name: config.name.clone(),
            realm: params.realm.unwrap_or_else(|| "local".to_string()),
            users: HashMap::new(),
        };
        for user in params.users {
            store.add_user(user)?;
        }
        Ok(store)
    }

    pub fn new(name: impl Into<String>, realm: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            realm: realm.into(),
            users: HashMap::new(),
        }
    }

    pub fn add_user(&mut self, user: LocalUserConfig) -> Result<(), AuthenticationError> {
        use argon2::password_hash::{rand_core::OsRng, SaltString};
        use argon2::{Argon2, PasswordHasher};

        if user.username.is_empty() {
            return Err(AuthenticationError::StoreConfig {
                store: self.name.clone(),
                reason: "user with empty username".to_string(),
            });
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(user.password.as_bytes(), &salt)
            .map_err(|e| AuthenticationError::StoreConfig {
                store: self.name.clone(),
                reason: format!("failed to hash password for `{}`: {e}", user.username),
            })?
            .to_string();

        self.users.insert(
            user.username,
            LocalUser {
                password_hash,
                email: user.email,
                roles: user.roles,
                disabled: user.disabled,
            },
        );
        Ok(())
    }

    fn rejected(&self) -> AuthenticationError {
        AuthenticationError::CredentialsRejected {
            store: self.name.clone(),
        }
    }
}

#[async_trait]
impl IdentityStore for LocalIdentityStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "local"
    }

    fn realm(&self) -> &str {
        &self.realm
    }

    fn configure(&self) -> Result<(), AuthenticationError> {
        if self.users.is_empty() {
            tracing::warn!(store = self.name.as_str(), "local identity store has no users");
        }
        Ok(())
    }

    async fn authenticate(
        &self,
        credentials: &Credentials,
    ) -> Result<ClaimSet, AuthenticationError> {
        use argon2::{Argon2, PasswordHash, PasswordVerifier};

        // Unknown and disabled users produce the same rejection as a bad
        // password, so callers cannot enumerate accounts.
        let user = self.users.get(&credentials.username).ok_or_else(|| self.rejected())?;
        if user.disabled {
            return Err(self.rejected());
        }

        let parsed_hash =
            PasswordHash::new(&user.password_hash).map_err(|_| self.rejected())?;
        if Argon2::default()
            .verify_password(credentials.password.as_bytes(), &parsed_hash)
            .is_err()
        {
            return Err(self.rejected());
        }

        let mut claims = ClaimSet::new();
        claims.insert("sub", credentials.username.clone());
        claims.insert("realm", self.realm.clone());
        if user.roles.is_empty() {
            claims.insert("roles", "user");
        } else {
            for role in &user.roles {
                claims.insert("roles", role.clone());
            }
        }
        if let Some(email) = &user.email {
            claims.insert("email", email.clone());
        }
        Ok(claims)
    }
}
