use std::sync::Arc;

use authportal::acl::rule::RuleConfiguration;
use authportal::ids::local::{LocalIdentityStore, LocalUserConfig};
use authportal::ids::IdentityStore;
use authportal::log::{new_logger, Logger};
use authportal::portal::{Portal, PortalConfig, PortalParameters};
use authportal::token::keys::SigningKeyConfig;
use authportal::token::options::TokenValidatorOptions;
use authportal::transform::TransformerConfig;

/// Builder for local identity store test users
pub struct UserBuilder {
    username: String,
    password: String,
    email: Option<String>,
    roles: Vec<String>,
    disabled: bool,
}

impl UserBuilder {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            password: "password123".to_string(),
            email: None,
            roles: Vec::new(),
            disabled: false,
        }
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.roles.push(role.to_string());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn into_config(self) -> LocalUserConfig {
        LocalUserConfig {
            username: self.username,
            password: self.password,
            email: self.email,
            roles: self.roles,
            disabled: self.disabled,
        }
    }
}

/// Builder for test portals backed by an in-memory local store
pub struct PortalBuilder {
    name: String,
    users: Vec<LocalUserConfig>,
    access_list_configs: Vec<RuleConfiguration>,
    user_transformer_configs: Vec<TransformerConfig>,
    crypto_key_configs: Vec<SigningKeyConfig>,
    auth_timeout_secs: Option<u64>,
    token_validator_options: Option<TokenValidatorOptions>,
    extra_stores: Vec<Arc<dyn IdentityStore>>,
    logger: Option<Logger>,
}

impl PortalBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            users: Vec::new(),
            access_list_configs: Vec::new(),
            user_transformer_configs: Vec::new(),
            crypto_key_configs: Vec::new(),
            auth_timeout_secs: None,
            token_validator_options: None,
            extra_stores: Vec::new(),
            logger: None,
        }
    }

    pub fn with_user(mut self, user: UserBuilder) -> Self {
        self.users.push(user.into_config());
        self
    }

    pub fn with_rule(mut self, action: &str, conditions: &[&str]) -> Self {
        self.access_list_configs.push(RuleConfiguration::new(
            action,
            conditions.iter().map(|c| c.to_string()).collect(),
        ));
        self
    }

    pub fn with_transformer(mut self, matchers: &[&str], actions: &[&str]) -> Self {
        self.user_transformer_configs.push(TransformerConfig::new(
            matchers.iter().map(|m| m.to_string()).collect(),
            actions.iter().map(|a| a.to_string()).collect(),
        ));
        self
    }

    pub fn with_key(mut self, config: SigningKeyConfig) -> Self {
        self.crypto_key_configs.push(config);
        self
    }

    pub fn with_auth_timeout_secs(mut self, secs: u64) -> Self {
        self.auth_timeout_secs = Some(secs);
        self
    }

    pub fn with_validator_options(mut self, options: TokenValidatorOptions) -> Self {
        self.token_validator_options = Some(options);
        self
    }

    /// Attach an additional store, routed before the local backend.
    pub fn with_store(mut self, store: Arc<dyn IdentityStore>) -> Self {
        self.extra_stores.push(store);
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> Portal {
        let mut local = LocalIdentityStore::new("local_backend", "local");
        for user in self.users {
            local.add_user(user).expect("Failed to add test user");
        }

        let mut stores: Vec<Arc<dyn IdentityStore>> = self.extra_stores;
        stores.push(Arc::new(local));
        let store_names = stores.iter().map(|s| s.name().to_string()).collect();

        let config = PortalConfig {
            name: self.name,
            identity_stores: store_names,
            access_list_configs: self.access_list_configs,
            user_transformer_configs: self.user_transformer_configs,
            crypto_key_configs: self.crypto_key_configs,
            auth_timeout_secs: self.auth_timeout_secs,
            token_validator_options: self.token_validator_options,
            ..PortalConfig::default()
        };

        Portal::new(PortalParameters {
            config: Some(config),
            logger: Some(self.logger.unwrap_or_else(new_logger)),
            identity_stores: stores,
        })
        .expect("Failed to build test portal")
    }
}
