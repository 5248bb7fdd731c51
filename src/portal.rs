//! Portal orchestrator: composes the identity store router, transformer
//! pipeline, ACL policy, token grantor/validator, and cookie carrier into
//! the two top-level flows, `authenticate` and `authorize`.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::instrument::WithSubscriber;

use crate::acl::engine::Decision;
use crate::acl::rule::RuleConfiguration;
use crate::acl::{AclPolicy, DefaultAction};
use crate::claims::ClaimSet;
use crate::cookie::CookieConfig;
use crate::errors::{ConstructionError, PortalError};
use crate::ids::{Credentials, IdentityStore, IdentityStoreRouter};
use crate::log::Logger;
use crate::token::grantor::TokenGrantor;
use crate::token::keys::{SigningKeyConfig, SigningKeyRing, SigningKeySet};
use crate::token::options::{TokenGrantorOptions, TokenValidatorOptions};
use crate::token::validator::TokenValidator;
use crate::token::TokenSource;
use crate::transform::{TransformerConfig, TransformerPipeline};

const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiParameters {
    #[serde(default = "default_theme")]
    pub theme: String,
}

fn default_theme() -> String {
    "basic".to_string()
}

impl Default for UiParameters {
    fn default() -> Self {
        Self {
            theme: default_theme(),
        }
    }
}

/// Declarative portal configuration. Field order matters for the
/// serialized form, which doubles as the configuration fingerprint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ui: UiParameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_validator_options: Option<TokenValidatorOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_grantor_options: Option<TokenGrantorOptions>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_list_configs: Vec<RuleConfiguration>,
    #[serde(default, skip_serializing_if = "DefaultAction::is_default")]
    pub access_list_default_action: DefaultAction,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_transformer_configs: Vec<TransformerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie_config: Option<CookieConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identity_stores: Vec<String>,
    /// Key material never serializes back out.
    #[serde(default, skip_serializing)]
    pub crypto_key_configs: Vec<SigningKeyConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_timeout_secs: Option<u64>,
}

impl PortalConfig {
    /// Check required fields and install defaults. Called once during
    /// portal construction; also usable standalone for config linting.
    pub fn validate(&mut self) -> Result<(), ConstructionError> {
        if self.name.is_empty() {
            return Err(ConstructionError::NameNotFound);
        }
        if self.identity_stores.is_empty() {
            return Err(ConstructionError::BackendsNotFound);
        }
        if self.access_list_configs.is_empty() {
            self.access_list_configs.push(RuleConfiguration::new(
                "allow",
                vec!["match any".to_string()],
            ));
        }
        if self.token_validator_options.is_none() {
            self.token_validator_options = Some(TokenValidatorOptions::default());
        }
        if let Some(cookie) = &self.cookie_config {
            cookie.validate()?;
        }
        Ok(())
    }

    /// Load a portal configuration from a file, with environment
    /// overrides: `AUTHPORTAL__NAME=myportal`, etc.
    pub fn from_file(path: &str) -> Result<Self, ConstructionError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("AUTHPORTAL").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

/// Construction inputs for [`Portal::new`].
#[derive(Default)]
pub struct PortalParameters {
    pub config: Option<PortalConfig>,
    pub logger: Option<Logger>,
    pub identity_stores: Vec<Arc<dyn IdentityStore>>,
}

/// Result of a successful login.
#[derive(Debug)]
pub struct Session {
    pub token: crate::token::Token,
    pub claims: ClaimSet,
    /// `Set-Cookie` header value carrying the token.
    pub set_cookie: String,
}

/// Carrier material for an authorization check.
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    pub cookie_header: Option<String>,
    pub authorization_header: Option<String>,
}

impl AuthRequest {
    pub fn with_cookie(header: impl Into<String>) -> Self {
        Self {
            cookie_header: Some(header.into()),
            ..Self::default()
        }
    }

    pub fn with_bearer(token: impl Into<String>) -> Self {
        Self {
            authorization_header: Some(format!("Bearer {}", token.into())),
            ..Self::default()
        }
    }

    fn bearer_token(&self) -> Option<&str> {
        self.authorization_header
            .as_deref()
            .and_then(|h| h.strip_prefix("Bearer "))
            .filter(|t| !t.is_empty())
    }
}

/// Result of a successful authorization check.
#[derive(Debug)]
pub struct AuthzResult {
    pub claims: ClaimSet,
    pub decision: Decision,
}

#[derive(Debug)]
pub struct Portal {
    config: PortalConfig,
    logger: Logger,
    router: IdentityStoreRouter,
    acl: AclPolicy,
    pipeline: TransformerPipeline,
    cookie: CookieConfig,
    ring: Arc<SigningKeyRing>,
    grantor: TokenGrantor,
    validator: TokenValidator,
}

impl Portal {
    pub fn new(params: PortalParameters) -> Result<Self, PortalError> {
        let logger = params.logger.ok_or(PortalError::LoggerNotFound)?;
        let mut config = params.config.ok_or(PortalError::ConfigNotFound)?;
        let _guard = tracing::dispatcher::set_default(&logger.0);

        config.validate().map_err(PortalError::Construction)?;

        // Resolve configured store names against the attached backends,
        // preserving configuration order.
        let mut stores: Vec<Arc<dyn IdentityStore>> = Vec::with_capacity(config.identity_stores.len());
        for name in &config.identity_stores {
            let store = params
                .identity_stores
                .iter()
                .find(|s| s.name() == name.as_str())
                .cloned()
                .ok_or_else(|| ConstructionError::BackendNotAttached(name.clone()))?;
            store
                .configure()
                .map_err(|e| ConstructionError::StoreConfigure {
                    store: name.clone(),
                    reason: e.to_string(),
                })?;
            stores.push(store);
        }
        let timeout = Duration::from_secs(
            config.auth_timeout_secs.unwrap_or(DEFAULT_AUTH_TIMEOUT_SECS),
        );
        let router = IdentityStoreRouter::new(stores, timeout);

        let acl = AclPolicy::compile(&config.access_list_configs, config.access_list_default_action)?;
        let pipeline = TransformerPipeline::compile(&config.user_transformer_configs)?;
        let cookie = config.cookie_config.clone().unwrap_or_default();

        // With no configured keys the portal runs on an ephemeral shared
        // secret; tokens do not survive a restart.
        let key_configs = if config.crypto_key_configs.is_empty() {
            tracing::warn!(
                portal = config.name.as_str(),
                "no signing keys configured, generating an ephemeral shared key"
            );
            vec![SigningKeyConfig::random_shared()]
        } else {
            config.crypto_key_configs.clone()
        };
        let ring = Arc::new(SigningKeyRing::new(SigningKeySet::from_configs(&key_configs)?));

        let mut grantor_options = config.token_grantor_options.clone().unwrap_or_default();
        if grantor_options.issuer.is_none() {
            grantor_options.issuer = Some(config.name.clone());
        }
        let grantor = TokenGrantor::new(grantor_options, Arc::clone(&ring))?;
        let validator_options = config
            .token_validator_options
            .clone()
            .unwrap_or_default();
        let validator = TokenValidator::new(validator_options, Arc::clone(&ring));

        tracing::info!(
            portal = config.name.as_str(),
            stores = router.store_count(),
            acl_rules = acl.rule_count(),
            transformer_stages = pipeline.stage_count(),
            "portal constructed"
        );

        drop(_guard);
        Ok(Self {
            config,
            logger,
            router,
            acl,
            pipeline,
            cookie,
            ring,
            grantor,
            validator,
        })
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn cookie_config(&self) -> &CookieConfig {
        &self.cookie
    }

    /// Full login flow: route credentials through the identity stores,
    /// transform the resulting claims, gate them through the ACL, and
    /// issue a signed session token.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<Session, PortalError> {
        // The dispatcher is attached to the future itself, not the polling
        // thread; events keep reaching the portal's logger when the runtime
        // resumes the login on another worker.
        self.login(credentials)
            .with_subscriber(self.logger.0.clone())
            .await
    }

    async fn login(&self, credentials: &Credentials) -> Result<Session, PortalError> {
        let claims = self.router.authenticate(credentials).await?;
        let claims = self.pipeline.apply(&claims)?;

        let decision = self.acl.evaluate(&claims);
        if !decision.allowed() {
            tracing::info!(
                portal = self.config.name.as_str(),
                username = credentials.username.as_str(),
                matched_rule = ?decision.matched_rule,
                "login denied by access list"
            );
            return Err(PortalError::AccessDenied {
                matched_rule: decision.matched_rule,
            });
        }

        let token = self.grantor.grant(&claims)?;
        let set_cookie = self
            .cookie
            .set_cookie(&token.raw, self.grantor.options().lifetime_secs);
        tracing::info!(
            portal = self.config.name.as_str(),
            username = credentials.username.as_str(),
            "session issued"
        );
        Ok(Session {
            claims: token.claims.clone(),
            token,
            set_cookie,
        })
    }

    /// Authorization flow: extract a token from the request carriers,
    /// validate it, and gate its claims through the ACL.
    pub fn authorize(&self, request: &AuthRequest) -> Result<AuthzResult, PortalError> {
        let _guard = tracing::dispatcher::set_default(&self.logger.0);

        // The bearer header outranks the cookie when both carry a token.
        let (raw, source) = if self.validator.options().validate_bearer_header {
            match request.bearer_token() {
                Some(raw) => (Some(raw.to_string()), TokenSource::BearerHeader),
                None => self.cookie_token(request),
            }
        } else {
            self.cookie_token(request)
        };
        let raw = raw.ok_or(crate::token::validator::ValidationError::TokenNotFound)?;

        let claims = self.validator.validate(&raw, source)?;
        let decision = self.acl.evaluate(&claims);
        if !decision.allowed() {
            tracing::info!(
                portal = self.config.name.as_str(),
                matched_rule = ?decision.matched_rule,
                "request denied by access list"
            );
            return Err(PortalError::AccessDenied {
                matched_rule: decision.matched_rule,
            });
        }
        Ok(AuthzResult { claims, decision })
    }

    fn cookie_token(&self, request: &AuthRequest) -> (Option<String>, TokenSource) {
        let raw = request
            .cookie_header
            .as_deref()
            .and_then(|h| self.cookie.read(h));
        (raw, TokenSource::Cookie)
    }

    /// Install a new active signing key. Previously issued tokens remain
    /// verifiable until their keys are retired.
    pub fn rotate_signing_key(&self, config: &SigningKeyConfig) -> Result<(), PortalError> {
        let _guard = tracing::dispatcher::set_default(&self.logger.0);
        self.ring.rotate(config)?;
        Ok(())
    }

    /// Retire a verification key; tokens signed with it stop validating.
    pub fn retire_signing_key(&self, key_id: &str) {
        let _guard = tracing::dispatcher::set_default(&self.logger.0);
        let current = self.ring.current();
        self.ring.install(current.without_key(key_id));
        tracing::info!(key_id, "signing key retired");
    }

    /// `Set-Cookie` header value that clears the session cookie.
    pub fn logout_cookie(&self) -> String {
        self.cookie.delete_cookie()
    }
}
