use miette::Diagnostic;
use thiserror::Error;

use crate::acl::errors::AclError;
use crate::ids::AuthenticationError;
use crate::token::grantor::GrantError;
use crate::token::keys::KeyError;
use crate::token::validator::ValidationError;
use crate::transform::TransformError;

/// Failures during portal construction over otherwise-present inputs.
#[derive(Debug, Error, Diagnostic)]
pub enum ConstructionError {
    #[error("portal configuration name not found")]
    #[diagnostic(
        code(authportal::construct::name_not_found),
        help("Set `name` in the portal configuration")
    )]
    NameNotFound,

    #[error("portal identity store backends not found")]
    #[diagnostic(
        code(authportal::construct::backends_not_found),
        help("Reference at least one identity store in `identity_stores`")
    )]
    BackendsNotFound,

    #[error("identity store `{0}` referenced by configuration is not attached")]
    #[diagnostic(code(authportal::construct::backend_not_attached))]
    BackendNotAttached(String),

    #[error("identity store `{store}` failed configuration: {reason}")]
    #[diagnostic(code(authportal::construct::store_configure))]
    StoreConfigure { store: String, reason: String },

    #[error("invalid cookie configuration: {0}")]
    #[diagnostic(code(authportal::construct::cookie))]
    Cookie(String),

    #[error("Config error: {0}")]
    #[diagnostic(code(authportal::construct::config))]
    Config(#[from] config::ConfigError),
}

/// Top-level portal error covering construction and both runtime flows.
#[derive(Debug, Error, Diagnostic)]
pub enum PortalError {
    #[error("portal logger not found")]
    #[diagnostic(code(authportal::portal::logger_not_found))]
    LoggerNotFound,

    #[error("portal configuration not found")]
    #[diagnostic(code(authportal::portal::config_not_found))]
    ConfigNotFound,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Construction(#[from] ConstructionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Acl(#[from] AclError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Grant(#[from] GrantError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Authentication(#[from] AuthenticationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Transform(#[from] TransformError),

    #[error("access denied by policy")]
    #[diagnostic(code(authportal::portal::access_denied))]
    AccessDenied { matched_rule: Option<usize> },
}
