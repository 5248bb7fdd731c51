use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AclError {
    #[error("invalid rule configuration at index {index}: {reason}")]
    #[diagnostic(
        code(authportal::acl::rule_config),
        help("Each rule needs at least one condition and an action of `allow`, `deny`, `allow stop` or `deny stop`")
    )]
    RuleConfig { index: usize, reason: String },

    #[error("invalid condition `{condition}`: {reason}")]
    #[diagnostic(
        code(authportal::acl::invalid_condition),
        help("Condition syntax: `match any`, `exact match <field> <value>`, `match <field> <value...>`, `regex match <field> <pattern>`")
    )]
    InvalidCondition { condition: String, reason: String },

    #[error("invalid action `{0}`")]
    #[diagnostic(code(authportal::acl::invalid_action))]
    InvalidAction(String),
}
