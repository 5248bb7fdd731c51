//! Access-control list engine.
//!
//! Rule configurations are compiled once into an immutable, ordered
//! [`AclPolicy`]; evaluation is a pure read over the compiled policy and is
//! safe to call concurrently without locking. Configuration changes require
//! recompiling a new policy.

pub mod engine;
pub mod errors;
pub mod rule;

use serde::{Deserialize, Serialize};

use crate::acl::errors::AclError;
use crate::acl::rule::{Rule, RuleConfiguration};

/// Policy outcome when no rule matches. Deny unless explicitly configured
/// otherwise, even for an empty rule list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultAction {
    Allow,
    #[default]
    Deny,
}

impl DefaultAction {
    pub fn is_default(&self) -> bool {
        *self == DefaultAction::Deny
    }
}

/// An ordered sequence of compiled rules plus a default action.
#[derive(Debug)]
pub struct AclPolicy {
    pub(crate) rules: Vec<Rule>,
    pub(crate) default_action: DefaultAction,
}

impl AclPolicy {
    /// Compile rule configurations into an immutable policy, failing fast
    /// with the index of the first offending rule.
    pub fn compile(
        configs: &[RuleConfiguration],
        default_action: DefaultAction,
    ) -> Result<Self, AclError> {
        let rules = configs
            .iter()
            .enumerate()
            .map(|(index, config)| Rule::compile(index, config))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            rules = rules.len(),
            ?default_action,
            "compiled access control policy"
        );

        Ok(AclPolicy {
            rules,
            default_action,
        })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn default_action(&self) -> DefaultAction {
        self.default_action
    }
}
