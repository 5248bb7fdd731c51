//! Rule configuration surface and its typed compiled form.
//!
//! Rules arrive as loosely-typed string records ([`RuleConfiguration`]) and
//! are parsed into a closed set of condition and action variants at compile
//! time. Unknown shapes are rejected with an [`AclError`] instead of being
//! deferred to evaluation.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::acl::errors::AclError;
use crate::claims::ClaimSet;

/// Raw rule configuration: a list of condition strings plus an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub conditions: Vec<String>,
    pub action: String,
}

impl RuleConfiguration {
    pub fn new(action: impl Into<String>, conditions: Vec<String>) -> Self {
        Self {
            comment: None,
            conditions,
            action: action.into(),
        }
    }
}

/// Rule action. Stop variants terminate evaluation on match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Allow,
    Deny,
    AllowStop,
    DenyStop,
}

impl Action {
    /// Accepts `allow`, `deny`, `allow stop`/`allow-stop`,
    /// `deny stop`/`deny-stop`, case-insensitively.
    pub fn parse(input: &str) -> Result<Self, AclError> {
        let normalized = input.trim().to_ascii_lowercase().replace('-', " ");
        let tokens: Vec<&str> = normalized.split_whitespace().collect();
        match tokens.as_slice() {
            ["allow"] => Ok(Action::Allow),
            ["deny"] => Ok(Action::Deny),
            ["allow", "stop"] => Ok(Action::AllowStop),
            ["deny", "stop"] => Ok(Action::DenyStop),
            _ => Err(AclError::InvalidAction(input.to_string())),
        }
    }

    pub fn is_stop(self) -> bool {
        matches!(self, Action::AllowStop | Action::DenyStop)
    }

    pub fn allows(self) -> bool {
        matches!(self, Action::Allow | Action::AllowStop)
    }
}

/// Predicate over a single claim attribute.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Matches every claim set.
    MatchAny,
    /// Equality against any of the attribute's values.
    FieldExact { field: String, value: String },
    /// Set membership: any overlap between the attribute's values and the
    /// configured value list.
    FieldIn { field: String, values: Vec<String> },
    /// Regex match against any of the attribute's values.
    FieldRegex { field: String, pattern: Regex },
}

impl Condition {
    pub fn parse(input: &str) -> Result<Self, AclError> {
        let tokens: Vec<&str> = input.split_whitespace().collect();
        let invalid = |reason: &str| AclError::InvalidCondition {
            condition: input.to_string(),
            reason: reason.to_string(),
        };

        match tokens.as_slice() {
            ["match", "any"] => Ok(Condition::MatchAny),
            ["exact", "match", field, rest @ ..] => {
                if rest.is_empty() {
                    return Err(invalid("expected a value after the field name"));
                }
                Ok(Condition::FieldExact {
                    field: (*field).to_string(),
                    value: rest.join(" "),
                })
            }
            ["regex", "match", field, rest @ ..] => {
                if rest.is_empty() {
                    return Err(invalid("expected a pattern after the field name"));
                }
                let raw = rest.join(" ");
                let pattern = Regex::new(&raw).map_err(|e| AclError::InvalidCondition {
                    condition: input.to_string(),
                    reason: format!("bad regex: {e}"),
                })?;
                Ok(Condition::FieldRegex {
                    field: (*field).to_string(),
                    pattern,
                })
            }
            ["match", field, rest @ ..] => {
                if rest.is_empty() {
                    return Err(invalid("expected at least one value after the field name"));
                }
                Ok(Condition::FieldIn {
                    field: (*field).to_string(),
                    values: rest.iter().map(|s| s.to_string()).collect(),
                })
            }
            [] => Err(invalid("empty condition")),
            _ => Err(invalid("unknown condition verb")),
        }
    }

    /// Whether the condition holds against the given claim set.
    pub fn holds(&self, claims: &ClaimSet) -> bool {
        match self {
            Condition::MatchAny => true,
            Condition::FieldExact { field, value } => claims.has_value(field, value),
            Condition::FieldIn { field, values } => {
                values.iter().any(|v| claims.has_value(field, v))
            }
            Condition::FieldRegex { field, pattern } => claims
                .get(field)
                .map(|vals| vals.iter().any(|v| pattern.is_match(v)))
                .unwrap_or(false),
        }
    }
}

/// A compiled rule: all conditions must hold for the rule to match.
#[derive(Debug, Clone)]
pub struct Rule {
    pub(crate) conditions: Vec<Condition>,
    pub(crate) action: Action,
}

impl Rule {
    /// Compile a raw configuration, tagging failures with the rule index.
    pub(crate) fn compile(index: usize, config: &RuleConfiguration) -> Result<Self, AclError> {
        let rule_err = |reason: String| AclError::RuleConfig { index, reason };

        if config.conditions.is_empty() {
            return Err(rule_err("rule has no conditions".to_string()));
        }
        let action = Action::parse(&config.action).map_err(|e| rule_err(e.to_string()))?;
        let conditions = config
            .conditions
            .iter()
            .map(|c| Condition::parse(c))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| rule_err(e.to_string()))?;

        Ok(Rule { conditions, action })
    }

    pub(crate) fn matches(&self, claims: &ClaimSet) -> bool {
        self.conditions.iter().all(|c| c.holds(claims))
    }
}
