//! Policy evaluation.
//!
//! Rules are walked in their configured order every time. A rule matches
//! when all of its conditions hold. Stop actions terminate evaluation
//! immediately; among non-stop matches the last one wins. No rule matching
//! yields the policy's default action.

use serde::Serialize;

use crate::acl::{AclPolicy, DefaultAction};
use crate::claims::ClaimSet;

/// Final access outcome of a policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessAction {
    Allow,
    Deny,
}

impl From<DefaultAction> for AccessAction {
    fn from(value: DefaultAction) -> Self {
        match value {
            DefaultAction::Allow => AccessAction::Allow,
            DefaultAction::Deny => AccessAction::Deny,
        }
    }
}

/// Evaluation outcome: the action plus the index of the rule that decided
/// it, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub action: AccessAction,
    pub matched_rule: Option<usize>,
}

impl Decision {
    pub fn allowed(&self) -> bool {
        self.action == AccessAction::Allow
    }
}

impl AclPolicy {
    /// Evaluate a claim set against the policy. Pure and lock-free.
    pub fn evaluate(&self, claims: &ClaimSet) -> Decision {
        self.evaluate_traced(claims).0
    }

    /// Like [`evaluate`](Self::evaluate), additionally returning the indices
    /// of the rules that were visited, in order. The trace makes the
    /// short-circuiting behavior of stop actions observable.
    pub fn evaluate_traced(&self, claims: &ClaimSet) -> (Decision, Vec<usize>) {
        let mut decision = Decision {
            action: self.default_action.into(),
            matched_rule: None,
        };
        let mut visited = Vec::with_capacity(self.rules.len());

        for (index, rule) in self.rules.iter().enumerate() {
            visited.push(index);
            if !rule.matches(claims) {
                continue;
            }
            let action = if rule.action.allows() {
                AccessAction::Allow
            } else {
                AccessAction::Deny
            };
            decision = Decision {
                action,
                matched_rule: Some(index),
            };
            if rule.action.is_stop() {
                return (decision, visited);
            }
        }

        (decision, visited)
    }
}
