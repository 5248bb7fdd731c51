//! Claim transformer pipeline.
//!
//! Stages run strictly in configured order between raw authentication and
//! policy/token issuance. Each stage receives the output of its predecessor
//! and produces a new claim set; a stage may also declare a terminal deny,
//! aborting the enclosing login attempt. The pipeline is deterministic and
//! order-sensitive by design.

use miette::Diagnostic;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::acl::rule::Condition;
use crate::claims::ClaimSet;

#[derive(Debug, Error, Diagnostic)]
pub enum TransformError {
    #[error("access denied by transformer stage {stage}")]
    #[diagnostic(code(authportal::transform::access_denied))]
    AccessDenied { stage: usize },

    #[error("invalid transformer configuration at stage {stage}: {reason}")]
    #[diagnostic(
        code(authportal::transform::config),
        help("Stage actions: `add <field> <value...>`, `remove <field> [value]`, `rewrite <field> <pattern> <replacement>`, `deny`")
    )]
    Config { stage: usize, reason: String },
}

/// Raw stage configuration: matcher conditions (ACL condition grammar, all
/// must hold, empty list matches always) plus an ordered list of actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformerConfig {
    #[serde(default)]
    pub matchers: Vec<String>,
    pub actions: Vec<String>,
}

impl TransformerConfig {
    pub fn new(matchers: Vec<String>, actions: Vec<String>) -> Self {
        Self { matchers, actions }
    }
}

#[derive(Debug, Clone)]
enum TransformOp {
    Add { field: String, values: Vec<String> },
    RemoveField { field: String },
    RemoveValue { field: String, value: String },
    Rewrite { field: String, pattern: Regex, replacement: String },
    Deny,
}

impl TransformOp {
    fn parse(input: &str) -> Result<Self, String> {
        let tokens: Vec<&str> = input.split_whitespace().collect();
        match tokens.as_slice() {
            ["add", field, values @ ..] if !values.is_empty() => Ok(TransformOp::Add {
                field: (*field).to_string(),
                values: values.iter().map(|s| s.to_string()).collect(),
            }),
            ["remove", field] => Ok(TransformOp::RemoveField {
                field: (*field).to_string(),
            }),
            ["remove", field, value] => Ok(TransformOp::RemoveValue {
                field: (*field).to_string(),
                value: (*value).to_string(),
            }),
            // The last token is the replacement; everything between the
            // field and it joins into the pattern, so patterns may contain
            // spaces.
            ["rewrite", field, rest @ ..] => {
                let Some((replacement, pattern_tokens)) = rest.split_last() else {
                    return Err(format!(
                        "rewrite takes a field, a pattern and a replacement: `{input}`"
                    ));
                };
                if pattern_tokens.is_empty() {
                    return Err(format!(
                        "rewrite takes a field, a pattern and a replacement: `{input}`"
                    ));
                }
                let raw = pattern_tokens.join(" ");
                let pattern = Regex::new(&raw)
                    .map_err(|e| format!("bad rewrite pattern `{raw}`: {e}"))?;
                Ok(TransformOp::Rewrite {
                    field: (*field).to_string(),
                    pattern,
                    replacement: (*replacement).to_string(),
                })
            }
            ["deny"] => Ok(TransformOp::Deny),
            _ => Err(format!("unknown transformer action `{input}`")),
        }
    }
}

#[derive(Debug)]
struct Stage {
    matchers: Vec<Condition>,
    ops: Vec<TransformOp>,
}

impl Stage {
    fn matches(&self, claims: &ClaimSet) -> bool {
        self.matchers.iter().all(|m| m.holds(claims))
    }
}

/// Ordered, compiled transformer stages.
#[derive(Debug, Default)]
pub struct TransformerPipeline {
    stages: Vec<Stage>,
}

impl TransformerPipeline {
    /// Compile stage configurations, failing with the offending stage index.
    pub fn compile(configs: &[TransformerConfig]) -> Result<Self, TransformError> {
        let mut stages = Vec::with_capacity(configs.len());
        for (stage, config) in configs.iter().enumerate() {
            let config_err = |reason: String| TransformError::Config { stage, reason };

            if config.actions.is_empty() {
                return Err(config_err("stage has no actions".to_string()));
            }
            let matchers = config
                .matchers
                .iter()
                .map(|m| Condition::parse(m).map_err(|e| config_err(e.to_string())))
                .collect::<Result<Vec<_>, _>>()?;
            let ops = config
                .actions
                .iter()
                .map(|a| TransformOp::parse(a).map_err(config_err))
                .collect::<Result<Vec<_>, _>>()?;
            stages.push(Stage { matchers, ops });
        }
        Ok(Self { stages })
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Run the stages in order over `claims`, producing a new claim set.
    pub fn apply(&self, claims: &ClaimSet) -> Result<ClaimSet, TransformError> {
        let mut current = claims.clone();
        for (stage_index, stage) in self.stages.iter().enumerate() {
            if !stage.matches(&current) {
                continue;
            }
            for op in &stage.ops {
                match op {
                    TransformOp::Add { field, values } => {
                        for value in values {
                            if !current.has_value(field, value) {
                                current.insert(field.clone(), value.clone());
                            }
                        }
                    }
                    TransformOp::RemoveField { field } => {
                        current.remove(field);
                    }
                    TransformOp::RemoveValue { field, value } => {
                        if let Some(values) = current.get(field) {
                            let kept: Vec<String> =
                                values.iter().filter(|v| *v != value).cloned().collect();
                            if kept.is_empty() {
                                current.remove(field);
                            } else {
                                current.set(field.clone(), kept);
                            }
                        }
                    }
                    TransformOp::Rewrite {
                        field,
                        pattern,
                        replacement,
                    } => {
                        if let Some(values) = current.get(field) {
                            let rewritten: Vec<String> = values
                                .iter()
                                .map(|v| pattern.replace_all(v, replacement.as_str()).into_owned())
                                .collect();
                            current.set(field.clone(), rewritten);
                        }
                    }
                    TransformOp::Deny => {
                        return Err(TransformError::AccessDenied { stage: stage_index });
                    }
                }
            }
        }
        Ok(current)
    }
}
