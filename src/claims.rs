//! Claim set data model shared by the ACL engine, the token subsystem and
//! the transformer pipeline.
//!
//! A [`ClaimSet`] maps an attribute name to one or more string values. Once a
//! claim set has been handed to the ACL engine or the token grantor it is
//! treated as immutable; transformers produce a new set instead of mutating
//! shared state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Claim names the token grantor populates itself. A caller-supplied claim
/// set that already carries any of these is rejected at grant time.
pub const RESERVED_CLAIMS: [&str; 6] = ["iss", "aud", "iat", "exp", "nbf", "jti"];

/// Attribute name to one-or-more string values, in stable attribute order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimSet {
    claims: BTreeMap<String, Vec<String>>,
}

impl ClaimSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value to an attribute, creating the attribute if absent.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.claims.entry(name.into()).or_default().push(value.into());
    }

    /// Replace all values of an attribute.
    pub fn set(&mut self, name: impl Into<String>, values: Vec<String>) {
        self.claims.insert(name.into(), values);
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.claims.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.claims.get(name).map(|v| v.as_slice())
    }

    /// First value of an attribute, if any.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(|v| v.first()).map(|s| s.as_str())
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.claims.contains_key(name)
    }

    /// Whether the attribute carries the given value.
    pub fn has_value(&self, name: &str, value: &str) -> bool {
        self.claims
            .get(name)
            .map(|v| v.iter().any(|c| c == value))
            .unwrap_or(false)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.claims.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.claims.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

impl FromIterator<(String, Vec<String>)> for ClaimSet {
    fn from_iter<T: IntoIterator<Item = (String, Vec<String>)>>(iter: T) -> Self {
        Self {
            claims: iter.into_iter().collect(),
        }
    }
}
