//! Token grantor and validator options, validated once at portal
//! construction.

use serde::{Deserialize, Serialize};

/// Options governing token issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrantorOptions {
    /// Token lifetime in seconds (`exp = iat + lifetime`).
    #[serde(default = "default_lifetime_secs")]
    pub lifetime_secs: u64,
    /// `iss` claim. The portal defaults this to its own name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// `aud` claim. Defaults to the issuer when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    /// Backdates `nbf` by this many seconds to tolerate clock skew.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub nbf_skew_secs: u64,
}

impl Default for TokenGrantorOptions {
    fn default() -> Self {
        Self {
            lifetime_secs: default_lifetime_secs(),
            issuer: None,
            audience: None,
            nbf_skew_secs: 0,
        }
    }
}

/// Options governing token validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenValidatorOptions {
    /// Accept the `Authorization: Bearer` header as a token carrier.
    #[serde(default = "default_true")]
    pub validate_bearer_header: bool,
    /// Reject tokens presented only via cookie.
    #[serde(default, skip_serializing_if = "is_false")]
    pub require_bearer_header: bool,
    /// When set, the token's `iss` claim must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_issuer: Option<String>,
    /// When set, the token's `aud` claim must contain this value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_audience: Option<String>,
}

impl Default for TokenValidatorOptions {
    fn default() -> Self {
        Self {
            validate_bearer_header: true,
            require_bearer_header: false,
            expected_issuer: None,
            expected_audience: None,
        }
    }
}

fn default_lifetime_secs() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

fn is_false(v: &bool) -> bool {
    !*v
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validator_defaults() {
        let opts = TokenValidatorOptions::default();
        assert!(opts.validate_bearer_header);
        assert!(!opts.require_bearer_header);
        assert!(opts.expected_issuer.is_none());
    }

    #[test]
    fn test_validator_default_serialization_is_minimal() {
        let json = serde_json::to_value(TokenValidatorOptions::default()).unwrap();
        assert_eq!(json, serde_json::json!({ "validate_bearer_header": true }));
    }

    #[test]
    fn test_grantor_defaults() {
        let opts = TokenGrantorOptions::default();
        assert_eq!(opts.lifetime_secs, 3600);
        assert_eq!(opts.nbf_skew_secs, 0);
    }
}
