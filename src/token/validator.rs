//! Token validation.
//!
//! Checks run in a fixed order with the first failure winning: structure,
//! signature, temporal bounds, issuer/audience, presentation requirements.
//! Validation is a pure read over a snapshot of the signing key set.

use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use miette::Diagnostic;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::claims::ClaimSet;
use crate::token::keys::SigningKeyRing;
use crate::token::options::TokenValidatorOptions;
use crate::token::{unix_now, TokenSource};

#[derive(Debug, Error, Diagnostic)]
pub enum ValidationError {
    #[error("no session token found in the request")]
    #[diagnostic(code(authportal::token::not_found))]
    TokenNotFound,

    #[error("malformed token")]
    #[diagnostic(
        code(authportal::token::malformed),
        help("A token is three base64url segments: header.payload.signature")
    )]
    MalformedToken,

    #[error("token signature verification failed")]
    #[diagnostic(code(authportal::token::signature_invalid))]
    SignatureInvalid,

    #[error("token has expired")]
    #[diagnostic(code(authportal::token::expired))]
    TokenExpired,

    #[error("token is not yet valid")]
    #[diagnostic(code(authportal::token::not_yet_valid))]
    TokenNotYetValid,

    #[error("token issuer does not match `{expected}`")]
    #[diagnostic(code(authportal::token::issuer_mismatch))]
    IssuerMismatch { expected: String },

    #[error("token audience does not match `{expected}`")]
    #[diagnostic(code(authportal::token::audience_mismatch))]
    AudienceMismatch { expected: String },

    #[error("token must be presented via an authorization bearer header")]
    #[diagnostic(code(authportal::token::bearer_header_required))]
    BearerHeaderRequired,
}

/// Verifies signed tokens back into claim sets. Stateless and safe for
/// concurrent use.
#[derive(Debug)]
pub struct TokenValidator {
    options: TokenValidatorOptions,
    ring: Arc<SigningKeyRing>,
}

impl TokenValidator {
    pub fn new(options: TokenValidatorOptions, ring: Arc<SigningKeyRing>) -> Self {
        Self { options, ring }
    }

    pub fn options(&self) -> &TokenValidatorOptions {
        &self.options
    }

    /// Validate a raw token presented through `source` at the current time.
    pub fn validate(&self, raw: &str, source: TokenSource) -> Result<ClaimSet, ValidationError> {
        self.validate_at(raw, source, unix_now())
    }

    /// Validate with an explicit clock, in Unix seconds.
    pub fn validate_at(
        &self,
        raw: &str,
        source: TokenSource,
        now: i64,
    ) -> Result<ClaimSet, ValidationError> {
        check_structure(raw)?;

        // Try every verification key, not just the one named by the header
        // kid; headers can go stale across rotations.
        let key_set = self.ring.current();
        let mut payload_bytes = None;
        for key in key_set.verification_keys() {
            let Ok(verifier) = key.verifier() else {
                continue;
            };
            if let Ok((bytes, _header)) = josekit::jws::deserialize_compact(raw, verifier.as_ref())
            {
                payload_bytes = Some(bytes);
                break;
            }
        }
        let payload_bytes = payload_bytes.ok_or(ValidationError::SignatureInvalid)?;

        let payload: Map<String, Value> =
            serde_json::from_slice(&payload_bytes).map_err(|_| ValidationError::MalformedToken)?;

        let nbf = claim_as_i64(&payload, "nbf");
        if let Some(nbf) = nbf {
            if now < nbf {
                return Err(ValidationError::TokenNotYetValid);
            }
        }
        let exp = claim_as_i64(&payload, "exp").ok_or(ValidationError::MalformedToken)?;
        if now >= exp {
            return Err(ValidationError::TokenExpired);
        }

        if let Some(expected) = &self.options.expected_issuer {
            let issuer = payload.get("iss").and_then(Value::as_str);
            if issuer != Some(expected.as_str()) {
                return Err(ValidationError::IssuerMismatch {
                    expected: expected.clone(),
                });
            }
        }
        if let Some(expected) = &self.options.expected_audience {
            if !audience_contains(payload.get("aud"), expected) {
                return Err(ValidationError::AudienceMismatch {
                    expected: expected.clone(),
                });
            }
        }

        if self.options.require_bearer_header && source != TokenSource::BearerHeader {
            return Err(ValidationError::BearerHeaderRequired);
        }

        Ok(claims_from_payload(&payload))
    }
}

/// Structural pre-check: three non-empty, base64url-decodable segments with
/// a JSON header naming an algorithm.
fn check_structure(raw: &str) -> Result<(), ValidationError> {
    let parts: Vec<&str> = raw.split('.').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(ValidationError::MalformedToken);
    }
    let header_bytes =
        Base64UrlUnpadded::decode_vec(parts[0]).map_err(|_| ValidationError::MalformedToken)?;
    let header: Map<String, Value> =
        serde_json::from_slice(&header_bytes).map_err(|_| ValidationError::MalformedToken)?;
    if !header.get("alg").map(Value::is_string).unwrap_or(false) {
        return Err(ValidationError::MalformedToken);
    }
    Base64UrlUnpadded::decode_vec(parts[1]).map_err(|_| ValidationError::MalformedToken)?;
    Base64UrlUnpadded::decode_vec(parts[2]).map_err(|_| ValidationError::MalformedToken)?;
    Ok(())
}

fn claim_as_i64(payload: &Map<String, Value>, name: &str) -> Option<i64> {
    match payload.get(name) {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}

fn audience_contains(aud: Option<&Value>, expected: &str) -> bool {
    match aud {
        Some(Value::String(s)) => s == expected,
        Some(Value::Array(items)) => items
            .iter()
            .any(|v| v.as_str().map(|s| s == expected).unwrap_or(false)),
        _ => false,
    }
}

/// Flatten the JSON payload into the string-valued claims model. Reserved
/// fields stay in, so callers can inspect `exp`/`jti` for revocation checks.
fn claims_from_payload(payload: &Map<String, Value>) -> ClaimSet {
    let mut claims = ClaimSet::new();
    for (name, value) in payload {
        match value {
            Value::String(s) => claims.insert(name, s.clone()),
            Value::Number(n) => claims.insert(name, n.to_string()),
            Value::Bool(b) => claims.insert(name, b.to_string()),
            Value::Array(items) => {
                let values: Vec<String> = items
                    .iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s.clone()),
                        Value::Number(n) => Some(n.to_string()),
                        Value::Bool(b) => Some(b.to_string()),
                        _ => None,
                    })
                    .collect();
                claims.set(name, values);
            }
            // Nested objects and nulls have no claim representation.
            _ => {}
        }
    }
    claims
}
