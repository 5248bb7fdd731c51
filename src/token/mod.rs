//! Token subsystem: the grantor issues signed claim sets, the validator
//! verifies them back into claims. Tokens use the standard three-part
//! compact JWS representation (`header.payload.signature`) so external
//! verifiers can interoperate.

pub mod grantor;
pub mod keys;
pub mod options;
pub mod validator;

use std::time::{SystemTime, UNIX_EPOCH};

/// Decoded token header fields the portal cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    pub algorithm: String,
    pub key_id: Option<String>,
}

/// A signed, self-contained token. Never mutated after signing.
#[derive(Debug, Clone)]
pub struct Token {
    /// Compact serialization, `header.payload.signature`.
    pub raw: String,
    pub header: TokenHeader,
    /// The granted claim set plus the reserved temporal/issuer fields.
    pub claims: crate::claims::ClaimSet,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// How the raw token reached the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Cookie,
    BearerHeader,
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
