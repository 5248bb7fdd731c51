//! Token issuance.

use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use josekit::jws::JwsHeader;
use josekit::jwt::{self, JwtPayload};
use miette::Diagnostic;
use rand::RngCore;
use serde_json::{json, Value};
use thiserror::Error;

use crate::claims::{ClaimSet, RESERVED_CLAIMS};
use crate::token::keys::SigningKeyRing;
use crate::token::options::TokenGrantorOptions;
use crate::token::{unix_now, Token, TokenHeader};

#[derive(Debug, Error, Diagnostic)]
pub enum GrantError {
    #[error("claim `{0}` is reserved and cannot be supplied by the caller")]
    #[diagnostic(
        code(authportal::token::reserved_claim),
        help("The grantor populates iss, aud, iat, exp, nbf and jti itself")
    )]
    ReservedClaim(String),

    #[error("invalid token grantor options: {0}")]
    #[diagnostic(code(authportal::token::grantor_options))]
    InvalidOptions(String),

    #[error("failed to sign token: {0}")]
    #[diagnostic(code(authportal::token::signing))]
    Signing(String),
}

/// Issues signed tokens from claim sets. Stateless apart from the shared
/// key ring; safe for concurrent use.
#[derive(Debug)]
pub struct TokenGrantor {
    options: TokenGrantorOptions,
    ring: Arc<SigningKeyRing>,
}

impl TokenGrantor {
    pub fn new(
        options: TokenGrantorOptions,
        ring: Arc<SigningKeyRing>,
    ) -> Result<Self, GrantError> {
        if options.lifetime_secs == 0 {
            return Err(GrantError::InvalidOptions(
                "token lifetime must be greater than zero".to_string(),
            ));
        }
        Ok(Self { options, ring })
    }

    pub fn options(&self) -> &TokenGrantorOptions {
        &self.options
    }

    /// Issue a token for `claims`, stamped with the current time.
    pub fn grant(&self, claims: &ClaimSet) -> Result<Token, GrantError> {
        self.grant_at(claims, unix_now())
    }

    /// Issue a token with an explicit issuance time, in Unix seconds.
    pub fn grant_at(&self, claims: &ClaimSet, now: i64) -> Result<Token, GrantError> {
        for reserved in RESERVED_CLAIMS {
            if claims.contains_key(reserved) {
                return Err(GrantError::ReservedClaim(reserved.to_string()));
            }
        }

        let issuer = self
            .options
            .issuer
            .clone()
            .unwrap_or_else(|| "authportal".to_string());
        let audience = self.options.audience.clone().unwrap_or_else(|| issuer.clone());
        let iat = now;
        let nbf = now - self.options.nbf_skew_secs as i64;
        let exp = now + self.options.lifetime_secs as i64;
        let jti = random_nonce();

        let mut payload = JwtPayload::new();
        for (name, values) in claims.iter() {
            let value = if values.len() == 1 {
                Value::String(values[0].clone())
            } else {
                Value::Array(values.iter().cloned().map(Value::String).collect())
            };
            payload
                .set_claim(name, Some(value))
                .map_err(|e| GrantError::Signing(e.to_string()))?;
        }
        let sign_err = |e: josekit::JoseError| GrantError::Signing(e.to_string());
        payload
            .set_claim("iss", Some(Value::String(issuer.clone())))
            .map_err(sign_err)?;
        payload
            .set_claim("aud", Some(Value::String(audience.clone())))
            .map_err(sign_err)?;
        payload.set_claim("iat", Some(json!(iat))).map_err(sign_err)?;
        payload.set_claim("nbf", Some(json!(nbf))).map_err(sign_err)?;
        payload.set_claim("exp", Some(json!(exp))).map_err(sign_err)?;
        payload
            .set_claim("jti", Some(Value::String(jti.clone())))
            .map_err(sign_err)?;

        let key_set = self.ring.current();
        let active = key_set.active();
        let signer = active
            .signer()
            .map_err(|e| GrantError::Signing(e.to_string()))?;

        let mut header = JwsHeader::new();
        header.set_algorithm(active.algorithm());
        header.set_key_id(active.key_id());

        let raw = jwt::encode_with_signer(&payload, &header, signer.as_ref())
            .map_err(|e| GrantError::Signing(e.to_string()))?;

        // The token's claims are exactly the granted set plus the reserved
        // fields, mirroring what the validator will hand back.
        let mut granted = claims.clone();
        granted.set("iss", vec![issuer]);
        granted.set("aud", vec![audience]);
        granted.set("iat", vec![iat.to_string()]);
        granted.set("nbf", vec![nbf.to_string()]);
        granted.set("exp", vec![exp.to_string()]);
        granted.set("jti", vec![jti]);

        Ok(Token {
            raw,
            header: TokenHeader {
                algorithm: active.algorithm().to_string(),
                key_id: Some(active.key_id().to_string()),
            },
            claims: granted,
        })
    }
}

/// 128-bit random nonce, base64url.
fn random_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}
