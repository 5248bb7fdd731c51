//! Authportal - embeddable authentication and authorization engine
//!
//! This library composes identity store backends, a claims transformer
//! pipeline, an ACL policy engine, and a signed-token grantor/validator
//! into a single portal orchestrator.

pub mod acl;
pub mod claims;
pub mod cookie;
pub mod errors;
pub mod ids;
pub mod log;
pub mod portal;
pub mod token;
pub mod transform;
