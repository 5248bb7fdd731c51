//! Session cookie carrier: attribute configuration, header rendering, and
//! extraction from incoming `Cookie` headers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::ConstructionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SameSite::Strict => write!(f, "Strict"),
            SameSite::Lax => write!(f, "Lax"),
            SameSite::None => write!(f, "None"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieConfig {
    #[serde(default = "default_cookie_name")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    #[serde(default = "default_true")]
    pub secure: bool,
    #[serde(default = "default_true")]
    pub http_only: bool,
    #[serde(default = "default_same_site")]
    pub same_site: SameSite,
    /// Overrides the token lifetime as the cookie Max-Age when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifetime_secs: Option<u64>,
}

fn default_cookie_name() -> String {
    "authportal_token".to_string()
}

fn default_cookie_path() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

fn default_same_site() -> SameSite {
    SameSite::Lax
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: default_cookie_name(),
            domain: None,
            path: default_cookie_path(),
            secure: true,
            http_only: true,
            same_site: default_same_site(),
            lifetime_secs: None,
        }
    }
}

impl CookieConfig {
    pub fn validate(&self) -> Result<(), ConstructionError> {
        if self.name.is_empty() {
            return Err(ConstructionError::Cookie(
                "cookie name must not be empty".to_string(),
            ));
        }
        if self.name.contains(['=', ';', ' ']) {
            return Err(ConstructionError::Cookie(format!(
                "cookie name `{}` contains forbidden characters",
                self.name
            )));
        }
        if self.path.is_empty() {
            return Err(ConstructionError::Cookie(
                "cookie path must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Render a `Set-Cookie` header value carrying the token.
    pub fn set_cookie(&self, token: &str, token_lifetime_secs: u64) -> String {
        let max_age = self.lifetime_secs.unwrap_or(token_lifetime_secs);
        let mut header = format!("{}={}; Path={}", self.name, token, self.path);
        if let Some(domain) = &self.domain {
            header.push_str("; Domain=");
            header.push_str(domain);
        }
        header.push_str(&format!("; Max-Age={max_age}"));
        if self.secure {
            header.push_str("; Secure");
        }
        if self.http_only {
            header.push_str("; HttpOnly");
        }
        header.push_str(&format!("; SameSite={}", self.same_site));
        header
    }

    /// Render a `Set-Cookie` header value that clears the session cookie.
    pub fn delete_cookie(&self) -> String {
        let mut header = format!("{}=; Path={}; Max-Age=0", self.name, self.path);
        if let Some(domain) = &self.domain {
            header.push_str("; Domain=");
            header.push_str(domain);
        }
        if self.secure {
            header.push_str("; Secure");
        }
        if self.http_only {
            header.push_str("; HttpOnly");
        }
        header.push_str(&format!("; SameSite={}", self.same_site));
        header
    }

    /// Extract the token value from an incoming `Cookie` header.
    pub fn read(&self, cookie_header: &str) -> Option<String> {
        for cookie in cookie_header.split(';') {
            let cookie = cookie.trim();
            if let Some(value) = cookie
                .strip_prefix(self.name.as_str())
                .and_then(|s| s.strip_prefix('='))
            {
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
        None
    }
}
