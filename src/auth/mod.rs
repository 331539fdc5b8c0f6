pub mod middleware;

use http::HeaderMap;
use percent_encoding::percent_decode_str;

use crate::config::{ApiToken, Config, Permission};

/// Authenticated caller, attached to requests as an extension.
#[derive(Debug, Clone)]
pub struct Identity {
    pub name: String,
    pub permissions: Vec<Permission>,
}

impl Identity {
    pub fn can(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

impl From<&ApiToken> for Identity {
    fn from(token: &ApiToken) -> Self {
        Self {
            name: token.name.clone(),
            permissions: token.permissions.clone(),
        }
    }
}

/// Caller on routes where authentication is optional.
#[derive(Debug, Clone)]
pub struct Caller(pub Option<Identity>);

/// Bearer token from the `Authorization` header, falling back to `?token=`.
pub fn extract_token(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    let from_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, token) = v.split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim().to_string())
        })
        .filter(|t| !t.is_empty());
    if from_header.is_some() {
        return from_header;
    }

    query?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .and_then(|raw| {
            percent_decode_str(&raw.replace('+', " "))
                .decode_utf8()
                .ok()
                .map(|s| s.into_owned())
        })
        .filter(|t| !t.is_empty())
}

/// Look up a configured token by key.
pub fn resolve(config: &Config, key: &str) -> Option<Identity> {
    config
        .tokens
        .iter()
        .find(|t| constant_time_eq(t.key.as_bytes(), key.as_bytes()))
        .map(Identity::from)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
