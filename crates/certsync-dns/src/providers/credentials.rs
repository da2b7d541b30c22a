//! DNS provider credentials
//!
//! Credentials are read from the process environment, never from the config
//! document.

use certsync_core::mask_sensitive;

use crate::errors::DnsError;

/// Cloudflare credentials
///
/// Cloudflare supports two authentication methods:
/// 1. API Token (recommended) - Scoped tokens with Zone:DNS:Edit permission
/// 2. API Key + Email (legacy) - Global API key with email address
#[derive(Clone, PartialEq)]
pub enum CloudflareCredentials {
    ApiToken(String),
    ApiKey { email: String, key: String },
}

impl CloudflareCredentials {
    pub const TOKEN_VARS: [&'static str; 2] = ["CLOUDFLARE_DNS_API_TOKEN", "CF_DNS_API_TOKEN"];
    pub const EMAIL_VAR: &'static str = "CLOUDFLARE_EMAIL";
    pub const KEY_VAR: &'static str = "CLOUDFLARE_API_KEY";

    /// Resolve credentials from the environment. A scoped token wins over the
    /// legacy key pair.
    pub fn from_env() -> Result<Self, DnsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DnsError> {
        let present = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(token) = Self::TOKEN_VARS.iter().find_map(|name| present(name)) {
            return Ok(Self::ApiToken(token));
        }

        match (present(Self::EMAIL_VAR), present(Self::KEY_VAR)) {
            (Some(email), Some(key)) => Ok(Self::ApiKey { email, key }),
            _ => Err(DnsError::InvalidCredentials(format!(
                "set {} (or {}), or both {} and {}",
                Self::TOKEN_VARS[0],
                Self::TOKEN_VARS[1],
                Self::EMAIL_VAR,
                Self::KEY_VAR
            ))),
        }
    }
}

impl std::fmt::Debug for CloudflareCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiToken(token) => f
                .debug_tuple("ApiToken")
                .field(&mask_sensitive(token))
                .finish(),
            Self::ApiKey { email, key } => f
                .debug_struct("ApiKey")
                .field("email", email)
                .field("key", &mask_sensitive(key))
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_token_takes_precedence() {
        let creds = CloudflareCredentials::from_lookup(lookup(&[
            ("CF_DNS_API_TOKEN", "token-123"),
            ("CLOUDFLARE_EMAIL", "ops@example.com"),
            ("CLOUDFLARE_API_KEY", "key"),
        ]))
        .unwrap();
        assert_eq!(creds, CloudflareCredentials::ApiToken("token-123".into()));
    }

    #[test]
    fn test_legacy_key_pair() {
        let creds = CloudflareCredentials::from_lookup(lookup(&[
            ("CLOUDFLARE_EMAIL", "ops@example.com"),
            ("CLOUDFLARE_API_KEY", "global-key"),
        ]))
        .unwrap();
        assert!(matches!(creds, CloudflareCredentials::ApiKey { .. }));
    }

    #[test]
    fn test_missing_credentials() {
        let err = CloudflareCredentials::from_lookup(lookup(&[(
            "CLOUDFLARE_EMAIL",
            "ops@example.com",
        )]))
        .unwrap_err();
        assert!(matches!(err, DnsError::InvalidCredentials(_)));
    }

    #[test]
    fn test_debug_masks_secrets() {
        let creds = CloudflareCredentials::ApiToken("abcdefghijklmnop".into());
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("abcdefghijklmnop"));
        assert!(rendered.contains("abcd***mnop"));
    }
}
