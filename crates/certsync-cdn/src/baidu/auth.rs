//! BCE authentication v1 request signing
//!
//! ```text
//! authStringPrefix = bce-auth-v1/{accessKey}/{timestamp}/{expiration}
//! signingKey       = hex(HMAC-SHA256(secretKey, authStringPrefix))
//! canonicalRequest = METHOD \n URI \n QUERY \n HEADERS
//! signature        = hex(HMAC-SHA256(signingKey, canonicalRequest))
//! Authorization    = {authStringPrefix}/{signedHeaders}/{signature}
//! ```

use certsync_core::mask_sensitive;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::errors::CdnError;

type HmacSha256 = Hmac<Sha256>;

/// Seconds a signature stays valid
pub const DEFAULT_EXPIRATION_SECS: u32 = 1800;

/// Access key pair for Baidu Cloud
#[derive(Clone, PartialEq)]
pub struct BaiduCredentials {
    pub access_key: String,
    pub secret_key: String,
}

impl BaiduCredentials {
    pub const ACCESS_KEY_VAR: &'static str = "BAIDUYUN_ACCESSKEY";
    pub const SECRET_KEY_VAR: &'static str = "BAIDUYUN_SECRETKEY";

    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    pub fn from_env() -> Result<Self, CdnError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CdnError> {
        let present = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        match (present(Self::ACCESS_KEY_VAR), present(Self::SECRET_KEY_VAR)) {
            (Some(access_key), Some(secret_key)) => Ok(Self::new(access_key, secret_key)),
            _ => Err(CdnError::Auth(format!(
                "set both {} and {}",
                Self::ACCESS_KEY_VAR,
                Self::SECRET_KEY_VAR
            ))),
        }
    }
}

impl std::fmt::Debug for BaiduCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaiduCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &mask_sensitive(&self.secret_key))
            .finish()
    }
}

/// Headers that take part in the signature
fn is_signed_header(name: &str) -> bool {
    matches!(
        name,
        "host" | "content-type" | "content-length" | "content-md5"
    ) || name.starts_with("x-bce-")
}

/// RFC 3986 encoding, leaving only unreserved characters as-is
fn uri_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

pub(crate) fn canonical_uri(path: &str) -> String {
    let encoded: Vec<String> = path.split('/').map(uri_encode).collect();
    let joined = encoded.join("/");
    if joined.starts_with('/') {
        joined
    } else {
        format!("/{}", joined)
    }
}

fn canonical_query(query: &[(&str, &str)]) -> String {
    let mut pairs: Vec<String> = query
        .iter()
        .filter(|(k, _)| !k.eq_ignore_ascii_case("authorization"))
        .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
        .collect();
    pairs.sort();
    pairs.join("&")
}

/// Canonical header block and the `;`-joined signed header names
fn canonical_headers(headers: &[(&str, &str)]) -> (String, String) {
    let mut entries: Vec<(String, String)> = headers
        .iter()
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .filter(|(k, v)| is_signed_header(k) && !v.is_empty())
        .collect();
    entries.sort();

    let canonical: Vec<String> = entries
        .iter()
        .map(|(k, v)| format!("{}:{}", uri_encode(k), uri_encode(v)))
        .collect();
    let signed: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
    (canonical.join("\n"), signed.join(";"))
}

fn hmac_sha256_hex(key: &[u8], data: &str) -> Result<String, CdnError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| CdnError::Auth(format!("Invalid signing key: {}", e)))?;
    mac.update(data.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Signs requests to Baidu Cloud services
#[derive(Debug, Clone)]
pub struct BceSigner {
    credentials: BaiduCredentials,
    expiration_secs: u32,
}

impl BceSigner {
    pub fn new(credentials: BaiduCredentials) -> Self {
        Self {
            credentials,
            expiration_secs: DEFAULT_EXPIRATION_SECS,
        }
    }

    /// The `Authorization` header value for one request
    pub fn sign(
        &self,
        method: &str,
        path: &str,
        query: &[(&str, &str)],
        headers: &[(&str, &str)],
        timestamp: DateTime<Utc>,
    ) -> Result<String, CdnError> {
        let auth_prefix = format!(
            "bce-auth-v1/{}/{}/{}",
            self.credentials.access_key,
            timestamp.format("%Y-%m-%dT%H:%M:%SZ"),
            self.expiration_secs
        );
        let signing_key = hmac_sha256_hex(self.credentials.secret_key.as_bytes(), &auth_prefix)?;

        let (headers_block, signed_headers) = canonical_headers(headers);
        let canonical_request = format!(
            "{}\n{}\n{}\n{}",
            method.to_ascii_uppercase(),
            canonical_uri(path),
            canonical_query(query),
            headers_block
        );
        let signature = hmac_sha256_hex(signing_key.as_bytes(), &canonical_request)?;

        Ok(format!("{}/{}/{}", auth_prefix, signed_headers, signature))
    }
}
