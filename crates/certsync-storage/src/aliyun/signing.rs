//! OSS V4 request signing

use certsync_core::mask_sensitive;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::errors::StorageError;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "OSS4-HMAC-SHA256";
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Aliyun access key pair
#[derive(Clone, PartialEq)]
pub struct AliyunCredentials {
    pub access_key_id: String,
    pub access_key_secret: String,
}

impl AliyunCredentials {
    pub const ACCESS_KEY_ID_VAR: &'static str = "OSS_ACCESS_KEY_ID";
    pub const ACCESS_KEY_SECRET_VAR: &'static str = "OSS_ACCESS_KEY_SECRET";

    pub fn new(access_key_id: impl Into<String>, access_key_secret: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
        }
    }

    pub fn from_env() -> Result<Self, StorageError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, StorageError> {
        let present = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        match (
            present(Self::ACCESS_KEY_ID_VAR),
            present(Self::ACCESS_KEY_SECRET_VAR),
        ) {
            (Some(id), Some(secret)) => Ok(Self::new(id, secret)),
            _ => Err(StorageError::Auth(format!(
                "set both {} and {}",
                Self::ACCESS_KEY_ID_VAR,
                Self::ACCESS_KEY_SECRET_VAR
            ))),
        }
    }
}

impl std::fmt::Debug for AliyunCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliyunCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &mask_sensitive(&self.access_key_secret))
            .finish()
    }
}

/// A request as seen by the signer
pub struct SigningRequest<'a> {
    pub method: &'a str,
    pub bucket: &'a str,
    pub region: &'a str,
    pub query: &'a [(&'a str, &'a str)],
    /// Lowercase names; only `content-type`, `content-md5` and `x-oss-*` are signed
    pub headers: &'a [(&'a str, &'a str)],
}

fn hmac_sha256(key: &[u8], data: &str) -> Result<Vec<u8>, StorageError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| StorageError::Auth(format!("Invalid signing key: {}", e)))?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn canonical_query(query: &[(&str, &str)]) -> String {
    let mut pairs: Vec<String> = query
        .iter()
        .map(|(k, v)| {
            if v.is_empty() {
                urlencoding::encode(k).into_owned()
            } else {
                format!("{}={}", urlencoding::encode(k), urlencoding::encode(v))
            }
        })
        .collect();
    pairs.sort();
    pairs.join("&")
}

fn canonical_headers(headers: &[(&str, &str)]) -> String {
    let mut entries: Vec<(String, String)> = headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim().to_string()))
        .filter(|(k, _)| k == "content-type" || k == "content-md5" || k.starts_with("x-oss-"))
        .collect();
    entries.sort();
    entries
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect()
}

/// Signs bucket-level OSS requests
#[derive(Debug, Clone)]
pub struct OssSigner {
    credentials: AliyunCredentials,
}

impl OssSigner {
    pub fn new(credentials: AliyunCredentials) -> Self {
        Self { credentials }
    }

    /// The `Authorization` header value. The request must carry an
    /// `x-oss-date` header with `timestamp` and `x-oss-content-sha256`.
    pub fn sign(
        &self,
        request: &SigningRequest<'_>,
        timestamp: DateTime<Utc>,
    ) -> Result<String, StorageError> {
        let date = timestamp.format("%Y%m%d").to_string();
        let oss_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();
        let region = request.region;

        let canonical_request = format!(
            "{}\n/{}/\n{}\n{}\n\n{}",
            request.method.to_ascii_uppercase(),
            request.bucket,
            canonical_query(request.query),
            canonical_headers(request.headers),
            UNSIGNED_PAYLOAD
        );

        let scope = format!("{}/{}/oss/aliyun_v4_request", date, region);
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            oss_date,
            scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let k_date = hmac_sha256(
            format!("aliyun_v4{}", self.credentials.access_key_secret).as_bytes(),
            &date,
        )?;
        let k_region = hmac_sha256(&k_date, region)?;
        let k_service = hmac_sha256(&k_region, "oss")?;
        let k_signing = hmac_sha256(&k_service, "aliyun_v4_request")?;
        let signature = hex::encode(hmac_sha256(&k_signing, &string_to_sign)?);

        Ok(format!(
            "{} Credential={}/{},Signature={}",
            ALGORITHM, self.credentials.access_key_id, scope, signature
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_canonical_query_keeps_bare_keys() {
        assert_eq!(
            canonical_query(&[("comp", "token"), ("cname", "")]),
            "cname&comp=token"
        );
        assert_eq!(
            canonical_query(&[("cname", "static.example.com"), ("comp", "token")]),
            "cname=static.example.com&comp=token"
        );
    }

    #[test]
    fn test_canonical_headers_only_signs_oss_headers() {
        let block = canonical_headers(&[
            ("x-oss-date", "20240102T030405Z"),
            ("content-type", "application/xml"),
            ("user-agent", "certsync"),
            ("x-oss-content-sha256", "UNSIGNED-PAYLOAD"),
        ]);
        assert_eq!(
            block,
            "content-type:application/xml\nx-oss-content-sha256:UNSIGNED-PAYLOAD\nx-oss-date:20240102T030405Z\n"
        );
    }

    #[test]
    fn test_authorization_layout() {
        let signer = OssSigner::new(AliyunCredentials::new("LTAI-test", "secret"));
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let auth = signer
            .sign(
                &SigningRequest {
                    method: "GET",
                    bucket: "assets",
                    region: "cn-hangzhou",
                    query: &[("cname", "")],
                    headers: &[("x-oss-date", "20240102T030405Z")],
                },
                ts,
            )
            .unwrap();

        let prefix = "OSS4-HMAC-SHA256 Credential=LTAI-test/20240102/cn-hangzhou/oss/aliyun_v4_request,Signature=";
        assert!(auth.starts_with(prefix), "{}", auth);
        assert_eq!(auth.len(), prefix.len() + 64);
    }

    #[test]
    fn test_credentials_from_lookup() {
        assert!(AliyunCredentials::from_lookup(|name| match name {
            "OSS_ACCESS_KEY_ID" => Some("id".into()),
            "OSS_ACCESS_KEY_SECRET" => Some("secret".into()),
            _ => None,
        })
        .is_ok());
        assert!(matches!(
            AliyunCredentials::from_lookup(|_| None),
            Err(StorageError::Auth(_))
        ));
    }
}
