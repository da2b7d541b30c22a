//! CDN error types

use certsync_dns::DnsError;
use certsync_tls::InvalidCertificate;
use thiserror::Error;

/// CDN target and reconciliation errors
#[derive(Error, Debug)]
pub enum CdnError {
    /// The platform answered with an error
    #[error("{platform} API error: {message}")]
    Remote { platform: String, message: String },

    /// The per-pass certificate listing of a platform failed
    #[error("Certificate inventory of {platform} is unavailable: {message}")]
    Inventory { platform: String, message: String },

    #[error("DNS error: {0}")]
    Dns(#[from] DnsError),

    #[error(transparent)]
    InvalidCertificate(#[from] InvalidCertificate),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Authentication error: {0}")]
    Auth(String),
}

impl CdnError {
    pub fn remote(platform: impl Into<String>, message: impl Into<String>) -> Self {
        CdnError::Remote {
            platform: platform.into(),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for CdnError {
    fn from(err: reqwest::Error) -> Self {
        CdnError::Request(err.to_string())
    }
}
