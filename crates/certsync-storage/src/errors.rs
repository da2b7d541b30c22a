//! Object-storage error types

use certsync_dns::DnsError;
use thiserror::Error;

/// Object-storage target and reconciliation errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Nothing can be bound to a bucket that does not exist
    #[error("Bucket {bucket} does not exist in {region}")]
    BucketNotFound { bucket: String, region: String },

    /// The platform answered with an error
    #[error("{platform} API error: {message}")]
    Remote { platform: String, message: String },

    #[error("DNS error: {0}")]
    Dns(#[from] DnsError),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Authentication error: {0}")]
    Auth(String),
}

impl StorageError {
    pub fn remote(platform: impl Into<String>, message: impl Into<String>) -> Self {
        StorageError::Remote {
            platform: platform.into(),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        StorageError::Request(err.to_string())
    }
}
