use async_trait::async_trait;
use certsync_core::UtcDateTime;

use crate::errors::StorageError;

/// Certificate attached to a custom-domain binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundCertificate {
    pub cert_id: Option<String>,
    /// `None` when the platform reports no readable end date
    pub valid_end: Option<UtcDateTime>,
}

/// A custom domain bound to a bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub domain: String,
    pub certificate: Option<BoundCertificate>,
}

/// Object-storage platform capability
#[async_trait]
pub trait ObjectStorageTarget: Send + Sync {
    /// Platform name, as used in the `platform` field of an object-storage target
    fn platform(&self) -> &str;

    async fn bucket_exists(&self, bucket: &str, region: &str) -> Result<bool, StorageError>;

    async fn list_bound_domains(
        &self,
        bucket: &str,
        region: &str,
    ) -> Result<Vec<Binding>, StorageError>;

    /// Token that must be published at `_dnsauth.<domain>` before binding
    async fn create_ownership_token(
        &self,
        bucket: &str,
        region: &str,
        domain: &str,
    ) -> Result<String, StorageError>;

    /// Bind (or force-rebind) the domain with a certificate pair
    async fn bind_domain(
        &self,
        bucket: &str,
        region: &str,
        domain: &str,
        certificate_pem: &str,
        private_key_pem: &str,
    ) -> Result<(), StorageError>;
}
