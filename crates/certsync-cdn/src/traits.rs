use async_trait::async_trait;
use certsync_core::config::CdnOptions;
use certsync_core::UtcDateTime;

use crate::errors::CdnError;

/// A certificate as observed in a CDN platform's certificate store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCertificateMeta {
    pub cert_id: String,
    pub common_name: String,
    pub not_before: Option<UtcDateTime>,
    pub not_after: UtcDateTime,
}

impl RemoteCertificateMeta {
    /// The local certificate outlives this one, or this one already expired
    pub fn is_superseded_by(&self, local_expires_at: UtcDateTime, now: UtcDateTime) -> bool {
        self.not_after < local_expires_at || self.not_after <= now
    }
}

/// CDN platform capability
///
/// Every call is expected to be idempotent against current platform state.
#[async_trait]
pub trait CdnTarget: Send + Sync {
    /// Platform name, as used in the `platform` field of a CDN target
    fn platform(&self) -> &str;

    async fn list_certificates(&self) -> Result<Vec<RemoteCertificateMeta>, CdnError>;

    /// Upload a PEM pair and return the platform's certificate id
    async fn create_certificate(
        &self,
        certificate_pem: &str,
        private_key_pem: &str,
    ) -> Result<String, CdnError>;

    async fn delete_certificate(&self, cert_id: &str) -> Result<(), CdnError>;

    /// Whether the domain is already onboarded on the platform
    async fn domain_exists(&self, domain: &str) -> Result<bool, CdnError>;

    /// Onboard the domain from its declared origin settings
    async fn create_domain(&self, domain: &str, options: &CdnOptions) -> Result<(), CdnError>;

    /// Enable HTTPS on the domain with the given certificate
    async fn bind_certificate(
        &self,
        domain: &str,
        cert_id: &str,
        options: &CdnOptions,
    ) -> Result<(), CdnError>;

    /// Push origin, SNI, QUIC, HTTP/3, SEO and IPv6 settings
    async fn apply_domain_options(&self, domain: &str, options: &CdnOptions)
        -> Result<(), CdnError>;
}
