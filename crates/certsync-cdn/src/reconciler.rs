//! CDN certificate reconciliation
//!
//! For one domain, against the platform's certificate inventory:
//! - no remote certificate with the domain as common name: upload and bind
//! - a remote certificate that expires before the local one, or already
//!   expired: upload, bind, then delete the superseded id
//! - otherwise: rebind the existing id, which heals an unbound domain
//!
//! The CDN domain is onboarded first when missing. Declared domain options are
//! pushed on every pass, after binding.

use certsync_core::config::CdnOptions;
use certsync_core::UtcDateTime;
use certsync_dns::{CnameOutcome, RecordReconciler};
use certsync_tls::CertificateRecord;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::errors::CdnError;
use crate::traits::{CdnTarget, RemoteCertificateMeta};

/// What happened to the domain's remote certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateAction {
    /// No matching certificate existed; a new one was uploaded and bound
    Created { cert_id: String },
    /// A superseded certificate was replaced
    Rotated {
        cert_id: String,
        previous: String,
        old_deleted: bool,
    },
    /// The current remote certificate was bound again
    Rebound { cert_id: String },
}

impl CertificateAction {
    pub fn cert_id(&self) -> &str {
        match self {
            CertificateAction::Created { cert_id }
            | CertificateAction::Rotated { cert_id, .. }
            | CertificateAction::Rebound { cert_id } => cert_id,
        }
    }
}

impl std::fmt::Display for CertificateAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CertificateAction::Created { cert_id } => write!(f, "certificate {} created", cert_id),
            CertificateAction::Rotated {
                cert_id,
                previous,
                old_deleted: true,
            } => write!(f, "certificate rotated {} -> {}", previous, cert_id),
            CertificateAction::Rotated {
                cert_id, previous, ..
            } => write!(
                f,
                "certificate rotated {} -> {} (old certificate left behind)",
                previous, cert_id
            ),
            CertificateAction::Rebound { cert_id } => {
                write!(f, "certificate {} rebound", cert_id)
            }
        }
    }
}

/// Result of reconciling one CDN domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdnOutcome {
    pub domain_created: bool,
    pub certificate: CertificateAction,
    /// Set when pushing domain options failed; the certificate is still bound
    pub options_error: Option<String>,
    pub dns: Option<CnameOutcome>,
    /// Set when CNAME convergence failed after the certificate was bound
    pub dns_error: Option<String>,
}

impl std::fmt::Display for CdnOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.domain_created {
            write!(f, "domain onboarded, ")?;
        }
        write!(f, "{}", self.certificate)?;
        if let Some(err) = &self.options_error {
            write!(f, ", options failed: {}", err)?;
        }
        if let Some(dns) = &self.dns {
            write!(f, ", cname {}", dns)?;
        }
        if let Some(err) = &self.dns_error {
            write!(f, ", cname failed: {}", err)?;
        }
        Ok(())
    }
}

/// Certificate listings, fetched at most once per platform per pass
#[derive(Debug, Default)]
pub struct CertificateInventory {
    listings: HashMap<String, Result<Vec<RemoteCertificateMeta>, String>>,
}

impl CertificateInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The platform's certificates. A failed listing is remembered, so every
    /// domain on that platform fails the same way for the rest of the pass.
    pub async fn certificates(
        &mut self,
        target: &dyn CdnTarget,
    ) -> Result<&mut Vec<RemoteCertificateMeta>, CdnError> {
        let platform = target.platform();
        if !self.listings.contains_key(platform) {
            let listing = target.list_certificates().await.map_err(|e| {
                error!("Failed to list {} certificates: {}", platform, e);
                e.to_string()
            });
            if let Ok(certs) = &listing {
                debug!("Fetched {} certificate(s) from {}", certs.len(), platform);
            }
            self.listings.insert(platform.to_string(), listing);
        }

        match self.listings.get_mut(platform) {
            Some(Ok(certs)) => Ok(certs),
            Some(Err(message)) => Err(CdnError::Inventory {
                platform: platform.to_string(),
                message: message.clone(),
            }),
            None => Err(CdnError::Inventory {
                platform: platform.to_string(),
                message: "listing was not fetched".to_string(),
            }),
        }
    }
}

/// Reconciles certificates and domain settings on one CDN platform
#[derive(Clone)]
pub struct CdnCertificateReconciler {
    target: Arc<dyn CdnTarget>,
}

impl CdnCertificateReconciler {
    pub fn new(target: Arc<dyn CdnTarget>) -> Self {
        Self { target }
    }

    pub fn platform(&self) -> &str {
        self.target.platform()
    }

    /// Converge one domain. `dns` is used only when a CNAME is declared.
    pub async fn reconcile(
        &self,
        domain: &str,
        record: &CertificateRecord,
        options: &CdnOptions,
        inventory: &mut CertificateInventory,
        dns: Option<&RecordReconciler>,
        now: UtcDateTime,
    ) -> Result<CdnOutcome, CdnError> {
        let domain_created = self.ensure_domain(domain, options).await?;

        let certs = inventory.certificates(self.target.as_ref()).await?;
        // Leftovers from a failed delete may share the common name; the
        // longest-lived one is the certificate in service
        let current = certs
            .iter()
            .filter(|c| c.common_name.eq_ignore_ascii_case(domain))
            .max_by_key(|c| c.not_after)
            .cloned();

        let certificate = match current {
            None => {
                info!(domain = %domain, "No certificate on {}, uploading", self.platform());
                let cert_id = self.upload(record, certs).await?;
                self.target.bind_certificate(domain, &cert_id, options).await?;
                CertificateAction::Created { cert_id }
            }
            Some(remote) if remote.is_superseded_by(record.expires_at, now) => {
                info!(
                    domain = %domain,
                    "Certificate {} on {} expires {}, replacing",
                    remote.cert_id,
                    self.platform(),
                    remote.not_after
                );
                let cert_id = self.upload(record, certs).await?;
                self.target.bind_certificate(domain, &cert_id, options).await?;

                // The new certificate is already live; a leftover is only clutter
                let old_deleted = match self.target.delete_certificate(&remote.cert_id).await {
                    Ok(()) => {
                        certs.retain(|c| c.cert_id != remote.cert_id);
                        true
                    }
                    Err(e) => {
                        warn!(
                            domain = %domain,
                            "Failed to delete superseded certificate {}: {}", remote.cert_id, e
                        );
                        false
                    }
                };
                CertificateAction::Rotated {
                    cert_id,
                    previous: remote.cert_id,
                    old_deleted,
                }
            }
            Some(remote) => {
                debug!(domain = %domain, "Certificate {} is current, rebinding", remote.cert_id);
                self.target
                    .bind_certificate(domain, &remote.cert_id, options)
                    .await?;
                CertificateAction::Rebound {
                    cert_id: remote.cert_id,
                }
            }
        };

        let options_error = match self.target.apply_domain_options(domain, options).await {
            Ok(()) => None,
            Err(e) => {
                error!(domain = %domain, "Failed to update CDN domain options: {}", e);
                Some(e.to_string())
            }
        };

        let (dns, dns_error) = match (options.cname.desired(), dns) {
            (Some(desired), Some(dns)) => match dns.converge_cname(domain, desired).await {
                Ok(outcome) => (Some(outcome), None),
                Err(e) => {
                    error!(domain = %domain, "Failed to converge CNAME: {}", e);
                    (None, Some(e.to_string()))
                }
            },
            (Some(_), None) => {
                warn!(domain = %domain, "CNAME is declared but no DNS provider is available");
                (None, None)
            }
            (None, _) => (None, None),
        };

        Ok(CdnOutcome {
            domain_created,
            certificate,
            options_error,
            dns,
            dns_error,
        })
    }

    async fn ensure_domain(&self, domain: &str, options: &CdnOptions) -> Result<bool, CdnError> {
        if self.target.domain_exists(domain).await? {
            return Ok(false);
        }
        self.target.create_domain(domain, options).await?;
        info!(domain = %domain, "Onboarded CDN domain on {}", self.platform());
        Ok(true)
    }

    async fn upload(
        &self,
        record: &CertificateRecord,
        certs: &mut Vec<RemoteCertificateMeta>,
    ) -> Result<String, CdnError> {
        let cert_id = self
            .target
            .create_certificate(&record.certificate, &record.private_key)
            .await?;
        certs.push(RemoteCertificateMeta {
            cert_id: cert_id.clone(),
            common_name: record.domain.clone(),
            not_before: None,
            not_after: record.expires_at,
        });
        info!(domain = %record.domain, "Uploaded certificate {}", cert_id);
        Ok(cert_id)
    }
}
