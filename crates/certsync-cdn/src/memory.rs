//! In-memory CDN target for tests

use async_trait::async_trait;
use certsync_core::config::CdnOptions;
use certsync_core::UtcDateTime;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::errors::CdnError;
use crate::traits::{CdnTarget, RemoteCertificateMeta};

/// A call observed by [`FakeCdnTarget`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CdnCall {
    ListCertificates,
    CreateCertificate(String),
    DeleteCertificate(String),
    CreateDomain(String),
    BindCertificate(String, String),
    ApplyDomainOptions(String),
}

#[derive(Default)]
struct State {
    certificates: Vec<RemoteCertificateMeta>,
    domains: HashSet<String>,
    bindings: HashMap<String, String>,
    next_id: usize,
    calls: Vec<CdnCall>,
}

/// CDN target backed by in-memory state, recording every call
#[derive(Default)]
pub struct FakeCdnTarget {
    platform: String,
    state: Mutex<State>,
    fail_list: bool,
    fail_delete: bool,
    fail_options: bool,
}

impl FakeCdnTarget {
    pub fn new(platform: &str) -> Self {
        Self {
            platform: platform.to_string(),
            ..Default::default()
        }
    }

    pub fn with_domain(self, domain: &str) -> Self {
        self.state.lock().unwrap().domains.insert(domain.to_string());
        self
    }

    pub fn with_certificate(self, cert_id: &str, common_name: &str, not_after: UtcDateTime) -> Self {
        self.state
            .lock()
            .unwrap()
            .certificates
            .push(RemoteCertificateMeta {
                cert_id: cert_id.to_string(),
                common_name: common_name.to_string(),
                not_before: None,
                not_after,
            });
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn failing_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    pub fn failing_options(mut self) -> Self {
        self.fail_options = true;
        self
    }

    pub fn calls(&self) -> Vec<CdnCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls that create or delete platform resources
    pub fn mutation_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| {
                matches!(
                    call,
                    CdnCall::CreateCertificate(_)
                        | CdnCall::DeleteCertificate(_)
                        | CdnCall::CreateDomain(_)
                )
            })
            .count()
    }

    pub fn certificate_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .certificates
            .iter()
            .map(|c| c.cert_id.clone())
            .collect()
    }

    pub fn bound_certificate(&self, domain: &str) -> Option<String> {
        self.state.lock().unwrap().bindings.get(domain).cloned()
    }

    pub fn has_domain(&self, domain: &str) -> bool {
        self.state.lock().unwrap().domains.contains(domain)
    }

    fn record(&self, call: CdnCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl CdnTarget for FakeCdnTarget {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn list_certificates(&self) -> Result<Vec<RemoteCertificateMeta>, CdnError> {
        self.record(CdnCall::ListCertificates);
        if self.fail_list {
            return Err(CdnError::remote(&self.platform, "listing unavailable"));
        }
        Ok(self.state.lock().unwrap().certificates.clone())
    }

    async fn create_certificate(
        &self,
        certificate_pem: &str,
        _private_key_pem: &str,
    ) -> Result<String, CdnError> {
        let common_name = certsync_tls::parse_common_name(certificate_pem)?.unwrap_or_default();
        let not_after = certsync_tls::parse_not_after(certificate_pem)?;

        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let cert_id = format!("cert-new-{}", state.next_id);
        state.certificates.push(RemoteCertificateMeta {
            cert_id: cert_id.clone(),
            common_name: common_name.clone(),
            not_before: None,
            not_after,
        });
        state.calls.push(CdnCall::CreateCertificate(common_name));
        Ok(cert_id)
    }

    async fn delete_certificate(&self, cert_id: &str) -> Result<(), CdnError> {
        self.record(CdnCall::DeleteCertificate(cert_id.to_string()));
        if self.fail_delete {
            return Err(CdnError::remote(&self.platform, "certificate is in use"));
        }
        self.state
            .lock()
            .unwrap()
            .certificates
            .retain(|c| c.cert_id != cert_id);
        Ok(())
    }

    async fn domain_exists(&self, domain: &str) -> Result<bool, CdnError> {
        Ok(self.has_domain(domain))
    }

    async fn create_domain(&self, domain: &str, _options: &CdnOptions) -> Result<(), CdnError> {
        self.record(CdnCall::CreateDomain(domain.to_string()));
        self.state.lock().unwrap().domains.insert(domain.to_string());
        Ok(())
    }

    async fn bind_certificate(
        &self,
        domain: &str,
        cert_id: &str,
        _options: &CdnOptions,
    ) -> Result<(), CdnError> {
        self.record(CdnCall::BindCertificate(
            domain.to_string(),
            cert_id.to_string(),
        ));
        self.state
            .lock()
            .unwrap()
            .bindings
            .insert(domain.to_string(), cert_id.to_string());
        Ok(())
    }

    async fn apply_domain_options(
        &self,
        domain: &str,
        _options: &CdnOptions,
    ) -> Result<(), CdnError> {
        self.record(CdnCall::ApplyDomainOptions(domain.to_string()));
        if self.fail_options {
            return Err(CdnError::remote(&self.platform, "set quic error"));
        }
        Ok(())
    }
}
