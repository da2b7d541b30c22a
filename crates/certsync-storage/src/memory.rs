//! In-memory object-storage target for tests

use async_trait::async_trait;
use certsync_core::UtcDateTime;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::errors::StorageError;
use crate::traits::{Binding, BoundCertificate, ObjectStorageTarget};

/// A mutating call observed by [`FakeObjectStorage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageCall {
    CreateOwnershipToken(String),
    BindDomain(String),
}

#[derive(Default)]
struct State {
    buckets: HashSet<(String, String)>,
    bindings: HashMap<String, Binding>,
    calls: Vec<StorageCall>,
}

/// Object-storage target backed by in-memory state
#[derive(Default)]
pub struct FakeObjectStorage {
    platform: String,
    state: Mutex<State>,
    fail_bind: bool,
}

impl FakeObjectStorage {
    pub fn new(platform: &str) -> Self {
        Self {
            platform: platform.to_string(),
            ..Default::default()
        }
    }

    pub fn with_bucket(self, bucket: &str, region: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .buckets
            .insert((bucket.to_string(), region.to_string()));
        self
    }

    /// Pre-existing binding whose certificate ends at `valid_end`
    pub fn with_binding(self, domain: &str, valid_end: Option<UtcDateTime>) -> Self {
        self.state.lock().unwrap().bindings.insert(
            domain.to_string(),
            Binding {
                domain: domain.to_string(),
                certificate: Some(BoundCertificate {
                    cert_id: Some(format!("cas-{}", domain)),
                    valid_end,
                }),
            },
        );
        self
    }

    pub fn failing_bind(mut self) -> Self {
        self.fail_bind = true;
        self
    }

    pub fn calls(&self) -> Vec<StorageCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    pub fn binding(&self, domain: &str) -> Option<Binding> {
        self.state.lock().unwrap().bindings.get(domain).cloned()
    }
}

#[async_trait]
impl ObjectStorageTarget for FakeObjectStorage {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn bucket_exists(&self, bucket: &str, region: &str) -> Result<bool, StorageError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .buckets
            .contains(&(bucket.to_string(), region.to_string())))
    }

    async fn list_bound_domains(
        &self,
        _bucket: &str,
        _region: &str,
    ) -> Result<Vec<Binding>, StorageError> {
        Ok(self.state.lock().unwrap().bindings.values().cloned().collect())
    }

    async fn create_ownership_token(
        &self,
        _bucket: &str,
        _region: &str,
        domain: &str,
    ) -> Result<String, StorageError> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(StorageCall::CreateOwnershipToken(domain.to_string()));
        Ok(format!("token-{}", domain))
    }

    async fn bind_domain(
        &self,
        _bucket: &str,
        _region: &str,
        domain: &str,
        certificate_pem: &str,
        _private_key_pem: &str,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(StorageCall::BindDomain(domain.to_string()));
        if self.fail_bind {
            return Err(StorageError::remote(&self.platform, "NeedVerifyDomainOwnership"));
        }

        let valid_end = certsync_tls::parse_not_after(certificate_pem).ok();
        state.bindings.insert(
            domain.to_string(),
            Binding {
                domain: domain.to_string(),
                certificate: Some(BoundCertificate {
                    cert_id: Some(format!("cas-{}", domain)),
                    valid_end,
                }),
            },
        );
        Ok(())
    }
}
