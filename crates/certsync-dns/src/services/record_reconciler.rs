//! DNS record reconciliation
//!
//! Converges one `(type, name)` to a single desired value using only the three
//! primitives of [`DnsRecordStore`].
//!
//! For CNAMEs:
//! 1. Probe the CNAME at `name`. When absent, probe `A` and then `AAAA` and
//!    delete whatever is found, since a name cannot carry a CNAME next to
//!    address records. Then create the CNAME.
//! 2. When a CNAME exists, compare the observed value with the desired value,
//!    both without the trailing dot. Equal values are left alone; different
//!    values are replaced by delete-then-create.
//!
//! Any failing primitive aborts the convergence and is returned to the caller.

use certsync_core::{same_dns_name, to_fqdn, un_fqdn};
use std::sync::Arc;
use tracing::{debug, info};

use crate::errors::DnsError;
use crate::providers::{DnsRecordStore, DnsRecordType};

/// Record types that conflict with a CNAME at the same name
const CONFLICTING_TYPES: [DnsRecordType; 2] = [DnsRecordType::A, DnsRecordType::AAAA];

/// What a convergence call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CnameOutcome {
    /// No CNAME existed. `removed` lists conflicting record types deleted first.
    Created { removed: Vec<DnsRecordType> },
    /// The observed value already matched
    AlreadyCorrect,
    /// A CNAME with a different value was replaced
    Updated { previous: String },
}

impl CnameOutcome {
    /// Whether any record was changed
    pub fn is_mutation(&self) -> bool {
        !matches!(self, CnameOutcome::AlreadyCorrect)
    }
}

impl std::fmt::Display for CnameOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CnameOutcome::Created { removed } if removed.is_empty() => write!(f, "created"),
            CnameOutcome::Created { removed } => {
                let removed: Vec<String> = removed.iter().map(|t| t.to_string()).collect();
                write!(f, "created (removed {})", removed.join(", "))
            }
            CnameOutcome::AlreadyCorrect => write!(f, "already correct"),
            CnameOutcome::Updated { previous } => write!(f, "updated (was {})", previous),
        }
    }
}

/// Converges records through one provider's record store
#[derive(Clone)]
pub struct RecordReconciler {
    store: Arc<dyn DnsRecordStore>,
}

impl RecordReconciler {
    pub fn new(store: Arc<dyn DnsRecordStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DnsRecordStore> {
        &self.store
    }

    /// Ensure `name` carries exactly one CNAME pointing at `desired`
    pub async fn converge_cname(&self, name: &str, desired: &str) -> Result<CnameOutcome, DnsError> {
        let name = un_fqdn(name);
        let target = to_fqdn(desired);

        match self.store.exists_record(DnsRecordType::CNAME, name).await? {
            None => {
                let mut removed = Vec::new();
                for record_type in CONFLICTING_TYPES {
                    if let Some(value) = self.store.exists_record(record_type, name).await? {
                        info!(
                            "{} record exists at {} ({}), deleting before creating CNAME",
                            record_type, name, value
                        );
                        self.store.delete_record(record_type, name).await?;
                        removed.push(record_type);
                    }
                }

                self.store
                    .create_record(DnsRecordType::CNAME, name, &target)
                    .await?;
                info!("Created CNAME record {} -> {}", name, target);
                Ok(CnameOutcome::Created { removed })
            }
            Some(observed) if same_dns_name(&observed, &target) => {
                debug!("CNAME record {} -> {} already correct", name, observed);
                Ok(CnameOutcome::AlreadyCorrect)
            }
            Some(observed) => {
                info!(
                    "CNAME record {} points at {}, updating to {}",
                    name, observed, target
                );
                self.store.delete_record(DnsRecordType::CNAME, name).await?;
                self.store
                    .create_record(DnsRecordType::CNAME, name, &target)
                    .await?;
                Ok(CnameOutcome::Updated { previous: observed })
            }
        }
    }

    /// Publish a TXT record, replacing any different value at `name`
    pub async fn publish_txt(&self, name: &str, value: &str) -> Result<(), DnsError> {
        let name = un_fqdn(name);
        match self.store.exists_record(DnsRecordType::TXT, name).await? {
            Some(observed) if observed == value => {
                debug!("TXT record {} already published", name);
                return Ok(());
            }
            Some(_) => {
                self.store.delete_record(DnsRecordType::TXT, name).await?;
            }
            None => {}
        }
        self.store
            .create_record(DnsRecordType::TXT, name, value)
            .await?;
        info!("Published TXT record {}", name);
        Ok(())
    }

    /// Remove the TXT record at `name` if present
    pub async fn remove_txt(&self, name: &str) -> Result<(), DnsError> {
        let name = un_fqdn(name);
        if self
            .store
            .exists_record(DnsRecordType::TXT, name)
            .await?
            .is_some()
        {
            self.store.delete_record(DnsRecordType::TXT, name).await?;
            info!("Removed TXT record {}", name);
        }
        Ok(())
    }
}
