//! Runner error types

use certsync_cdn::CdnError;
use certsync_core::ConfigError;
use certsync_dns::DnsError;
use certsync_storage::StorageError;
use certsync_tls::{AuthorityError, StoreError};
use thiserror::Error;

/// Errors of a reconciliation pass.
///
/// `Config` and `StoreCorrupt` abort a pass before any external call. The
/// other variants are recorded against a single domain, except `Persistence`
/// which is reported on the pass once every domain has been handled.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Certificate store unusable: {0}")]
    StoreCorrupt(#[source] StoreError),

    #[error("Failed to persist certificates: {0}")]
    Persistence(#[source] StoreError),

    #[error("Issuance failed: {0}")]
    Authority(#[from] AuthorityError),

    #[error("DNS provider error: {0}")]
    Provider(#[from] DnsError),

    #[error("No {kind} target registered for platform '{platform}'")]
    UnknownPlatform { kind: &'static str, platform: String },

    #[error("CDN reconciliation failed: {0}")]
    Cdn(#[from] CdnError),

    #[error("Object storage reconciliation failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid cron expression '{expression}': {message}")]
    Schedule { expression: String, message: String },
}

impl RunnerError {
    /// Whether this error stops a whole pass rather than one domain
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RunnerError::Config(_) | RunnerError::StoreCorrupt(_) | RunnerError::Schedule { .. }
        )
    }
}
