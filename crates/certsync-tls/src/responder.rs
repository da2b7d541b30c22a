//! DNS-01 challenge responder backed by a DNS provider

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use certsync_dns::{challenge_record_name, RecordReconciler};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, info};

use crate::authority::ChallengeResponder;
use crate::errors::AuthorityError;

/// Default time allowed for a challenge record to become visible
pub const DEFAULT_PROPAGATION_TIMEOUT: Duration = Duration::from_secs(120);
/// Default delay between visibility checks
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(5);

/// TXT value for a DNS-01 key authorization: base64url(SHA256(key_auth))
pub fn dns01_txt_value(key_auth: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key_auth.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Publishes `_acme-challenge.<domain>` TXT records through a record store
#[derive(Clone)]
pub struct DnsChallengeResponder {
    records: RecordReconciler,
    propagation_timeout: Duration,
    polling_interval: Duration,
}

impl DnsChallengeResponder {
    pub fn new(records: RecordReconciler) -> Self {
        Self {
            records,
            propagation_timeout: DEFAULT_PROPAGATION_TIMEOUT,
            polling_interval: DEFAULT_POLLING_INTERVAL,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration, interval: Duration) -> Self {
        self.propagation_timeout = timeout;
        self.polling_interval = interval;
        self
    }
}

#[async_trait]
impl ChallengeResponder for DnsChallengeResponder {
    async fn present(
        &self,
        domain: &str,
        _token: &str,
        key_auth: &str,
    ) -> Result<(), AuthorityError> {
        let name = challenge_record_name(domain);
        let value = dns01_txt_value(key_auth);
        info!(
            "Presenting DNS-01 challenge for {} via {}",
            domain,
            self.records.store().provider_name()
        );
        self.records.publish_txt(&name, &value).await?;
        Ok(())
    }

    async fn clean_up(
        &self,
        domain: &str,
        _token: &str,
        _key_auth: &str,
    ) -> Result<(), AuthorityError> {
        let name = challenge_record_name(domain);
        debug!("Cleaning up DNS-01 challenge record {}", name);
        self.records.remove_txt(&name).await?;
        Ok(())
    }

    fn timeout(&self) -> (Duration, Duration) {
        (self.propagation_timeout, self.polling_interval)
    }
}
