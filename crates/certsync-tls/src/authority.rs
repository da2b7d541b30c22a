use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::AuthorityError;
use crate::models::IssuedCertificate;

/// DNS-01 challenge contract.
///
/// `present` publishes the proof for `domain`, `clean_up` removes it. Both
/// receive the raw key authorization; the responder derives the record value.
#[async_trait]
pub trait ChallengeResponder: Send + Sync {
    async fn present(&self, domain: &str, token: &str, key_auth: &str)
        -> Result<(), AuthorityError>;

    async fn clean_up(&self, domain: &str, token: &str, key_auth: &str)
        -> Result<(), AuthorityError>;

    /// `(timeout, poll_interval)` for observing the published proof
    fn timeout(&self) -> (Duration, Duration);
}

/// Handle returned by a successful account registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub contact: String,
    /// False when an existing account was reused
    pub newly_created: bool,
}

/// Certificate issuance capability
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Install the responder used for the next `obtain` calls
    fn set_challenge_responder(&mut self, responder: Arc<dyn ChallengeResponder>);

    /// Register (or re-load) the ACME account. Callers treat failure as
    /// non-fatal: an account may already exist.
    async fn register(&mut self) -> Result<Registration, AuthorityError>;

    /// Issue a certificate for a single domain
    async fn obtain(&self, domain: &str) -> Result<IssuedCertificate, AuthorityError>;
}
