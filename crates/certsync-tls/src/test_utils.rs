//! Test helpers: self-signed certificates and a scriptable certificate authority

use async_trait::async_trait;
use chrono::Duration;
use rcgen::{CertificateParams, DnType, KeyPair};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use certsync_core::UtcDateTime;

use crate::authority::{CertificateAuthority, ChallengeResponder, Registration};
use crate::errors::AuthorityError;
use crate::models::IssuedCertificate;

/// Self-signed certificate for `domain` that expires at `not_after`
pub fn self_signed_certificate(
    domain: &str,
    not_after: UtcDateTime,
) -> Result<IssuedCertificate, AuthorityError> {
    let mut params = CertificateParams::new(vec![domain.to_string()])?;
    params
        .distinguished_name
        .push(DnType::CommonName, domain.to_string());

    let not_before = std::cmp::min(chrono::Utc::now(), not_after) - Duration::days(1);
    params.not_before = offset_date_time(not_before)?;
    params.not_after = offset_date_time(not_after)?;

    let key = KeyPair::generate()?;
    let cert = params.self_signed(&key)?;
    Ok(IssuedCertificate {
        certificate_pem: cert.pem(),
        private_key_pem: key.serialize_pem(),
    })
}

fn offset_date_time(at: UtcDateTime) -> Result<time::OffsetDateTime, AuthorityError> {
    time::OffsetDateTime::from_unix_timestamp(at.timestamp())
        .map_err(|e| AuthorityError::CertificateGeneration(e.to_string()))
}

/// Certificate authority that issues self-signed certificates locally.
///
/// When a responder is installed, every `obtain` runs it through
/// `present` and `clean_up` like a real DNS-01 flow would.
pub struct FakeAuthority {
    validity: Duration,
    failing: Mutex<HashSet<String>>,
    fail_registration: bool,
    responder: Option<Arc<dyn ChallengeResponder>>,
    registrations: AtomicUsize,
    issued: Mutex<Vec<String>>,
}

impl Default for FakeAuthority {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeAuthority {
    pub fn new() -> Self {
        Self {
            validity: Duration::days(90),
            failing: Mutex::new(HashSet::new()),
            fail_registration: false,
            responder: None,
            registrations: AtomicUsize::new(0),
            issued: Mutex::new(Vec::new()),
        }
    }

    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    /// Make `obtain` fail for `domain`
    pub fn fail_for(self, domain: &str) -> Self {
        self.failing.lock().unwrap().insert(domain.to_string());
        self
    }

    pub fn fail_registration(mut self) -> Self {
        self.fail_registration = true;
        self
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    /// Domains successfully issued, in order
    pub fn issued(&self) -> Vec<String> {
        self.issued.lock().unwrap().clone()
    }
}

#[async_trait]
impl CertificateAuthority for FakeAuthority {
    fn set_challenge_responder(&mut self, responder: Arc<dyn ChallengeResponder>) {
        self.responder = Some(responder);
    }

    async fn register(&mut self) -> Result<Registration, AuthorityError> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        if self.fail_registration {
            return Err(AuthorityError::Acme("account already exists".to_string()));
        }
        Ok(Registration {
            contact: "ops@example.com".to_string(),
            newly_created: self.registration_count() == 1,
        })
    }

    async fn obtain(&self, domain: &str) -> Result<IssuedCertificate, AuthorityError> {
        let responder = self
            .responder
            .clone()
            .ok_or(AuthorityError::NoChallengeResponder)?;

        let token = format!("token-{}", domain);
        let key_auth = format!("{}.thumbprint", token);
        responder.present(domain, &token, &key_auth).await?;
        let result = if self.failing.lock().unwrap().contains(domain) {
            Err(AuthorityError::ChallengeFailed(format!(
                "validation failed for {}",
                domain
            )))
        } else {
            self_signed_certificate(domain, chrono::Utc::now() + self.validity)
        };
        responder.clean_up(domain, &token, &key_auth).await?;

        if result.is_ok() {
            self.issued.lock().unwrap().push(domain.to_string());
        }
        result
    }
}
