//! ACME issuance through Let's Encrypt (or any RFC 8555 directory)

use async_trait::async_trait;
use certsync_dns::challenge_record_name;
use instant_acme::{
    Account, AccountCredentials, AuthorizationStatus, ChallengeType, Identifier, NewAccount,
    NewOrder, Order, OrderStatus,
};
use rcgen::{CertificateParams, DistinguishedName, KeyPair};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::authority::{CertificateAuthority, ChallengeResponder, Registration};
use crate::errors::AuthorityError;
use crate::models::IssuedCertificate;
use crate::propagation::PropagationProbe;
use crate::responder::dns01_txt_value;

/// Environment override for the ACME directory
pub const DIRECTORY_URL_ENV: &str = "ACME_DIRECTORY_URL";

/// Attempts to download the certificate after finalization
const CERTIFICATE_POLL_ATTEMPTS: u32 = 30;

/// Resolve the configured directory: `production`, `staging`, or a URL.
/// Falls back to `ACME_DIRECTORY_URL`, then Let's Encrypt production.
pub fn resolve_directory_url(setting: Option<&str>) -> String {
    match setting.map(str::trim) {
        Some("staging") => instant_acme::LetsEncrypt::Staging.url().to_string(),
        Some("production") => instant_acme::LetsEncrypt::Production.url().to_string(),
        Some(url) if !url.is_empty() => url.to_string(),
        _ => std::env::var(DIRECTORY_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| instant_acme::LetsEncrypt::Production.url().to_string()),
    }
}

struct PresentedChallenge {
    token: String,
    key_authorization: String,
    url: String,
}

/// Let's Encrypt certificate authority using DNS-01 challenges
pub struct LetsEncryptAuthority {
    email: String,
    directory_url: String,
    /// Where account credentials are kept between runs
    credentials_path: Option<PathBuf>,
    account: Option<Account>,
    responder: Option<Arc<dyn ChallengeResponder>>,
    probe: Option<PropagationProbe>,
}

impl LetsEncryptAuthority {
    pub fn new(email: impl Into<String>, directory_url: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            directory_url: directory_url.into(),
            credentials_path: None,
            account: None,
            responder: None,
            probe: None,
        }
    }

    /// Persist account credentials at `path` and reuse them on later runs
    pub fn with_credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = Some(path.into());
        self
    }

    /// Wait for challenge records to be publicly visible before validation
    pub fn with_propagation_probe(mut self, probe: PropagationProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn directory_url(&self) -> &str {
        &self.directory_url
    }

    fn load_credentials(&self) -> Result<Option<AccountCredentials>, AuthorityError> {
        let Some(path) = &self.credentials_path else {
            return Ok(None);
        };
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).map(Some).map_err(|e| {
                AuthorityError::AccountStorage(format!(
                    "Failed to deserialize account {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AuthorityError::AccountStorage(format!(
                "Failed to read account {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn save_credentials(&self, credentials: &AccountCredentials) -> Result<(), AuthorityError> {
        let Some(path) = &self.credentials_path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(credentials).map_err(|e| {
            AuthorityError::AccountStorage(format!("Failed to serialize account: {}", e))
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AuthorityError::AccountStorage(e.to_string()))?;
        }
        std::fs::write(path, json).map_err(|e| {
            AuthorityError::AccountStorage(format!(
                "Failed to write account {}: {}",
                path.display(),
                e
            ))
        })
    }

    async fn validate_challenges(
        &self,
        domain: &str,
        order: &mut Order,
        responder: &dyn ChallengeResponder,
        presented: &[PresentedChallenge],
    ) -> Result<(), AuthorityError> {
        if let Some(probe) = &self.probe {
            let (timeout, interval) = responder.timeout();
            let record = challenge_record_name(domain);
            for challenge in presented {
                probe
                    .wait_for_txt(
                        &record,
                        &dns01_txt_value(&challenge.key_authorization),
                        timeout,
                        interval,
                    )
                    .await?;
            }
        }

        for challenge in presented {
            debug!("Setting challenge ready for {} ({})", domain, challenge.url);
            order.set_challenge_ready(&challenge.url).await?;
        }

        self.wait_for_order_ready(order).await
    }

    async fn wait_for_order_ready(&self, order: &mut Order) -> Result<(), AuthorityError> {
        const MAX_ATTEMPTS: u8 = 6;
        const BASE_DELAY_SECS: u64 = 1;
        const MAX_DELAY_SECS: u64 = 30;

        for attempt in 1..=MAX_ATTEMPTS {
            // Exponential backoff: 1s, 2s, 4s, 8s, 16s, 30s (capped)
            let delay_secs = std::cmp::min(
                BASE_DELAY_SECS * 2u64.pow((attempt - 1) as u32),
                MAX_DELAY_SECS,
            );
            tokio::time::sleep(Duration::from_secs(delay_secs)).await;
            let state = order.refresh().await?;

            match state.status {
                OrderStatus::Ready | OrderStatus::Valid => {
                    info!("Order is ready after {} attempt(s)", attempt);
                    return Ok(());
                }
                OrderStatus::Invalid => {
                    let error_msg = format!("Order validation failed after {} attempt(s)", attempt);
                    error!("{}", error_msg);
                    return Err(AuthorityError::ChallengeFailed(error_msg));
                }
                _ => {
                    debug!(
                        "Order not ready yet (attempt {}/{})",
                        attempt, MAX_ATTEMPTS
                    );
                }
            }
        }

        Err(AuthorityError::ChallengeFailed(format!(
            "Order validation timed out after {} attempts",
            MAX_ATTEMPTS
        )))
    }

    async fn finalize_order(
        &self,
        domain: &str,
        order: &mut Order,
    ) -> Result<IssuedCertificate, AuthorityError> {
        let mut params = CertificateParams::new(vec![domain.to_string()])?;
        params.distinguished_name = DistinguishedName::new();

        let private_key = KeyPair::generate()?;
        let csr = params.serialize_request(&private_key)?;

        order.finalize(csr.der()).await?;

        for _ in 0..CERTIFICATE_POLL_ATTEMPTS {
            if let Some(certificate_pem) = order.certificate().await? {
                return Ok(IssuedCertificate {
                    certificate_pem,
                    private_key_pem: private_key.serialize_pem(),
                });
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        Err(AuthorityError::Acme(format!(
            "Certificate for {} was not issued after {} polls",
            domain, CERTIFICATE_POLL_ATTEMPTS
        )))
    }
}

#[async_trait]
impl CertificateAuthority for LetsEncryptAuthority {
    fn set_challenge_responder(&mut self, responder: Arc<dyn ChallengeResponder>) {
        self.responder = Some(responder);
    }

    async fn register(&mut self) -> Result<Registration, AuthorityError> {
        if self.account.is_some() {
            return Ok(Registration {
                contact: self.email.clone(),
                newly_created: false,
            });
        }

        if let Some(credentials) = self.load_credentials()? {
            let account = Account::from_credentials(credentials).await?;
            info!("Loaded ACME account for {}", self.email);
            self.account = Some(account);
            return Ok(Registration {
                contact: self.email.clone(),
                newly_created: false,
            });
        }

        info!(
            "Registering ACME account for {} at {}",
            self.email, self.directory_url
        );
        let contact = format!("mailto:{}", self.email);
        let (account, credentials) = Account::create(
            &NewAccount {
                contact: &[contact.as_str()],
                terms_of_service_agreed: true,
                only_return_existing: false,
            },
            &self.directory_url,
            None,
        )
        .await?;

        // The account is usable even if saving fails; the next run registers again.
        if let Err(e) = self.save_credentials(&credentials) {
            warn!("Failed to persist ACME account credentials: {}", e);
        }
        self.account = Some(account);

        Ok(Registration {
            contact: self.email.clone(),
            newly_created: true,
        })
    }

    async fn obtain(&self, domain: &str) -> Result<IssuedCertificate, AuthorityError> {
        let account = self.account.as_ref().ok_or(AuthorityError::NotRegistered)?;
        let responder = self
            .responder
            .clone()
            .ok_or(AuthorityError::NoChallengeResponder)?;

        info!("Requesting certificate for {}", domain);
        let identifiers = [Identifier::Dns(domain.to_string())];
        let mut order = account
            .new_order(&NewOrder {
                identifiers: &identifiers,
            })
            .await?;

        if order.state().status != OrderStatus::Ready {
            let authorizations = order.authorizations().await?;
            let mut presented = Vec::new();
            let mut outcome = Ok(());

            for authz in &authorizations {
                if authz.status == AuthorizationStatus::Valid {
                    continue;
                }
                let Some(challenge) = authz
                    .challenges
                    .iter()
                    .find(|c| c.r#type == ChallengeType::Dns01)
                else {
                    outcome = Err(AuthorityError::UnsupportedChallenge(
                        "No DNS-01 challenge offered".to_string(),
                    ));
                    break;
                };

                let key_authorization = order.key_authorization(challenge).as_str().to_string();
                if let Err(e) = responder
                    .present(domain, &challenge.token, &key_authorization)
                    .await
                {
                    outcome = Err(e);
                    break;
                }
                presented.push(PresentedChallenge {
                    token: challenge.token.clone(),
                    key_authorization,
                    url: challenge.url.clone(),
                });
            }

            if outcome.is_ok() {
                outcome = self
                    .validate_challenges(domain, &mut order, responder.as_ref(), &presented)
                    .await;
            }

            // Challenge records are removed whether or not validation passed
            for challenge in &presented {
                if let Err(e) = responder
                    .clean_up(domain, &challenge.token, &challenge.key_authorization)
                    .await
                {
                    warn!("Failed to clean up challenge for {}: {}", domain, e);
                }
            }
            outcome?;
        }

        let issued = self.finalize_order(domain, &mut order).await?;
        info!("Certificate issued for {}", domain);
        Ok(issued)
    }
}
