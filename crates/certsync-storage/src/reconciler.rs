//! Custom-domain binding reconciliation
//!
//! 1. The bucket must exist, otherwise the domain's storage step is aborted.
//! 2. An unbound domain first proves ownership: the platform's token is
//!    published at `_dnsauth.<domain>`, left to propagate, and removed again
//!    once the bind attempt is over, whatever its result.
//! 3. A binding whose certificate is still valid is left alone; anything else
//!    is (re)bound with the local certificate.
//! 4. The declared CNAME is converged last.

use certsync_core::config::ObjectStorageOptions;
use certsync_core::UtcDateTime;
use certsync_dns::{ownership_record_name, CnameOutcome, RecordReconciler};
use certsync_tls::CertificateRecord;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::errors::StorageError;
use crate::traits::ObjectStorageTarget;

/// Wait between publishing the ownership token and binding
pub const DEFAULT_PROPAGATION_DELAY: Duration = Duration::from_secs(10);

/// What happened to the custom-domain binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindAction {
    /// The domain was not bound before
    Bound,
    /// An existing binding got the local certificate
    Rebound,
    /// The bound certificate is valid until the given time
    Skipped { valid_until: UtcDateTime },
}

impl std::fmt::Display for BindAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindAction::Bound => write!(f, "domain bound"),
            BindAction::Rebound => write!(f, "certificate rebound"),
            BindAction::Skipped { valid_until } => {
                write!(f, "binding current until {}", valid_until.format("%Y-%m-%d"))
            }
        }
    }
}

/// Result of reconciling one custom-domain binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageOutcome {
    pub bind: BindAction,
    /// An ownership token was published for this bind
    pub ownership_verified: bool,
    pub dns: Option<CnameOutcome>,
}

impl std::fmt::Display for StorageOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.bind)?;
        if self.ownership_verified {
            write!(f, " after ownership check")?;
        }
        if let Some(dns) = &self.dns {
            write!(f, ", cname {}", dns)?;
        }
        Ok(())
    }
}

/// Reconciles custom-domain bindings on one object-storage platform
#[derive(Clone)]
pub struct ObjectStorageReconciler {
    target: Arc<dyn ObjectStorageTarget>,
    propagation_delay: Duration,
}

impl ObjectStorageReconciler {
    pub fn new(target: Arc<dyn ObjectStorageTarget>) -> Self {
        Self {
            target,
            propagation_delay: DEFAULT_PROPAGATION_DELAY,
        }
    }

    pub fn with_propagation_delay(mut self, delay: Duration) -> Self {
        self.propagation_delay = delay;
        self
    }

    pub fn platform(&self) -> &str {
        self.target.platform()
    }

    pub fn propagation_delay(&self) -> Duration {
        self.propagation_delay
    }

    pub async fn reconcile(
        &self,
        domain: &str,
        record: &CertificateRecord,
        options: &ObjectStorageOptions,
        dns: &RecordReconciler,
        now: UtcDateTime,
    ) -> Result<StorageOutcome, StorageError> {
        let (bucket, region) = (options.bucket.as_str(), options.region.as_str());

        if !self.target.bucket_exists(bucket, region).await? {
            return Err(StorageError::BucketNotFound {
                bucket: bucket.to_string(),
                region: region.to_string(),
            });
        }

        let bindings = self.target.list_bound_domains(bucket, region).await?;
        let existing = bindings
            .into_iter()
            .find(|b| b.domain.eq_ignore_ascii_case(domain));

        let (bind, ownership_verified) = match existing {
            None => {
                self.bind_with_ownership_proof(domain, record, bucket, region, dns)
                    .await?;
                (BindAction::Bound, true)
            }
            Some(binding) => {
                let valid_end = binding.certificate.and_then(|c| c.valid_end);
                match valid_end {
                    Some(valid_until) if valid_until > now => {
                        debug!(domain = %domain, "Bound certificate valid until {}", valid_until);
                        (BindAction::Skipped { valid_until }, false)
                    }
                    _ => {
                        self.target
                            .bind_domain(bucket, region, domain, &record.certificate, &record.private_key)
                            .await?;
                        info!(domain = %domain, "Rebound {} to bucket {}", domain, bucket);
                        (BindAction::Rebound, false)
                    }
                }
            }
        };

        let dns = match options.cname.desired() {
            Some(desired) => Some(dns.converge_cname(domain, desired).await?),
            None => None,
        };

        Ok(StorageOutcome {
            bind,
            ownership_verified,
            dns,
        })
    }

    async fn bind_with_ownership_proof(
        &self,
        domain: &str,
        record: &CertificateRecord,
        bucket: &str,
        region: &str,
        dns: &RecordReconciler,
    ) -> Result<(), StorageError> {
        let token = self
            .target
            .create_ownership_token(bucket, region, domain)
            .await?;
        let txt_name = ownership_record_name(domain);
        dns.publish_txt(&txt_name, &token).await?;

        debug!(
            domain = %domain,
            "Waiting {:?} for {} to propagate", self.propagation_delay, txt_name
        );
        tokio::time::sleep(self.propagation_delay).await;

        let bound = self
            .target
            .bind_domain(bucket, region, domain, &record.certificate, &record.private_key)
            .await;

        if let Err(e) = dns.remove_txt(&txt_name).await {
            warn!(domain = %domain, "Failed to remove ownership record {}: {}", txt_name, e);
        }

        bound?;
        info!(domain = %domain, "Bound {} to bucket {}", domain, bucket);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{FakeObjectStorage, StorageCall};
    use certsync_core::config::CnameConfig;
    use certsync_dns::{DnsRecordType, InMemoryRecordStore, RecordCall};
    use certsync_tls::self_signed_certificate;
    use chrono::{Duration as ChronoDuration, Utc};

    const DOMAIN: &str = "static.example.com";

    fn options(cname: bool) -> ObjectStorageOptions {
        ObjectStorageOptions {
            platform: "aliyun".into(),
            bucket: "assets".into(),
            region: "cn-hangzhou".into(),
            cname: CnameConfig {
                enabled: cname,
                value: if cname {
                    "assets.oss-cn-hangzhou.aliyuncs.com.".into()
                } else {
                    String::new()
                },
            },
        }
    }

    fn record() -> CertificateRecord {
        let issued = self_signed_certificate(DOMAIN, Utc::now() + ChronoDuration::days(90)).unwrap();
        CertificateRecord::from_issued(DOMAIN, issued).unwrap()
    }

    fn setup(
        target: FakeObjectStorage,
    ) -> (
        Arc<FakeObjectStorage>,
        Arc<InMemoryRecordStore>,
        ObjectStorageReconciler,
        RecordReconciler,
    ) {
        let target = Arc::new(target);
        let store = Arc::new(InMemoryRecordStore::new());
        let reconciler =
            ObjectStorageReconciler::new(target.clone()).with_propagation_delay(Duration::ZERO);
        (target, store.clone(), reconciler, RecordReconciler::new(store))
    }

    #[tokio::test]
    async fn test_new_binding_publishes_and_removes_ownership_token() {
        let (target, store, reconciler, dns) =
            setup(FakeObjectStorage::new("aliyun").with_bucket("assets", "cn-hangzhou"));

        let outcome = reconciler
            .reconcile(DOMAIN, &record(), &options(false), &dns, Utc::now())
            .await
            .unwrap();

        assert_eq!(outcome.bind, BindAction::Bound);
        assert!(outcome.ownership_verified);
        assert!(target.binding(DOMAIN).is_some());
        assert_eq!(
            store.calls(),
            vec![
                RecordCall::Create(
                    DnsRecordType::TXT,
                    "_dnsauth.static.example.com".into(),
                    "token-static.example.com".into()
                ),
                RecordCall::Delete(DnsRecordType::TXT, "_dnsauth.static.example.com".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_ownership_record_removed_when_bind_fails() {
        let (_target, store, reconciler, dns) = setup(
            FakeObjectStorage::new("aliyun")
                .with_bucket("assets", "cn-hangzhou")
                .failing_bind(),
        );

        let err = reconciler
            .reconcile(DOMAIN, &record(), &options(true), &dns, Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Remote { .. }));
        assert_eq!(store.record(DnsRecordType::TXT, "_dnsauth.static.example.com"), None);
        // The CNAME step is not reached
        assert_eq!(store.record(DnsRecordType::CNAME, DOMAIN), None);
    }

    #[tokio::test]
    async fn test_missing_bucket_aborts_before_any_change() {
        let (target, store, reconciler, dns) = setup(FakeObjectStorage::new("aliyun"));

        let err = reconciler
            .reconcile(DOMAIN, &record(), &options(true), &dns, Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::BucketNotFound { .. }));
        assert_eq!(target.mutation_count(), 0);
        assert_eq!(store.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_current_binding_is_skipped() {
        let valid_until = Utc::now() + ChronoDuration::days(30);
        let (target, _store, reconciler, dns) = setup(
            FakeObjectStorage::new("aliyun")
                .with_bucket("assets", "cn-hangzhou")
                .with_binding(DOMAIN, Some(valid_until)),
        );

        let outcome = reconciler
            .reconcile(DOMAIN, &record(), &options(false), &dns, Utc::now())
            .await
            .unwrap();

        assert_eq!(outcome.bind, BindAction::Skipped { valid_until });
        assert_eq!(target.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_binding_is_rebound_without_token() {
        let (target, store, reconciler, dns) = setup(
            FakeObjectStorage::new("aliyun")
                .with_bucket("assets", "cn-hangzhou")
                .with_binding(DOMAIN, Some(Utc::now() - ChronoDuration::days(1))),
        );

        let outcome = reconciler
            .reconcile(DOMAIN, &record(), &options(false), &dns, Utc::now())
            .await
            .unwrap();

        assert_eq!(outcome.bind, BindAction::Rebound);
        assert!(!outcome.ownership_verified);
        assert_eq!(target.calls(), vec![StorageCall::BindDomain(DOMAIN.into())]);
        assert_eq!(store.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_binding_without_end_date_is_rebound() {
        let (_target, _store, reconciler, dns) = setup(
            FakeObjectStorage::new("aliyun")
                .with_bucket("assets", "cn-hangzhou")
                .with_binding(DOMAIN, None),
        );

        let outcome = reconciler
            .reconcile(DOMAIN, &record(), &options(false), &dns, Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome.bind, BindAction::Rebound);
    }

    #[tokio::test]
    async fn test_cname_converges_to_bucket_endpoint() {
        let (_target, store, reconciler, dns) =
            setup(FakeObjectStorage::new("aliyun").with_bucket("assets", "cn-hangzhou"));

        let outcome = reconciler
            .reconcile(DOMAIN, &record(), &options(true), &dns, Utc::now())
            .await
            .unwrap();

        assert!(matches!(outcome.dns, Some(CnameOutcome::Created { .. })));
        assert_eq!(
            store.record(DnsRecordType::CNAME, DOMAIN).as_deref(),
            Some("assets.oss-cn-hangzhou.aliyuncs.com.")
        );

        // Second pass: binding is current and the CNAME already correct
        let before = store.mutation_count();
        let second = reconciler
            .reconcile(DOMAIN, &record(), &options(true), &dns, Utc::now())
            .await
            .unwrap();
        assert!(matches!(second.bind, BindAction::Skipped { .. }));
        assert_eq!(second.dns, Some(CnameOutcome::AlreadyCorrect));
        assert_eq!(store.mutation_count(), before);
    }
}
