//! Reconciliation pass
//!
//! One pass loads the config and the certificate store, then walks the
//! declared domains in order. For each domain it renews the certificate when
//! it is missing or expiring, then hands it to the reconciler of the declared
//! target. A failure is recorded against its domain and the walk continues.
//! The store is saved once, after the last domain.

use certsync_cdn::{CdnCertificateReconciler, CertificateInventory};
use certsync_core::{AppConfig, DomainSpec, Target, UtcDateTime};
use certsync_dns::{DnsProviderRegistry, RecordReconciler};
use certsync_storage::{ObjectStorageReconciler, DEFAULT_PROPAGATION_DELAY};
use certsync_tls::{
    AuthorityError, CertificateAuthority, CertificateMap, CertificateRecord, CertificateStore,
    DnsChallengeResponder,
};
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::errors::RunnerError;
use crate::report::{DomainOutcome, IssueAction, PassReport, TargetAction};
use crate::targets::Targets;

/// Drives reconciliation passes over the declared domains
pub struct Runner {
    config_path: PathBuf,
    store: CertificateStore,
    authority: Box<dyn CertificateAuthority>,
    dns: DnsProviderRegistry,
    targets: Targets,
    ownership_delay: Duration,
    challenge_timeout: Option<(Duration, Duration)>,
}

/// State shared by the domains of one pass
struct PassContext {
    now: UtcDateTime,
    certificates: CertificateMap,
    inventory: CertificateInventory,
    records: HashMap<String, RecordReconciler>,
    dirty: bool,
}

impl Runner {
    pub fn new(
        config_path: impl Into<PathBuf>,
        store: CertificateStore,
        authority: Box<dyn CertificateAuthority>,
        dns: DnsProviderRegistry,
        targets: Targets,
    ) -> Self {
        Self {
            config_path: config_path.into(),
            store,
            authority,
            dns,
            targets,
            ownership_delay: DEFAULT_PROPAGATION_DELAY,
            challenge_timeout: None,
        }
    }

    /// Wait between publishing an ownership TXT record and binding a bucket
    pub fn with_ownership_delay(mut self, delay: Duration) -> Self {
        self.ownership_delay = delay;
        self
    }

    /// Propagation timeout and polling interval handed to the DNS-01 responder
    pub fn with_challenge_timeout(mut self, timeout: Duration, interval: Duration) -> Self {
        self.challenge_timeout = Some((timeout, interval));
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn store(&self) -> &CertificateStore {
        &self.store
    }

    pub fn targets(&self) -> &Targets {
        &self.targets
    }

    /// Run one full pass.
    ///
    /// Only an unreadable config or certificate store returns an error; both
    /// are detected before any external system is contacted.
    pub async fn run_pass(&mut self) -> Result<PassReport, RunnerError> {
        let started_at = Utc::now();
        let config = AppConfig::load(&self.config_path)?;
        let certificates = self.store.load().map_err(RunnerError::StoreCorrupt)?;

        info!(
            "Starting reconciliation pass over {} domain(s)",
            config.domains.len()
        );

        let mut ctx = PassContext {
            now: started_at,
            certificates,
            inventory: CertificateInventory::new(),
            records: HashMap::new(),
            dirty: false,
        };

        let mut domains = Vec::with_capacity(config.domains.len());
        for spec in &config.domains {
            let outcome = self.reconcile_domain(spec, &mut ctx).await;
            if outcome.is_failure() {
                error!(domain = %spec.domain, "{}", outcome);
            } else {
                info!(domain = %spec.domain, "{}", outcome);
            }
            domains.push(outcome);
        }

        let mut store_saved = false;
        let mut persistence_error = None;
        if ctx.dirty {
            match self.store.save(&ctx.certificates) {
                Ok(()) => store_saved = true,
                Err(e) => {
                    error!(
                        "Renewed certificates were NOT saved to {}: {}",
                        self.store.path().display(),
                        e
                    );
                    persistence_error = Some(RunnerError::Persistence(e));
                }
            }
        } else {
            debug!("No certificate changed, store left untouched");
        }

        let report = PassReport {
            started_at,
            finished_at: Utc::now(),
            domains,
            store_saved,
            persistence_error,
        };
        info!("{}", report.summary());
        Ok(report)
    }

    async fn reconcile_domain(&mut self, spec: &DomainSpec, ctx: &mut PassContext) -> DomainOutcome {
        let domain = spec.domain.as_str();

        let fresh = ctx
            .certificates
            .get(domain)
            .filter(|record| !record.needs_renewal(ctx.now))
            .map(|record| (record.expires_at, record.days_until_expiry(ctx.now)));

        let issue = match fresh {
            Some((expires_at, days_left)) => {
                debug!(
                    domain = %domain,
                    "Certificate valid for {} more day(s), skipping issuance",
                    days_left
                );
                IssueAction::Skipped { expires_at }
            }
            None => match self.issue(spec, ctx).await {
                Ok(record) => {
                    let expires_at = record.expires_at;
                    ctx.certificates.insert(domain.to_string(), record);
                    ctx.dirty = true;
                    IssueAction::Renewed { expires_at }
                }
                Err(e) => {
                    return DomainOutcome {
                        domain: domain.to_string(),
                        issue: IssueAction::Failed(e),
                        target: None,
                    }
                }
            },
        };

        let target = match ctx.certificates.get(domain).cloned() {
            Some(record) => match self.deploy(spec, &record, ctx).await {
                Ok(action) => action,
                Err(e) => TargetAction::Failed(e),
            },
            None => TargetAction::None,
        };

        DomainOutcome {
            domain: domain.to_string(),
            issue,
            target: Some(target),
        }
    }

    /// Resolve the record reconciler of a DNS provider, once per pass
    fn records(
        &self,
        provider: &str,
        cache: &mut HashMap<String, RecordReconciler>,
    ) -> Result<RecordReconciler, RunnerError> {
        if let Some(records) = cache.get(provider) {
            return Ok(records.clone());
        }
        let records = RecordReconciler::new(self.dns.create(provider)?);
        cache.insert(provider.to_string(), records.clone());
        Ok(records)
    }

    async fn issue(
        &mut self,
        spec: &DomainSpec,
        ctx: &mut PassContext,
    ) -> Result<CertificateRecord, RunnerError> {
        let records = self.records(&spec.provider, &mut ctx.records)?;
        let mut responder = DnsChallengeResponder::new(records);
        if let Some((timeout, interval)) = self.challenge_timeout {
            responder = responder.with_timeout(timeout, interval);
        }
        self.authority.set_challenge_responder(Arc::new(responder));

        match self.authority.register().await {
            Ok(registration) if registration.newly_created => {
                info!("Registered ACME account for {}", registration.contact)
            }
            Ok(_) => {}
            Err(e) => warn!(domain = %spec.domain, "ACME registration failed, issuing anyway: {}", e),
        }

        info!(domain = %spec.domain, "Requesting certificate via {}", spec.provider);
        let issued = self.authority.obtain(&spec.domain).await?;
        let record =
            CertificateRecord::from_issued(&spec.domain, issued).map_err(AuthorityError::from)?;
        Ok(record)
    }

    async fn deploy(
        &self,
        spec: &DomainSpec,
        record: &CertificateRecord,
        ctx: &mut PassContext,
    ) -> Result<TargetAction, RunnerError> {
        match &spec.target {
            Target::None => Ok(TargetAction::None),
            Target::Cdn(options) => {
                let target =
                    self.targets
                        .cdn(&options.platform)
                        .ok_or_else(|| RunnerError::UnknownPlatform {
                            kind: "cdn",
                            platform: options.platform.clone(),
                        })?;
                let records = match options.cname.desired() {
                    Some(_) => Some(self.records(&spec.provider, &mut ctx.records)?),
                    None => None,
                };
                let outcome = CdnCertificateReconciler::new(target)
                    .reconcile(
                        &spec.domain,
                        record,
                        options,
                        &mut ctx.inventory,
                        records.as_ref(),
                        ctx.now,
                    )
                    .await?;
                Ok(TargetAction::Cdn(outcome))
            }
            Target::ObjectStorage(options) => {
                let target = self.targets.storage(&options.platform).ok_or_else(|| {
                    RunnerError::UnknownPlatform {
                        kind: "object storage",
                        platform: options.platform.clone(),
                    }
                })?;
                let records = self.records(&spec.provider, &mut ctx.records)?;
                let outcome = ObjectStorageReconciler::new(target)
                    .with_propagation_delay(self.ownership_delay)
                    .reconcile(&spec.domain, record, options, &records, ctx.now)
                    .await?;
                Ok(TargetAction::ObjectStorage(outcome))
            }
        }
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("config_path", &self.config_path)
            .field("store", &self.store.path())
            .field("dns", &self.dns)
            .field("targets", &self.targets)
            .finish()
    }
}
