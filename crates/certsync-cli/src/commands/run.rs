//! `certsync run`: one reconciliation pass, or passes on a cron schedule

use anyhow::Context;
use certsync_cdn::BaiduCdnClient;
use certsync_core::AppConfig;
use certsync_dns::DnsProviderRegistry;
use certsync_runner::{parse_schedule, PassReport, Runner, Scheduler, Targets};
use certsync_storage::AliyunOssClient;
use certsync_tls::{resolve_directory_url, CertificateStore, LetsEncryptAuthority, PropagationProbe};
use clap::Args;
use colored::Colorize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Paths;

#[derive(Args)]
pub struct RunCommand {
    /// Cron expression (5, 6 or 7 fields). Without it a single pass runs.
    #[arg(long, short = 'c', env = "CRON")]
    pub cron: Option<String>,

    /// Seconds to wait for an ownership TXT record before binding a bucket
    #[arg(long, default_value = "10", env = "CERTSYNC_OWNERSHIP_DELAY")]
    pub ownership_delay: u64,

    /// Do not poll public resolvers for DNS-01 records before validation
    #[arg(long, default_value = "false")]
    pub skip_propagation_check: bool,
}

impl RunCommand {
    pub fn execute(self, paths: &Paths) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.run(paths))
    }

    async fn run(self, paths: &Paths) -> anyhow::Result<()> {
        // Bad schedules and configs fail before anything is contacted
        if let Some(expression) = &self.cron {
            parse_schedule(expression)?;
        }
        let config = AppConfig::load(&paths.config)
            .with_context(|| format!("Failed to load config {}", paths.config.display()))?;

        let runner = self.build_runner(paths, &config);

        // Replaces the default SIGINT exit so an in-flight pass always
        // removes its challenge and ownership records
        let shutdown = CancellationToken::new();
        tokio::spawn(forward_shutdown(tokio::signal::ctrl_c(), shutdown.clone()));

        match &self.cron {
            None => {
                let report = run_once(runner, &shutdown).await?;
                print_report(&report);
                Ok(())
            }
            Some(expression) => {
                let scheduler = Scheduler::new(runner, expression)?;
                if let Some(next) = scheduler.next_fire_time() {
                    info!("cron: {} (next scheduled pass at {})", expression, next);
                }
                scheduler.run_until_shutdown(shutdown).await;
                Ok(())
            }
        }
    }

    fn build_runner(&self, paths: &Paths, config: &AppConfig) -> Runner {
        let directory_url = resolve_directory_url(config.acme.directory.as_deref());
        debug!("Using ACME directory {}", directory_url);

        let mut authority = LetsEncryptAuthority::new(config.acme.email.clone(), directory_url)
            .with_credentials_path(paths.account_path());
        if !self.skip_propagation_check {
            authority = authority.with_propagation_probe(PropagationProbe::new());
        }

        Runner::new(
            &paths.config,
            CertificateStore::new(&paths.store),
            Box::new(authority),
            DnsProviderRegistry::with_builtin_providers(),
            targets_from_env(),
        )
        .with_ownership_delay(Duration::from_secs(self.ownership_delay))
    }
}

/// Cancel `shutdown` once `signal` resolves
async fn forward_shutdown<F>(signal: F, shutdown: CancellationToken)
where
    F: Future<Output = std::io::Result<()>>,
{
    if signal.await.is_ok() {
        info!("Received Ctrl+C, stopping after the current pass");
        shutdown.cancel();
    }
}

/// A single pass. Shutdown requests are only logged; the pass runs to the end.
async fn run_once(mut runner: Runner, shutdown: &CancellationToken) -> anyhow::Result<PassReport> {
    let report = runner.run_pass().await?;
    if shutdown.is_cancelled() {
        info!("Pass finished after a shutdown request");
    }
    Ok(report)
}

/// Register every platform whose credentials are present
fn targets_from_env() -> Targets {
    let mut targets = Targets::new();

    match BaiduCdnClient::from_env() {
        Ok(client) => targets.register_cdn(Arc::new(client)),
        Err(e) => warn!(
            "Baidu Cloud CDN unavailable, domains targeting it will fail: {}",
            e
        ),
    }

    match AliyunOssClient::from_env() {
        Ok(client) => targets.register_storage(Arc::new(client)),
        Err(e) => warn!(
            "Aliyun OSS unavailable, domains targeting it will fail: {}",
            e
        ),
    }

    debug!("Deployment targets: {:?}", targets);
    targets
}

fn print_report(report: &PassReport) {
    println!();
    for outcome in &report.domains {
        let marker = if outcome.is_failure() {
            "✗".bright_red()
        } else {
            "✓".bright_green()
        };
        println!("  {} {}", marker, outcome);
    }
    println!();
    let summary = report.summary();
    if report.failed() > 0 || report.persistence_error.is_some() {
        println!("  {}", summary.bright_yellow());
    } else {
        println!("  {}", summary.bright_green());
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use certsync_dns::{DnsRecordType, InMemoryRecordStore};
    use certsync_storage::{BindAction, FakeObjectStorage};
    use certsync_runner::TargetAction;
    use certsync_tls::FakeAuthority;

    const CONFIG: &str = r#"
acme:
  email: ops@example.com
domains:
  - domain: static.example.com
    provider: memory
    target:
      type: object_storage
      platform: aliyun
      bucket: assets
      region: cn-hangzhou
"#;

    #[tokio::test]
    async fn test_signal_cancels_shutdown_token() {
        let shutdown = CancellationToken::new();
        forward_shutdown(std::future::ready(Ok(())), shutdown.clone()).await;
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_failed_signal_listener_leaves_token_alone() {
        let shutdown = CancellationToken::new();
        let failed = std::future::ready(Err(std::io::Error::other("no signal support")));
        forward_shutdown(failed, shutdown.clone()).await;
        assert!(!shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_single_pass_completes_cleanup_after_shutdown_request() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        std::fs::write(&config_path, CONFIG).unwrap();

        let dns = Arc::new(InMemoryRecordStore::new());
        let mut registry = DnsProviderRegistry::new();
        registry.register_store("memory", dns.clone());
        let storage = Arc::new(FakeObjectStorage::new("aliyun").with_bucket("assets", "cn-hangzhou"));

        let runner = Runner::new(
            &config_path,
            CertificateStore::new(dir.path().join("certificates.json")),
            Box::new(FakeAuthority::new()),
            registry,
            Targets::new().with_storage(storage),
        )
        .with_ownership_delay(Duration::from_millis(50));

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let report = run_once(runner, &shutdown).await.unwrap();

        assert_eq!(report.failed(), 0);
        match &report.outcome("static.example.com").unwrap().target {
            Some(TargetAction::ObjectStorage(outcome)) => assert_eq!(outcome.bind, BindAction::Bound),
            other => panic!("unexpected target action: {:?}", other),
        }
        assert!(dns
            .record(DnsRecordType::TXT, "_dnsauth.static.example.com")
            .is_none());
    }
}
