//! Recurring reconciliation on a cron schedule
//!
//! Passes never overlap. The runner sits behind a `tokio::sync::Mutex` that
//! acts as the pass guard: a trigger that finds it held is skipped, and fire
//! times that elapse during a long pass are not replayed afterwards.

use chrono::Utc;
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::RunnerError;
use crate::report::PassReport;
use crate::runner::Runner;

/// Parse a cron expression.
///
/// Classic five-field expressions (`0 0 * * *`) are accepted by prepending a
/// zero seconds field. Six and seven field expressions are used as is.
pub fn parse_schedule(expression: &str) -> Result<Schedule, RunnerError> {
    let trimmed = expression.trim();
    let normalized = if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    };

    Schedule::from_str(&normalized).map_err(|e| RunnerError::Schedule {
        expression: expression.to_string(),
        message: e.to_string(),
    })
}

pub struct Scheduler {
    runner: Arc<Mutex<Runner>>,
    schedule: Schedule,
    expression: String,
    run_on_start: bool,
}

impl Scheduler {
    pub fn new(runner: Runner, expression: &str) -> Result<Self, RunnerError> {
        Ok(Self {
            runner: Arc::new(Mutex::new(runner)),
            schedule: parse_schedule(expression)?,
            expression: expression.trim().to_string(),
            run_on_start: true,
        })
    }

    /// Whether a pass runs immediately, before the first scheduled fire time
    pub fn run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }

    pub fn runner(&self) -> Arc<Mutex<Runner>> {
        self.runner.clone()
    }

    pub fn next_fire_time(&self) -> Option<chrono::DateTime<Utc>> {
        self.schedule.upcoming(Utc).next()
    }

    /// Run one pass unless another is in flight.
    ///
    /// Returns `None` when the trigger was skipped.
    pub async fn trigger(&self) -> Option<Result<PassReport, RunnerError>> {
        let mut runner = match self.runner.try_lock() {
            Ok(runner) => runner,
            Err(_) => {
                warn!("Previous reconciliation pass still running, skipping this trigger");
                return None;
            }
        };
        Some(runner.run_pass().await)
    }

    /// Fire passes on schedule until `shutdown` is cancelled.
    ///
    /// Shutdown is observed between passes only, so a running pass and its
    /// record cleanups always complete.
    pub async fn run_until_shutdown(&self, shutdown: CancellationToken) {
        info!("Scheduling reconciliation passes with '{}'", self.expression);

        if self.run_on_start && !shutdown.is_cancelled() {
            self.fire().await;
        }

        loop {
            if shutdown.is_cancelled() {
                info!("Scheduler received shutdown signal");
                return;
            }

            let Some(next) = self.next_fire_time() else {
                warn!("Cron expression '{}' has no upcoming fire time", self.expression);
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            debug!("Next reconciliation pass at {}", next);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    return;
                }
            }

            self.fire().await;
        }
    }

    async fn fire(&self) {
        match self.trigger().await {
            Some(Ok(report)) if report.persistence_error.is_some() => {
                error!("Pass completed but certificates were not persisted")
            }
            Some(Ok(_)) | None => {}
            Some(Err(e)) => error!("Reconciliation pass aborted: {}", e),
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("expression", &self.expression)
            .field("run_on_start", &self.run_on_start)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::targets::Targets;
    use certsync_dns::DnsProviderRegistry;
    use certsync_tls::{CertificateStore, FakeAuthority};
    use std::time::Duration;

    fn scheduler(dir: &tempfile::TempDir, expression: &str) -> Scheduler {
        let runner = Runner::new(
            dir.path().join("config.yaml"),
            CertificateStore::new(dir.path().join("certificates.json")),
            Box::new(FakeAuthority::new()),
            DnsProviderRegistry::new(),
            Targets::new(),
        );
        Scheduler::new(runner, expression).unwrap()
    }

    #[test]
    fn test_five_field_expressions_get_a_seconds_field() {
        let schedule = parse_schedule("0 0 * * *").unwrap();
        let next = schedule.upcoming(Utc).next().unwrap();
        assert_eq!(next.format("%H:%M:%S").to_string(), "00:00:00");
    }

    #[test]
    fn test_six_field_expressions_are_used_as_is() {
        let schedule = parse_schedule("30 15 4 * * *").unwrap();
        let next = schedule.upcoming(Utc).next().unwrap();
        assert_eq!(next.format("%H:%M:%S").to_string(), "04:15:30");
    }

    #[test]
    fn test_invalid_expression() {
        let err = parse_schedule("every day").unwrap_err();
        assert!(matches!(err, RunnerError::Schedule { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_trigger_is_skipped_while_a_pass_runs() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(&dir, "0 0 * * *");

        let runner = scheduler.runner();
        let in_flight = runner.lock().await;
        assert!(scheduler.trigger().await.is_none());
        drop(in_flight);

        // The config file does not exist, so the pass itself fails
        let result = scheduler.trigger().await.unwrap();
        assert!(matches!(result, Err(RunnerError::Config(_))));
    }

    #[tokio::test]
    async fn test_shutdown_stops_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(&dir, "0 0 1 1 *").run_on_start(false);

        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        tokio::time::timeout(Duration::from_secs(5), scheduler.run_until_shutdown(shutdown))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_pass_does_not_stop_the_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(&dir, "0 0 1 1 *");

        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        // The startup pass fails on the missing config, the loop keeps waiting
        tokio::time::timeout(Duration::from_secs(5), scheduler.run_until_shutdown(shutdown))
            .await
            .unwrap();
    }
}
