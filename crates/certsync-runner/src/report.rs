//! Per-domain outcomes and the aggregate pass report

use certsync_cdn::CdnOutcome;
use certsync_core::UtcDateTime;
use certsync_storage::StorageOutcome;
use std::fmt;

use crate::errors::RunnerError;

/// Certificate issuance decision for a domain
#[derive(Debug)]
pub enum IssueAction {
    /// The stored certificate is fresh
    Skipped { expires_at: UtcDateTime },
    /// A new certificate was obtained and stored
    Renewed { expires_at: UtcDateTime },
    Failed(RunnerError),
}

/// Deployment result for a domain's declared target
#[derive(Debug)]
pub enum TargetAction {
    Cdn(CdnOutcome),
    ObjectStorage(StorageOutcome),
    /// No target is declared
    None,
    Failed(RunnerError),
}

#[derive(Debug)]
pub struct DomainOutcome {
    pub domain: String,
    pub issue: IssueAction,
    /// `None` when issuance failed and the target was not attempted
    pub target: Option<TargetAction>,
}

impl DomainOutcome {
    pub fn is_failure(&self) -> bool {
        match &self.target {
            Some(TargetAction::Failed(_)) => true,
            Some(TargetAction::Cdn(outcome)) if outcome.dns_error.is_some() => true,
            _ => matches!(self.issue, IssueAction::Failed(_)),
        }
    }

    pub fn error(&self) -> Option<&RunnerError> {
        match (&self.issue, &self.target) {
            (IssueAction::Failed(e), _) => Some(e),
            (_, Some(TargetAction::Failed(e))) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for IssueAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueAction::Skipped { expires_at } => {
                write!(f, "certificate valid until {}", expires_at.format("%Y-%m-%d"))
            }
            IssueAction::Renewed { expires_at } => {
                write!(f, "certificate renewed until {}", expires_at.format("%Y-%m-%d"))
            }
            IssueAction::Failed(e) => write!(f, "{}", e),
        }
    }
}

impl fmt::Display for TargetAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAction::Cdn(outcome) => write!(f, "cdn: {}", outcome),
            TargetAction::ObjectStorage(outcome) => write!(f, "object storage: {}", outcome),
            TargetAction::None => write!(f, "no target"),
            TargetAction::Failed(e) => write!(f, "{}", e),
        }
    }
}

impl fmt::Display for DomainOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.domain, self.issue)?;
        if let Some(target) = &self.target {
            write!(f, "; {}", target)?;
        }
        Ok(())
    }
}

/// Everything one reconciliation pass did
#[derive(Debug)]
pub struct PassReport {
    pub started_at: UtcDateTime,
    pub finished_at: UtcDateTime,
    /// In declaration order
    pub domains: Vec<DomainOutcome>,
    /// Whether the certificate store was rewritten
    pub store_saved: bool,
    pub persistence_error: Option<RunnerError>,
}

impl PassReport {
    pub fn renewed(&self) -> usize {
        self.domains
            .iter()
            .filter(|d| matches!(d.issue, IssueAction::Renewed { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.domains.iter().filter(|d| d.is_failure()).count()
    }

    pub fn outcome(&self, domain: &str) -> Option<&DomainOutcome> {
        self.domains.iter().find(|d| d.domain == domain)
    }

    /// The aggregate completion message
    pub fn summary(&self) -> String {
        let elapsed = (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0;
        let mut summary = format!(
            "Reconciliation pass finished in {:.1}s: {} domain(s), {} renewed, {} failed",
            elapsed,
            self.domains.len(),
            self.renewed(),
            self.failed()
        );
        if self.persistence_error.is_some() {
            summary.push_str(", certificate store NOT saved");
        }
        summary
    }
}
