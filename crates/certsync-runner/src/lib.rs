//! Reconciliation passes for certsync
//!
//! - [`Runner`]: one full pass over the declared domains
//! - [`Scheduler`]: passes on a cron schedule, never more than one at a time
//! - [`Targets`]: CDN and object-storage capabilities keyed by platform

pub mod errors;
pub mod report;
pub mod runner;
pub mod scheduler;
pub mod targets;

pub use errors::RunnerError;
pub use report::{DomainOutcome, IssueAction, PassReport, TargetAction};
pub use runner::Runner;
pub use scheduler::{parse_schedule, Scheduler};
pub use targets::Targets;
