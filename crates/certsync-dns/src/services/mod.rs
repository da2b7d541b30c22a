//! Services built on top of the record store capability

pub mod record_reconciler;

pub use record_reconciler::{CnameOutcome, RecordReconciler};
