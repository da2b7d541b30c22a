//! DNS record management for certsync
//!
//! This crate exposes the [`DnsRecordStore`] capability that every DNS provider
//! implements, a [`DnsProviderRegistry`] that resolves provider names from the
//! config into record stores, and the [`RecordReconciler`] that converges a
//! name to a single desired CNAME or TXT value.
//!
//! # Supported Providers
//!
//! - **Cloudflare**: API token, or the legacy email + global API key pair

pub mod errors;
pub mod names;
pub mod providers;
pub mod services;

// Re-export main types
pub use errors::DnsError;
pub use names::{challenge_record_name, ownership_record_name};
pub use providers::{
    CloudflareCredentials, CloudflareProvider, DnsProviderRegistry, DnsRecordStore,
    DnsRecordType,
};
pub use services::{CnameOutcome, RecordReconciler};

#[cfg(any(test, feature = "test-utils"))]
pub use providers::memory::{InMemoryRecordStore, RecordCall};
