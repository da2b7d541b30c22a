//! DNS provider implementations
//!
//! This module contains the record store trait, the provider registry and the
//! concrete provider adapters.

pub mod cloudflare;
pub mod credentials;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod registry;
pub mod traits;

// Re-export commonly used types
pub use cloudflare::CloudflareProvider;
pub use credentials::CloudflareCredentials;
pub use registry::DnsProviderRegistry;
pub use traits::{DnsRecordStore, DnsRecordType};
