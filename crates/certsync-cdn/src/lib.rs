//! CDN certificate deployment for certsync
//!
//! - [`CdnTarget`]: what a CDN platform must offer
//! - [`CdnCertificateReconciler`]: create, rotate or rebind a domain's certificate,
//!   then push its declared options and CNAME
//! - [`BaiduCdnClient`]: Baidu Cloud CDN

pub mod baidu;
pub mod errors;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod reconciler;
pub mod traits;

pub use baidu::{BaiduCdnClient, BaiduCredentials};
pub use errors::CdnError;
pub use reconciler::{CdnCertificateReconciler, CdnOutcome, CertificateAction, CertificateInventory};
pub use traits::{CdnTarget, RemoteCertificateMeta};

#[cfg(any(test, feature = "test-utils"))]
pub use memory::{CdnCall, FakeCdnTarget};
