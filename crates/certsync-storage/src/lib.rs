//! Object-storage custom-domain binding for certsync
//!
//! - [`ObjectStorageTarget`]: what an object-storage platform must offer
//! - [`ObjectStorageReconciler`]: prove domain ownership through a TXT record,
//!   bind the certificate, then point the domain's CNAME at the bucket
//! - [`AliyunOssClient`]: Aliyun OSS

pub mod aliyun;
pub mod errors;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod reconciler;
pub mod traits;

pub use aliyun::{AliyunCredentials, AliyunOssClient};
pub use errors::StorageError;
pub use reconciler::{BindAction, ObjectStorageReconciler, StorageOutcome, DEFAULT_PROPAGATION_DELAY};
pub use traits::{Binding, BoundCertificate, ObjectStorageTarget};

#[cfg(any(test, feature = "test-utils"))]
pub use memory::{FakeObjectStorage, StorageCall};
