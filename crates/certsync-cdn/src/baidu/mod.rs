//! Baidu Cloud CDN
//!
//! Certificates live in the certificate service, domain settings in the CDN
//! service. Both are signed with BCE auth v1.

mod auth;
mod client;

pub use auth::{BaiduCredentials, BceSigner};
pub use client::{BaiduCdnClient, CDN_ENDPOINT, CERTIFICATE_ENDPOINT, PLATFORM};
