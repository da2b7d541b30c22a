//! Certificates for certsync
//!
//! - [`CertificateStore`]: the persisted map from domain to last issued certificate
//! - [`CertificateAuthority`] / [`ChallengeResponder`]: the issuance capability and
//!   the DNS-01 contract it drives
//! - [`LetsEncryptAuthority`]: ACME issuance through instant-acme
//! - [`DnsChallengeResponder`]: DNS-01 records published through a DNS provider

pub mod authority;
pub mod errors;
pub mod letsencrypt;
pub mod models;
pub mod propagation;
pub mod responder;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use authority::{CertificateAuthority, ChallengeResponder, Registration};
pub use errors::{AuthorityError, InvalidCertificate, StoreError};
pub use letsencrypt::{resolve_directory_url, LetsEncryptAuthority};
pub use models::{
    parse_common_name, parse_not_after, renewal_threshold, CertificateRecord, IssuedCertificate,
    RENEWAL_THRESHOLD_DAYS,
};
pub use propagation::PropagationProbe;
pub use responder::{dns01_txt_value, DnsChallengeResponder};
pub use store::{CertificateMap, CertificateStore};
#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::{self_signed_certificate, FakeAuthority};
