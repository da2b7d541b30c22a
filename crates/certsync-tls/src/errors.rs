use certsync_dns::DnsError;
use std::path::PathBuf;
use thiserror::Error;

/// Certificate issuance errors
#[derive(Error, Debug)]
pub enum AuthorityError {
    #[error("ACME error: {0}")]
    Acme(String),

    #[error("ACME account is not registered")]
    NotRegistered,

    #[error("No challenge responder installed")]
    NoChallengeResponder,

    #[error("Challenge failed: {0}")]
    ChallengeFailed(String),

    #[error("Unsupported challenge type: {0}")]
    UnsupportedChallenge(String),

    #[error("Challenge responder error: {0}")]
    Responder(#[from] DnsError),

    #[error("DNS propagation of {record} not observed after {elapsed_secs}s")]
    PropagationTimeout { record: String, elapsed_secs: u64 },

    #[error("Certificate generation error: {0}")]
    CertificateGeneration(String),

    #[error(transparent)]
    InvalidCertificate(#[from] InvalidCertificate),

    #[error("Account storage error: {0}")]
    AccountStorage(String),
}

impl From<instant_acme::Error> for AuthorityError {
    fn from(err: instant_acme::Error) -> Self {
        AuthorityError::Acme(err.to_string())
    }
}

impl From<rcgen::Error> for AuthorityError {
    fn from(err: rcgen::Error) -> Self {
        AuthorityError::CertificateGeneration(err.to_string())
    }
}

/// A PEM blob that does not parse as an X.509 certificate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid certificate: {0}")]
pub struct InvalidCertificate(pub String);

/// Certificate store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Certificate store {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to read certificate store {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write certificate store {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize certificates: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl StoreError {
    /// Load failures halt a pass before any external call; write failures do not.
    pub fn is_load_failure(&self) -> bool {
        matches!(self, StoreError::Corrupt { .. } | StoreError::Read { .. })
    }
}
