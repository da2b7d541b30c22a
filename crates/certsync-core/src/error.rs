//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading, validating or writing the declarative config.
///
/// Every variant is fatal for a reconciliation pass: nothing is contacted
/// before the document has been read and normalized.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration for '{domain}': {reason}")]
    Invalid { domain: String, reason: String },
}

impl ConfigError {
    pub fn invalid(domain: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            domain: domain.into(),
            reason: reason.into(),
        }
    }
}
