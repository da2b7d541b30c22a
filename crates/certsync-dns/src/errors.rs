//! DNS provider error types

use thiserror::Error;

/// DNS provider errors
#[derive(Error, Debug)]
pub enum DnsError {
    /// No record store is registered under this provider name
    #[error("Unknown DNS provider: {0}")]
    UnknownProvider(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Zone not found: {0}")]
    ZoneNotFound(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),
}
