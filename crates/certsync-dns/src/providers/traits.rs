//! DNS record store trait definitions
//!
//! A record store exposes exactly three primitives. Everything smarter
//! (conflict removal, value comparison) lives in
//! [`RecordReconciler`](crate::services::RecordReconciler), so providers stay thin.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::DnsError;

/// DNS record types managed by certsync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DnsRecordType {
    A,
    AAAA,
    CNAME,
    TXT,
}

impl std::fmt::Display for DnsRecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DnsRecordType::A => write!(f, "A"),
            DnsRecordType::AAAA => write!(f, "AAAA"),
            DnsRecordType::CNAME => write!(f, "CNAME"),
            DnsRecordType::TXT => write!(f, "TXT"),
        }
    }
}

impl std::str::FromStr for DnsRecordType {
    type Err = DnsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(DnsRecordType::A),
            "AAAA" => Ok(DnsRecordType::AAAA),
            "CNAME" => Ok(DnsRecordType::CNAME),
            "TXT" => Ok(DnsRecordType::TXT),
            other => Err(DnsError::NotSupported(format!(
                "record type {} is not managed",
                other
            ))),
        }
    }
}

/// Record-level access to one DNS provider account.
///
/// Names are passed without the trailing root dot. At most one record of a
/// given type is treated as authoritative for a name.
#[async_trait]
pub trait DnsRecordStore: Send + Sync {
    /// Provider name used in logs
    fn provider_name(&self) -> &str;

    /// Value of the record of `record_type` at `name`, if any
    async fn exists_record(
        &self,
        record_type: DnsRecordType,
        name: &str,
    ) -> Result<Option<String>, DnsError>;

    async fn create_record(
        &self,
        record_type: DnsRecordType,
        name: &str,
        value: &str,
    ) -> Result<(), DnsError>;

    /// Remove every record of `record_type` at `name`
    async fn delete_record(&self, record_type: DnsRecordType, name: &str) -> Result<(), DnsError>;
}
