//! Cloudflare DNS provider implementation
//!
//! This provider uses the Cloudflare API to manage DNS records.
//! It requires an API Token with Zone:DNS:Edit permissions, or the legacy
//! email + global API key pair.

use async_trait::async_trait;
use certsync_core::un_fqdn;
use cloudflare::endpoints::{dns, zones};
use cloudflare::framework::{
    auth::Credentials, client::async_api::Client, client::ClientConfig, Environment,
};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info};

use super::credentials::CloudflareCredentials;
use super::traits::{DnsRecordStore, DnsRecordType};
use crate::errors::DnsError;

/// TTL for records created by certsync (seconds)
const RECORD_TTL: u32 = 120;

/// Cloudflare DNS provider
pub struct CloudflareProvider {
    client: Client,
    /// zone name -> zone id
    zone_ids: Mutex<HashMap<String, String>>,
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider with the given credentials
    pub fn new(credentials: CloudflareCredentials) -> Result<Self, DnsError> {
        let cf_credentials = match credentials {
            CloudflareCredentials::ApiToken(token) => Credentials::UserAuthToken { token },
            CloudflareCredentials::ApiKey { email, key } => Credentials::UserAuthKey { email, key },
        };

        let client = Client::new(
            cf_credentials,
            ClientConfig::default(),
            Environment::Production,
        )
        .map_err(|e| DnsError::InvalidCredentials(format!("Failed to create client: {:?}", e)))?;

        Ok(Self {
            client,
            zone_ids: Mutex::new(HashMap::new()),
        })
    }

    /// Candidate zone names for a record name, longest first.
    ///
    /// `_dnsauth.static.example.com` yields `_dnsauth.static.example.com`,
    /// `static.example.com` and `example.com`. The bare TLD is never tried.
    fn zone_candidates(name: &str) -> Vec<String> {
        let labels: Vec<&str> = un_fqdn(name).split('.').filter(|l| !l.is_empty()).collect();
        if labels.len() < 2 {
            return labels.iter().map(|l| l.to_string()).collect();
        }
        (0..labels.len() - 1)
            .map(|start| labels[start..].join("."))
            .collect()
    }

    fn cached_zone(&self, candidates: &[String]) -> Option<String> {
        let cache = self.zone_ids.lock().ok()?;
        candidates.iter().find_map(|zone| cache.get(zone).cloned())
    }

    /// Get zone ID for the zone that contains `name`
    async fn get_zone_id(&self, name: &str) -> Result<String, DnsError> {
        let candidates = Self::zone_candidates(name);
        if let Some(zone_id) = self.cached_zone(&candidates) {
            return Ok(zone_id);
        }

        for zone_name in &candidates {
            debug!("Looking up Cloudflare zone {}", zone_name);

            let endpoint = zones::zone::ListZones {
                params: zones::zone::ListZonesParams {
                    name: Some(zone_name.clone()),
                    ..Default::default()
                },
            };

            let response = self
                .client
                .request(&endpoint)
                .await
                .map_err(|e| DnsError::ApiError(format!("Failed to list zones: {:?}", e)))?;

            if let Some(zone) = response.result.first() {
                if let Ok(mut cache) = self.zone_ids.lock() {
                    cache.insert(zone_name.clone(), zone.id.clone());
                }
                return Ok(zone.id.clone());
            }
        }

        Err(DnsError::ZoneNotFound(name.to_string()))
    }

    /// Record type filter for the Cloudflare list endpoint
    fn record_type_to_cf_content(record_type: DnsRecordType) -> dns::dns::DnsContent {
        match record_type {
            DnsRecordType::A => dns::dns::DnsContent::A {
                content: std::net::Ipv4Addr::new(0, 0, 0, 0),
            },
            DnsRecordType::AAAA => dns::dns::DnsContent::AAAA {
                content: std::net::Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 0),
            },
            DnsRecordType::CNAME => dns::dns::DnsContent::CNAME {
                content: String::new(),
            },
            DnsRecordType::TXT => dns::dns::DnsContent::TXT {
                content: String::new(),
            },
        }
    }

    /// Build the Cloudflare content for a record value
    fn to_cf_content(record_type: DnsRecordType, value: &str) -> Result<dns::dns::DnsContent, DnsError> {
        match record_type {
            DnsRecordType::A => {
                let ip: std::net::Ipv4Addr = value.parse().map_err(|e| {
                    DnsError::Validation(format!("Invalid IPv4 address '{}': {}", value, e))
                })?;
                Ok(dns::dns::DnsContent::A { content: ip })
            }
            DnsRecordType::AAAA => {
                let ip: std::net::Ipv6Addr = value.parse().map_err(|e| {
                    DnsError::Validation(format!("Invalid IPv6 address '{}': {}", value, e))
                })?;
                Ok(dns::dns::DnsContent::AAAA { content: ip })
            }
            DnsRecordType::CNAME => Ok(dns::dns::DnsContent::CNAME {
                content: un_fqdn(value).to_string(),
            }),
            DnsRecordType::TXT => Ok(dns::dns::DnsContent::TXT {
                content: value.to_string(),
            }),
        }
    }

    /// Extract the value of a Cloudflare record as text
    fn content_value(content: &dns::dns::DnsContent) -> Option<String> {
        match content {
            dns::dns::DnsContent::A { content } => Some(content.to_string()),
            dns::dns::DnsContent::AAAA { content } => Some(content.to_string()),
            dns::dns::DnsContent::CNAME { content } => Some(content.clone()),
            dns::dns::DnsContent::TXT { content } => Some(content.trim_matches('"').to_string()),
            _ => None,
        }
    }

    async fn find_records(
        &self,
        zone_id: &str,
        record_type: DnsRecordType,
        name: &str,
    ) -> Result<Vec<dns::dns::DnsRecord>, DnsError> {
        let endpoint = dns::dns::ListDnsRecords {
            zone_identifier: zone_id,
            params: dns::dns::ListDnsRecordsParams {
                name: Some(un_fqdn(name).to_string()),
                record_type: Some(Self::record_type_to_cf_content(record_type)),
                ..Default::default()
            },
        };

        let response = self
            .client
            .request(&endpoint)
            .await
            .map_err(|e| DnsError::ApiError(format!("Failed to list records: {:?}", e)))?;

        Ok(response.result)
    }
}

#[async_trait]
impl DnsRecordStore for CloudflareProvider {
    fn provider_name(&self) -> &str {
        "cloudflare"
    }

    async fn exists_record(
        &self,
        record_type: DnsRecordType,
        name: &str,
    ) -> Result<Option<String>, DnsError> {
        let zone_id = self.get_zone_id(name).await?;
        let records = self.find_records(&zone_id, record_type, name).await?;

        Ok(records
            .iter()
            .find_map(|record| Self::content_value(&record.content)))
    }

    async fn create_record(
        &self,
        record_type: DnsRecordType,
        name: &str,
        value: &str,
    ) -> Result<(), DnsError> {
        let zone_id = self.get_zone_id(name).await?;
        let record_name = un_fqdn(name);

        let params = dns::dns::CreateDnsRecordParams {
            name: record_name,
            content: Self::to_cf_content(record_type, value)?,
            ttl: Some(RECORD_TTL),
            priority: None,
            proxied: Some(false),
        };

        let endpoint = dns::dns::CreateDnsRecord {
            zone_identifier: &zone_id,
            params,
        };

        self.client
            .request(&endpoint)
            .await
            .map_err(|e| DnsError::ApiError(format!("Failed to create record: {:?}", e)))?;

        info!("Created {} record {} -> {}", record_type, record_name, value);
        Ok(())
    }

    async fn delete_record(&self, record_type: DnsRecordType, name: &str) -> Result<(), DnsError> {
        let zone_id = self.get_zone_id(name).await?;
        let records = self.find_records(&zone_id, record_type, name).await?;

        for record in records {
            let endpoint = dns::dns::DeleteDnsRecord {
                zone_identifier: &zone_id,
                identifier: &record.id,
            };

            self.client
                .request(&endpoint)
                .await
                .map_err(|e| DnsError::ApiError(format!("Failed to delete record: {:?}", e)))?;

            info!("Deleted {} record {} ({})", record_type, record.name, record.id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Zone lookup tests ====================

    #[test]
    fn test_zone_candidates() {
        assert_eq!(
            CloudflareProvider::zone_candidates("_dnsauth.static.example.com."),
            vec![
                "_dnsauth.static.example.com".to_string(),
                "static.example.com".to_string(),
                "example.com".to_string(),
            ]
        );
    }

    #[test]
    fn test_zone_candidates_apex() {
        assert_eq!(
            CloudflareProvider::zone_candidates("example.com"),
            vec!["example.com".to_string()]
        );
    }

    #[test]
    fn test_zone_candidates_single_label() {
        assert_eq!(
            CloudflareProvider::zone_candidates("localhost"),
            vec!["localhost".to_string()]
        );
    }

    // ==================== Content conversion tests ====================

    #[test]
    fn test_record_type_to_cf_content() {
        let content = CloudflareProvider::record_type_to_cf_content(DnsRecordType::A);
        assert!(matches!(content, dns::dns::DnsContent::A { .. }));

        let content = CloudflareProvider::record_type_to_cf_content(DnsRecordType::AAAA);
        assert!(matches!(content, dns::dns::DnsContent::AAAA { .. }));

        let content = CloudflareProvider::record_type_to_cf_content(DnsRecordType::CNAME);
        assert!(matches!(content, dns::dns::DnsContent::CNAME { .. }));

        let content = CloudflareProvider::record_type_to_cf_content(DnsRecordType::TXT);
        assert!(matches!(content, dns::dns::DnsContent::TXT { .. }));
    }

    #[test]
    fn test_to_cf_content_cname_strips_root_dot() {
        let content =
            CloudflareProvider::to_cf_content(DnsRecordType::CNAME, "cdn.example.com.a.bdydns.com.")
                .unwrap();
        match content {
            dns::dns::DnsContent::CNAME { content } => {
                assert_eq!(content, "cdn.example.com.a.bdydns.com");
            }
            _ => panic!("Expected CNAME content"),
        }
    }

    #[test]
    fn test_to_cf_content_invalid_ip() {
        let result = CloudflareProvider::to_cf_content(DnsRecordType::A, "not-an-ip");
        assert!(matches!(result.unwrap_err(), DnsError::Validation(_)));

        let result = CloudflareProvider::to_cf_content(DnsRecordType::AAAA, "1.2.3.4");
        assert!(matches!(result.unwrap_err(), DnsError::Validation(_)));
    }

    #[test]
    fn test_content_value() {
        let txt = dns::dns::DnsContent::TXT {
            content: "\"token-value\"".to_string(),
        };
        assert_eq!(
            CloudflareProvider::content_value(&txt),
            Some("token-value".to_string())
        );

        let a = dns::dns::DnsContent::A {
            content: std::net::Ipv4Addr::new(1, 2, 3, 4),
        };
        assert_eq!(
            CloudflareProvider::content_value(&a),
            Some("1.2.3.4".to_string())
        );
    }

    #[test]
    fn test_provider_creation_with_token() {
        let provider =
            CloudflareProvider::new(CloudflareCredentials::ApiToken("test-token".to_string()));
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().provider_name(), "cloudflare");
    }
}
