use certsync_core::UtcDateTime;
use chrono::{Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::InvalidCertificate;

/// A certificate is renewed once it has this many days of validity left, or less.
pub const RENEWAL_THRESHOLD_DAYS: i64 = 14;

pub fn renewal_threshold() -> Duration {
    Duration::days(RENEWAL_THRESHOLD_DAYS)
}

/// PEM material handed back by a certificate authority
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub certificate_pem: String,
    pub private_key_pem: String,
}

impl std::fmt::Debug for IssuedCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCertificate")
            .field("certificate_pem", &format!("{} bytes", self.certificate_pem.len()))
            .field("private_key_pem", &"***")
            .finish()
    }
}

/// Last issued certificate of a domain, as persisted in the certificate store
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub domain: String,
    pub certificate: String,
    pub private_key: String,
    pub expires_at: UtcDateTime,
}

impl CertificateRecord {
    /// Build a record from freshly issued material. The expiry always comes
    /// from the certificate's NotAfter.
    pub fn from_issued(domain: &str, issued: IssuedCertificate) -> Result<Self, InvalidCertificate> {
        let expires_at = parse_not_after(&issued.certificate_pem)?;
        Ok(Self {
            domain: domain.to_string(),
            certificate: issued.certificate_pem,
            private_key: issued.private_key_pem,
            expires_at,
        })
    }

    /// True iff `expires_at - now <= 14 days`
    pub fn needs_renewal(&self, now: UtcDateTime) -> bool {
        self.expires_at - now <= renewal_threshold()
    }

    pub fn days_until_expiry(&self, now: UtcDateTime) -> i64 {
        (self.expires_at - now).num_days()
    }

    pub fn is_expired(&self, now: UtcDateTime) -> bool {
        self.expires_at <= now
    }
}

impl std::fmt::Debug for CertificateRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateRecord")
            .field("domain", &self.domain)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

fn parse_leaf<T>(
    pem: &str,
    read: impl FnOnce(&x509_parser::certificate::X509Certificate<'_>) -> T,
) -> Result<T, InvalidCertificate> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(pem.as_bytes())
        .map_err(|e| InvalidCertificate(format!("Failed to parse PEM: {}", e)))?;

    let x509 = pem
        .parse_x509()
        .map_err(|e| InvalidCertificate(format!("Failed to parse X509: {}", e)))?;

    Ok(read(&x509))
}

/// NotAfter of the leaf certificate of a PEM chain
pub fn parse_not_after(pem: &str) -> Result<UtcDateTime, InvalidCertificate> {
    let timestamp = parse_leaf(pem, |x509| x509.validity().not_after.timestamp())?;

    Utc.timestamp_opt(timestamp, 0)
        .single()
        .ok_or_else(|| InvalidCertificate("Invalid expiration timestamp".to_string()))
}

/// Subject common name of the leaf certificate, if it has one
pub fn parse_common_name(pem: &str) -> Result<Option<String>, InvalidCertificate> {
    parse_leaf(pem, |x509| {
        x509.subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(|cn| cn.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::self_signed_certificate;

    fn record_expiring_in(duration: Duration, now: UtcDateTime) -> CertificateRecord {
        CertificateRecord {
            domain: "example.com".to_string(),
            certificate: String::new(),
            private_key: String::new(),
            expires_at: now + duration,
        }
    }

    #[test]
    fn test_renewal_threshold_boundaries() {
        let now = Utc::now();

        assert!(!record_expiring_in(Duration::days(14) + Duration::seconds(1), now)
            .needs_renewal(now));
        assert!(record_expiring_in(Duration::days(14), now).needs_renewal(now));
        assert!(record_expiring_in(Duration::days(13), now).needs_renewal(now));
        assert!(record_expiring_in(Duration::days(-1), now).needs_renewal(now));
        assert!(!record_expiring_in(Duration::days(60), now).needs_renewal(now));
    }

    #[test]
    fn test_from_issued_parses_not_after() {
        let not_after = Utc.with_ymd_and_hms(2031, 3, 4, 5, 6, 7).unwrap();
        let issued = self_signed_certificate("example.com", not_after).unwrap();

        let record = CertificateRecord::from_issued("example.com", issued).unwrap();
        assert_eq!(record.expires_at, not_after);
        assert_eq!(record.domain, "example.com");
    }

    #[test]
    fn test_parse_common_name() {
        let issued = self_signed_certificate("cdn.example.com", Utc::now() + Duration::days(90))
            .unwrap();
        assert_eq!(
            parse_common_name(&issued.certificate_pem).unwrap(),
            Some("cdn.example.com".to_string())
        );
    }

    #[test]
    fn test_invalid_pem_is_rejected() {
        let issued = IssuedCertificate {
            certificate_pem: "not a certificate".to_string(),
            private_key_pem: String::new(),
        };
        assert!(CertificateRecord::from_issued("example.com", issued).is_err());
    }

    #[test]
    fn test_debug_hides_key_material() {
        let record = CertificateRecord {
            domain: "example.com".to_string(),
            certificate: "CERT".to_string(),
            private_key: "SECRET KEY".to_string(),
            expires_at: Utc::now(),
        };
        assert!(!format!("{:?}", record).contains("SECRET"));
    }
}
