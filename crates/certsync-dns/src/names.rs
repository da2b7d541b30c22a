//! Well-known control record names

use certsync_core::un_fqdn;

/// Label prefix of ACME DNS-01 challenge records
pub const ACME_CHALLENGE_LABEL: &str = "_acme-challenge";

/// Label prefix of object-storage ownership-proof records
pub const OWNERSHIP_LABEL: &str = "_dnsauth";

/// `_acme-challenge.<domain>`; a wildcard prefix is dropped.
pub fn challenge_record_name(domain: &str) -> String {
    let domain = un_fqdn(domain);
    let domain = domain.strip_prefix("*.").unwrap_or(domain);
    format!("{}.{}", ACME_CHALLENGE_LABEL, domain)
}

/// `_dnsauth.<domain>`
pub fn ownership_record_name(domain: &str) -> String {
    format!("{}.{}", OWNERSHIP_LABEL, un_fqdn(domain))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_record_name() {
        assert_eq!(
            challenge_record_name("example.com"),
            "_acme-challenge.example.com"
        );
        assert_eq!(
            challenge_record_name("*.example.com."),
            "_acme-challenge.example.com"
        );
    }

    #[test]
    fn test_ownership_record_name() {
        assert_eq!(
            ownership_record_name("static.example.com."),
            "_dnsauth.static.example.com"
        );
    }
}
