use certsync_tls::{
    CertificateMap, CertificateRecord, CertificateStore, IssuedCertificate, RENEWAL_THRESHOLD_DAYS,
};
use chrono::{Duration, Utc};
use rcgen::{CertificateParams, DnType, KeyPair};

fn issue(domain: &str, valid_days: i64) -> IssuedCertificate {
    let mut params = CertificateParams::new(vec![domain.to_string()]).unwrap();
    params
        .distinguished_name
        .push(DnType::CommonName, domain.to_string());
    let now = time::OffsetDateTime::now_utc();
    params.not_before = now - time::Duration::days(1);
    params.not_after = now + time::Duration::days(valid_days);

    let key = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    IssuedCertificate {
        certificate_pem: cert.pem(),
        private_key_pem: key.serialize_pem(),
    }
}

#[test]
fn test_issued_certificate_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("certs").join("certificates.json");

    let record = CertificateRecord::from_issued("example.com", issue("example.com", 20)).unwrap();
    let mut certificates = CertificateMap::new();
    certificates.insert("example.com".to_string(), record.clone());
    CertificateStore::new(&path).save(&certificates).unwrap();

    let reloaded = CertificateStore::new(&path).load().unwrap();
    let stored = &reloaded["example.com"];
    assert_eq!(stored, &record);
    assert!(stored.certificate.starts_with("-----BEGIN CERTIFICATE-----"));

    let now = Utc::now();
    assert!(!CertificateStore::needs_renewal(Some(stored), now));
    // Six days later only 14 days of validity remain
    assert!(CertificateStore::needs_renewal(
        Some(stored),
        now + Duration::days(20 - RENEWAL_THRESHOLD_DAYS)
    ));
}

#[test]
fn test_deleting_the_store_forces_reissuance() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("certificates.json");

    let mut certificates = CertificateMap::new();
    certificates.insert(
        "example.com".to_string(),
        CertificateRecord::from_issued("example.com", issue("example.com", 90)).unwrap(),
    );
    let store = CertificateStore::new(&path);
    store.save(&certificates).unwrap();
    std::fs::remove_file(&path).unwrap();

    let reloaded = store.load().unwrap();
    assert!(CertificateStore::needs_renewal(
        reloaded.get("example.com"),
        Utc::now()
    ));
}
