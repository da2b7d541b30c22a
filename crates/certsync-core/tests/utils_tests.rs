use certsync_core::utils::{mask_sensitive, same_dns_name, to_fqdn, un_fqdn};

#[test]
fn test_fqdn_helpers_round_trip() {
    assert_eq!(un_fqdn(&to_fqdn("cdn.example.com")), "cdn.example.com");
}

#[test]
fn test_same_dns_name_ignores_trailing_dot_and_case() {
    assert!(same_dns_name("cdn.example.com.", "CDN.example.com"));
    assert!(same_dns_name("old.example.com", "old.example.com."));
    assert!(!same_dns_name("old.example.com.", "new.example.com."));
}

#[test]
fn test_mask_sensitive() {
    assert_eq!(mask_sensitive("short"), "***");
    assert_eq!(mask_sensitive("1234567890"), "1234***7890");
    assert_eq!(mask_sensitive(""), "***");
    // Multibyte characters are kept whole
    assert_eq!(mask_sensitive("密钥密钥abc密钥密钥"), "密钥密钥***密钥密钥");
    assert_eq!(mask_sensitive("ключ-секрет"), "ключ***крет");
    assert_eq!(mask_sensitive("日本語テキスト"), "***");
}
