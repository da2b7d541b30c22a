//! Common utility functions

/// Append the root label to a DNS name (`example.com` -> `example.com.`).
pub fn to_fqdn(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{}.", name)
    }
}

/// Strip a single trailing root label (`example.com.` -> `example.com`).
pub fn un_fqdn(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}

/// Compare two DNS names ignoring the trailing dot and ASCII case.
pub fn same_dns_name(a: &str, b: &str) -> bool {
    un_fqdn(a.trim()).eq_ignore_ascii_case(un_fqdn(b.trim()))
}

/// Mask sensitive data for logging
pub fn mask_sensitive(data: &str) -> String {
    let chars = data.chars().count();
    if chars <= 8 {
        return "***".to_string();
    }
    let head: String = data.chars().take(4).collect();
    let tail: String = data.chars().skip(chars - 4).collect();
    format!("{}***{}", head, tail)
}
