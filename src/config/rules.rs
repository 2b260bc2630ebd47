//! Field-level rules shared by the entity validators.

use regex::Regex;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::LazyLock;

use super::spec::FieldError;

/// Domain names: dot-separated labels, optional single leading `*.` label.
static DOMAIN_RE: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(
        r"^(\*\.)?([a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,63}$",
    )
});

/// Memory sizes in compose notation: `512m`, `1g`, `1.5G`, `2048`.
static MEMORY_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[0-9]+(\.[0-9]+)?[bkmgBKMG]?$"));

fn matches(re: &LazyLock<Result<Regex, regex::Error>>, value: &str) -> bool {
    re.as_ref().is_ok_and(|re| re.is_match(value))
}

/// Returns true if the name is usable as a resource identifier.
///
/// Names become part of compose project names, so they must be lowercase
/// alphanumerics with `-` or `_`, starting with an alphanumeric.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
        return false;
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

/// Returns true for a fully qualified domain name, allowing one leading wildcard label.
#[must_use]
pub fn is_valid_domain(name: &str) -> bool {
    name.len() <= 253 && matches(&DOMAIN_RE, name)
}

/// Returns true for a compose memory size.
#[must_use]
pub fn is_valid_memory(value: &str) -> bool {
    matches(&MEMORY_RE, value)
}

/// Returns true for an IPv4 or IPv6 literal.
#[must_use]
pub fn is_valid_ip(value: &str) -> bool {
    value.parse::<IpAddr>().is_ok()
}

/// Returns true for an IPv4 literal.
#[must_use]
pub fn is_valid_ipv4(value: &str) -> bool {
    value.parse::<Ipv4Addr>().is_ok()
}

/// Returns true for an IPv6 literal.
#[must_use]
pub fn is_valid_ipv6(value: &str) -> bool {
    value.parse::<Ipv6Addr>().is_ok()
}

/// Returns true for a CIDR block or a bare address.
#[must_use]
pub fn is_valid_cidr(value: &str) -> bool {
    let Some((addr, prefix)) = value.split_once('/') else {
        return is_valid_ip(value);
    };
    let Ok(prefix) = prefix.parse::<u8>() else {
        return false;
    };
    match addr.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => prefix <= 32,
        Ok(IpAddr::V6(_)) => prefix <= 128,
        Err(_) => false,
    }
}

/// Fails when a required string field is blank.
///
/// # Errors
///
/// Returns a field error naming the empty field.
pub fn require(field: &str, value: &str) -> Result<(), FieldError> {
    if value.trim().is_empty() {
        return Err(FieldError::new(field, "is required"));
    }
    Ok(())
}

/// Fails when the name is blank or malformed.
///
/// # Errors
///
/// Returns a field error on the `name` field.
pub fn require_name(name: &str) -> Result<(), FieldError> {
    require("name", name)?;
    if !is_valid_name(name) {
        return Err(FieldError::new(
            "name",
            format!("'{name}' must be lowercase alphanumeric with '-' or '_'"),
        ));
    }
    Ok(())
}

/// Fails when the port is outside 1-65535.
///
/// # Errors
///
/// Returns `port N: invalid port`.
pub fn require_port(port: u16) -> Result<(), FieldError> {
    if port == 0 {
        return Err(FieldError::new(format!("port {port}"), "invalid port"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("api"));
        assert!(is_valid_name("api-v2"));
        assert!(is_valid_name("1panel"));
        assert!(is_valid_name("cert_proxy"));
    }

    #[test]
    fn test_invalid_name() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Api"));
        assert!(!is_valid_name("-api"));
        assert!(!is_valid_name("api.v2"));
        assert!(!is_valid_name("api v2"));
    }

    #[test]
    fn test_domain_names() {
        assert!(is_valid_domain("example.com"));
        assert!(is_valid_domain("api.example.co.uk"));
        assert!(is_valid_domain("*.example.com"));
        assert!(!is_valid_domain("*.*.example.com"));
        assert!(!is_valid_domain("api.*.example.com"));
        assert!(!is_valid_domain("example"));
        assert!(!is_valid_domain("-bad.example.com"));
        assert!(!is_valid_domain(""));
    }

    #[test]
    fn test_cidr() {
        assert!(is_valid_cidr("10.0.0.0/8"));
        assert!(is_valid_cidr("192.168.1.10"));
        assert!(is_valid_cidr("2001:db8::/32"));
        assert!(!is_valid_cidr("10.0.0.0/33"));
        assert!(!is_valid_cidr("10.0.0/8"));
        assert!(!is_valid_cidr("10.0.0.0/x"));
    }

    #[test]
    fn test_memory() {
        assert!(is_valid_memory("512m"));
        assert!(is_valid_memory("1.5G"));
        assert!(is_valid_memory("2048"));
        assert!(!is_valid_memory("lots"));
        assert!(!is_valid_memory("1gb"));
    }

    #[test]
    fn test_port_zero_is_invalid() {
        let err = require_port(0).unwrap_err();
        assert_eq!(err.to_string(), "port 0: invalid port");
        assert!(require_port(65535).is_ok());
    }
}
