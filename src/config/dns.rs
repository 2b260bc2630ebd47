//! DNS domains, records and TLS certificates.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::rules::{is_valid_domain, is_valid_ipv4, is_valid_ipv6, require, require_name};
use super::spec::{FieldError, Named, Validate};

/// A DNS zone managed through one ISP.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Domain {
    /// Domain name, e.g. `example.com`.
    pub name: String,
    /// ISP hosting the zone.
    pub dns_isp: String,
    /// Records owned by this domain.
    #[serde(default)]
    pub records: Vec<DnsRecord>,
}

/// DNS record types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    /// IPv4 address.
    A,
    /// IPv6 address.
    #[allow(clippy::upper_case_acronyms)]
    AAAA,
    /// Canonical name.
    #[allow(clippy::upper_case_acronyms)]
    CNAME,
    /// Mail exchanger.
    MX,
    /// Text.
    #[allow(clippy::upper_case_acronyms)]
    TXT,
    /// Name server.
    NS,
    /// Service locator.
    #[allow(clippy::upper_case_acronyms)]
    SRV,
    /// Certificate authority authorization.
    #[allow(clippy::upper_case_acronyms)]
    CAA,
}

/// One DNS record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DnsRecord {
    /// Record type.
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// Host label; `@` is the apex.
    pub name: String,
    /// Record value.
    pub value: String,
    /// TTL in seconds.
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

/// Certificate authority.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CertProvider {
    /// Let's Encrypt.
    #[default]
    Letsencrypt,
    /// `ZeroSSL`.
    Zerossl,
}

/// A TLS certificate obtained through DNS validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Certificate {
    /// Certificate name.
    pub name: String,
    /// Covered domain names; wildcards allowed.
    pub domains: Vec<String>,
    /// ISP answering the DNS challenge.
    pub dns_isp: String,
    /// Issuing authority.
    #[serde(default)]
    pub provider: CertProvider,
    /// Renew this many days before expiry.
    #[serde(default = "default_renew_before_days")]
    pub renew_before_days: u32,
}

const fn default_ttl() -> u32 {
    600
}

const fn default_renew_before_days() -> u32 {
    30
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::A => "A",
            Self::AAAA => "AAAA",
            Self::CNAME => "CNAME",
            Self::MX => "MX",
            Self::TXT => "TXT",
            Self::NS => "NS",
            Self::SRV => "SRV",
            Self::CAA => "CAA",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for CertProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Letsencrypt => write!(f, "letsencrypt"),
            Self::Zerossl => write!(f, "zerossl"),
        }
    }
}

impl DnsRecord {
    /// Fully qualified host name under `domain`.
    #[must_use]
    pub fn fqdn(&self, domain: &str) -> String {
        if self.name == "@" {
            domain.to_string()
        } else {
            format!("{}.{domain}", self.name)
        }
    }

    /// Returns true when value and TTL agree with `other`.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.value == other.value && self.ttl == other.ttl
    }
}

impl Named for Domain {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Certificate {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Validate for Domain {
    fn validate(&self) -> Result<(), FieldError> {
        require("name", &self.name)?;
        if !is_valid_domain(&self.name) || self.name.starts_with("*.") {
            return Err(FieldError::new(
                "name",
                format!("'{}' is not a valid domain name", self.name),
            ));
        }
        require("dns_isp", &self.dns_isp)?;
        for (i, record) in self.records.iter().enumerate() {
            record
                .validate()
                .map_err(|e| e.within(&format!("records[{i}]")))?;
        }
        Ok(())
    }
}

impl Validate for DnsRecord {
    fn validate(&self) -> Result<(), FieldError> {
        require("name", &self.name)?;
        require("value", &self.value)?;
        if self.ttl == 0 {
            return Err(FieldError::new("ttl", "must be positive"));
        }
        let host_value = self.value.trim_end_matches('.');
        let ok = match self.record_type {
            RecordType::A => is_valid_ipv4(&self.value),
            RecordType::AAAA => is_valid_ipv6(&self.value),
            RecordType::CNAME | RecordType::NS => is_valid_domain(host_value),
            RecordType::MX => {
                // Either a bare host or "priority host".
                let host = host_value.rsplit(' ').next().unwrap_or(host_value);
                is_valid_domain(host)
            }
            RecordType::TXT | RecordType::SRV | RecordType::CAA => true,
        };
        if !ok {
            return Err(FieldError::new(
                "value",
                format!("'{}' is not valid for a {} record", self.value, self.record_type),
            ));
        }
        Ok(())
    }
}

impl Validate for Certificate {
    fn validate(&self) -> Result<(), FieldError> {
        require_name(&self.name)?;
        if self.domains.is_empty() {
            return Err(FieldError::new("domains", "at least one domain is required"));
        }
        for (i, domain) in self.domains.iter().enumerate() {
            if !is_valid_domain(domain) {
                return Err(FieldError::new(
                    format!("domains[{i}]"),
                    format!("'{domain}' is not a valid domain name"),
                ));
            }
        }
        require("dns_isp", &self.dns_isp)?;
        if self.renew_before_days == 0 {
            return Err(FieldError::new("renew_before_days", "must be positive"));
        }
        Ok(())
    }
}
