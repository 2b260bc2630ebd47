//! Desired-state aggregate and the contracts every entity implements.
//!
//! `Config` holds ordered collections of every managed resource kind. Names
//! are the identity key within a kind; lookups return name-keyed maps in
//! lexical order so that everything derived from them is deterministic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::dns::{Certificate, DnsRecord, Domain};
use super::infra::{Gateway, InfraService};
use super::inventory::{Isp, Registry, Secret, Zone};
use super::server::Server;
use super::service::BizService;
use super::settings::EngineSettings;

/// The desired-state aggregate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Optional engine settings embedded in the configuration.
    #[serde(default)]
    pub settings: Option<EngineSettings>,
    /// Named secrets.
    #[serde(default)]
    pub secrets: Vec<Secret>,
    /// Cloud ISPs.
    #[serde(default)]
    pub isps: Vec<Isp>,
    /// Container registries.
    #[serde(default)]
    pub registries: Vec<Registry>,
    /// Zones (regions / network groups).
    #[serde(default)]
    pub zones: Vec<Zone>,
    /// Servers.
    #[serde(default)]
    pub servers: Vec<Server>,
    /// Platform services (gateway, ssl).
    #[serde(default)]
    pub infra_services: Vec<InfraService>,
    /// Standalone gateways.
    #[serde(default)]
    pub gateways: Vec<Gateway>,
    /// Business services.
    #[serde(default)]
    pub services: Vec<BizService>,
    /// DNS domains with their records.
    #[serde(default)]
    pub domains: Vec<Domain>,
    /// TLS certificates.
    #[serde(default)]
    pub certificates: Vec<Certificate>,
}

/// A structural validation failure inside one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Field (or field with value) that failed.
    pub field: String,
    /// Why it failed.
    pub message: String,
}

/// Structural validation of a single entity.
///
/// Validation stops at the first failing field. Cross-entity references are
/// not checked here; see [`crate::config::ConfigValidator`].
pub trait Validate {
    /// Validates the entity.
    ///
    /// # Errors
    ///
    /// Returns the first failing field.
    fn validate(&self) -> Result<(), FieldError>;
}

/// An entity identified by name within its kind.
pub trait Named {
    /// Returns the entity name.
    fn name(&self) -> &str;
}

/// An entity deployed onto exactly one server.
pub trait ServerBound: Named {
    /// Returns the owning server name.
    fn server(&self) -> &str;
}

/// A DNS record denormalized with its owning domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlatRecord {
    /// Owning domain name.
    pub domain: String,
    /// The record.
    pub record: DnsRecord,
}

impl FieldError {
    /// Creates a field error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Prefixes the field with a parent path, e.g. `ports[1]`.
    #[must_use]
    pub fn within(self, parent: &str) -> Self {
        Self {
            field: format!("{parent}.{}", self.field),
            message: self.message,
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for FieldError {}

/// Builds a name-keyed index; later duplicates win.
fn index<T: Named>(items: &[T]) -> BTreeMap<&str, &T> {
    items.iter().map(|item| (item.name(), item)).collect()
}

impl Config {
    /// Name-keyed secrets.
    #[must_use]
    pub fn secret_map(&self) -> BTreeMap<&str, &Secret> {
        index(&self.secrets)
    }

    /// Name-keyed ISPs.
    #[must_use]
    pub fn isp_map(&self) -> BTreeMap<&str, &Isp> {
        index(&self.isps)
    }

    /// Name-keyed registries.
    #[must_use]
    pub fn registry_map(&self) -> BTreeMap<&str, &Registry> {
        index(&self.registries)
    }

    /// Name-keyed zones.
    #[must_use]
    pub fn zone_map(&self) -> BTreeMap<&str, &Zone> {
        index(&self.zones)
    }

    /// Name-keyed servers.
    #[must_use]
    pub fn server_map(&self) -> BTreeMap<&str, &Server> {
        index(&self.servers)
    }

    /// Name-keyed infra services.
    #[must_use]
    pub fn infra_service_map(&self) -> BTreeMap<&str, &InfraService> {
        index(&self.infra_services)
    }

    /// Name-keyed gateways.
    #[must_use]
    pub fn gateway_map(&self) -> BTreeMap<&str, &Gateway> {
        index(&self.gateways)
    }

    /// Name-keyed business services.
    #[must_use]
    pub fn service_map(&self) -> BTreeMap<&str, &BizService> {
        index(&self.services)
    }

    /// Name-keyed domains.
    #[must_use]
    pub fn domain_map(&self) -> BTreeMap<&str, &Domain> {
        index(&self.domains)
    }

    /// Name-keyed certificates.
    #[must_use]
    pub fn certificate_map(&self) -> BTreeMap<&str, &Certificate> {
        index(&self.certificates)
    }

    /// Looks up a server by name.
    #[must_use]
    pub fn server(&self, name: &str) -> Option<&Server> {
        self.servers.iter().rev().find(|s| s.name == name)
    }

    /// Looks up a domain by name.
    #[must_use]
    pub fn domain(&self, name: &str) -> Option<&Domain> {
        self.domains.iter().rev().find(|d| d.name == name)
    }

    /// Looks up a registry by name.
    #[must_use]
    pub fn registry(&self, name: &str) -> Option<&Registry> {
        self.registries.iter().rev().find(|r| r.name == name)
    }

    /// Returns the zone a server belongs to, if the server exists.
    #[must_use]
    pub fn zone_of_server(&self, server: &str) -> Option<&str> {
        self.server(server).map(|s| s.zone.as_str())
    }

    /// Denormalizes every domain's records into one list tagged with the domain.
    #[must_use]
    pub fn flatten_records(&self) -> Vec<FlatRecord> {
        self.domains
            .iter()
            .flat_map(|domain| {
                domain.records.iter().map(|record| FlatRecord {
                    domain: domain.name.clone(),
                    record: record.clone(),
                })
            })
            .collect()
    }

    /// Appends every collection of `other` to this configuration.
    ///
    /// Settings from `other` replace existing settings when present.
    pub fn merge(&mut self, other: Self) {
        if other.settings.is_some() {
            self.settings = other.settings;
        }
        self.secrets.extend(other.secrets);
        self.isps.extend(other.isps);
        self.registries.extend(other.registries);
        self.zones.extend(other.zones);
        self.servers.extend(other.servers);
        self.infra_services.extend(other.infra_services);
        self.gateways.extend(other.gateways);
        self.services.extend(other.services);
        self.domains.extend(other.domains);
        self.certificates.extend(other.certificates);
    }

    /// Returns the number of entities per kind, in planning order.
    #[must_use]
    pub fn entity_counts(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("isps", self.isps.len()),
            ("zones", self.zones.len()),
            ("domains", self.domains.len()),
            ("dns_records", self.domains.iter().map(|d| d.records.len()).sum()),
            ("certificates", self.certificates.len()),
            ("registries", self.registries.len()),
            ("servers", self.servers.len()),
            ("services", self.services.len()),
            ("infra_services", self.infra_services.len()),
            ("gateways", self.gateways.len()),
            ("secrets", self.secrets.len()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::dns::RecordType;

    fn record(name: &str, value: &str) -> DnsRecord {
        DnsRecord {
            record_type: RecordType::A,
            name: name.to_string(),
            value: value.to_string(),
            ttl: 600,
        }
    }

    #[test]
    fn test_flatten_records_tags_domain() {
        let config = Config {
            domains: vec![
                Domain {
                    name: String::from("example.com"),
                    dns_isp: String::from("cf"),
                    records: vec![record("@", "1.2.3.4"), record("www", "1.2.3.4")],
                },
                Domain {
                    name: String::from("example.org"),
                    dns_isp: String::from("cf"),
                    records: vec![record("api", "5.6.7.8")],
                },
            ],
            ..Config::default()
        };

        let flat = config.flatten_records();
        assert_eq!(flat.len(), 3);
        assert_eq!(flat[0].domain, "example.com");
        assert_eq!(flat[2].domain, "example.org");
        assert_eq!(flat[2].record.name, "api");
    }

    #[test]
    fn test_lookup_maps_are_sorted_and_last_wins() {
        let config = Config {
            domains: vec![
                Domain {
                    name: String::from("b.com"),
                    dns_isp: String::from("first"),
                    records: vec![],
                },
                Domain {
                    name: String::from("a.com"),
                    dns_isp: String::from("cf"),
                    records: vec![],
                },
                Domain {
                    name: String::from("b.com"),
                    dns_isp: String::from("second"),
                    records: vec![],
                },
            ],
            ..Config::default()
        };

        let map = config.domain_map();
        let keys: Vec<_> = map.keys().copied().collect();
        assert_eq!(keys, vec!["a.com", "b.com"]);
        assert_eq!(map["b.com"].dns_isp, "second");
        assert_eq!(config.domain("b.com").map(|d| d.dns_isp.as_str()), Some("second"));
    }

    #[test]
    fn test_field_error_display() {
        let err = FieldError::new("port 0", "invalid port").within("ports[1]");
        assert_eq!(err.to_string(), "ports[1].port 0: invalid port");
    }
}
