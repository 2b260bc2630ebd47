//! Whole-configuration validation.
//!
//! Per-entity structural checks run first, then the passes that need the
//! entire configuration: name uniqueness, cross-entity references, and
//! port, hostname and DNS conflicts. Any error rejects the whole run.

use crate::error::{ConfigError, Result};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, warn};

use super::dns::RecordType;
use super::inventory::SecretValue;
use super::service::Protocol;
use super::spec::{Config, Named, Validate};

/// Validator for the desired-state configuration.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all problems found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Fatal problems, in discovery order.
    pub errors: Vec<ConfigError>,
    /// Non-fatal issues.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if no errors were found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a configuration, failing on the first error found.
    ///
    /// # Errors
    ///
    /// Returns the first failing entity's error.
    pub fn validate(&self, config: &Config) -> Result<ValidationResult> {
        let mut result = self.check(config);

        for warning in &result.warnings {
            warn!("{warning}");
        }

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            Err(result.errors.swap_remove(0).into())
        }
    }

    /// Runs every pass and collects all problems without failing.
    #[must_use]
    pub fn check(&self, config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        if let Some(settings) = &config.settings
            && let Err(e) = settings.validate()
        {
            result.errors.push(ConfigError::invalid("settings", e.to_string()));
        }

        structural("secrets", &config.secrets, &mut result);
        structural("isps", &config.isps, &mut result);
        structural("registries", &config.registries, &mut result);
        structural("zones", &config.zones, &mut result);
        structural("servers", &config.servers, &mut result);
        structural("infra_services", &config.infra_services, &mut result);
        structural("gateways", &config.gateways, &mut result);
        structural("services", &config.services, &mut result);
        structural("domains", &config.domains, &mut result);
        structural("certificates", &config.certificates, &mut result);

        duplicates("secret", &config.secrets, &mut result);
        duplicates("isp", &config.isps, &mut result);
        duplicates("registry", &config.registries, &mut result);
        duplicates("zone", &config.zones, &mut result);
        duplicates("server", &config.servers, &mut result);
        duplicates("infra_service", &config.infra_services, &mut result);
        duplicates("gateway", &config.gateways, &mut result);
        duplicates("service", &config.services, &mut result);
        duplicates("domain", &config.domains, &mut result);
        duplicates("certificate", &config.certificates, &mut result);

        Self::check_project_names(config, &mut result);
        Self::check_references(config, &mut result);
        Self::check_port_conflicts(config, &mut result);
        Self::check_hostname_conflicts(config, &mut result);
        Self::check_dns_conflicts(config, &mut result);
        Self::check_warnings(config, &mut result);

        result
    }

    /// Services, infra services and gateways share the compose project
    /// namespace `yo-{env}-{name}`, so a name may be used by one of them only.
    fn check_project_names(config: &Config, result: &mut ValidationResult) {
        let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
        let deployables = config
            .services
            .iter()
            .map(|s| ("services", "service", s.name.as_str()))
            .chain(
                config
                    .infra_services
                    .iter()
                    .map(|s| ("infra_services", "infra_service", s.name.as_str())),
            )
            .chain(
                config
                    .gateways
                    .iter()
                    .map(|g| ("gateways", "gateway", g.name.as_str())),
            );

        let mut index: BTreeMap<&str, usize> = BTreeMap::new();
        for (list, kind, name) in deployables {
            let i = index.entry(list).or_default();
            match owners.get(name) {
                Some(owner) if *owner != kind => result.errors.push(ConfigError::invalid(
                    format!("{list}[{i}]"),
                    format!("name '{name}' is already used by a {owner}"),
                )),
                Some(_) => {}
                None => {
                    owners.insert(name, kind);
                }
            }
            *i += 1;
        }
    }

    /// Checks that every reference field resolves.
    fn check_references(config: &Config, result: &mut ValidationResult) {
        let isps = config.isp_map();
        let zones = config.zone_map();
        let servers = config.server_map();
        let registries = config.registry_map();
        let secrets = config.secret_map();

        let secret_ref = |path: String, value: &SecretValue, result: &mut ValidationResult| {
            if let Some(name) = value.secret_name()
                && !secrets.contains_key(name)
            {
                result
                    .errors
                    .push(ConfigError::missing_reference(path, "secret", name));
            }
        };

        for (i, isp) in config.isps.iter().enumerate() {
            for value in isp.credentials.values() {
                secret_ref(format!("isps[{i}]"), value, result);
            }
        }
        for (i, registry) in config.registries.iter().enumerate() {
            secret_ref(format!("registries[{i}]"), &registry.password, result);
        }
        for (i, zone) in config.zones.iter().enumerate() {
            if !isps.contains_key(zone.isp.as_str()) {
                result
                    .errors
                    .push(ConfigError::missing_reference(format!("zones[{i}]"), "isp", &zone.isp));
            }
        }
        for (i, server) in config.servers.iter().enumerate() {
            let path = format!("servers[{i}]");
            if !zones.contains_key(server.zone.as_str()) {
                result
                    .errors
                    .push(ConfigError::missing_reference(&path, "zone", &server.zone));
            }
            for registry in &server.environment.registries {
                if !registries.contains_key(registry.as_str()) {
                    result
                        .errors
                        .push(ConfigError::missing_reference(&path, "registry", registry));
                }
            }
            if let Some(password) = &server.ssh.password {
                secret_ref(path, password, result);
            }
        }

        let server_ref = |path: String, server: &str, result: &mut ValidationResult| {
            if !servers.contains_key(server) {
                result
                    .errors
                    .push(ConfigError::missing_reference(path, "server", server));
            }
        };

        for (i, infra) in config.infra_services.iter().enumerate() {
            server_ref(format!("infra_services[{i}]"), &infra.server, result);
        }
        for (i, gateway) in config.gateways.iter().enumerate() {
            server_ref(format!("gateways[{i}]"), &gateway.server, result);
        }
        for (i, service) in config.services.iter().enumerate() {
            server_ref(format!("services[{i}]"), &service.server, result);
            for value in service.env.values() {
                secret_ref(format!("services[{i}]"), value, result);
            }
        }

        for (i, domain) in config.domains.iter().enumerate() {
            if !isps.contains_key(domain.dns_isp.as_str()) {
                result.errors.push(ConfigError::missing_reference(
                    format!("domains[{i}]"),
                    "isp",
                    &domain.dns_isp,
                ));
            }
        }
        for (i, cert) in config.certificates.iter().enumerate() {
            if !isps.contains_key(cert.dns_isp.as_str()) {
                result.errors.push(ConfigError::missing_reference(
                    format!("certificates[{i}]"),
                    "isp",
                    &cert.dns_isp,
                ));
            }
        }
    }

    /// Detects two deployables on one server claiming the same host port.
    fn check_port_conflicts(config: &Config, result: &mut ValidationResult) {
        let mut claims: Vec<(&str, u16, Protocol, String)> = Vec::new();
        for infra in &config.infra_services {
            for port in infra.host_ports() {
                let owner = format!("infra_service '{}'", infra.name);
                claims.push((infra.server.as_str(), port, Protocol::Tcp, owner));
            }
        }
        for gateway in &config.gateways {
            for port in gateway.spec.host_ports() {
                let owner = format!("gateway '{}'", gateway.name);
                claims.push((gateway.server.as_str(), port, Protocol::Tcp, owner));
            }
        }
        for service in &config.services {
            for mapping in &service.ports {
                let owner = format!("service '{}'", service.name);
                claims.push((service.server.as_str(), mapping.host, mapping.protocol, owner));
            }
        }

        let mut owners: BTreeMap<(&str, u16, Protocol), &str> = BTreeMap::new();
        for (server, port, protocol, owner) in &claims {
            match owners.get(&(*server, *port, *protocol)) {
                Some(first) if first != owner => {
                    result.errors.push(ConfigError::conflict(format!(
                        "port {port} on server '{server}' is claimed by {first} and {owner}"
                    )));
                }
                Some(_) => {}
                None => {
                    owners.insert((*server, *port, *protocol), owner);
                }
            }
        }
    }

    /// Detects one gateway hostname routed to two services.
    fn check_hostname_conflicts(config: &Config, result: &mut ValidationResult) {
        let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
        for service in &config.services {
            for route in &service.gateways {
                match owners.get(route.hostname.as_str()) {
                    Some(first) => {
                        result.errors.push(ConfigError::conflict(format!(
                            "hostname '{}' is routed by service '{first}' and service '{}'",
                            route.hostname, service.name
                        )));
                    }
                    None => {
                        owners.insert(&route.hostname, &service.name);
                    }
                }
            }
        }
    }

    /// Detects duplicate `(type, name)` records and CNAMEs sharing a name.
    fn check_dns_conflicts(config: &Config, result: &mut ValidationResult) {
        for domain in &config.domains {
            let mut seen: HashSet<(RecordType, &str)> = HashSet::new();
            let mut types_by_name: BTreeMap<&str, BTreeSet<RecordType>> = BTreeMap::new();

            for record in &domain.records {
                if !seen.insert((record.record_type, record.name.as_str())) {
                    result.errors.push(ConfigError::conflict(format!(
                        "{} record '{}' is defined twice in domain '{}'",
                        record.record_type, record.name, domain.name
                    )));
                }
                types_by_name
                    .entry(&record.name)
                    .or_default()
                    .insert(record.record_type);
            }

            for (name, types) in types_by_name {
                if types.contains(&RecordType::CNAME) && types.len() > 1 {
                    result.errors.push(ConfigError::conflict(format!(
                        "CNAME record '{name}' in domain '{}' shares its name with another record",
                        domain.name
                    )));
                }
            }
        }
    }

    /// Collects non-fatal findings.
    fn check_warnings(config: &Config, result: &mut ValidationResult) {
        for server in &config.servers {
            if server.ssh.password.is_none() && server.ssh.key_file.is_none() {
                result.warnings.push(format!(
                    "server '{}' has neither password nor key_file; relying on the SSH agent",
                    server.name
                ));
            }
        }

        let referenced: HashSet<&str> = config
            .isps
            .iter()
            .flat_map(|isp| isp.credentials.values())
            .chain(config.registries.iter().map(|r| &r.password))
            .chain(config.servers.iter().filter_map(|s| s.ssh.password.as_ref()))
            .chain(config.services.iter().flat_map(|s| s.env.values()))
            .filter_map(SecretValue::secret_name)
            .collect();
        for secret in &config.secrets {
            if !referenced.contains(secret.name.as_str()) {
                result
                    .warnings
                    .push(format!("secret '{}' is never referenced", secret.name));
            }
        }
    }
}

/// Runs structural validation over one collection.
fn structural<T: Validate>(kind: &str, items: &[T], result: &mut ValidationResult) {
    for (i, item) in items.iter().enumerate() {
        if let Err(e) = item.validate() {
            result
                .errors
                .push(ConfigError::invalid(format!("{kind}[{i}]"), e.to_string()));
        }
    }
}

/// Rejects names used twice within one kind.
fn duplicates<T: Named>(kind: &str, items: &[T], result: &mut ValidationResult) {
    let mut seen = HashSet::new();
    for item in items {
        if !seen.insert(item.name()) {
            result.errors.push(ConfigError::DuplicateName {
                kind: kind.to_string(),
                name: item.name().to_string(),
            });
        }
    }
}
