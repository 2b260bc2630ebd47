//! Scope filters narrowing a plan or apply run.

use serde::{Deserialize, Serialize};

/// Filters restricting which resources a run considers.
///
/// Matching is conjunctive: every filter that is set must match. A filter on
/// a dimension the resource does not have (e.g. `zone` for a DNS record)
/// excludes the resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    /// Only resources in this zone.
    pub zone: Option<String>,
    /// Only resources on this server.
    pub server: Option<String>,
    /// Only these business services.
    pub services: Vec<String>,
    /// Only these infra services and gateways.
    pub infra_services: Vec<String>,
    /// Only this domain, its subdomains and its records.
    pub domain: Option<String>,
    /// Only domains and DNS records.
    pub dns_only: bool,
    /// Redeploy selected services even when they are in sync.
    pub force_deploy: bool,
}

/// The scope dimensions of one resource.
#[derive(Debug, Clone, Default)]
pub struct ScopeTarget<'a> {
    /// Zone the resource belongs to.
    pub zone: Option<&'a str>,
    /// Server the resource runs on.
    pub server: Option<&'a str>,
    /// Domain names the resource covers.
    pub domains: Vec<&'a str>,
}

impl Scope {
    /// A scope that matches everything.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Returns true when explicit service or infra service names are selected.
    #[must_use]
    pub fn has_any_service_selection(&self) -> bool {
        !self.services.is_empty() || !self.infra_services.is_empty()
    }

    /// Returns true when no filter is set.
    #[must_use]
    pub fn is_unfiltered(&self) -> bool {
        self.zone.is_none()
            && self.server.is_none()
            && self.domain.is_none()
            && !self.dns_only
            && !self.has_any_service_selection()
    }

    /// Returns true if the target satisfies every location filter.
    #[must_use]
    pub fn matches(&self, target: &ScopeTarget<'_>) -> bool {
        if let Some(zone) = &self.zone
            && target.zone != Some(zone.as_str())
        {
            return false;
        }
        if let Some(server) = &self.server
            && target.server != Some(server.as_str())
        {
            return false;
        }
        if let Some(domain) = &self.domain
            && !target.domains.iter().any(|d| domain_matches(domain, d))
        {
            return false;
        }
        true
    }

    /// Returns true if a business service name passes the service selection.
    #[must_use]
    pub fn selects_service(&self, name: &str) -> bool {
        if self.dns_only {
            return false;
        }
        if !self.has_any_service_selection() {
            return true;
        }
        self.services.iter().any(|s| s == name)
    }

    /// Returns true if an infra service or gateway name passes the selection.
    #[must_use]
    pub fn selects_infra(&self, name: &str) -> bool {
        if self.dns_only {
            return false;
        }
        if !self.has_any_service_selection() {
            return true;
        }
        self.infra_services.iter().any(|s| s == name)
    }

    /// Returns true if inventory kinds are planned.
    #[must_use]
    pub fn includes_inventory(&self) -> bool {
        !self.dns_only && !self.has_any_service_selection()
    }

    /// Returns true if domains and DNS records are planned.
    #[must_use]
    pub fn includes_dns(&self) -> bool {
        !self.has_any_service_selection()
    }

    /// Returns true if resources not in the configuration may be deleted.
    ///
    /// Deletes only happen in full inventory mode.
    #[must_use]
    pub fn allows_deletes(&self) -> bool {
        !self.has_any_service_selection()
    }
}

/// Returns true if `name` is `filter` or one of its subdomains.
fn domain_matches(filter: &str, name: &str) -> bool {
    let name = name.strip_prefix("*.").unwrap_or(name);
    name == filter
        || name
            .strip_suffix(filter)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

impl<'a> ScopeTarget<'a> {
    /// A resource placed on a server in a zone.
    #[must_use]
    pub fn on_server(zone: Option<&'a str>, server: &'a str) -> Self {
        Self {
            zone,
            server: Some(server),
            domains: Vec::new(),
        }
    }

    /// A resource that belongs to a zone only.
    #[must_use]
    pub fn in_zone(zone: &'a str) -> Self {
        Self {
            zone: Some(zone),
            ..Self::default()
        }
    }

    /// A resource covering domain names.
    #[must_use]
    pub fn for_domains(domains: Vec<&'a str>) -> Self {
        Self {
            domains,
            ..Self::default()
        }
    }
}
