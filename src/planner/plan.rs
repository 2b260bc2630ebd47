//! Plan and change types.
//!
//! A [`Plan`] is an ordered, immutable list of [`Change`]s plus the
//! [`Scope`] that produced it. Re-planning produces a new plan.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{
    BizService, Certificate, Domain, FlatRecord, Gateway, InfraService, Isp, Registry, Server,
    ServerBound, Zone,
};
use crate::state::{CertificateRecord, ObservedResource};

use super::scope::Scope;

/// Kind of mutation a change performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// Create a resource.
    Create,
    /// Update a resource.
    Update,
    /// Delete a resource.
    Delete,
    /// Nothing to do.
    Noop,
}

/// Managed entity kinds, in planning order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Cloud ISP.
    Isp,
    /// Zone.
    Zone,
    /// DNS domain.
    Domain,
    /// DNS record.
    DnsRecord,
    /// TLS certificate.
    Certificate,
    /// Container registry.
    Registry,
    /// Server.
    Server,
    /// Business service.
    Service,
    /// Infra service.
    InfraService,
    /// Standalone gateway.
    Gateway,
}

/// Entity payload carried by a change, one variant per kind.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityState {
    /// ISP.
    Isp(Isp),
    /// Zone.
    Zone(Zone),
    /// Domain.
    Domain(Domain),
    /// DNS record with its domain.
    DnsRecord(FlatRecord),
    /// Certificate.
    Certificate(Certificate),
    /// Registry.
    Registry(Registry),
    /// Server.
    Server(Server),
    /// Business service.
    Service(BizService),
    /// Infra service.
    InfraService(InfraService),
    /// Gateway.
    Gateway(Gateway),
    /// A deployment found on a server.
    Observed(ObservedResource),
    /// A certificate known from the ledger.
    Issued(CertificateRecord),
    /// An inventory entry known only from the ledger.
    Recorded(String),
}

/// One planned mutation against one named resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    /// Mutation type.
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    /// Entity kind.
    pub kind: EntityKind,
    /// Resource name; DNS records use `type name.domain`.
    pub name: String,
    /// Owning server, resolved when the change is built.
    pub server: Option<String>,
    /// Observed state before the change.
    #[serde(skip)]
    pub old: Option<EntityState>,
    /// Desired state after the change.
    #[serde(skip)]
    pub new: Option<EntityState>,
    /// Human-readable steps.
    pub actions: Vec<String>,
}

/// An ordered list of changes and the scope that produced it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Plan {
    /// Scope used for planning.
    pub scope: Scope,
    /// Changes in planning order.
    pub changes: Vec<Change>,
}

/// Change counts by type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    /// Creates.
    pub create: usize,
    /// Updates.
    pub update: usize,
    /// Deletes.
    pub delete: usize,
    /// No-ops.
    pub noop: usize,
}

impl ChangeType {
    /// One-character prefix used when rendering plans.
    #[must_use]
    pub const fn prefix(self) -> char {
        match self {
            Self::Create => '+',
            Self::Update => '~',
            Self::Delete => '-',
            Self::Noop => ' ',
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Noop => "noop",
        };
        write!(f, "{s}")
    }
}

impl EntityKind {
    /// Stable kind name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Isp => "isp",
            Self::Zone => "zone",
            Self::Domain => "domain",
            Self::DnsRecord => "dns_record",
            Self::Certificate => "certificate",
            Self::Registry => "registry",
            Self::Server => "server",
            Self::Service => "service",
            Self::InfraService => "infra_service",
            Self::Gateway => "gateway",
        }
    }

    /// Returns true for kinds deployed as compose projects.
    #[must_use]
    pub const fn is_deployable(self) -> bool {
        matches!(self, Self::Service | Self::InfraService | Self::Gateway)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EntityState {
    /// The server owning this entity, if it is bound to one.
    #[must_use]
    pub fn server(&self) -> Option<&str> {
        match self {
            Self::Service(s) => Some(s.server()),
            Self::InfraService(s) => Some(s.server()),
            Self::Gateway(g) => Some(g.server()),
            Self::Server(s) => Some(&s.name),
            Self::Observed(o) => Some(&o.server),
            Self::Isp(_)
            | Self::Zone(_)
            | Self::Domain(_)
            | Self::DnsRecord(_)
            | Self::Certificate(_)
            | Self::Registry(_)
            | Self::Issued(_)
            | Self::Recorded(_) => None,
        }
    }
}

impl Change {
    /// Builds a change, resolving its server from the payloads.
    #[must_use]
    pub fn new(
        change_type: ChangeType,
        kind: EntityKind,
        name: impl Into<String>,
        old: Option<EntityState>,
        new: Option<EntityState>,
    ) -> Self {
        let server = new
            .as_ref()
            .and_then(EntityState::server)
            .or_else(|| old.as_ref().and_then(EntityState::server))
            .map(ToString::to_string);
        Self {
            change_type,
            kind,
            name: name.into(),
            server,
            old,
            new,
            actions: Vec::new(),
        }
    }

    /// Appends a human-readable step.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }

    /// Returns true unless this is a no-op.
    #[must_use]
    pub fn is_change(&self) -> bool {
        self.change_type != ChangeType::Noop
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.change_type.prefix(), self.kind, self.name)?;
        if let Some(server) = &self.server {
            write!(f, " (server: {server})")?;
        }
        Ok(())
    }
}

impl Plan {
    /// Creates a plan.
    #[must_use]
    pub const fn new(scope: Scope, changes: Vec<Change>) -> Self {
        Self { scope, changes }
    }

    /// Returns true if any change is not a no-op.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.changes.iter().any(Change::is_change)
    }

    /// Returns the changes of one type.
    #[must_use]
    pub fn filter_by_type(&self, change_type: ChangeType) -> Vec<&Change> {
        self.changes
            .iter()
            .filter(|c| c.change_type == change_type)
            .collect()
    }

    /// Returns the changes of one entity kind.
    #[must_use]
    pub fn filter_by_entity(&self, kind: EntityKind) -> Vec<&Change> {
        self.changes.iter().filter(|c| c.kind == kind).collect()
    }

    /// Re-scopes the plan to the changes owned by one server, without replanning.
    #[must_use]
    pub fn filter_by_server(&self, server: &str) -> Self {
        let scope = Scope {
            server: Some(server.to_string()),
            ..self.scope.clone()
        };
        let changes = self
            .changes
            .iter()
            .filter(|c| c.server.as_deref() == Some(server))
            .cloned()
            .collect();
        Self { scope, changes }
    }

    /// Counts changes by type.
    #[must_use]
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for change in &self.changes {
            match change.change_type {
                ChangeType::Create => summary.create += 1,
                ChangeType::Update => summary.update += 1,
                ChangeType::Delete => summary.delete += 1,
                ChangeType::Noop => summary.noop += 1,
            }
        }
        summary
    }

    /// Number of changes, including no-ops.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns true if the plan holds no changes at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.create, self.update, self.delete, self.noop
        )
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.has_changes() {
            return write!(f, "No changes required");
        }

        for change in &self.changes {
            writeln!(f, "{change}")?;
            for action in &change.actions {
                writeln!(f, "    {action}")?;
            }
        }
        write!(f, "Plan: {}", self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SyncStatus;

    fn observed(name: &str, server: &str) -> EntityState {
        EntityState::Observed(ObservedResource {
            name: name.to_string(),
            server: server.to_string(),
            sync: SyncStatus::Drifted,
        })
    }

    fn plan() -> Plan {
        Plan::new(
            Scope::all(),
            vec![
                Change::new(
                    ChangeType::Create,
                    EntityKind::Zone,
                    "hz",
                    None,
                    Some(EntityState::Recorded(String::from("hz"))),
                ),
                Change::new(ChangeType::Update, EntityKind::Service, "api", None, Some(observed("api", "s1"))),
                Change::new(ChangeType::Delete, EntityKind::Service, "old", Some(observed("old", "s2")), None),
                Change::new(ChangeType::Noop, EntityKind::Service, "web", None, Some(observed("web", "s1"))),
            ],
        )
    }

    #[test]
    fn test_prefixes() {
        assert_eq!(ChangeType::Create.prefix(), '+');
        assert_eq!(ChangeType::Update.prefix(), '~');
        assert_eq!(ChangeType::Delete.prefix(), '-');
        assert_eq!(ChangeType::Noop.prefix(), ' ');
    }

    #[test]
    fn test_server_resolved_at_construction() {
        let plan = plan();
        assert_eq!(plan.changes[0].server, None);
        assert_eq!(plan.changes[1].server.as_deref(), Some("s1"));
        assert_eq!(plan.changes[2].server.as_deref(), Some("s2"));
    }

    #[test]
    fn test_queries() {
        let plan = plan();
        assert!(plan.has_changes());
        assert_eq!(plan.filter_by_type(ChangeType::Create).len(), 1);
        assert_eq!(plan.filter_by_entity(EntityKind::Service).len(), 3);
        assert_eq!(
            plan.summary(),
            PlanSummary {
                create: 1,
                update: 1,
                delete: 1,
                noop: 1
            }
        );
    }

    #[test]
    fn test_filter_by_server() {
        let plan = plan().filter_by_server("s1");
        assert_eq!(plan.scope.server.as_deref(), Some("s1"));
        let names: Vec<_> = plan.changes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["api", "web"]);
    }

    #[test]
    fn test_noop_only_plan_has_no_changes() {
        let plan = Plan::new(
            Scope::all(),
            vec![Change::new(ChangeType::Noop, EntityKind::Service, "web", None, Some(observed("web", "s1")))],
        );
        assert!(!plan.has_changes());
        assert_eq!(plan.to_string(), "No changes required");
    }

    #[test]
    fn test_display() {
        let rendered = plan().to_string();
        assert!(rendered.contains("+ zone hz"));
        assert!(rendered.contains("~ service api (server: s1)"));
        assert!(rendered.ends_with("Plan: 1 to create, 1 to update, 1 to delete, 1 unchanged"));
    }
}
