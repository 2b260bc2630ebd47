//! Observed state and the persisted inventory ledger.
//!
//! [`DeploymentState`] is the observed mirror of the configuration built
//! fresh for every plan. [`Inventory`] is the local ledger of inventory
//! entities the engine has applied, which have no remote drift signal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::{DnsRecord, FlatRecord, RecordType};
use crate::planner::EntityKind;

/// Current version of the ledger format.
pub const STATE_VERSION: &str = "1.0";

/// Maximum number of apply history entries kept in the ledger.
const MAX_HISTORY: usize = 100;

/// Whether a deployment's content matches the local artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncStatus {
    /// Remote content fingerprint equals the local one.
    InSync {
        /// The shared fingerprint.
        fingerprint: String,
    },
    /// Present, but content differs or could not be read.
    Drifted,
}

/// A compose deployment found on a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedResource {
    /// Resource name, the project name without the environment prefix.
    pub name: String,
    /// Server it was found on.
    pub server: String,
    /// Content check result.
    pub sync: SyncStatus,
}

/// Identity of a DNS record: `(domain, type, name)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    /// Owning domain.
    pub domain: String,
    /// Record type.
    pub record_type: RecordType,
    /// Host label.
    pub name: String,
}

/// A certificate known from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    /// Covered domain names.
    pub domains: Vec<String>,
    /// Expiry of the issued certificate.
    #[serde(default)]
    pub not_after: Option<DateTime<Utc>>,
}

/// Observed state used for planning.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentState {
    /// When observation finished; certificate renewal is judged against it.
    pub observed_at: DateTime<Utc>,
    /// ISPs known to exist.
    pub isps: BTreeSet<String>,
    /// Zones known to exist.
    pub zones: BTreeSet<String>,
    /// Registries known to exist.
    pub registries: BTreeSet<String>,
    /// Servers known to exist.
    pub servers: BTreeSet<String>,
    /// Domains known to exist.
    pub domains: BTreeSet<String>,
    /// Certificates known to exist.
    pub certificates: BTreeMap<String, CertificateRecord>,
    /// DNS records listed from providers.
    pub records: BTreeMap<RecordKey, DnsRecord>,
    /// Business services found on servers.
    pub services: BTreeMap<String, ObservedResource>,
    /// Infra services found on servers.
    pub infra_services: BTreeMap<String, ObservedResource>,
    /// Gateways found on servers.
    pub gateways: BTreeMap<String, ObservedResource>,
    /// Environment deployments matching no configured resource on their server.
    pub orphans: Vec<ObservedResource>,
}

/// One apply run recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyHistoryEntry {
    /// When the run finished.
    pub timestamp: DateTime<Utc>,
    /// Changes that succeeded.
    pub succeeded: usize,
    /// Changes that failed.
    pub failed: usize,
    /// Changes skipped after cancellation.
    #[serde(default)]
    pub skipped: usize,
    /// `kind/name` of every change that was not a no-op.
    pub resources: Vec<String>,
}

/// The persisted inventory ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    /// Ledger format version.
    pub version: String,
    /// Environment the ledger belongs to.
    pub environment: String,
    /// Applied ISPs.
    #[serde(default)]
    pub isps: BTreeSet<String>,
    /// Applied zones.
    #[serde(default)]
    pub zones: BTreeSet<String>,
    /// Applied registries.
    #[serde(default)]
    pub registries: BTreeSet<String>,
    /// Applied servers.
    #[serde(default)]
    pub servers: BTreeSet<String>,
    /// Applied domains.
    #[serde(default)]
    pub domains: BTreeSet<String>,
    /// Issued certificates.
    #[serde(default)]
    pub certificates: BTreeMap<String, CertificateRecord>,
    /// When the ledger was last written.
    pub last_updated: DateTime<Utc>,
    /// Recent apply runs.
    #[serde(default)]
    pub history: Vec<ApplyHistoryEntry>,
}

impl SyncStatus {
    /// Returns true if the content was verified identical.
    #[must_use]
    pub const fn is_in_sync(&self) -> bool {
        matches!(self, Self::InSync { .. })
    }
}

impl ObservedResource {
    /// A deployment whose content matches the local artifact.
    #[must_use]
    pub fn verified(name: &str, server: &str, fingerprint: &str) -> Self {
        Self {
            name: name.to_string(),
            server: server.to_string(),
            sync: SyncStatus::InSync {
                fingerprint: fingerprint.to_string(),
            },
        }
    }

    /// A deployment that exists but could not be verified.
    #[must_use]
    pub fn drifted(name: &str, server: &str) -> Self {
        Self {
            name: name.to_string(),
            server: server.to_string(),
            sync: SyncStatus::Drifted,
        }
    }
}

impl RecordKey {
    /// Builds the key of a record in a domain.
    #[must_use]
    pub fn new(domain: &str, record: &DnsRecord) -> Self {
        Self {
            domain: domain.to_string(),
            record_type: record.record_type,
            name: record.name.clone(),
        }
    }

    /// Builds the key of a flattened record.
    #[must_use]
    pub fn of(flat: &FlatRecord) -> Self {
        Self::new(&flat.domain, &flat.record)
    }

    /// Display name used in changes: `TYPE name.domain`.
    #[must_use]
    pub fn label(&self) -> String {
        if self.name == "@" {
            format!("{} {}", self.record_type, self.domain)
        } else {
            format!("{} {}.{}", self.record_type, self.name, self.domain)
        }
    }
}

impl Default for DeploymentState {
    fn default() -> Self {
        Self::empty(Utc::now())
    }
}

impl DeploymentState {
    /// Empty state observed at `observed_at`.
    #[must_use]
    pub const fn empty(observed_at: DateTime<Utc>) -> Self {
        Self {
            observed_at,
            isps: BTreeSet::new(),
            zones: BTreeSet::new(),
            registries: BTreeSet::new(),
            servers: BTreeSet::new(),
            domains: BTreeSet::new(),
            certificates: BTreeMap::new(),
            records: BTreeMap::new(),
            services: BTreeMap::new(),
            infra_services: BTreeMap::new(),
            gateways: BTreeMap::new(),
            orphans: Vec::new(),
        }
    }

    /// State pre-seeded with the inventory ledger.
    #[must_use]
    pub fn from_inventory(inventory: &Inventory, observed_at: DateTime<Utc>) -> Self {
        Self {
            isps: inventory.isps.clone(),
            zones: inventory.zones.clone(),
            registries: inventory.registries.clone(),
            servers: inventory.servers.clone(),
            domains: inventory.domains.clone(),
            certificates: inventory.certificates.clone(),
            ..Self::empty(observed_at)
        }
    }

    /// Folds another partial observation into this one.
    pub fn merge(&mut self, other: Self) {
        self.isps.extend(other.isps);
        self.zones.extend(other.zones);
        self.registries.extend(other.registries);
        self.servers.extend(other.servers);
        self.domains.extend(other.domains);
        self.certificates.extend(other.certificates);
        self.records.extend(other.records);
        self.services.extend(other.services);
        self.infra_services.extend(other.infra_services);
        self.gateways.extend(other.gateways);
        self.orphans.extend(other.orphans);
        self.orphans
            .sort_by(|a, b| (&a.server, &a.name).cmp(&(&b.server, &b.name)));
    }

    /// The observed resource map for a deployable kind.
    #[must_use]
    pub const fn deployed(&self, kind: EntityKind) -> Option<&BTreeMap<String, ObservedResource>> {
        match kind {
            EntityKind::Service => Some(&self.services),
            EntityKind::InfraService => Some(&self.infra_services),
            EntityKind::Gateway => Some(&self.gateways),
            _ => None,
        }
    }

    /// Mutable access to the observed resource map for a deployable kind.
    pub const fn deployed_mut(
        &mut self,
        kind: EntityKind,
    ) -> Option<&mut BTreeMap<String, ObservedResource>> {
        match kind {
            EntityKind::Service => Some(&mut self.services),
            EntityKind::InfraService => Some(&mut self.infra_services),
            EntityKind::Gateway => Some(&mut self.gateways),
            _ => None,
        }
    }

    /// Returns true if an inventory entity is known to exist.
    #[must_use]
    pub fn has_inventory(&self, kind: EntityKind, name: &str) -> bool {
        match kind {
            EntityKind::Isp => self.isps.contains(name),
            EntityKind::Zone => self.zones.contains(name),
            EntityKind::Registry => self.registries.contains(name),
            EntityKind::Server => self.servers.contains(name),
            EntityKind::Domain => self.domains.contains(name),
            EntityKind::Certificate => self.certificates.contains_key(name),
            _ => false,
        }
    }
}

impl Inventory {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new(environment: &str) -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            environment: environment.to_string(),
            isps: BTreeSet::new(),
            zones: BTreeSet::new(),
            registries: BTreeSet::new(),
            servers: BTreeSet::new(),
            domains: BTreeSet::new(),
            certificates: BTreeMap::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    fn names_mut(&mut self, kind: EntityKind) -> Option<&mut BTreeSet<String>> {
        match kind {
            EntityKind::Isp => Some(&mut self.isps),
            EntityKind::Zone => Some(&mut self.zones),
            EntityKind::Registry => Some(&mut self.registries),
            EntityKind::Server => Some(&mut self.servers),
            EntityKind::Domain => Some(&mut self.domains),
            _ => None,
        }
    }

    /// Records that an inventory entity exists.
    ///
    /// Returns false for kinds the ledger does not track by name.
    pub fn record(&mut self, kind: EntityKind, name: &str) -> bool {
        let Some(names) = self.names_mut(kind) else {
            return false;
        };
        names.insert(name.to_string());
        self.last_updated = Utc::now();
        true
    }

    /// Records an issued certificate.
    pub fn record_certificate(&mut self, name: &str, record: CertificateRecord) {
        self.certificates.insert(name.to_string(), record);
        self.last_updated = Utc::now();
    }

    /// Removes an entity from the ledger.
    pub fn forget(&mut self, kind: EntityKind, name: &str) -> bool {
        let removed = if kind == EntityKind::Certificate {
            self.certificates.remove(name).is_some()
        } else {
            self.names_mut(kind).is_some_and(|names| names.remove(name))
        };
        if removed {
            self.last_updated = Utc::now();
        }
        removed
    }

    /// Adds a history entry, keeping only the most recent ones.
    pub fn add_history(&mut self, entry: ApplyHistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }

    /// Number of tracked entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.isps.len()
            + self.zones.len()
            + self.registries.len()
            + self.servers.len()
            + self.domains.len()
            + self.certificates.len()
    }
}
