//! Diff engine turning desired configuration and observed state into a plan.
//!
//! Planning is pure: no I/O, and the same inputs always yield the same plan.
//! Kinds are planned in dependency order and each kind in name order.

use std::collections::BTreeSet;
use tracing::debug;

use crate::config::{
    Config, DnsRecord, EngineSettings, Named, RecordType, ServerBound,
};
use crate::state::{DeploymentState, ObservedResource, RecordKey, SyncStatus};

use super::plan::{Change, ChangeType, EntityKind, EntityState, Plan};
use super::scope::{Scope, ScopeTarget};

/// Computes plans.
#[derive(Debug, Clone, Default)]
pub struct Planner {
    settings: EngineSettings,
}

/// A compose-deployed resource as seen by the diff.
struct DeployTarget<'a> {
    kind: EntityKind,
    name: &'a str,
    server: &'a str,
    gateway: bool,
    payload: EntityState,
}

impl Planner {
    /// Creates a planner using the naming conventions of `settings`.
    #[must_use]
    pub const fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }

    /// Computes the plan for `config` against `state` within `scope`.
    #[must_use]
    pub fn plan(&self, config: &Config, state: &DeploymentState, scope: &Scope) -> Plan {
        let mut changes = Vec::new();

        if scope.includes_inventory() {
            Self::plan_isps(config, state, scope, &mut changes);
            Self::plan_zones(config, state, scope, &mut changes);
        }
        if scope.includes_dns() {
            Self::plan_domains(config, state, scope, &mut changes);
            Self::plan_records(config, state, scope, &mut changes);
        }
        if scope.includes_inventory() {
            Self::plan_certificates(config, state, scope, &mut changes);
            Self::plan_registries(config, state, scope, &mut changes);
            self.plan_servers(config, state, scope, &mut changes);
        }
        self.plan_deployments(config, state, scope, &mut changes);
        self.plan_orphans(config, state, scope, &mut changes);

        let plan = Plan::new(scope.clone(), changes);
        debug!("Planned {} change(s): {}", plan.len(), plan.summary());
        plan
    }

    /// Presence-only diff of an inventory kind, plus deletes of ledger leftovers.
    fn plan_inventory<'a, T: Named + 'a>(
        kind: EntityKind,
        items: impl IntoIterator<Item = &'a T>,
        known: &BTreeSet<String>,
        scope: &Scope,
        target: impl Fn(&'a T) -> ScopeTarget<'a>,
        payload: impl Fn(&T) -> EntityState,
        changes: &mut Vec<Change>,
    ) {
        let mut desired = BTreeSet::new();
        for item in items {
            desired.insert(item.name().to_string());
            if !scope.matches(&target(item)) {
                continue;
            }
            let (change_type, action) = if known.contains(item.name()) {
                (ChangeType::Noop, None)
            } else {
                (ChangeType::Create, Some(format!("register {kind} {}", item.name())))
            };
            let mut change = Change::new(change_type, kind, item.name(), None, Some(payload(item)));
            if let Some(action) = action {
                change = change.with_action(action);
            }
            changes.push(change);
        }

        if scope.is_unfiltered() {
            for name in known.difference(&desired) {
                changes.push(
                    Change::new(
                        ChangeType::Delete,
                        kind,
                        name.as_str(),
                        Some(EntityState::Recorded(name.clone())),
                        None,
                    )
                    .with_action(format!("forget {kind} {name}")),
                );
            }
        }
    }

    fn plan_isps(config: &Config, state: &DeploymentState, scope: &Scope, changes: &mut Vec<Change>) {
        Self::plan_inventory(
            EntityKind::Isp,
            config.isp_map().into_values(),
            &state.isps,
            scope,
            |_| ScopeTarget::default(),
            |isp| EntityState::Isp(isp.clone()),
            changes,
        );
    }

    fn plan_zones(config: &Config, state: &DeploymentState, scope: &Scope, changes: &mut Vec<Change>) {
        Self::plan_inventory(
            EntityKind::Zone,
            config.zone_map().into_values(),
            &state.zones,
            scope,
            |zone| ScopeTarget::in_zone(&zone.name),
            |zone| EntityState::Zone(zone.clone()),
            changes,
        );
    }

    fn plan_domains(config: &Config, state: &DeploymentState, scope: &Scope, changes: &mut Vec<Change>) {
        Self::plan_inventory(
            EntityKind::Domain,
            config.domain_map().into_values(),
            &state.domains,
            scope,
            |domain| ScopeTarget::for_domains(vec![&domain.name]),
            |domain| EntityState::Domain(domain.clone()),
            changes,
        );
    }

    fn plan_registries(
        config: &Config,
        state: &DeploymentState,
        scope: &Scope,
        changes: &mut Vec<Change>,
    ) {
        Self::plan_inventory(
            EntityKind::Registry,
            config.registry_map().into_values(),
            &state.registries,
            scope,
            |_| ScopeTarget::default(),
            |registry| EntityState::Registry(registry.clone()),
            changes,
        );
    }

    fn plan_records(config: &Config, state: &DeploymentState, scope: &Scope, changes: &mut Vec<Change>) {
        let mut desired: Vec<_> = config
            .flatten_records()
            .into_iter()
            .map(|flat| (RecordKey::of(&flat), flat))
            .collect();
        desired.sort_by(|a, b| a.0.cmp(&b.0));
        desired.dedup_by(|a, b| a.0 == b.0);

        let desired_keys: BTreeSet<&RecordKey> = desired.iter().map(|(key, _)| key).collect();
        let desired_domains: BTreeSet<&str> = config.domains.iter().map(|d| d.name.as_str()).collect();

        for (key, flat) in &desired {
            let fqdn = flat.record.fqdn(&flat.domain);
            if !scope.matches(&ScopeTarget::for_domains(vec![&fqdn])) {
                continue;
            }
            let record = &flat.record;
            let change = match state.records.get(key) {
                None => Change::new(
                    ChangeType::Create,
                    EntityKind::DnsRecord,
                    key.label(),
                    None,
                    Some(EntityState::DnsRecord(flat.clone())),
                )
                .with_action(format!("create {} (ttl {})", record.value, record.ttl)),
                Some(observed) if observed.same_content(record) => Change::new(
                    ChangeType::Noop,
                    EntityKind::DnsRecord,
                    key.label(),
                    Some(EntityState::DnsRecord(observed_flat(key, observed))),
                    Some(EntityState::DnsRecord(flat.clone())),
                ),
                Some(observed) => Change::new(
                    ChangeType::Update,
                    EntityKind::DnsRecord,
                    key.label(),
                    Some(EntityState::DnsRecord(observed_flat(key, observed))),
                    Some(EntityState::DnsRecord(flat.clone())),
                )
                .with_action(describe_record_update(observed, record)),
            };
            changes.push(change);
        }

        if !scope.allows_deletes() {
            return;
        }
        for (key, observed) in &state.records {
            if desired_keys.contains(key)
                || !desired_domains.contains(key.domain.as_str())
                || is_provider_managed(observed)
            {
                continue;
            }
            let fqdn = observed.fqdn(&key.domain);
            if !scope.matches(&ScopeTarget::for_domains(vec![&fqdn])) {
                continue;
            }
            changes.push(
                Change::new(
                    ChangeType::Delete,
                    EntityKind::DnsRecord,
                    key.label(),
                    Some(EntityState::DnsRecord(observed_flat(key, observed))),
                    None,
                )
                .with_action(format!("delete {}", observed.value)),
            );
        }
    }

    fn plan_certificates(
        config: &Config,
        state: &DeploymentState,
        scope: &Scope,
        changes: &mut Vec<Change>,
    ) {
        let desired: BTreeSet<&str> = config.certificates.iter().map(|c| c.name.as_str()).collect();

        for cert in config.certificate_map().into_values() {
            let domains: Vec<&str> = cert.domains.iter().map(String::as_str).collect();
            if !scope.matches(&ScopeTarget::for_domains(domains)) {
                continue;
            }
            let payload = Some(EntityState::Certificate(cert.clone()));
            let change = match state.certificates.get(&cert.name) {
                None => Change::new(ChangeType::Create, EntityKind::Certificate, &cert.name, None, payload)
                    .with_action(format!("obtain for {} via {}", cert.domains.join(", "), cert.provider)),
                Some(known) => {
                    let renew_at = known.not_after.map(|not_after| {
                        not_after - chrono::Duration::days(i64::from(cert.renew_before_days))
                    });
                    match renew_at {
                        Some(renew_at) if renew_at <= state.observed_at => Change::new(
                            ChangeType::Update,
                            EntityKind::Certificate,
                            &cert.name,
                            Some(EntityState::Issued(known.clone())),
                            payload,
                        )
                        .with_action(format!(
                            "renew, expires {}",
                            known.not_after.map(|t| t.to_rfc3339()).unwrap_or_default()
                        )),
                        _ => Change::new(
                            ChangeType::Noop,
                            EntityKind::Certificate,
                            &cert.name,
                            Some(EntityState::Issued(known.clone())),
                            payload,
                        ),
                    }
                }
            };
            changes.push(change);
        }

        if scope.is_unfiltered() {
            for name in state.certificates.keys() {
                if desired.contains(name.as_str()) {
                    continue;
                }
                changes.push(
                    Change::new(
                        ChangeType::Delete,
                        EntityKind::Certificate,
                        name.as_str(),
                        Some(EntityState::Recorded(name.clone())),
                        None,
                    )
                    .with_action(format!("remove local files of {name}")),
                );
            }
        }
    }

    fn plan_servers(
        &self,
        config: &Config,
        state: &DeploymentState,
        scope: &Scope,
        changes: &mut Vec<Change>,
    ) {
        let start = changes.len();
        Self::plan_inventory(
            EntityKind::Server,
            config.server_map().into_values(),
            &state.servers,
            scope,
            |server| ScopeTarget::on_server(Some(&server.zone), &server.name),
            |server| EntityState::Server(server.clone()),
            changes,
        );

        for change in &mut changes[start..] {
            let Some(EntityState::Server(server)) = &change.new else {
                continue;
            };
            if change.change_type != ChangeType::Create {
                continue;
            }
            let mut actions = Vec::new();
            if let Some(mirror) = &server.environment.apt_mirror {
                actions.push(format!("set apt mirror {}", mirror.url()));
            }
            for name in &server.environment.registries {
                let url = config.registry(name).map_or(name.as_str(), |r| r.url.as_str());
                actions.push(format!("docker login {url}"));
            }
            actions.push(format!("mkdir -p {}", self.settings.remote_base_dir));
            change.actions = actions;
        }
    }

    fn deploy_targets<'a>(config: &'a Config, scope: &Scope) -> Vec<DeployTarget<'a>> {
        let mut targets = Vec::new();
        for service in config.service_map().into_values() {
            if scope.selects_service(&service.name) {
                targets.push(DeployTarget {
                    kind: EntityKind::Service,
                    name: &service.name,
                    server: service.server(),
                    gateway: false,
                    payload: EntityState::Service(service.clone()),
                });
            }
        }
        for infra in config.infra_service_map().into_values() {
            if scope.selects_infra(&infra.name) {
                targets.push(DeployTarget {
                    kind: EntityKind::InfraService,
                    name: &infra.name,
                    server: infra.server(),
                    gateway: infra.is_gateway(),
                    payload: EntityState::InfraService(infra.clone()),
                });
            }
        }
        for gateway in config.gateway_map().into_values() {
            if scope.selects_infra(&gateway.name) {
                targets.push(DeployTarget {
                    kind: EntityKind::Gateway,
                    name: &gateway.name,
                    server: gateway.server(),
                    gateway: true,
                    payload: EntityState::Gateway(gateway.clone()),
                });
            }
        }
        targets.retain(|t| {
            scope.matches(&ScopeTarget::on_server(config.zone_of_server(t.server), t.server))
        });
        targets
    }

    fn plan_deployments(
        &self,
        config: &Config,
        state: &DeploymentState,
        scope: &Scope,
        changes: &mut Vec<Change>,
    ) {
        for target in Self::deploy_targets(config, scope) {
            let observed = state
                .deployed(target.kind)
                .and_then(|deployed| deployed.get(target.name));
            let change_type = match observed.map(|o| &o.sync) {
                None => ChangeType::Create,
                Some(SyncStatus::InSync { .. }) if !scope.force_deploy => ChangeType::Noop,
                Some(_) => ChangeType::Update,
            };

            let actions = if change_type == ChangeType::Noop {
                Vec::new()
            } else {
                self.deploy_actions(&target)
            };
            let mut change = Change::new(
                change_type,
                target.kind,
                target.name,
                observed.cloned().map(EntityState::Observed),
                Some(target.payload),
            );
            change.actions = actions;
            changes.push(change);
        }
    }

    fn deploy_actions(&self, target: &DeployTarget<'_>) -> Vec<String> {
        let dir = self.settings.remote_dir(target.name);
        let mut actions = vec![format!("mkdir -p {dir}")];
        for (local, remote) in self
            .settings
            .artifacts(target.server, target.name, target.gateway)
        {
            actions.push(format!("upload {} -> {dir}/{remote}", local.display()));
        }
        actions.push(format!(
            "docker compose -p {} up -d",
            self.settings.project_name(target.name)
        ));
        actions
    }

    fn plan_orphans(
        &self,
        config: &Config,
        state: &DeploymentState,
        scope: &Scope,
        changes: &mut Vec<Change>,
    ) {
        if !scope.allows_deletes() || scope.dns_only {
            return;
        }
        for orphan in &state.orphans {
            let target = ScopeTarget::on_server(config.zone_of_server(&orphan.server), &orphan.server);
            if !scope.matches(&target) {
                continue;
            }
            changes.push(self.orphan_delete(orphan));
        }
    }

    fn orphan_delete(&self, orphan: &ObservedResource) -> Change {
        let dir = self.settings.remote_dir(&orphan.name);
        Change::new(
            ChangeType::Delete,
            EntityKind::Service,
            orphan.name.as_str(),
            Some(EntityState::Observed(orphan.clone())),
            None,
        )
        .with_action(format!(
            "docker compose -p {} down",
            self.settings.project_name(&orphan.name)
        ))
        .with_action(format!("rm -rf {dir}"))
    }
}

fn observed_flat(key: &RecordKey, record: &DnsRecord) -> crate::config::FlatRecord {
    crate::config::FlatRecord {
        domain: key.domain.clone(),
        record: record.clone(),
    }
}

fn describe_record_update(observed: &DnsRecord, desired: &DnsRecord) -> String {
    let mut parts = Vec::new();
    if observed.value != desired.value {
        parts.push(format!("value {} -> {}", observed.value, desired.value));
    }
    if observed.ttl != desired.ttl {
        parts.push(format!("ttl {} -> {}", observed.ttl, desired.ttl));
    }
    parts.join(", ")
}

/// Apex NS records belong to the DNS host and are never deleted.
fn is_provider_managed(record: &DnsRecord) -> bool {
    record.record_type == RecordType::NS && record.name == "@"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigParser, fingerprint};
    use crate::state::{CertificateRecord, Inventory};
    use chrono::{Duration, Utc};

    const CONFIG: &str = r"
isps:
  - name: ali
    type: aliyun
    credentials: { access_key_id: id, access_key_secret: key }
zones:
  - name: hz
    isp: ali
  - name: sh
    isp: ali
servers:
  - name: s1
    zone: hz
    ssh: { host: 10.0.0.1, user: root }
    environment:
      apt_mirror: aliyun
  - name: s2
    zone: sh
    ssh: { host: 10.0.0.2, user: root }
services:
  - name: web
    server: s1
    image: web:1
  - name: api
    server: s1
    image: api:1
  - name: worker
    server: s2
    image: worker:1
infra_services:
  - name: gw
    server: s1
    image: gw:1
    type: gateway
    http_port: 80
    https_port: 443
domains:
  - name: example.com
    dns_isp: ali
    records:
      - { type: A, name: www, value: 1.2.3.4 }
      - { type: A, name: api, value: 1.2.3.5 }
certificates:
  - name: wild
    domains: ['*.example.com']
    dns_isp: ali
";

    fn config() -> Config {
        ConfigParser::new().parse_yaml(CONFIG, None).unwrap()
    }

    fn planner() -> Planner {
        Planner::new(EngineSettings::default())
    }

    fn names(plan: &Plan, kind: EntityKind) -> Vec<(ChangeType, String)> {
        plan.filter_by_entity(kind)
            .into_iter()
            .map(|c| (c.change_type, c.name.clone()))
            .collect()
    }

    fn record(name: &str, value: &str) -> DnsRecord {
        DnsRecord {
            record_type: RecordType::A,
            name: name.to_string(),
            value: value.to_string(),
            ttl: 600,
        }
    }

    fn in_sync(state: &mut DeploymentState, name: &str, server: &str) {
        state.services.insert(
            name.to_string(),
            ObservedResource::verified(name, server, &fingerprint("services: {}")),
        );
    }

    #[test]
    fn test_fresh_deploy_single_service() {
        let config = ConfigParser::new()
            .parse_yaml(
                "servers:\n  - name: s1\n    zone: hz\n    ssh: { host: h, user: u }\nservices:\n  - name: api\n    server: s1\n    image: api:1\n",
                None,
            )
            .unwrap();
        let scope = Scope {
            services: vec![String::from("api")],
            ..Scope::default()
        };

        let plan = planner().plan(&config, &DeploymentState::default(), &scope);
        assert_eq!(plan.len(), 1);
        let change = &plan.changes[0];
        assert_eq!(change.change_type, ChangeType::Create);
        assert_eq!(change.kind, EntityKind::Service);
        assert_eq!(change.name, "api");
        assert_eq!(change.server.as_deref(), Some("s1"));
        assert!(matches!(&change.new, Some(EntityState::Service(s)) if s.image == "api:1"));
        assert_eq!(
            change.actions,
            vec![
                String::from("mkdir -p /data/yamlops/yo-dev-api"),
                String::from("upload deploy/s1/api.compose.yaml -> /data/yamlops/yo-dev-api/docker-compose.yml"),
                String::from("docker compose -p yo-dev-api up -d"),
            ]
        );
    }

    #[test]
    fn test_planning_is_idempotent_and_ordered() {
        let config = config();
        let state = DeploymentState::default();
        let first = planner().plan(&config, &state, &Scope::all());
        let second = planner().plan(&config, &state, &Scope::all());
        assert_eq!(first, second);

        let kinds: Vec<EntityKind> = first.changes.iter().map(|c| c.kind).collect();
        let mut sorted = kinds.clone();
        sorted.sort();
        assert_eq!(kinds, sorted);
        assert_eq!(
            names(&first, EntityKind::Service),
            vec![
                (ChangeType::Create, String::from("api")),
                (ChangeType::Create, String::from("web")),
                (ChangeType::Create, String::from("worker")),
            ]
        );
    }

    #[test]
    fn test_in_sync_service_is_noop() {
        let config = config();
        let mut state = DeploymentState::default();
        in_sync(&mut state, "api", "s1");

        let plan = planner().plan(&config, &state, &Scope::all());
        let api = plan.changes.iter().find(|c| c.name == "api").unwrap();
        assert_eq!(api.change_type, ChangeType::Noop);
        assert!(api.actions.is_empty());
    }

    #[test]
    fn test_drifted_service_is_updated() {
        let config = config();
        let mut state = DeploymentState::default();
        state
            .services
            .insert(String::from("api"), ObservedResource::drifted("api", "s1"));

        let plan = planner().plan(&config, &state, &Scope::all());
        let api = plan.changes.iter().find(|c| c.name == "api").unwrap();
        assert_eq!(api.change_type, ChangeType::Update);
    }

    #[test]
    fn test_targeted_force_redeploy() {
        let config = config();
        let mut state = DeploymentState::default();
        in_sync(&mut state, "api", "s1");
        let scope = Scope {
            services: vec![String::from("api")],
            force_deploy: true,
            ..Scope::default()
        };

        let plan = planner().plan(&config, &state, &scope);
        assert_eq!(names(&plan, EntityKind::Service), vec![(ChangeType::Update, String::from("api"))]);
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_scope_conservation() {
        let config = config();
        let mut state = DeploymentState::default();
        state.orphans.push(ObservedResource::drifted("legacy", "s2"));
        state.orphans.push(ObservedResource::drifted("old", "s1"));
        let scope = Scope {
            server: Some(String::from("s1")),
            ..Scope::default()
        };

        let plan = planner().plan(&config, &state, &scope);
        assert!(!plan.is_empty());
        for change in &plan.changes {
            assert_eq!(change.server.as_deref(), Some("s1"), "{change}");
        }
        assert!(plan.changes.iter().any(|c| c.change_type == ChangeType::Delete && c.name == "old"));
        assert!(!plan.changes.iter().any(|c| c.name == "worker" || c.name == "legacy"));
    }

    #[test]
    fn test_zone_scope_includes_zone_and_its_servers() {
        let plan = planner().plan(
            &config(),
            &DeploymentState::default(),
            &Scope {
                zone: Some(String::from("sh")),
                ..Scope::default()
            },
        );
        let all: Vec<_> = plan.changes.iter().map(|c| (c.kind, c.name.as_str())).collect();
        assert_eq!(
            all,
            vec![
                (EntityKind::Zone, "sh"),
                (EntityKind::Server, "s2"),
                (EntityKind::Service, "worker"),
            ]
        );
    }

    #[test]
    fn test_targeted_mode_skips_inventory_and_deletes() {
        let config = config();
        let mut state = DeploymentState::default();
        state.orphans.push(ObservedResource::drifted("old", "s1"));
        let scope = Scope {
            infra_services: vec![String::from("gw")],
            ..Scope::default()
        };

        let plan = planner().plan(&config, &state, &scope);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.changes[0].kind, EntityKind::InfraService);
        assert!(plan.changes[0].actions.iter().any(|a| a.ends_with("gateway.yml")));
    }

    #[test]
    fn test_dns_record_diff() {
        let config = config();
        let mut state = DeploymentState::default();
        let mut observed_www = record("www", "9.9.9.9");
        observed_www.ttl = 300;
        let stale = record("old", "5.5.5.5");
        let apex_ns = DnsRecord {
            record_type: RecordType::NS,
            name: String::from("@"),
            value: String::from("ns1.dns.com"),
            ttl: 600,
        };
        for r in [&observed_www, &stale, &apex_ns] {
            state.records.insert(RecordKey::new("example.com", r), r.clone());
        }
        let scope = Scope {
            dns_only: true,
            ..Scope::default()
        };

        let plan = planner().plan(&config, &state, &scope);
        assert_eq!(
            names(&plan, EntityKind::DnsRecord),
            vec![
                (ChangeType::Create, String::from("A api.example.com")),
                (ChangeType::Update, String::from("A www.example.com")),
                (ChangeType::Delete, String::from("A old.example.com")),
            ]
        );
        let update = &plan.filter_by_type(ChangeType::Update)[0];
        assert_eq!(update.actions, vec![String::from("value 9.9.9.9 -> 1.2.3.4, ttl 300 -> 600")]);
        assert!(plan.filter_by_entity(EntityKind::Service).is_empty());
        assert!(plan.filter_by_entity(EntityKind::Zone).is_empty());
    }

    #[test]
    fn test_ledger_seeded_inventory_is_noop() {
        let config = config();
        let mut inventory = Inventory::new("dev");
        inventory.record(EntityKind::Isp, "ali");
        inventory.record(EntityKind::Zone, "hz");
        inventory.record(EntityKind::Zone, "gone");
        inventory.record(EntityKind::Server, "s1");

        let state = DeploymentState::from_inventory(&inventory, Utc::now());
        let plan = planner().plan(&config, &state, &Scope::all());

        assert_eq!(
            names(&plan, EntityKind::Zone),
            vec![
                (ChangeType::Noop, String::from("hz")),
                (ChangeType::Create, String::from("sh")),
                (ChangeType::Delete, String::from("gone")),
            ]
        );
        assert_eq!(names(&plan, EntityKind::Isp), vec![(ChangeType::Noop, String::from("ali"))]);
        assert_eq!(
            names(&plan, EntityKind::Server),
            vec![
                (ChangeType::Noop, String::from("s1")),
                (ChangeType::Create, String::from("s2")),
            ]
        );
        let s1 = plan.changes.iter().find(|c| c.name == "s1").unwrap();
        assert!(s1.actions.is_empty());
    }

    #[test]
    fn test_server_actions() {
        let plan = planner().plan(&config(), &DeploymentState::default(), &Scope::all());
        let s1 = plan.changes.iter().find(|c| c.kind == EntityKind::Server && c.name == "s1").unwrap();
        assert_eq!(s1.change_type, ChangeType::Create);
        assert_eq!(
            s1.actions,
            vec![
                String::from("set apt mirror http://mirrors.aliyun.com"),
                String::from("mkdir -p /data/yamlops"),
            ]
        );
    }

    #[test]
    fn test_certificate_renewal_window() {
        let config = config();
        let now = Utc::now();
        let mut state = DeploymentState::empty(now);
        state.certificates.insert(
            String::from("wild"),
            CertificateRecord {
                domains: vec![String::from("*.example.com")],
                not_after: Some(now + Duration::days(10)),
            },
        );
        let plan = planner().plan(&config, &state, &Scope::all());
        assert_eq!(
            names(&plan, EntityKind::Certificate),
            vec![(ChangeType::Update, String::from("wild"))]
        );

        state.certificates.insert(
            String::from("wild"),
            CertificateRecord {
                domains: vec![String::from("*.example.com")],
                not_after: Some(now + Duration::days(60)),
            },
        );
        let plan = planner().plan(&config, &state, &Scope::all());
        assert_eq!(
            names(&plan, EntityKind::Certificate),
            vec![(ChangeType::Noop, String::from("wild"))]
        );
    }

    #[test]
    fn test_domain_scope() {
        let scope = Scope {
            domain: Some(String::from("example.com")),
            ..Scope::default()
        };
        let plan = planner().plan(&config(), &DeploymentState::default(), &scope);
        let kinds: BTreeSet<EntityKind> = plan.changes.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            [EntityKind::Domain, EntityKind::DnsRecord, EntityKind::Certificate]
                .into_iter()
                .collect()
        );
    }
}
