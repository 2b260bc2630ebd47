//! Remote state observation.
//!
//! The observer builds a best-effort [`DeploymentState`]: every server and
//! every domain is probed independently, and a failure only removes that
//! server's or domain's contribution. Observation never fails the run.

use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{
    Config, EngineSettings, SecretResolver, Server, ServerBound, fingerprint, is_valid_name,
};
use crate::error::Result;
use crate::planner::{EntityKind, Scope, ScopeTarget};
use crate::providers::DnsProviders;
use crate::remote::{Connector, RemoteSession, shell_quote};

use super::types::{DeploymentState, ObservedResource, RecordKey};

/// Lists every compose project, running or not.
const COMPOSE_LS: &str = "docker compose ls -a --format json";

/// One compose-deployed resource configured on a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Deployable<'a> {
    pub kind: EntityKind,
    pub name: &'a str,
    pub gateway: bool,
}

#[derive(Deserialize)]
struct ComposeProject {
    #[serde(rename = "Name")]
    name: String,
}

/// Observes remote state for planning.
pub struct StateObserver {
    settings: EngineSettings,
    connector: Arc<dyn Connector>,
    providers: DnsProviders,
}

impl std::fmt::Debug for StateObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateObserver")
            .field("environment", &self.settings.environment)
            .field("providers", &self.providers)
            .finish_non_exhaustive()
    }
}

/// Parses `docker compose ls --format json` output.
///
/// Accepts a JSON array as well as one JSON object per line; unparsable
/// lines are ignored.
pub(crate) fn parse_compose_projects(output: &str) -> BTreeSet<String> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return BTreeSet::new();
    }
    if let Ok(projects) = serde_json::from_str::<Vec<ComposeProject>>(trimmed) {
        return projects.into_iter().map(|p| p.name).collect();
    }
    trimmed
        .lines()
        .filter_map(|line| serde_json::from_str::<ComposeProject>(line.trim()).ok())
        .map(|p| p.name)
        .collect()
}

/// Compose-deployed resources configured on a server, sorted by kind then name.
pub(crate) fn deployables_on<'a>(config: &'a Config, server: &str) -> Vec<Deployable<'a>> {
    let mut found: Vec<Deployable<'a>> = config
        .services
        .iter()
        .filter(|s| s.server() == server)
        .map(|s| Deployable {
            kind: EntityKind::Service,
            name: &s.name,
            gateway: false,
        })
        .chain(
            config
                .infra_services
                .iter()
                .filter(|s| s.server() == server)
                .map(|s| Deployable {
                    kind: EntityKind::InfraService,
                    name: &s.name,
                    gateway: s.is_gateway(),
                }),
        )
        .chain(
            config
                .gateways
                .iter()
                .filter(|g| g.server() == server)
                .map(|g| Deployable {
                    kind: EntityKind::Gateway,
                    name: &g.name,
                    gateway: true,
                }),
        )
        .collect();
    found.sort_by(|a, b| (a.kind, a.name).cmp(&(b.kind, b.name)));
    found.dedup_by(|a, b| a.kind == b.kind && a.name == b.name);
    found
}

impl StateObserver {
    /// Creates an observer without DNS providers.
    #[must_use]
    pub fn new(settings: EngineSettings, connector: Arc<dyn Connector>) -> Self {
        Self {
            settings,
            connector,
            providers: DnsProviders::new(),
        }
    }

    /// Enables DNS observation through the given providers.
    #[must_use]
    pub fn with_dns_providers(mut self, providers: DnsProviders) -> Self {
        self.providers = providers;
        self
    }

    /// Servers whose deployments are probed for this scope.
    fn servers_in_scope<'a>(config: &'a Config, scope: &Scope) -> Vec<&'a Server> {
        if scope.dns_only {
            return Vec::new();
        }
        config
            .server_map()
            .into_values()
            .filter(|s| scope.matches(&ScopeTarget::on_server(Some(&s.zone), &s.name)))
            .filter(|s| {
                !scope.has_any_service_selection()
                    || deployables_on(config, &s.name).iter().any(|d| match d.kind {
                        EntityKind::Service => scope.selects_service(d.name),
                        _ => scope.selects_infra(d.name),
                    })
            })
            .collect()
    }

    /// Observes every in-scope server and domain, on top of `seed`.
    pub async fn observe(
        &self,
        config: &Config,
        scope: &Scope,
        seed: DeploymentState,
    ) -> DeploymentState {
        let mut state = seed;
        let servers = Self::servers_in_scope(config, scope);
        info!("Observing {} server(s)", servers.len());

        let observed: Vec<_> = stream::iter(servers)
            .map(|server| async move {
                let result = self.observe_server(config, server).await;
                (server.name.as_str(), result)
            })
            .buffer_unordered(self.settings.max_parallel_servers.max(1))
            .collect()
            .await;

        for (server, result) in observed {
            match result {
                Ok(partial) => state.merge(partial),
                Err(e) => warn!("Skipping state of server {server}: {e}"),
            }
        }

        if scope.includes_dns() && !self.providers.is_empty() {
            self.observe_dns(config, scope, &mut state).await;
        }
        state
    }

    async fn observe_server(&self, config: &Config, server: &Server) -> Result<DeploymentState> {
        let resolver = SecretResolver::new(&config.secrets);
        let password = server
            .ssh
            .password
            .as_ref()
            .map(|p| resolver.resolve(p))
            .transpose()?;

        let session = self
            .settings
            .retry
            .run(&format!("connect {}", server.name), || {
                self.connector.connect(server, password.clone())
            })
            .await?;

        let result = self.probe_server(config, server, session.as_ref()).await;
        if let Err(e) = session.close().await {
            debug!("Closing session to {} failed: {e}", server.name);
        }
        result
    }

    async fn probe_server(
        &self,
        config: &Config,
        server: &Server,
        session: &dyn RemoteSession,
    ) -> Result<DeploymentState> {
        let listing = session.run(COMPOSE_LS).await?;
        let projects = parse_compose_projects(&listing.stdout);

        // Server presence comes from the ledger; a reachable host is not a prepared one.
        let mut state = DeploymentState::empty(chrono::Utc::now());

        let deployables = deployables_on(config, &server.name);
        for deployable in &deployables {
            let Some(resource) = self
                .probe_deployment(session, &server.name, deployable, &projects)
                .await
            else {
                continue;
            };
            if let Some(map) = state.deployed_mut(deployable.kind) {
                map.insert(deployable.name.to_string(), resource);
            }
        }

        let prefix = self.settings.project_prefix();
        let configured: BTreeSet<&str> = deployables.iter().map(|d| d.name).collect();
        for project in &projects {
            let Some(name) = project.strip_prefix(&prefix) else {
                continue;
            };
            if !is_valid_name(name) {
                warn!("Ignoring project {project} on {}: not a valid resource name", server.name);
                continue;
            }
            if !configured.contains(name) {
                debug!("Found orphan project {project} on {}", server.name);
                state.orphans.push(ObservedResource::drifted(name, &server.name));
            }
        }

        debug!(
            "Observed {} deployment(s) and {} orphan(s) on {}",
            state.services.len() + state.infra_services.len() + state.gateways.len(),
            state.orphans.len(),
            server.name
        );
        Ok(state)
    }

    /// Returns the observed resource, or `None` if it is not deployed.
    async fn probe_deployment(
        &self,
        session: &dyn RemoteSession,
        server: &str,
        deployable: &Deployable<'_>,
        projects: &BTreeSet<String>,
    ) -> Option<ObservedResource> {
        let dir = self.settings.remote_dir(deployable.name);
        let listed = projects.contains(&self.settings.project_name(deployable.name));
        if !listed
            && session
                .run(&format!("test -d {}", shell_quote(&dir)))
                .await
                .is_err()
        {
            return None;
        }

        let mut compose_fingerprint = None;
        for (local, remote_file) in
            self.settings
                .artifacts(server, deployable.name, deployable.gateway)
        {
            let remote = session
                .run(&format!("cat {}", shell_quote(&format!("{dir}/{remote_file}"))))
                .await
                .map(|o| fingerprint(&o.stdout))
                .unwrap_or_default();
            let wanted = local_fingerprint(&local).await;
            if remote.is_empty() || remote != wanted {
                debug!("{} {} on {server} has drifted", deployable.kind, deployable.name);
                return Some(ObservedResource::drifted(deployable.name, server));
            }
            if compose_fingerprint.is_none() {
                compose_fingerprint = Some(remote);
            }
        }

        Some(compose_fingerprint.map_or_else(
            || ObservedResource::drifted(deployable.name, server),
            |fp| ObservedResource::verified(deployable.name, server, &fp),
        ))
    }

    async fn observe_dns(&self, config: &Config, scope: &Scope, state: &mut DeploymentState) {
        for domain in config.domain_map().into_values() {
            if !scope.matches(&ScopeTarget::for_domains(vec![&domain.name])) {
                continue;
            }
            let Ok(provider) = self.providers.get(&domain.dns_isp) else {
                debug!("No DNS provider for {}, skipping {}", domain.dns_isp, domain.name);
                continue;
            };

            let listed = self
                .settings
                .retry
                .run(&format!("list domains of {}", domain.dns_isp), || {
                    provider.list_domains()
                })
                .await;
            match listed {
                Ok(names) if names.iter().any(|n| n == &domain.name) => {
                    state.domains.insert(domain.name.clone());
                }
                Ok(_) => {
                    debug!("Domain {} is not hosted by {}", domain.name, provider.name());
                    continue;
                }
                Err(e) => {
                    warn!("Skipping DNS state of {}: {e}", domain.name);
                    continue;
                }
            }

            let records = self
                .settings
                .retry
                .run(&format!("list records of {}", domain.name), || {
                    provider.list_records(&domain.name)
                })
                .await;
            match records {
                Ok(records) => {
                    for record in records {
                        state.records.insert(RecordKey::new(&domain.name, &record), record);
                    }
                }
                Err(e) => warn!("Skipping DNS records of {}: {e}", domain.name),
            }
        }
    }
}

/// Fingerprint of a local artifact; empty when it cannot be read.
async fn local_fingerprint(path: &Path) -> String {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => fingerprint(&content),
        Err(e) => {
            warn!("Cannot read artifact {}: {e}", path.display());
            String::new()
        }
    }
}
