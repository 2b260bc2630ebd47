//! Reconciliation engine.
//!
//! [`Engine`] exposes the two entry points of the system: [`Engine::plan`]
//! observes remote state and computes a [`Plan`] for a scope, and
//! [`Engine::apply`] executes a plan and updates the inventory ledger.

use chrono::Utc;
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigValidator, EngineSettings, Validate};
use crate::error::{ConfigError, Result};
use crate::planner::{
    ApplyReport, CancelToken, ChangeResult, ChangeType, EntityKind, Executor, Plan, Planner, Scope,
};
use crate::providers::{CertificateIssuer, DnsProviders};
use crate::remote::Connector;
use crate::state::{
    ApplyHistoryEntry, DeploymentState, Inventory, InventoryStore, LOCK_RENEW_INTERVAL_SECS,
    LocalInventoryStore, LockInfo, StateObserver,
};

/// Plans and applies changes for one configuration.
pub struct Engine {
    config: Config,
    settings: EngineSettings,
    connector: Arc<dyn Connector>,
    store: Arc<dyn InventoryStore>,
    providers: DnsProviders,
    issuer: Option<Arc<dyn CertificateIssuer>>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("environment", &self.settings.environment)
            .field("store", &self.store.backend_type())
            .field("providers", &self.providers)
            .field("issuer", &self.issuer.is_some())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an engine keeping its ledger under `settings.state_dir`.
    #[must_use]
    pub fn new(config: Config, settings: EngineSettings, connector: Arc<dyn Connector>) -> Self {
        let store = Arc::new(LocalInventoryStore::new(settings.state_dir.clone()));
        Self {
            config,
            settings,
            connector,
            store,
            providers: DnsProviders::new(),
            issuer: None,
        }
    }

    /// Uses another ledger backend.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn InventoryStore>) -> Self {
        self.store = store;
        self
    }

    /// Uses another transport for remote servers.
    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Registers the DNS providers used for observation and apply.
    #[must_use]
    pub fn with_dns_providers(mut self, providers: DnsProviders) -> Self {
        self.providers = providers;
        self
    }

    /// Sets the certificate issuer.
    #[must_use]
    pub fn with_certificate_issuer(mut self, issuer: Arc<dyn CertificateIssuer>) -> Self {
        self.issuer = Some(issuer);
        self
    }

    /// The configuration being reconciled.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The effective engine settings.
    #[must_use]
    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Renews the lock lease until dropped. A failed renewal is logged and
    /// retried on the next tick.
    async fn renew_lease(&self, lock_id: &str) -> Infallible {
        let period = std::time::Duration::from_secs(LOCK_RENEW_INTERVAL_SECS);
        let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            ticks.tick().await;
            match self.store.renew_lock(lock_id).await {
                Ok(lock) => debug!("Lock lease renewed until {}", lock.expires_at),
                Err(e) => warn!("Failed to renew state lock: {e}"),
            }
        }
    }

    /// Validates the configuration and the effective settings, which may
    /// carry command-line or environment overrides.
    fn check(&self) -> Result<()> {
        ConfigValidator::new().validate(&self.config)?;
        self.settings
            .validate()
            .map_err(|e| ConfigError::invalid("settings", e.to_string()))?;
        Ok(())
    }

    /// Observes remote state and plans the changes for `scope`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the ledger cannot
    /// be read. Unreachable servers only narrow the observed state.
    pub async fn plan(&self, scope: &Scope) -> Result<Plan> {
        self.check()?;

        let inventory = self.load_inventory().await?;
        let seed = DeploymentState::from_inventory(&inventory, Utc::now());

        let observer = StateObserver::new(self.settings.clone(), Arc::clone(&self.connector))
            .with_dns_providers(self.providers.clone());
        let state = observer.observe(&self.config, scope, seed).await;

        let plan = Planner::new(self.settings.clone()).plan(&self.config, &state, scope);
        info!("Plan: {}", plan.summary());
        Ok(plan)
    }

    /// Applies `plan` under the workspace lock and records the outcome.
    ///
    /// Failed changes do not make this return an error; they are itemized in
    /// the report.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the lock is held by
    /// another run, or the ledger cannot be written.
    pub async fn apply(&self, plan: &Plan, cancel: &CancelToken) -> Result<ApplyReport> {
        self.check()?;

        let lock = self.store.acquire_lock("").await?;
        let outcome = tokio::select! {
            outcome = self.apply_locked(plan, cancel) => outcome,
            never = self.renew_lease(&lock.lock_id) => match never {},
        };
        if let Err(e) = self.store.release_lock(&lock.lock_id).await {
            warn!("Failed to release state lock: {e}");
        }
        outcome
    }

    async fn apply_locked(&self, plan: &Plan, cancel: &CancelToken) -> Result<ApplyReport> {
        let mut executor = Executor::new(
            self.settings.clone(),
            self.config.clone(),
            Arc::clone(&self.connector),
        )
        .with_dns_providers(self.providers.clone());
        if let Some(issuer) = &self.issuer {
            executor = executor.with_certificate_issuer(Arc::clone(issuer));
        }

        let report = executor.apply(plan, cancel).await;

        let mut inventory = self.load_inventory().await?;
        for result in &report.results {
            update_ledger(&mut inventory, result);
        }
        inventory.add_history(ApplyHistoryEntry {
            timestamp: Utc::now(),
            succeeded: report.succeeded(),
            failed: report.failed(),
            skipped: report.skipped(),
            resources: report
                .results
                .iter()
                .filter(|r| r.change.is_change())
                .map(|r| format!("{}/{}", r.change.kind, r.change.name))
                .collect(),
        });
        self.store.save(&inventory).await?;

        Ok(report)
    }

    /// Loads the ledger, or an empty one for this environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger exists but cannot be read.
    pub async fn inventory(&self) -> Result<Inventory> {
        self.load_inventory().await
    }

    /// Current workspace lock, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be read.
    pub async fn lock_info(&self) -> Result<Option<LockInfo>> {
        self.store.lock_info().await
    }

    /// Removes the workspace lock regardless of its holder.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be removed.
    pub async fn force_unlock(&self) -> Result<Option<LockInfo>> {
        let previous = self.store.force_unlock().await?;
        if let Some(lock) = &previous {
            warn!("Force-released lock held by {}", lock.holder);
        }
        Ok(previous)
    }

    async fn load_inventory(&self) -> Result<Inventory> {
        let environment = &self.settings.environment;
        match self.store.load().await? {
            Some(inventory) if &inventory.environment == environment => Ok(inventory),
            Some(inventory) => {
                warn!(
                    "Ledger in {} belongs to environment {}, starting a new one for {environment}",
                    self.store.backend_type(),
                    inventory.environment
                );
                Ok(Inventory::new(environment))
            }
            None => {
                debug!("No ledger yet for {environment}");
                Ok(Inventory::new(environment))
            }
        }
    }
}

/// Records a successful inventory change in the ledger.
fn update_ledger(inventory: &mut Inventory, result: &ChangeResult) {
    if !result.success {
        return;
    }
    let change = &result.change;
    match change.kind {
        EntityKind::Certificate => {
            if change.change_type == ChangeType::Delete {
                inventory.forget(change.kind, &change.name);
            } else if let Some(record) = &result.certificate {
                inventory.record_certificate(&change.name, record.clone());
            }
        }
        EntityKind::Isp
        | EntityKind::Zone
        | EntityKind::Registry
        | EntityKind::Server
        | EntityKind::Domain => {
            if change.change_type == ChangeType::Delete {
                inventory.forget(change.kind, &change.name);
            } else {
                inventory.record(change.kind, &change.name);
            }
        }
        EntityKind::DnsRecord
        | EntityKind::Service
        | EntityKind::InfraService
        | EntityKind::Gateway => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;
    use crate::error::{StateError, YoError};
    use crate::remote::RetryPolicy;
    use crate::remote::fake::FakeConnector;
    use tempfile::TempDir;

    const CONFIG: &str = r"
isps:
  - name: ali
    type: aliyun
    credentials: { access_key_id: id, access_key_secret: key }
zones:
  - name: hz
    isp: ali
servers:
  - name: s1
    zone: hz
    ssh: { host: 10.0.0.1, user: root }
services:
  - name: api
    server: s1
    image: api:1
";

    const COMPOSE: &str = "services:\n  api:\n    image: api:1\n";

    fn settings(temp: &TempDir) -> EngineSettings {
        EngineSettings {
            output_dir: temp.path().join("deploy"),
            state_dir: temp.path().join("state"),
            retry: RetryPolicy::none(),
            ..EngineSettings::default()
        }
    }

    fn engine(temp: &TempDir, connector: Arc<FakeConnector>) -> Engine {
        engine_with(temp, connector, CONFIG)
    }

    fn engine_with(temp: &TempDir, connector: Arc<FakeConnector>, yaml: &str) -> Engine {
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        let settings = settings(temp);
        let artifact = settings.compose_artifact("s1", "api");
        std::fs::create_dir_all(artifact.parent().unwrap()).unwrap();
        std::fs::write(artifact, COMPOSE).unwrap();
        Engine::new(config, settings, connector)
    }

    fn kinds(plan: &Plan) -> Vec<(ChangeType, EntityKind, String)> {
        plan.changes
            .iter()
            .map(|c| (c.change_type, c.kind, c.name.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_plan_rejects_invalid_config() {
        let temp = TempDir::new().unwrap();
        let config = ConfigParser::new()
            .parse_yaml("services:\n  - name: api\n    server: nowhere\n    image: api:1\n", None)
            .unwrap();
        let connector = Arc::new(FakeConnector::default());
        let engine = Engine::new(config, settings(&temp), connector.clone());

        let err = engine.plan(&Scope::all()).await.unwrap_err();
        assert!(matches!(err, YoError::Config(_)));
        assert_eq!(connector.connects.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_plan_rejects_overridden_environment_with_dash() {
        let temp = TempDir::new().unwrap();
        let config = ConfigParser::new().parse_yaml(CONFIG, None).unwrap();
        let settings = EngineSettings {
            environment: String::from("prod-eu"),
            ..settings(&temp)
        };
        let connector = Arc::new(FakeConnector::default());
        let engine = Engine::new(config, settings, connector.clone());

        let err = engine.plan(&Scope::all()).await.unwrap_err();
        assert!(matches!(err, YoError::Config(ConfigError::Invalid { ref path, .. }) if path == "settings"));
        assert_eq!(connector.connects.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_apply_converges_to_empty_plan() {
        let temp = TempDir::new().unwrap();
        let first = Arc::new(FakeConnector::default());
        first.session("s1").fail("test -d", "missing");
        let engine = engine(&temp, first);

        let plan = engine.plan(&Scope::all()).await.unwrap();
        assert_eq!(
            kinds(&plan),
            vec![
                (ChangeType::Create, EntityKind::Isp, String::from("ali")),
                (ChangeType::Create, EntityKind::Zone, String::from("hz")),
                (ChangeType::Create, EntityKind::Server, String::from("s1")),
                (ChangeType::Create, EntityKind::Service, String::from("api")),
            ]
        );

        let report = engine.apply(&plan, &CancelToken::new()).await.unwrap();
        assert!(report.is_success(), "{report}");

        let deployed = Arc::new(FakeConnector::default());
        let session = deployed.session("s1");
        session.respond("docker compose ls", r#"[{"Name":"yo-dev-api","Status":"running(1)"}]"#);
        session.respond("cat ", COMPOSE);
        let engine = engine.with_connector(deployed);

        let replan = engine.plan(&Scope::all()).await.unwrap();
        assert!(!replan.has_changes(), "{:?}", kinds(&replan));
    }

    #[tokio::test]
    async fn test_apply_records_history_and_releases_lock() {
        let temp = TempDir::new().unwrap();
        let connector = Arc::new(FakeConnector::default());
        connector.session("s1").fail("test -d", "missing");
        let engine = engine(&temp, connector);

        let plan = engine.plan(&Scope::all()).await.unwrap();
        engine.apply(&plan, &CancelToken::new()).await.unwrap();

        assert!(engine.lock_info().await.unwrap().is_none());
        let inventory = engine.inventory().await.unwrap();
        assert_eq!(inventory.history.len(), 1);
        assert_eq!(inventory.history[0].succeeded, 4);
        assert_eq!(
            inventory.history[0].resources,
            vec![
                String::from("isp/ali"),
                String::from("zone/hz"),
                String::from("server/s1"),
                String::from("service/api"),
            ]
        );
        assert!(inventory.isps.contains("ali"));
        assert!(inventory.servers.contains("s1"));
    }

    #[tokio::test]
    async fn test_fresh_reachable_server_is_prepared() {
        let yaml = format!(
            "{CONFIG}{}",
            r"
secrets:
  - name: reg-pass
    value: hunter2
registries:
  - name: priv
    url: registry.example.com
    username: ci
    password: { secret: reg-pass }
"
        )
        .replace(
            "ssh: { host: 10.0.0.1, user: root }",
            "ssh: { host: 10.0.0.1, user: root }\n    environment: { apt_mirror: aliyun, registries: [priv] }",
        );
        let temp = TempDir::new().unwrap();
        let connector = Arc::new(FakeConnector::default());
        let session = connector.session("s1");
        session.respond("docker compose ls", "[]");
        session.fail("test -d", "missing");
        let engine = engine_with(&temp, connector, &yaml);

        let plan = engine.plan(&Scope::all()).await.unwrap();
        let server = plan.filter_by_entity(EntityKind::Server)[0];
        assert_eq!(server.change_type, ChangeType::Create);
        assert_eq!(
            server.actions,
            vec![
                String::from("set apt mirror http://mirrors.aliyun.com"),
                String::from("docker login registry.example.com"),
                String::from("mkdir -p /data/yamlops"),
            ]
        );

        let report = engine.apply(&plan, &CancelToken::new()).await.unwrap();
        assert!(report.is_success(), "{report}");
        let commands = session.commands();
        assert!(commands.iter().any(|c| c.contains("mirrors.aliyun.com")));
        assert!(commands.iter().any(|c| c.starts_with("docker login registry.example.com")));

        let replan = engine.plan(&Scope::all()).await.unwrap();
        assert_eq!(
            replan.filter_by_entity(EntityKind::Server)[0].change_type,
            ChangeType::Noop
        );
    }

    #[tokio::test]
    async fn test_apply_refuses_when_locked() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp, Arc::new(FakeConnector::default()));
        let plan = engine.plan(&Scope::all()).await.unwrap();

        LocalInventoryStore::new(temp.path().join("state"))
            .acquire_lock("other-host")
            .await
            .unwrap();

        let err = engine.apply(&plan, &CancelToken::new()).await.unwrap_err();
        assert!(matches!(
            err,
            YoError::State(StateError::LockedByOther { ref holder, .. }) if holder == "other-host"
        ));

        let released = engine.force_unlock().await.unwrap();
        assert_eq!(released.map(|l| l.holder).as_deref(), Some("other-host"));
        assert!(engine.apply(&plan, &CancelToken::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_server_is_not_recorded() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp, Arc::new(FakeConnector::unreachable(&["s1"])));

        let plan = engine.plan(&Scope::all()).await.unwrap();
        assert_eq!(plan.filter_by_entity(EntityKind::Server)[0].change_type, ChangeType::Create);

        let report = engine.apply(&plan, &CancelToken::new()).await.unwrap();
        assert_eq!(report.failed(), 2);

        let inventory = engine.inventory().await.unwrap();
        assert!(inventory.zones.contains("hz"));
        assert!(!inventory.servers.contains("s1"));
        assert_eq!(inventory.history[0].failed, 2);
    }

    #[tokio::test]
    async fn test_ledger_of_other_environment_is_ignored() {
        let temp = TempDir::new().unwrap();
        let store = LocalInventoryStore::new(temp.path().join("state"));
        let mut other = Inventory::new("prod");
        other.record(EntityKind::Isp, "ali");
        store.save(&other).await.unwrap();

        let engine = engine(&temp, Arc::new(FakeConnector::default()));
        let inventory = engine.inventory().await.unwrap();
        assert_eq!(inventory.environment, "dev");
        assert!(inventory.isps.is_empty());
    }
}
