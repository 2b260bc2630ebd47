//! Engine settings and the naming conventions derived from them.
//!
//! Settings are layered: defaults, then the optional `settings` block of the
//! configuration, then `YO_*` environment variables, then CLI flags.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use crate::remote::RetryPolicy;

use super::rules::is_valid_name;
use super::spec::{FieldError, Validate};

/// File name of the compose definition on the server.
pub const REMOTE_COMPOSE_FILE: &str = "docker-compose.yml";

/// File name of the gateway configuration on the server.
pub const REMOTE_GATEWAY_FILE: &str = "gateway.yml";

/// Engine-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSettings {
    /// Environment name, part of every project name.
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Base directory for deployments on every server.
    #[serde(default = "default_remote_base_dir")]
    pub remote_base_dir: String,
    /// Local directory holding generated artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Local directory holding the inventory ledger and lock.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Time budget of one remote command, in seconds.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Time budget of opening a session, in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Maximum number of servers worked on concurrently.
    #[serde(default = "default_max_parallel")]
    pub max_parallel_servers: usize,
    /// Retry policy for remote and provider calls.
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_environment() -> String {
    String::from("dev")
}

fn default_remote_base_dir() -> String {
    String::from("/data/yamlops")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("deploy")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".yamlops")
}

const fn default_command_timeout() -> u64 {
    120
}

const fn default_connect_timeout() -> u64 {
    15
}

const fn default_max_parallel() -> usize {
    4
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            remote_base_dir: default_remote_base_dir(),
            output_dir: default_output_dir(),
            state_dir: default_state_dir(),
            command_timeout_secs: default_command_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            max_parallel_servers: default_max_parallel(),
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineSettings {
    /// Compose project name of a resource: `yo-{env}-{name}`.
    #[must_use]
    pub fn project_name(&self, name: &str) -> String {
        format!("{}{name}", self.project_prefix())
    }

    /// Prefix shared by every project of this environment.
    #[must_use]
    pub fn project_prefix(&self) -> String {
        format!("yo-{}-", self.environment)
    }

    /// Remote directory of a resource: `{basedir}/yo-{env}-{name}`.
    #[must_use]
    pub fn remote_dir(&self, name: &str) -> String {
        format!(
            "{}/{}",
            self.remote_base_dir.trim_end_matches('/'),
            self.project_name(name)
        )
    }

    /// Local compose artifact: `{output}/{server}/{name}.compose.yaml`.
    #[must_use]
    pub fn compose_artifact(&self, server: &str, name: &str) -> PathBuf {
        self.output_dir.join(server).join(format!("{name}.compose.yaml"))
    }

    /// Local gateway artifact: `{output}/{server}/{name}.gate.yaml`.
    #[must_use]
    pub fn gateway_artifact(&self, server: &str, name: &str) -> PathBuf {
        self.output_dir.join(server).join(format!("{name}.gate.yaml"))
    }

    /// Local artifacts of a deployment paired with their remote file names.
    ///
    /// Gateways ship a gateway config next to the compose file.
    #[must_use]
    pub fn artifacts(&self, server: &str, name: &str, gateway: bool) -> Vec<(PathBuf, &'static str)> {
        let mut files = vec![(self.compose_artifact(server, name), REMOTE_COMPOSE_FILE)];
        if gateway {
            files.push((self.gateway_artifact(server, name), REMOTE_GATEWAY_FILE));
        }
        files
    }

    /// Directory receiving issued certificates.
    #[must_use]
    pub fn certificate_dir(&self) -> PathBuf {
        self.output_dir.join("certificates")
    }

    /// Per-command timeout.
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Applies `YO_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from a variable lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(env) = lookup("YO_ENV") {
            debug!("Overriding environment from YO_ENV");
            self.environment = env;
        }
        if let Some(dir) = lookup("YO_REMOTE_BASE_DIR") {
            debug!("Overriding remote_base_dir from YO_REMOTE_BASE_DIR");
            self.remote_base_dir = dir;
        }
        if let Some(dir) = lookup("YO_OUTPUT_DIR") {
            debug!("Overriding output_dir from YO_OUTPUT_DIR");
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("YO_STATE_DIR") {
            debug!("Overriding state_dir from YO_STATE_DIR");
            self.state_dir = PathBuf::from(dir);
        }
        if let Some(secs) = parse_var(&lookup, "YO_COMMAND_TIMEOUT") {
            self.command_timeout_secs = secs;
        }
        if let Some(secs) = parse_var(&lookup, "YO_CONNECT_TIMEOUT") {
            self.connect_timeout_secs = secs;
        }
        if let Some(n) = parse_var(&lookup, "YO_MAX_PARALLEL") {
            self.max_parallel_servers = n;
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => {
            debug!("Overriding setting from {key}");
            Some(value)
        }
        Err(_) => {
            warn!("Ignoring {key}={raw}: not a number");
            None
        }
    }
}

impl Validate for EngineSettings {
    fn validate(&self) -> Result<(), FieldError> {
        // `-` separates environment from name in `yo-{env}-{name}`.
        if !is_valid_name(&self.environment) || self.environment.contains('-') {
            return Err(FieldError::new(
                "environment",
                format!("'{}' must be lowercase alphanumeric with '_'", self.environment),
            ));
        }
        if !self.remote_base_dir.starts_with('/') {
            return Err(FieldError::new("remote_base_dir", "must be an absolute path"));
        }
        if self.command_timeout_secs == 0 {
            return Err(FieldError::new("command_timeout_secs", "must be positive"));
        }
        if self.connect_timeout_secs == 0 {
            return Err(FieldError::new("connect_timeout_secs", "must be positive"));
        }
        if self.max_parallel_servers == 0 {
            return Err(FieldError::new("max_parallel_servers", "must be at least 1"));
        }
        self.retry.validate().map_err(|e| e.within("retry"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings: EngineSettings = serde_yaml::from_str("{}").unwrap();
        assert_eq!(settings, EngineSettings::default());
        assert_eq!(settings.environment, "dev");
        assert_eq!(settings.max_parallel_servers, 4);
        assert_eq!(settings.retry.max_attempts, 3);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_layout_conventions() {
        let settings = EngineSettings {
            environment: String::from("prod"),
            remote_base_dir: String::from("/srv/"),
            ..EngineSettings::default()
        };
        assert_eq!(settings.project_name("api"), "yo-prod-api");
        assert_eq!(settings.remote_dir("api"), "/srv/yo-prod-api");
        assert_eq!(
            settings.compose_artifact("s1", "api"),
            PathBuf::from("deploy/s1/api.compose.yaml")
        );
        assert_eq!(
            settings.gateway_artifact("s1", "gw"),
            PathBuf::from("deploy/s1/gw.gate.yaml")
        );
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("YO_ENV", "staging"),
            ("YO_MAX_PARALLEL", "8"),
            ("YO_COMMAND_TIMEOUT", "soon"),
        ]
        .into_iter()
        .collect();

        let mut settings = EngineSettings::default();
        settings.apply_overrides(|key| vars.get(key).map(ToString::to_string));

        assert_eq!(settings.environment, "staging");
        assert_eq!(settings.max_parallel_servers, 8);
        assert_eq!(settings.command_timeout_secs, 120);
    }

    #[test]
    fn test_invalid_settings() {
        let settings = EngineSettings {
            max_parallel_servers: 0,
            ..EngineSettings::default()
        };
        assert_eq!(settings.validate().unwrap_err().field, "max_parallel_servers");
    }

    #[test]
    fn test_environment_cannot_contain_dash() {
        for environment in ["prod-eu", "Prod", ""] {
            let settings = EngineSettings {
                environment: environment.to_string(),
                ..EngineSettings::default()
            };
            assert_eq!(settings.validate().unwrap_err().field, "environment", "{environment}");
        }
        let settings = EngineSettings {
            environment: String::from("prod_eu"),
            ..EngineSettings::default()
        };
        assert!(settings.validate().is_ok());
    }
}
