//! Configuration loading from YAML files and directories.
//!
//! A configuration is either one YAML file or a directory whose `*.yaml` and
//! `*.yml` files are merged in lexical file order.

use crate::error::{ConfigError, Result, YoError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::settings::EngineSettings;
use super::spec::Config;

/// Configuration parser for loading the desired state.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for locating the `.env` file.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path used to locate `.env`.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a file or a directory of files.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is missing or any file fails to parse.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if path.is_dir() {
            self.load_dir(path)
        } else {
            self.load_file(path)
        }
    }

    /// Loads configuration from a single YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(YoError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            YoError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Loads and merges every YAML file of a directory in lexical order.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed or a file fails to parse.
    pub fn load_dir(&self, dir: impl AsRef<Path>) -> Result<Config> {
        let dir = dir.as_ref();
        info!("Loading configuration directory: {}", dir.display());

        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|p| p.is_file() && is_yaml(p))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(YoError::Config(ConfigError::FileNotFound {
                path: dir.join("*.yaml"),
            }));
        }

        let mut config = Config::default();
        for file in &files {
            config.merge(self.load_file(file)?);
        }
        debug!("Merged {} configuration files", files.len());
        Ok(config)
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<Config> {
        debug!("Parsing YAML configuration");

        if content.trim().is_empty() {
            return Ok(Config::default());
        }

        let config: Config = serde_yaml::from_str(content).map_err(|e| {
            let file = source.map(|p| p.display().to_string());
            let location = match (file, e.location()) {
                (Some(file), Some(loc)) => Some(format!("{file}:{}:{}", loc.line(), loc.column())),
                (Some(file), None) => Some(file),
                (None, Some(loc)) => Some(format!("{}:{}", loc.line(), loc.column())),
                (None, None) => None,
            };
            YoError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Parsed {} servers and {} services",
            config.servers.len(),
            config.services.len()
        );
        Ok(config)
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                YoError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Resolves the effective engine settings for a configuration.
    ///
    /// Defaults, then the configuration's `settings` block, then `YO_*`
    /// environment variables.
    #[must_use]
    pub fn settings(config: &Config) -> EngineSettings {
        let mut settings = config.settings.clone().unwrap_or_default();
        settings.apply_env_overrides();
        settings
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
}

/// Default configuration locations to search for.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["yamlops.yaml", "yamlops.yml", "userdata"];

/// Finds the configuration in the current directory or parent directories.
///
/// # Errors
///
/// Returns an error if no configuration is found.
pub fn find_config(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for candidate in DEFAULT_CONFIG_PATHS {
            let config_path = current.join(candidate);
            if config_path.exists() {
                info!("Found configuration: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(YoError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_PATHS[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
zones:
  - name: hz
    isp: ali
";
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        assert_eq!(config.zones.len(), 1);
        assert!(config.services.is_empty());
        assert!(config.settings.is_none());
    }

    #[test]
    fn test_empty_document() {
        let config = ConfigParser::new().parse_yaml("\n", None).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parse_error_carries_location() {
        let err = ConfigParser::new()
            .parse_yaml("servers: [", Some(Path::new("infra.yaml")))
            .unwrap_err();
        let YoError::Config(ConfigError::ParseError { location, .. }) = err else {
            panic!("expected parse error");
        };
        assert!(location.unwrap().starts_with("infra.yaml"));
    }

    #[test]
    fn test_directory_merge_in_lexical_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("20-services.yaml"),
            "services:\n  - {name: web, server: s1, image: web:1}\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("10-services.yml"),
            "settings:\n  environment: prod\nservices:\n  - {name: api, server: s1, image: api:1}\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let config = ConfigParser::new().load(dir.path()).unwrap();
        let names: Vec<_> = config.services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["api", "web"]);
        assert_eq!(config.settings.map(|s| s.environment), Some(String::from("prod")));
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigParser::new().load("/nonexistent/yamlops.yaml").unwrap_err();
        assert!(matches!(err, YoError::Config(ConfigError::FileNotFound { .. })));
    }
}
