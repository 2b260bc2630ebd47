//! Platform services: reverse-proxy gateways and the SSL proxy.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::rules::{is_valid_cidr, require, require_name, require_port};
use super::spec::{FieldError, Named, ServerBound, Validate};

/// A platform-level deployable bound to one server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InfraService {
    /// Service name.
    pub name: String,
    /// Owning server.
    pub server: String,
    /// Container image.
    pub image: String,
    /// Variant-specific settings, tagged by `type`.
    #[serde(flatten)]
    pub kind: InfraKind,
}

/// Infra service variants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InfraKind {
    /// Reverse-proxy gateway.
    Gateway(GatewaySpec),
    /// Certificate-authority proxy.
    Ssl(SslSpec),
}

/// A standalone gateway deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Gateway {
    /// Gateway name.
    pub name: String,
    /// Owning server.
    pub server: String,
    /// Container image.
    pub image: String,
    /// Gateway settings.
    #[serde(flatten)]
    pub spec: GatewaySpec,
}

/// Reverse-proxy settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewaySpec {
    /// Host HTTP port.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Host HTTPS port.
    #[serde(default = "default_https_port")]
    pub https_port: u16,
    /// Web application firewall.
    #[serde(default)]
    pub waf: WafConfig,
    /// TLS termination.
    #[serde(default)]
    pub ssl: SslSettings,
    /// Proxy log level.
    #[serde(default)]
    pub log_level: LogLevel,
}

/// WAF settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WafConfig {
    /// Enable the WAF.
    #[serde(default)]
    pub enabled: bool,
    /// Client networks that bypass the WAF.
    #[serde(default)]
    pub whitelist: Vec<String>,
}

/// Where the gateway gets certificates from.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    /// Certificates on the gateway host.
    #[default]
    Local,
    /// Certificates served by a remote SSL proxy.
    Remote,
}

/// Gateway TLS settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SslSettings {
    /// Certificate source.
    #[serde(default)]
    pub mode: SslMode,
    /// SSL proxy endpoint; required in remote mode.
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Proxy log level.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Debug.
    Debug,
    /// Info.
    #[default]
    Info,
    /// Warn.
    Warn,
    /// Error.
    Error,
}

/// SSL proxy settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SslSpec {
    /// Host port of the proxy API.
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Certificate storage volume or host path.
    pub storage: String,
}

const fn default_http_port() -> u16 {
    80
}

const fn default_https_port() -> u16 {
    443
}

const fn default_api_port() -> u16 {
    38567
}

impl fmt::Display for InfraKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gateway(_) => write!(f, "gateway"),
            Self::Ssl(_) => write!(f, "ssl"),
        }
    }
}

impl GatewaySpec {
    /// Host ports claimed by the gateway.
    #[must_use]
    pub fn host_ports(&self) -> Vec<u16> {
        vec![self.http_port, self.https_port]
    }
}

impl InfraService {
    /// Host ports claimed on the server.
    #[must_use]
    pub fn host_ports(&self) -> Vec<u16> {
        match &self.kind {
            InfraKind::Gateway(spec) => spec.host_ports(),
            InfraKind::Ssl(spec) => vec![spec.api_port],
        }
    }

    /// Returns true for the gateway variant, which also ships a gateway config file.
    #[must_use]
    pub const fn is_gateway(&self) -> bool {
        matches!(self.kind, InfraKind::Gateway(_))
    }
}

impl Named for InfraService {
    fn name(&self) -> &str {
        &self.name
    }
}

impl ServerBound for InfraService {
    fn server(&self) -> &str {
        &self.server
    }
}

impl Named for Gateway {
    fn name(&self) -> &str {
        &self.name
    }
}

impl ServerBound for Gateway {
    fn server(&self) -> &str {
        &self.server
    }
}

impl Validate for InfraService {
    fn validate(&self) -> Result<(), FieldError> {
        require_name(&self.name)?;
        require("server", &self.server)?;
        require("image", &self.image)?;
        match &self.kind {
            InfraKind::Gateway(spec) => spec.validate(),
            InfraKind::Ssl(spec) => spec.validate(),
        }
    }
}

impl Validate for Gateway {
    fn validate(&self) -> Result<(), FieldError> {
        require_name(&self.name)?;
        require("server", &self.server)?;
        require("image", &self.image)?;
        self.spec.validate()
    }
}

impl Validate for GatewaySpec {
    fn validate(&self) -> Result<(), FieldError> {
        require_port(self.http_port)?;
        require_port(self.https_port)?;
        if self.http_port == self.https_port {
            return Err(FieldError::new(
                "https_port",
                format!("{} is already used as http_port", self.https_port),
            ));
        }
        for (i, cidr) in self.waf.whitelist.iter().enumerate() {
            if !is_valid_cidr(cidr) {
                return Err(FieldError::new(
                    format!("waf.whitelist[{i}]"),
                    format!("'{cidr}' is not a CIDR block"),
                ));
            }
        }
        if self.ssl.mode == SslMode::Remote {
            match &self.ssl.endpoint {
                Some(endpoint) => require("ssl.endpoint", endpoint)?,
                None => return Err(FieldError::new("ssl.endpoint", "is required in remote mode")),
            }
        }
        Ok(())
    }
}

impl Validate for SslSpec {
    fn validate(&self) -> Result<(), FieldError> {
        require_port(self.api_port)?;
        require("storage", &self.storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_infra_yaml() {
        let yaml = r"
name: main-gw
server: s1
image: infra-gate:latest
type: gateway
http_port: 8080
https_port: 8443
waf:
  enabled: true
  whitelist: ['10.0.0.0/8', '192.168.1.1']
ssl:
  mode: remote
  endpoint: http://10.0.0.3:38567
log_level: warn
";
        let infra: InfraService = serde_yaml::from_str(yaml).unwrap();
        assert!(infra.is_gateway());
        assert_eq!(infra.host_ports(), vec![8080, 8443]);
        assert!(infra.validate().is_ok());
        let InfraKind::Gateway(spec) = &infra.kind else {
            panic!("expected gateway");
        };
        assert_eq!(spec.log_level, LogLevel::Warn);
    }

    #[test]
    fn test_ssl_infra_yaml() {
        let yaml = "name: ssl\nserver: s1\nimage: ssl:1\ntype: ssl\nstorage: /data/ssl\n";
        let infra: InfraService = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(infra.kind.to_string(), "ssl");
        assert_eq!(infra.host_ports(), vec![38567]);
        assert!(!infra.is_gateway());
        assert!(infra.validate().is_ok());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let yaml = "name: x\nserver: s1\nimage: x\ntype: cache\n";
        assert!(serde_yaml::from_str::<InfraService>(yaml).is_err());
    }

    #[test]
    fn test_remote_ssl_requires_endpoint() {
        let gateway = Gateway {
            name: String::from("gw"),
            server: String::from("s1"),
            image: String::from("gate:1"),
            spec: GatewaySpec {
                http_port: 80,
                https_port: 443,
                waf: WafConfig::default(),
                ssl: SslSettings {
                    mode: SslMode::Remote,
                    endpoint: None,
                },
                log_level: LogLevel::Info,
            },
        };
        assert_eq!(gateway.validate().unwrap_err().field, "ssl.endpoint");
    }

    #[test]
    fn test_bad_whitelist_entry() {
        let mut spec: GatewaySpec = serde_yaml::from_str("{}").unwrap();
        assert!(spec.validate().is_ok());
        spec.waf.whitelist.push(String::from("10.0.0.0/99"));
        assert_eq!(spec.validate().unwrap_err().field, "waf.whitelist[0]");
    }
}
