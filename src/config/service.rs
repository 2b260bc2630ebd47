//! Business service entity and its container-level settings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::inventory::SecretValue;
use super::rules::{is_valid_domain, is_valid_memory, require, require_name, require_port};
use super::spec::{FieldError, Named, ServerBound, Validate};

/// A deployable business workload bound to one server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BizService {
    /// Service name.
    pub name: String,
    /// Owning server.
    pub server: String,
    /// Container image.
    pub image: String,
    /// Port mappings.
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    /// Environment variables.
    #[serde(default)]
    pub env: BTreeMap<String, SecretValue>,
    /// Volume mounts.
    #[serde(default)]
    pub volumes: Vec<VolumeMount>,
    /// Container health check.
    #[serde(default)]
    pub healthcheck: Option<HealthCheck>,
    /// Resource limits.
    #[serde(default)]
    pub resources: Option<ResourceLimits>,
    /// Routes published through the zone gateway.
    #[serde(default)]
    pub gateways: Vec<GatewayRoute>,
}

/// Transport protocol of a port mapping.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP.
    #[default]
    Tcp,
    /// UDP.
    Udp,
}

/// A host-to-container port mapping, written `host:container[/proto]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub struct PortMapping {
    /// Port on the host.
    pub host: u16,
    /// Port in the container.
    pub container: u16,
    /// Protocol.
    pub protocol: Protocol,
}

/// A volume mount, written `source:target[:ro]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub struct VolumeMount {
    /// Host path or named volume.
    pub source: String,
    /// Mount point inside the container.
    pub target: String,
    /// Mount read-only.
    pub read_only: bool,
}

/// Container health check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthCheck {
    /// Test command, e.g. `["CMD", "curl", "-f", "http://localhost/health"]`.
    pub test: Vec<String>,
    /// Interval between checks, compose duration syntax.
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Timeout of each check.
    #[serde(default = "default_timeout")]
    pub timeout: String,
    /// Consecutive failures before unhealthy.
    #[serde(default = "default_retries")]
    pub retries: u32,
}

/// Container resource limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceLimits {
    /// CPU limit in cores.
    #[serde(default)]
    pub cpus: Option<f64>,
    /// Memory limit, e.g. `512m`.
    #[serde(default)]
    pub memory: Option<String>,
}

impl Eq for ResourceLimits {}

/// A hostname routed by the gateway to a container port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayRoute {
    /// Public hostname.
    pub hostname: String,
    /// Container port receiving traffic.
    pub container_port: u16,
    /// Serve plain HTTP.
    #[serde(default = "default_true")]
    pub http: bool,
    /// Serve HTTPS.
    #[serde(default)]
    pub https: bool,
}

fn default_interval() -> String {
    String::from("30s")
}

fn default_timeout() -> String {
    String::from("5s")
}

const fn default_retries() -> u32 {
    3
}

const fn default_true() -> bool {
    true
}

impl PortMapping {
    /// Parses `host:container[/tcp|udp]`; a bare `port` maps to itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the format is invalid.
    pub fn parse(s: &str) -> Result<Self, String> {
        let (ports, protocol) = match s.split_once('/') {
            Some((ports, proto)) => {
                let protocol = match proto.to_lowercase().as_str() {
                    "tcp" => Protocol::Tcp,
                    "udp" => Protocol::Udp,
                    other => {
                        return Err(format!("Invalid protocol: {other}. Expected: tcp or udp"));
                    }
                };
                (ports, protocol)
            }
            None => (s, Protocol::Tcp),
        };

        let parse_port = |p: &str| {
            p.trim()
                .parse::<u16>()
                .map_err(|_| format!("Invalid port number: {p}"))
        };

        let (host, container) = match ports.split_once(':') {
            Some((host, container)) => (parse_port(host)?, parse_port(container)?),
            None => {
                let port = parse_port(ports)?;
                (port, port)
            }
        };

        Ok(Self {
            host,
            container,
            protocol,
        })
    }
}

impl TryFrom<String> for PortMapping {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<PortMapping> for String {
    fn from(port: PortMapping) -> Self {
        port.to_string()
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let proto = match self.protocol {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        };
        write!(f, "{}:{}/{proto}", self.host, self.container)
    }
}

impl VolumeMount {
    /// Parses `source:target[:ro|rw]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the format is invalid.
    pub fn parse(s: &str) -> Result<Self, String> {
        let parts: Vec<&str> = s.split(':').collect();
        let (source, target, read_only) = match parts.as_slice() {
            [source, target] => (*source, *target, false),
            [source, target, "ro"] => (*source, *target, true),
            [source, target, "rw"] => (*source, *target, false),
            _ => {
                return Err(format!(
                    "Invalid volume: {s}. Expected format: SOURCE:TARGET[:ro]"
                ));
            }
        };
        Ok(Self {
            source: source.to_string(),
            target: target.to_string(),
            read_only,
        })
    }
}

impl TryFrom<String> for VolumeMount {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<VolumeMount> for String {
    fn from(volume: VolumeMount) -> Self {
        if volume.read_only {
            format!("{}:{}:ro", volume.source, volume.target)
        } else {
            format!("{}:{}", volume.source, volume.target)
        }
    }
}

impl BizService {
    /// Host ports this service claims on its server.
    #[must_use]
    pub fn host_ports(&self) -> Vec<u16> {
        self.ports.iter().map(|p| p.host).collect()
    }
}

impl Named for BizService {
    fn name(&self) -> &str {
        &self.name
    }
}

impl ServerBound for BizService {
    fn server(&self) -> &str {
        &self.server
    }
}

impl Validate for BizService {
    fn validate(&self) -> Result<(), FieldError> {
        require_name(&self.name)?;
        require("server", &self.server)?;
        require("image", &self.image)?;
        validate_ports(&self.ports)?;
        for (key, value) in &self.env {
            require("env", key)?;
            if let SecretValue::Ref { secret } = value {
                require(&format!("env.{key}.secret"), secret)?;
            }
        }
        validate_volumes(&self.volumes)?;
        if let Some(healthcheck) = &self.healthcheck {
            healthcheck.validate().map_err(|e| e.within("healthcheck"))?;
        }
        if let Some(resources) = &self.resources {
            resources.validate().map_err(|e| e.within("resources"))?;
        }
        for (i, route) in self.gateways.iter().enumerate() {
            route
                .validate()
                .map_err(|e| e.within(&format!("gateways[{i}]")))?;
        }
        Ok(())
    }
}

/// Validates every port mapping.
pub(crate) fn validate_ports(ports: &[PortMapping]) -> Result<(), FieldError> {
    for port in ports {
        require_port(port.host)?;
        require_port(port.container)?;
    }
    Ok(())
}

/// Validates every volume mount.
pub(crate) fn validate_volumes(volumes: &[VolumeMount]) -> Result<(), FieldError> {
    for (i, volume) in volumes.iter().enumerate() {
        require(&format!("volumes[{i}].source"), &volume.source)?;
        if !volume.target.starts_with('/') {
            return Err(FieldError::new(
                format!("volumes[{i}].target"),
                format!("mount path must be absolute: {}", volume.target),
            ));
        }
    }
    Ok(())
}

impl Validate for HealthCheck {
    fn validate(&self) -> Result<(), FieldError> {
        if self.test.is_empty() {
            return Err(FieldError::new("test", "is required"));
        }
        if self.retries == 0 {
            return Err(FieldError::new("retries", "must be at least 1"));
        }
        Ok(())
    }
}

impl Validate for ResourceLimits {
    fn validate(&self) -> Result<(), FieldError> {
        if let Some(cpus) = self.cpus
            && cpus <= 0.0
        {
            return Err(FieldError::new("cpus", "must be positive"));
        }
        if let Some(memory) = &self.memory
            && !is_valid_memory(memory)
        {
            return Err(FieldError::new("memory", format!("invalid size '{memory}'")));
        }
        Ok(())
    }
}

impl Validate for GatewayRoute {
    fn validate(&self) -> Result<(), FieldError> {
        if !is_valid_domain(&self.hostname) {
            return Err(FieldError::new(
                "hostname",
                format!("'{}' is not a valid domain name", self.hostname),
            ));
        }
        require_port(self.container_port)?;
        if !self.http && !self.https {
            return Err(FieldError::new("http", "route must enable http or https"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> BizService {
        BizService {
            name: String::from("api"),
            server: String::from("s1"),
            image: String::from("registry.example.com/api:1.2.0"),
            ports: vec![PortMapping::parse("8080:80").unwrap()],
            env: BTreeMap::new(),
            volumes: vec![],
            healthcheck: None,
            resources: None,
            gateways: vec![],
        }
    }

    #[test]
    fn test_port_mapping_parse() {
        let port = PortMapping::parse("8080:80/udp").unwrap();
        assert_eq!(port.host, 8080);
        assert_eq!(port.container, 80);
        assert_eq!(port.protocol, Protocol::Udp);

        let same = PortMapping::parse("9000").unwrap();
        assert_eq!((same.host, same.container), (9000, 9000));
        assert_eq!(same.protocol, Protocol::Tcp);

        assert!(PortMapping::parse("80:http").is_err());
        assert!(PortMapping::parse("80:80/sctp").is_err());
        assert!(PortMapping::parse("70000:80").is_err());
    }

    #[test]
    fn test_volume_parse() {
        let volume = VolumeMount::parse("./data:/var/lib/data:ro").unwrap();
        assert!(volume.read_only);
        assert_eq!(volume.target, "/var/lib/data");
        assert!(VolumeMount::parse("only-one").is_err());
        assert_eq!(String::from(volume), "./data:/var/lib/data:ro");
    }

    #[test]
    fn test_valid_service() {
        assert!(service().validate().is_ok());
    }

    #[test]
    fn test_port_zero_rejected() {
        let mut s = service();
        s.ports.push(PortMapping::parse("0:80").unwrap());
        assert_eq!(s.validate().unwrap_err().to_string(), "port 0: invalid port");
    }

    #[test]
    fn test_relative_volume_target_rejected() {
        let mut s = service();
        s.volumes.push(VolumeMount::parse("data:relative").unwrap());
        assert_eq!(s.validate().unwrap_err().field, "volumes[0].target");
    }

    #[test]
    fn test_gateway_route_rules() {
        let mut s = service();
        s.gateways.push(GatewayRoute {
            hostname: String::from("api.example.com"),
            container_port: 80,
            http: false,
            https: false,
        });
        assert_eq!(s.validate().unwrap_err().field, "gateways[0].http");

        s.gateways[0].https = true;
        assert!(s.validate().is_ok());

        s.gateways[0].hostname = String::from("not a host");
        assert_eq!(s.validate().unwrap_err().field, "gateways[0].hostname");
    }

    #[test]
    fn test_service_yaml() {
        let yaml = r"
name: api
server: s1
image: api:1
ports: ['8080:80']
env:
  PORT: 80
  DB_PASSWORD:
    secret: db
volumes: ['./data:/data']
gateways:
  - hostname: api.example.com
    container_port: 80
";
        let s: BizService = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(s.ports[0].host, 8080);
        assert_eq!(s.env["DB_PASSWORD"].secret_name(), Some("db"));
        assert!(s.gateways[0].http);
        assert!(!s.gateways[0].https);
        assert!(s.validate().is_ok());
    }
}
