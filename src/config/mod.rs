//! Configuration module for the yamlops engine.
//!
//! This module handles all configuration-related functionality:
//! - The typed entity model and the `Config` aggregate
//! - Structural and whole-configuration validation
//! - Loading YAML files and directories
//! - Content fingerprints for drift detection

mod dns;
mod hash;
mod infra;
mod inventory;
mod parser;
mod rules;
mod server;
mod service;
mod settings;
mod spec;
mod validator;

pub use dns::{CertProvider, Certificate, DnsRecord, Domain, RecordType};
pub use hash::fingerprint;
pub use infra::{
    Gateway, GatewaySpec, InfraKind, InfraService, LogLevel, SslMode, SslSettings, SslSpec,
    WafConfig,
};
pub use inventory::{Isp, IspKind, Registry, Secret, SecretResolver, SecretValue, Zone};
pub use parser::{ConfigParser, DEFAULT_CONFIG_PATHS, find_config};
pub use rules::{is_valid_cidr, is_valid_domain, is_valid_name};
pub use server::{AptMirror, Server, ServerEnvironment, ServerIp, SshConfig};
pub use service::{
    BizService, GatewayRoute, HealthCheck, PortMapping, Protocol, ResourceLimits, VolumeMount,
};
pub use settings::{EngineSettings, REMOTE_COMPOSE_FILE, REMOTE_GATEWAY_FILE};
pub use spec::{Config, FieldError, FlatRecord, Named, ServerBound, Validate};
pub use validator::{ConfigValidator, ValidationResult};
