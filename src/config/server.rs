//! Server entity: addressing, SSH access and host environment.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::inventory::SecretValue;
use super::rules::{is_valid_ip, require, require_name, require_port};
use super::spec::{FieldError, Named, Validate};

/// A managed host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Server {
    /// Server name.
    pub name: String,
    /// Zone this server belongs to.
    pub zone: String,
    /// Public and private addresses.
    #[serde(default)]
    pub ip: ServerIp,
    /// SSH connection descriptor.
    pub ssh: SshConfig,
    /// Host environment maintained by the engine.
    #[serde(default)]
    pub environment: ServerEnvironment,
}

/// Server addresses.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerIp {
    /// Public IP address.
    #[serde(default)]
    pub public: Option<String>,
    /// Private IP address.
    #[serde(default)]
    pub private: Option<String>,
}

/// SSH connection descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SshConfig {
    /// Host name or address.
    pub host: String,
    /// SSH port.
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// Login user.
    pub user: String,
    /// Password, inline or from a secret.
    #[serde(default)]
    pub password: Option<SecretValue>,
    /// Private key file; `~` expands to the home directory.
    #[serde(default)]
    pub key_file: Option<String>,
}

/// Host environment descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerEnvironment {
    /// APT mirror to configure.
    #[serde(default)]
    pub apt_mirror: Option<AptMirror>,
    /// Registries this host should stay logged in to.
    #[serde(default)]
    pub registries: Vec<String>,
}

/// APT mirror choice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum AptMirror {
    /// `mirrors.aliyun.com`.
    Aliyun,
    /// `mirrors.cloud.tencent.com`.
    Tencent,
    /// `mirrors.tuna.tsinghua.edu.cn`.
    Tsinghua,
    /// Any other mirror base URL.
    Custom(String),
}

const fn default_ssh_port() -> u16 {
    22
}

impl From<String> for AptMirror {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "aliyun" => Self::Aliyun,
            "tencent" => Self::Tencent,
            "tsinghua" => Self::Tsinghua,
            _ => Self::Custom(s),
        }
    }
}

impl From<AptMirror> for String {
    fn from(mirror: AptMirror) -> Self {
        match mirror {
            AptMirror::Aliyun => Self::from("aliyun"),
            AptMirror::Tencent => Self::from("tencent"),
            AptMirror::Tsinghua => Self::from("tsinghua"),
            AptMirror::Custom(url) => url,
        }
    }
}

impl AptMirror {
    /// Returns the mirror base URL.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Aliyun => "http://mirrors.aliyun.com",
            Self::Tencent => "http://mirrors.cloud.tencent.com",
            Self::Tsinghua => "https://mirrors.tuna.tsinghua.edu.cn",
            Self::Custom(url) => url.trim_end_matches('/'),
        }
    }
}

impl SshConfig {
    /// Returns the key file path with `~` expanded.
    #[must_use]
    pub fn key_path(&self) -> Option<PathBuf> {
        let raw = self.key_file.as_deref()?;
        match (raw.strip_prefix("~/"), dirs::home_dir()) {
            (Some(rest), Some(home)) => Some(home.join(rest)),
            _ => Some(PathBuf::from(raw)),
        }
    }

    /// Returns `user@host`.
    #[must_use]
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

impl Named for Server {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Validate for Server {
    fn validate(&self) -> Result<(), FieldError> {
        require_name(&self.name)?;
        require("zone", &self.zone)?;
        if let Some(public) = &self.ip.public
            && !is_valid_ip(public)
        {
            return Err(FieldError::new("ip.public", format!("'{public}' is not an IP address")));
        }
        if let Some(private) = &self.ip.private
            && !is_valid_ip(private)
        {
            return Err(FieldError::new(
                "ip.private",
                format!("'{private}' is not an IP address"),
            ));
        }
        self.ssh.validate().map_err(|e| e.within("ssh"))?;
        if let Some(AptMirror::Custom(url)) = &self.environment.apt_mirror
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return Err(FieldError::new(
                "environment.apt_mirror",
                format!("'{url}' is neither a known mirror nor an http(s) URL"),
            ));
        }
        for (i, registry) in self.environment.registries.iter().enumerate() {
            require(&format!("environment.registries[{i}]"), registry)?;
        }
        Ok(())
    }
}

impl Validate for SshConfig {
    fn validate(&self) -> Result<(), FieldError> {
        require("host", &self.host)?;
        require_port(self.port)?;
        require("user", &self.user)?;
        if let Some(SecretValue::Literal(p)) = &self.password {
            require("password", p)?;
        }
        Ok(())
    }
}
