//! Inventory entities: secrets, ISPs, registries and zones.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ApplyError;

use super::rules::{require, require_name};
use super::spec::{FieldError, Named, Validate};

/// A named secret value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Secret {
    /// Secret name.
    pub name: String,
    /// Secret value.
    pub value: String,
}

/// A value that is either written inline or taken from a named secret.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
#[serde(from = "RawSecretValue")]
pub enum SecretValue {
    /// Reference to a [`Secret`] by name.
    Ref {
        /// Name of the referenced secret.
        secret: String,
    },
    /// Inline literal.
    Literal(String),
}

/// Accepts YAML scalars of any type for literals.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSecretValue {
    Ref { secret: String },
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl From<RawSecretValue> for SecretValue {
    fn from(raw: RawSecretValue) -> Self {
        match raw {
            RawSecretValue::Ref { secret } => Self::Ref { secret },
            RawSecretValue::Text(s) => Self::Literal(s),
            RawSecretValue::Integer(i) => Self::Literal(i.to_string()),
            RawSecretValue::Float(f) => Self::Literal(f.to_string()),
            RawSecretValue::Bool(b) => Self::Literal(b.to_string()),
        }
    }
}

impl SecretValue {
    /// Returns the referenced secret name, if this is a reference.
    #[must_use]
    pub fn secret_name(&self) -> Option<&str> {
        match self {
            Self::Ref { secret } => Some(secret),
            Self::Literal(_) => None,
        }
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ref { secret } => write!(f, "secret:{secret}"),
            Self::Literal(_) => write!(f, "<literal>"),
        }
    }
}

/// Resolves [`SecretValue`]s against the configured secrets.
#[derive(Debug, Clone, Default)]
pub struct SecretResolver {
    values: BTreeMap<String, String>,
}

impl SecretResolver {
    /// Builds a resolver from the configured secrets.
    #[must_use]
    pub fn new(secrets: &[Secret]) -> Self {
        Self {
            values: secrets
                .iter()
                .map(|s| (s.name.clone(), s.value.clone()))
                .collect(),
        }
    }

    /// Resolves a value to its plain text.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::MissingSecret`] if a referenced secret is unknown.
    pub fn resolve(&self, value: &SecretValue) -> Result<String, ApplyError> {
        match value {
            SecretValue::Literal(s) => Ok(s.clone()),
            SecretValue::Ref { secret } => {
                self.values
                    .get(secret)
                    .cloned()
                    .ok_or_else(|| ApplyError::MissingSecret {
                        name: secret.clone(),
                    })
            }
        }
    }
}

/// Supported cloud ISPs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum IspKind {
    /// Alibaba Cloud.
    Aliyun,
    /// Cloudflare.
    Cloudflare,
    /// Tencent Cloud.
    Tencent,
}

impl IspKind {
    /// Credential keys this ISP requires.
    #[must_use]
    pub const fn required_credentials(self) -> &'static [&'static str] {
        match self {
            Self::Aliyun => &["access_key_id", "access_key_secret"],
            Self::Cloudflare => &["api_token"],
            Self::Tencent => &["secret_id", "secret_key"],
        }
    }
}

impl fmt::Display for IspKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Aliyun => "aliyun",
            Self::Cloudflare => "cloudflare",
            Self::Tencent => "tencent",
        };
        write!(f, "{s}")
    }
}

/// A cloud ISP account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Isp {
    /// ISP name.
    pub name: String,
    /// ISP type.
    #[serde(rename = "type")]
    pub kind: IspKind,
    /// API credentials by key.
    #[serde(default)]
    pub credentials: BTreeMap<String, SecretValue>,
}

/// A container registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Registry {
    /// Registry name.
    pub name: String,
    /// Registry host, e.g. `registry.cn-hangzhou.aliyuncs.com`.
    pub url: String,
    /// Login user.
    pub username: String,
    /// Login password.
    pub password: SecretValue,
}

/// A zone groups servers under one ISP.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Zone {
    /// Zone name.
    pub name: String,
    /// Owning ISP name.
    pub isp: String,
    /// Provider region id.
    #[serde(default)]
    pub region: Option<String>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

impl Named for Secret {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Isp {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Registry {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Zone {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Validate for Secret {
    fn validate(&self) -> Result<(), FieldError> {
        require("name", &self.name)?;
        require("value", &self.value)
    }
}

impl Validate for Isp {
    fn validate(&self) -> Result<(), FieldError> {
        require_name(&self.name)?;
        for key in self.kind.required_credentials() {
            if !self.credentials.contains_key(*key) {
                return Err(FieldError::new(
                    format!("credentials.{key}"),
                    format!("is required for {} ISPs", self.kind),
                ));
            }
        }
        Ok(())
    }
}

impl Validate for Registry {
    fn validate(&self) -> Result<(), FieldError> {
        require_name(&self.name)?;
        require("url", &self.url)?;
        if self.url.contains("://") {
            return Err(FieldError::new("url", "must be a host without scheme"));
        }
        require("username", &self.username)?;
        if let SecretValue::Literal(p) = &self.password {
            require("password", p)?;
        }
        Ok(())
    }
}

impl Validate for Zone {
    fn validate(&self) -> Result<(), FieldError> {
        require_name(&self.name)?;
        require("isp", &self.isp)
    }
}
