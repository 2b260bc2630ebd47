//! Error types for the yamlops reconciliation engine.
//!
//! This module provides the error hierarchy for every stage of a run:
//! configuration loading and validation, remote observation, provider calls,
//! the local inventory ledger, and per-change apply failures.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the yamlops engine.
#[derive(Debug, Error)]
pub enum YoError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Remote execution errors.
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// DNS or certificate provider errors.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Inventory ledger errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Errors scoped to a single change during apply.
    #[error("Apply error: {0}")]
    Apply(#[from] ApplyError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Structural validation of one entity failed.
    #[error("{path}: {message}")]
    Invalid {
        /// Entity path, e.g. `services[2]`.
        path: String,
        /// Field and reason, e.g. `port 0: invalid port`.
        message: String,
    },

    /// Two entities of the same kind share a name.
    #[error("Duplicate {kind} name: {name}")]
    DuplicateName {
        /// Entity kind (server, service, ...).
        kind: String,
        /// The duplicated name.
        name: String,
    },

    /// A cross-entity reference does not resolve.
    #[error("{path}: referenced {kind} '{name}' not found")]
    MissingReference {
        /// Entity path holding the reference.
        path: String,
        /// Kind of the referenced entity.
        kind: String,
        /// The unresolved name.
        name: String,
    },

    /// Two entities claim the same port, hostname or DNS name.
    #[error("Conflict: {message}")]
    Conflict {
        /// Description of the conflict.
        message: String,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },
}

/// Remote execution errors.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Could not open a session to the server.
    #[error("Failed to connect to {server}: {message}")]
    ConnectionFailed {
        /// Server name.
        server: String,
        /// Description of the failure.
        message: String,
    },

    /// A remote command exited unsuccessfully.
    #[error("Command failed on {server} (exit {status:?}): {command}: {stderr}")]
    CommandFailed {
        /// Server name.
        server: String,
        /// The command that was run.
        command: String,
        /// Exit status, if the process reported one.
        status: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// A file upload failed.
    #[error("Failed to upload {remote_path} to {server}: {message}")]
    UploadFailed {
        /// Server name.
        server: String,
        /// Destination path on the server.
        remote_path: String,
        /// Description of the failure.
        message: String,
    },

    /// A remote operation exceeded its time budget.
    #[error("Timed out after {secs}s on {server}: {operation}")]
    Timeout {
        /// Server name.
        server: String,
        /// Operation that timed out.
        operation: String,
        /// Timeout in seconds.
        secs: u64,
    },

    /// The server has no usable SSH credential.
    #[error("No usable credential for {server}: {message}")]
    MissingCredential {
        /// Server name.
        server: String,
        /// Description of the problem.
        message: String,
    },
}

/// DNS and certificate provider errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider throttled the request.
    #[error("{provider} rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Provider name.
        provider: String,
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// The provider API returned an error status.
    #[error("{provider} API request failed: {status} - {message}")]
    Api {
        /// Provider name.
        provider: String,
        /// HTTP-like status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Network failure talking to the provider.
    #[error("Network error communicating with {provider}: {message}")]
    Network {
        /// Provider name.
        provider: String,
        /// Description of the network error.
        message: String,
    },

    /// No provider is registered for the ISP.
    #[error("No provider registered for ISP '{isp}'")]
    NotRegistered {
        /// ISP name.
        isp: String,
    },

    /// Certificate issuance failed.
    #[error("Certificate issuance failed: {message}")]
    Issuance {
        /// Description of the failure.
        message: String,
    },
}

/// Inventory ledger errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// Ledger is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// Lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },
}

/// Errors scoped to a single change.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The generated deployment artifact is missing locally.
    #[error("Deployment artifact not found: {path}")]
    MissingArtifact {
        /// Expected local path.
        path: PathBuf,
    },

    /// A referenced secret does not exist.
    #[error("Secret '{name}' not found")]
    MissingSecret {
        /// Secret name.
        name: String,
    },

    /// The change does not carry an owning server.
    #[error("Cannot resolve server for {kind} '{name}'")]
    UnresolvedServer {
        /// Entity kind.
        kind: String,
        /// Entity name.
        name: String,
    },

    /// A referenced entity is missing from the configuration.
    #[error("{kind} '{name}' not found in configuration")]
    MissingEntity {
        /// Entity kind.
        kind: String,
        /// Entity name.
        name: String,
    },

    /// The change carries no payload for its operation.
    #[error("Change for {kind} '{name}' carries no state")]
    MissingPayload {
        /// Entity kind.
        kind: String,
        /// Entity name.
        name: String,
    },

    /// The apply run was cancelled before this change started.
    #[error("cancelled before start")]
    Cancelled,
}

/// Result type alias for yamlops operations.
pub type Result<T> = std::result::Result<T, YoError>;

/// Markers in command output that indicate a transient transport failure.
const TRANSIENT_MARKERS: &[&str] = &[
    "connection reset",
    "connection refused",
    "connection timed out",
    "timed out",
    "broken pipe",
    "temporarily unavailable",
];

impl YoError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is transient and the operation may be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Remote(RemoteError::Timeout { .. } | RemoteError::ConnectionFailed { .. })
            | Self::Provider(ProviderError::RateLimited { .. } | ProviderError::Network { .. })
            | Self::State(StateError::LockFailed { .. }) => true,
            Self::Provider(ProviderError::Api { status, .. }) => *status >= 500 || *status == 429,
            Self::Remote(RemoteError::CommandFailed { stderr, .. }) => {
                let stderr = stderr.to_lowercase();
                TRANSIENT_MARKERS.iter().any(|m| stderr.contains(m))
            }
            _ => false,
        }
    }

    /// Returns the suggested retry delay in seconds, if the error carries one.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Provider(ProviderError::RateLimited { retry_after_secs, .. }) => {
                Some(*retry_after_secs)
            }
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for an entity path.
    #[must_use]
    pub fn invalid(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates an unresolved reference error.
    #[must_use]
    pub fn missing_reference(
        path: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::MissingReference {
            path: path.into(),
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }
}

impl RemoteError {
    /// Creates a command failure.
    #[must_use]
    pub fn command(
        server: impl Into<String>,
        command: impl Into<String>,
        status: Option<i32>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            server: server.into(),
            command: command.into(),
            status,
            stderr: stderr.into(),
        }
    }

    /// Creates a connection failure.
    #[must_use]
    pub fn connection(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            server: server.into(),
            message: message.into(),
        }
    }
}

impl StateError {
    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl ProviderError {
    /// Creates an API error.
    #[must_use]
    pub fn api(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            provider: provider.into(),
            message: message.into(),
        }
    }
}
