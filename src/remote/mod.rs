//! Remote execution capability.
//!
//! The engine only needs four operations from a server: run a command,
//! upload a file, create a directory tree and close the session. Any
//! transport that provides them can back an apply run; [`ssh`] is the
//! OpenSSH-based one used by the CLI.

mod retry;
pub mod ssh;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::config::Server;
use crate::error::Result;

pub use retry::RetryPolicy;
pub use ssh::OpenSshConnector;

/// Captured output of a successful remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

/// An open session to one server.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Runs a shell command.
    ///
    /// A non-zero exit status is reported as
    /// [`crate::error::RemoteError::CommandFailed`].
    async fn run(&self, command: &str) -> Result<CommandOutput>;

    /// Uploads a local file to a remote path.
    async fn upload_file(&self, local: &Path, remote: &str) -> Result<()>;

    /// Creates a remote directory and its parents.
    async fn mkdir_all(&self, remote: &str) -> Result<()>;

    /// Closes the session.
    async fn close(&self) -> Result<()>;
}

/// Opens sessions to servers.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a session; `password` is the resolved SSH password, if any.
    async fn connect(&self, server: &Server, password: Option<String>)
    -> Result<Arc<dyn RemoteSession>>;
}

/// Quotes a value for a POSIX shell.
#[must_use]
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@,".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/data/yamlops/yo-dev-api"), "/data/yamlops/yo-dev-api");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }
}
