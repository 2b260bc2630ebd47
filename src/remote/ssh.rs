//! OpenSSH command-line transport.
//!
//! Each session keeps one multiplexed master connection (`ControlMaster`)
//! whose socket lives in a private temporary directory, so consecutive
//! commands to the same server reuse a single TCP connection. Password
//! authentication goes through `sshpass -e`, which reads `SSHPASS` from the
//! environment of the child process only.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

use crate::config::Server;
use crate::error::{RemoteError, Result};

use super::{CommandOutput, Connector, RemoteSession, shell_quote};

/// SSH exits with 255 when the connection itself failed.
const SSH_CONNECTION_ERROR: i32 = 255;

/// Opens [`OpenSshSession`]s using the system `ssh` and `scp` binaries.
#[derive(Debug, Clone)]
pub struct OpenSshConnector {
    connect_timeout: Duration,
    command_timeout: Duration,
}

/// A session to one server over OpenSSH.
pub struct OpenSshSession {
    server: String,
    destination: String,
    port: u16,
    key_file: Option<PathBuf>,
    password: Option<String>,
    connect_timeout: Duration,
    command_timeout: Duration,
    control_dir: TempDir,
}

impl OpenSshConnector {
    /// Creates a connector with the given time budgets.
    #[must_use]
    pub const fn new(connect_timeout: Duration, command_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            command_timeout,
        }
    }
}

#[async_trait]
impl Connector for OpenSshConnector {
    async fn connect(
        &self,
        server: &Server,
        password: Option<String>,
    ) -> Result<Arc<dyn RemoteSession>> {
        let control_dir = tempfile::Builder::new()
            .prefix("yo-ssh-")
            .tempdir()
            .map_err(|e| RemoteError::connection(&server.name, format!("control dir: {e}")))?;

        let session = OpenSshSession {
            server: server.name.clone(),
            destination: server.ssh.destination(),
            port: server.ssh.port,
            key_file: server.ssh.key_path(),
            password,
            connect_timeout: self.connect_timeout,
            command_timeout: self.command_timeout,
            control_dir,
        };

        debug!("Opening SSH session to {} ({})", session.server, session.destination);
        session.run_with_timeout("true", self.connect_timeout).await?;
        Ok(Arc::new(session))
    }
}

impl fmt::Debug for OpenSshSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenSshSession")
            .field("server", &self.server)
            .field("destination", &self.destination)
            .field("port", &self.port)
            .field("key_file", &self.key_file)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl OpenSshSession {
    fn control_path(&self) -> PathBuf {
        self.control_dir.path().join("cm")
    }

    /// Options shared by `ssh` and `scp`.
    fn common_options(&self) -> Vec<String> {
        let mut opts = vec![
            String::from("-o"),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
            String::from("-o"),
            String::from("StrictHostKeyChecking=accept-new"),
            String::from("-o"),
            String::from("ControlMaster=auto"),
            String::from("-o"),
            format!("ControlPath={}", self.control_path().display()),
            String::from("-o"),
            String::from("ControlPersist=120"),
        ];
        if self.password.is_none() {
            opts.push(String::from("-o"));
            opts.push(String::from("BatchMode=yes"));
        }
        if let Some(key) = &self.key_file {
            opts.push(String::from("-i"));
            opts.push(key.display().to_string());
        }
        opts
    }

    /// Builds `program`, wrapped in `sshpass -e` when a password is set.
    fn command(&self, program: &str) -> Command {
        let mut cmd = if let Some(password) = &self.password {
            let mut cmd = Command::new("sshpass");
            cmd.arg("-e").arg(program).env("SSHPASS", password);
            cmd
        } else {
            Command::new(program)
        };
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn output(&self, mut cmd: Command, operation: &str, limit: Duration) -> Result<Output> {
        match tokio::time::timeout(limit, cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(RemoteError::connection(&self.server, format!("{operation}: {e}")).into()),
            Err(_) => Err(RemoteError::Timeout {
                server: self.server.clone(),
                operation: operation.to_string(),
                secs: limit.as_secs(),
            }
            .into()),
        }
    }

    async fn run_with_timeout(&self, command: &str, limit: Duration) -> Result<CommandOutput> {
        let mut cmd = self.command("ssh");
        cmd.arg("-p")
            .arg(self.port.to_string())
            .args(self.common_options())
            .arg(&self.destination)
            .arg("--")
            .arg(command);

        debug!("[{}] $ {command}", self.server);
        let output = self.output(cmd, command, limit).await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        match output.status.code() {
            Some(0) => Ok(CommandOutput { stdout, stderr }),
            Some(SSH_CONNECTION_ERROR) => {
                Err(RemoteError::connection(&self.server, stderr.trim()).into())
            }
            status => Err(RemoteError::command(&self.server, command, status, stderr.trim()).into()),
        }
    }
}

#[async_trait]
impl RemoteSession for OpenSshSession {
    async fn run(&self, command: &str) -> Result<CommandOutput> {
        self.run_with_timeout(command, self.command_timeout).await
    }

    async fn upload_file(&self, local: &Path, remote: &str) -> Result<()> {
        let mut cmd = self.command("scp");
        cmd.arg("-q")
            .arg("-P")
            .arg(self.port.to_string())
            .args(self.common_options())
            .arg(local)
            .arg(format!("{}:{remote}", self.destination));

        debug!("[{}] upload {} -> {remote}", self.server, local.display());
        let output = self.output(cmd, "scp", self.command_timeout).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(RemoteError::UploadFailed {
                server: self.server.clone(),
                remote_path: remote.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into())
        }
    }

    async fn mkdir_all(&self, remote: &str) -> Result<()> {
        self.run(&format!("mkdir -p {}", shell_quote(remote)))
            .await
            .map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        if !self.control_path().exists() {
            return Ok(());
        }
        let mut cmd = Command::new("ssh");
        cmd.arg("-O")
            .arg("exit")
            .arg("-o")
            .arg(format!("ControlPath={}", self.control_path().display()))
            .arg(&self.destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        // The master may already be gone; the socket directory is removed on drop.
        let _ = self.output(cmd, "close", self.connect_timeout).await;
        debug!("Closed SSH session to {}", self.server);
        Ok(())
    }
}
