// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Remote shell transport
//!
//! [`SshShell`] drives the system OpenSSH client. Connecting starts a
//! multiplexed control master in the background, and every command after
//! that reuses the control socket, so a cleanup run pays for one handshake
//! no matter how many commands it issues.

use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use thiserror::Error;
use tokio::process::Command;

/// Result of one remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_status: i32,
    /// Standard output split into lines, carriage returns removed
    pub stdout: Vec<String>,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("connection to {host} timed out after {timeout:?}")]
    ConnectTimeout { host: String, timeout: Duration },

    #[error("connection to {host} failed: {reason}")]
    ConnectFailed { host: String, reason: String },

    #[error("command `{command}` timed out after {timeout:?}")]
    CommandTimeout { command: String, timeout: Duration },

    #[error("failed to run ssh: {0}")]
    Io(#[from] std::io::Error),
}

/// Opens sessions on remote hosts
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn connect(
        &self,
        host: &str,
        timeout: Duration,
    ) -> Result<Box<dyn ShellSession>, ShellError>;
}

/// An open session on one remote host
#[async_trait]
pub trait ShellSession: Send {
    /// Run one command. `pty` requests pseudo-terminal allocation.
    async fn exec(
        &mut self,
        command: &str,
        pty: bool,
        timeout: Duration,
    ) -> Result<CommandOutput, ShellError>;

    /// Release the session. Safe to call more than once.
    async fn close(&mut self);
}

/// OpenSSH based [`RemoteShell`]
#[derive(Debug, Clone)]
pub struct SshShell {
    user: String,
    identity: Option<PathBuf>,
    options: Vec<String>,
}

impl SshShell {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            identity: None,
            options: Vec::new(),
        }
    }

    /// Use an identity file instead of the agent / default keys
    pub fn with_identity(mut self, identity: impl Into<PathBuf>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Extra `-o` options passed to every ssh invocation
    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn connect(
        &self,
        host: &str,
        timeout: Duration,
    ) -> Result<Box<dyn ShellSession>, ShellError> {
        let control_dir = tempfile::Builder::new()
            .prefix("neutron-ha-ssh-")
            .tempdir()?;
        let control_path = control_dir.path().join("control");
        let target = format!("{}@{}", self.user, host);

        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", timeout.as_secs().max(1)))
            .arg("-o")
            .arg("ControlMaster=yes")
            .arg("-o")
            .arg(format!("ControlPath={}", control_path.display()))
            .arg("-o")
            .arg("ControlPersist=yes");
        if let Some(identity) = &self.identity {
            cmd.arg("-i").arg(identity);
        }
        for opt in &self.options {
            cmd.arg("-o").arg(opt);
        }
        // -N: no remote command, -f: background once authenticated
        cmd.arg("-N").arg("-f").arg(&target);

        tracing::debug!(host = %host, "Opening ssh control connection");

        // The backgrounded master keeps its stdio open, so waiting on piped
        // output would block until it exits. Collect stderr in a file.
        let log_path = control_dir.path().join("connect.log");
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(std::fs::File::create(&log_path)?)
            .kill_on_drop(true);

        let status = match tokio::time::timeout(timeout, cmd.status()).await {
            Ok(status) => status?,
            Err(_) => {
                return Err(ShellError::ConnectTimeout {
                    host: host.to_string(),
                    timeout,
                });
            }
        };

        if !status.success() {
            let reason = std::fs::read_to_string(&log_path).unwrap_or_default();
            return Err(ShellError::ConnectFailed {
                host: host.to_string(),
                reason: reason.trim().to_string(),
            });
        }

        Ok(Box::new(SshSession {
            host: host.to_string(),
            target,
            control_path,
            _control_dir: control_dir,
            closed: false,
        }))
    }
}

/// Session multiplexed over an ssh control socket
struct SshSession {
    host: String,
    target: String,
    control_path: PathBuf,
    _control_dir: TempDir,
    closed: bool,
}

impl SshSession {
    fn command(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg(format!("ControlPath={}", self.control_path.display()))
            .arg("-o")
            .arg("BatchMode=yes");
        cmd
    }
}

#[async_trait]
impl ShellSession for SshSession {
    async fn exec(
        &mut self,
        command: &str,
        pty: bool,
        timeout: Duration,
    ) -> Result<CommandOutput, ShellError> {
        let mut cmd = self.command();
        if pty {
            // stdin is not a terminal, so a single -t would be ignored
            cmd.arg("-tt");
        }
        cmd.arg(&self.target).arg("--").arg(command);

        tracing::debug!(host = %self.host, command = %command, "Running remote command");

        let output = match run(cmd, timeout).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(ShellError::CommandTimeout {
                    command: command.to_string(),
                    timeout,
                });
            }
        };

        Ok(CommandOutput {
            exit_status: output.status.code().unwrap_or(-1),
            stdout: split_lines(&output.stdout),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let mut cmd = self.command();
        cmd.arg("-O").arg("exit").arg(&self.target);
        match run(cmd, Duration::from_secs(5)).await {
            Ok(Ok(_)) => tracing::debug!(host = %self.host, "Closed ssh control connection"),
            Ok(Err(e)) => tracing::warn!(
                host = %self.host,
                error = %e,
                "Failed to close ssh control connection"
            ),
            Err(_) => tracing::warn!(host = %self.host, "Timed out closing ssh control connection"),
        }
    }
}

/// Run a command to completion, killing it if the timeout elapses first
async fn run(
    mut cmd: Command,
    timeout: Duration,
) -> Result<std::io::Result<Output>, tokio::time::error::Elapsed> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    tokio::time::timeout(timeout, cmd.output()).await
}

/// Split raw output into lines, dropping the `\r` a pty adds
fn split_lines(raw: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(raw)
        .lines()
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect()
}
