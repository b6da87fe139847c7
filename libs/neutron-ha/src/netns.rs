// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Router namespace cleanup on a remote host
//!
//! After a router leaves a host its `qrouter-<id>` namespace can linger,
//! together with the keepalived / metadata proxy processes inside it.
//! [`RouterNamespaceCleanup`] removes it over a [`RemoteShell`] session:
//!
//! ```text
//! ListNamespaces --absent--> Done(NotPresent)
//!       |
//!    ListPids --none--> DeleteNamespace --> Done(Deleted | DeleteFailed)
//!       |                     ^
//!    KillPids --> ReconfirmPids --still running--> Done(Abandoned)
//! ```
//!
//! Each state knows the commands it issues and how their output selects the
//! next state, so transitions are tested without a shell. Nothing here
//! returns an error: connection problems and timeouts end the run as
//! [`CleanupOutcome::Abandoned`].

use std::time::Duration;

use crate::shell::{CommandOutput, RemoteShell, ShellSession};

/// Prefix of the namespace holding a router
pub const NAMESPACE_PREFIX: &str = "qrouter-";

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

pub fn namespace_name(router_id: &str) -> String {
    format!("{}{}", NAMESPACE_PREFIX, router_id)
}

/// Timeouts of one cleanup run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupConfig {
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

/// How a cleanup run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The namespace did not exist on the host
    NotPresent,
    /// The namespace was deleted after killing `killed` processes
    Deleted { killed: usize },
    /// `ip netns delete` exited non-zero
    DeleteFailed { exit_status: i32, stderr: String },
    /// The run stopped early: connection failure, timeout, or processes
    /// that survived the kill
    Abandoned { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupState {
    ListNamespaces,
    ListPids,
    KillPids(Vec<u32>),
    ReconfirmPids { killed: usize },
    DeleteNamespace { killed: usize },
    Done(CleanupOutcome),
}

impl CleanupState {
    /// Commands issued in this state, in order
    pub fn commands(&self, namespace: &str) -> Vec<String> {
        match self {
            Self::ListNamespaces => vec!["ip netns list".to_string()],
            Self::ListPids | Self::ReconfirmPids { .. } => {
                vec![format!("ip netns pids {}", namespace)]
            }
            Self::KillPids(pids) => pids.iter().map(|pid| format!("kill {}", pid)).collect(),
            Self::DeleteNamespace { .. } => vec![format!("ip netns delete {}", namespace)],
            Self::Done(_) => Vec::new(),
        }
    }

    /// Next state given the output of [`Self::commands`]
    pub fn advance(self, namespace: &str, outputs: &[CommandOutput]) -> CleanupState {
        match self {
            Self::ListNamespaces => match single(outputs) {
                Err(state) => state,
                Ok(out) if !out.success() => abandon(format!(
                    "listing namespaces failed with exit status {}",
                    out.exit_status
                )),
                Ok(out) if parse_namespaces(&out.stdout).any(|ns| ns == namespace) => {
                    Self::ListPids
                }
                Ok(_) => Self::Done(CleanupOutcome::NotPresent),
            },
            Self::ListPids => match single(outputs) {
                Err(state) => state,
                Ok(out) => {
                    let pids = parse_pids(&out.stdout);
                    if pids.is_empty() {
                        Self::DeleteNamespace { killed: 0 }
                    } else {
                        Self::KillPids(pids)
                    }
                }
            },
            // A pid that exited between listing and kill makes kill fail;
            // the reconfirmation decides.
            Self::KillPids(pids) => Self::ReconfirmPids { killed: pids.len() },
            Self::ReconfirmPids { killed } => match single(outputs) {
                Err(state) => state,
                Ok(out) => {
                    let remaining = parse_pids(&out.stdout);
                    if remaining.is_empty() {
                        Self::DeleteNamespace { killed }
                    } else {
                        abandon(format!("processes still running: {:?}", remaining))
                    }
                }
            },
            Self::DeleteNamespace { killed } => match single(outputs) {
                Err(state) => state,
                Ok(out) if out.success() => Self::Done(CleanupOutcome::Deleted { killed }),
                Ok(out) => Self::Done(CleanupOutcome::DeleteFailed {
                    exit_status: out.exit_status,
                    stderr: out.stderr.trim().to_string(),
                }),
            },
            done @ Self::Done(_) => done,
        }
    }
}

fn abandon(reason: String) -> CleanupState {
    CleanupState::Done(CleanupOutcome::Abandoned { reason })
}

fn single(outputs: &[CommandOutput]) -> Result<&CommandOutput, CleanupState> {
    match outputs {
        [out] => Ok(out),
        _ => Err(abandon(format!(
            "expected one command output, got {}",
            outputs.len()
        ))),
    }
}

/// Namespace names from `ip netns list`, whose lines may carry a
/// trailing ` (id: N)`
fn parse_namespaces(lines: &[String]) -> impl Iterator<Item = &str> {
    lines.iter().filter_map(|line| line.split_whitespace().next())
}

fn parse_pids(lines: &[String]) -> Vec<u32> {
    lines
        .iter()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}

/// Deletes one router's namespace on one host
#[derive(Debug, Clone)]
pub struct RouterNamespaceCleanup {
    host: String,
    router_id: String,
    namespace: String,
    config: CleanupConfig,
}

impl RouterNamespaceCleanup {
    pub fn new(
        host: impl Into<String>,
        router_id: impl Into<String>,
        config: CleanupConfig,
    ) -> Self {
        let router_id = router_id.into();
        Self {
            host: host.into(),
            namespace: namespace_name(&router_id),
            router_id,
            config,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Run the cleanup over a fresh session from `shell`
    ///
    /// The session is closed before returning, whatever the outcome.
    pub async fn delete_router_namespace(&self, shell: &dyn RemoteShell) -> CleanupOutcome {
        let outcome = match shell.connect(&self.host, self.config.connect_timeout).await {
            Ok(mut session) => {
                let outcome = self.run(session.as_mut()).await;
                session.close().await;
                outcome
            }
            Err(e) => CleanupOutcome::Abandoned {
                reason: e.to_string(),
            },
        };

        match &outcome {
            CleanupOutcome::NotPresent => tracing::info!(
                host = %self.host,
                router_id = %self.router_id,
                "Router namespace not present"
            ),
            CleanupOutcome::Deleted { killed } => tracing::info!(
                host = %self.host,
                namespace = %self.namespace,
                killed = killed,
                "Deleted router namespace"
            ),
            CleanupOutcome::DeleteFailed { exit_status, stderr } => tracing::warn!(
                host = %self.host,
                namespace = %self.namespace,
                exit_status = exit_status,
                stderr = %stderr,
                "Failed to delete router namespace"
            ),
            CleanupOutcome::Abandoned { reason } => tracing::warn!(
                host = %self.host,
                namespace = %self.namespace,
                reason = %reason,
                "Router namespace cleanup abandoned"
            ),
        }

        outcome
    }

    async fn run(&self, session: &mut dyn ShellSession) -> CleanupOutcome {
        let mut state = CleanupState::ListNamespaces;
        loop {
            if let CleanupState::Done(outcome) = state {
                return outcome;
            }

            let mut outputs = Vec::new();
            for command in state.commands(&self.namespace) {
                match session
                    .exec(&command, true, self.config.command_timeout)
                    .await
                {
                    Ok(output) => outputs.push(output),
                    Err(e) => {
                        return CleanupOutcome::Abandoned {
                            reason: e.to_string(),
                        };
                    }
                }
            }
            state = state.advance(&self.namespace, &outputs);
        }
    }
}
