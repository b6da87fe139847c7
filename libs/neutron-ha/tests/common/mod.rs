// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Shared fixtures for the integration tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use neutron_ha::memory::InMemoryControlPlane;
use neutron_ha::shell::{CommandOutput, RemoteShell, ShellError, ShellSession};

/// Control plane with `live-agent-N` and `dead-agent-N` L3 agents
pub fn setup_control_plane(live_agents: usize, dead_agents: usize) -> Arc<InMemoryControlPlane> {
    let plane = Arc::new(InMemoryControlPlane::new());
    for i in 0..live_agents {
        plane.add_live_l3_agent(
            &format!("live-agent-{}", i),
            &format!("live-agent-{}-host", i),
        );
    }
    for i in 0..dead_agents {
        plane.add_dead_l3_agent(
            &format!("dead-agent-{}", i),
            &format!("dead-agent-{}-host", i),
        );
    }
    plane
}

pub fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[derive(Default)]
struct Host {
    namespaces: Vec<String>,
    pids: Vec<u32>,
    connects: Vec<String>,
    commands: Vec<(String, bool)>,
    closes: usize,
    connect_times_out: bool,
    timeout_on: Option<String>,
}

/// A fake remote host that answers the `ip netns` commands
///
/// Killing a pid removes it and deleting a namespace removes it, so a
/// second listing reflects what the cleanup did.
#[derive(Clone, Default)]
pub struct ScriptedShell {
    host: Arc<Mutex<Host>>,
}

impl ScriptedShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespaces(self, namespaces: &[&str]) -> Self {
        self.host().namespaces = ids(namespaces);
        self
    }

    pub fn with_pids(self, pids: &[u32]) -> Self {
        self.host().pids = pids.to_vec();
        self
    }

    pub fn connect_times_out(self) -> Self {
        self.host().connect_times_out = true;
        self
    }

    /// Time out every command starting with `prefix`
    pub fn command_times_out(self, prefix: &str) -> Self {
        self.host().timeout_on = Some(prefix.to_string());
        self
    }

    fn host(&self) -> MutexGuard<'_, Host> {
        self.host.lock().unwrap()
    }

    pub fn commands(&self) -> Vec<String> {
        self.host().commands.iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn all_with_pty(&self) -> bool {
        self.host().commands.iter().all(|(_, pty)| *pty)
    }

    pub fn connects(&self) -> Vec<String> {
        self.host().connects.clone()
    }

    pub fn closes(&self) -> usize {
        self.host().closes
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.host().namespaces.clone()
    }
}

#[async_trait]
impl RemoteShell for ScriptedShell {
    async fn connect(
        &self,
        host: &str,
        timeout: Duration,
    ) -> Result<Box<dyn ShellSession>, ShellError> {
        let mut state = self.host();
        state.connects.push(host.to_string());
        if state.connect_times_out {
            return Err(ShellError::ConnectTimeout {
                host: host.to_string(),
                timeout,
            });
        }
        Ok(Box::new(ScriptedSession {
            host: self.host.clone(),
        }))
    }
}

struct ScriptedSession {
    host: Arc<Mutex<Host>>,
}

fn ok(stdout: Vec<String>) -> CommandOutput {
    CommandOutput {
        exit_status: 0,
        stdout,
        stderr: String::new(),
    }
}

#[async_trait]
impl ShellSession for ScriptedSession {
    async fn exec(
        &mut self,
        command: &str,
        pty: bool,
        timeout: Duration,
    ) -> Result<CommandOutput, ShellError> {
        let mut host = self.host.lock().unwrap();
        host.commands.push((command.to_string(), pty));

        if host
            .timeout_on
            .as_deref()
            .is_some_and(|prefix| command.starts_with(prefix))
        {
            return Err(ShellError::CommandTimeout {
                command: command.to_string(),
                timeout,
            });
        }

        let words: Vec<&str> = command.split_whitespace().collect();
        let output = match words.as_slice() {
            ["ip", "netns", "list"] => ok(host
                .namespaces
                .iter()
                .enumerate()
                .map(|(i, ns)| format!("{} (id: {})", ns, i))
                .collect()),
            ["ip", "netns", "pids", _] => ok(host.pids.iter().map(|p| p.to_string()).collect()),
            ["kill", pid] => {
                let pid: u32 = pid.parse().unwrap();
                host.pids.retain(|p| *p != pid);
                ok(Vec::new())
            }
            ["ip", "netns", "delete", ns] => {
                let ns = ns.to_string();
                host.namespaces.retain(|n| *n != ns);
                ok(Vec::new())
            }
            _ => CommandOutput {
                exit_status: 127,
                stdout: Vec::new(),
                stderr: format!("{}: command not found", command),
            },
        };
        Ok(output)
    }

    async fn close(&mut self) {
        self.host.lock().unwrap().closes += 1;
    }
}
