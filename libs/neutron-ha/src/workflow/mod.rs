// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Failover operations
//!
//! Every operation returns the number of routers (or networks) it could not
//! handle. A failure on one item is logged, counted, and processing moves on
//! to the next. Only [`FailoverError`] aborts an operation.
//!
//! Items are processed strictly one after another: a router is moved,
//! waited for and cleaned up before the next one is looked at.

mod dhcp;
mod l3;

pub use dhcp::replicate_dhcp;
pub use l3::{l3_agent_check, l3_agent_evacuate, l3_agent_migrate, l3_agent_rebalance};

use std::sync::Arc;
use std::time::Duration;

use crate::error::{ClientError, FailoverError, MoveError};
use crate::netns::{CleanupConfig, RouterNamespaceCleanup};
use crate::neutron::NetworkControlPlane;
use crate::picker::AgentPicker;
use crate::shell::RemoteShell;
use crate::types::{Agent, FloatingIp, Port, STATUS_ACTIVE};

/// Bounds of the wait for a moved router to settle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            interval: Duration::from_secs(1),
        }
    }
}

/// Namespace cleanup run on the source host after each move
#[derive(Clone)]
pub struct NamespaceCleaner {
    pub shell: Arc<dyn RemoteShell>,
    pub config: CleanupConfig,
}

/// Options shared by every operation that moves routers
#[derive(Clone, Default)]
pub struct MoveOptions {
    /// Ask for an immediate transfer
    pub now: bool,
    /// Log intended moves without changing anything
    pub noop: bool,
    /// Wait for each moved router to settle on its destination
    pub wait_for_router: Option<WaitConfig>,
    pub cleanup: Option<NamespaceCleaner>,
}

/// Log a per-item failure and count it
pub(crate) fn record(errors: &mut usize, error: &MoveError) {
    tracing::error!(error = %error, "Failover step failed");
    *errors += 1;
}

/// Hand `candidates` to the picker and ask it for a destination
///
/// Returns `Ok(None)` after counting a recoverable failure.
pub(crate) async fn choose_destination<'p>(
    picker: Option<&mut (dyn AgentPicker + 'p)>,
    candidates: &[Agent],
    router_id: &str,
    errors: &mut usize,
) -> Result<Option<Agent>, FailoverError> {
    let Some(picker) = picker else {
        return Err(FailoverError::NoPicker {
            router_id: router_id.to_string(),
        });
    };

    let picked = match picker.set_agents(candidates.to_vec()).await {
        Ok(()) => picker.pick().await,
        Err(e) => Err(e),
    };

    match picked {
        Ok(agent) => Ok(Some(agent)),
        Err(e) if e.is_fatal() => Err(FailoverError::Pick(e)),
        Err(source) => {
            record(
                errors,
                &MoveError::Pick {
                    router_id: router_id.to_string(),
                    source,
                },
            );
            Ok(None)
        }
    }
}

/// Move one router from `source` to `destination`
///
/// The router is removed from the source first. When the destination then
/// refuses it, the router is put back on the source so it is never left
/// unbound; only a failed restore yields [`MoveError::Orphaned`].
pub async fn move_router(
    client: &dyn NetworkControlPlane,
    router_id: &str,
    source: &Agent,
    destination: &Agent,
    options: &MoveOptions,
) -> Result<(), MoveError> {
    if options.noop {
        tracing::info!(
            router_id = %router_id,
            source_agent_id = %source.id,
            agent_id = %destination.id,
            host = %destination.host,
            "Would move router (noop)"
        );
        return Ok(());
    }

    client
        .remove_router_from_agent(&source.id, router_id)
        .await
        .map_err(|source_err| MoveError::RemoveFailed {
            router_id: router_id.to_string(),
            agent_id: source.id.clone(),
            source: source_err,
        })?;

    if let Err(add_error) = client
        .add_router_to_agent(&destination.id, router_id, options.now)
        .await
    {
        tracing::warn!(
            router_id = %router_id,
            agent_id = %destination.id,
            error = %add_error,
            "Add failed, restoring router on source agent"
        );
        return Err(
            match client
                .add_router_to_agent(&source.id, router_id, options.now)
                .await
            {
                Ok(()) => MoveError::AddFailed {
                    router_id: router_id.to_string(),
                    agent_id: destination.id.clone(),
                    source_agent_id: source.id.clone(),
                    source: add_error,
                },
                Err(restore_error) => MoveError::Orphaned {
                    router_id: router_id.to_string(),
                    agent_id: destination.id.clone(),
                    source_agent_id: source.id.clone(),
                    add_error,
                    restore_error,
                },
            },
        );
    }

    tracing::info!(
        router_id = %router_id,
        source_agent_id = %source.id,
        agent_id = %destination.id,
        host = %destination.host,
        "Moved router"
    );

    let settled = match &options.wait_for_router {
        Some(wait) => wait_for_router(client, router_id, &destination.host, wait).await,
        None => Ok(()),
    };

    // The router has left the source either way, so its namespace there is
    // stale even when the destination has not settled yet.
    if let Some(cleaner) = &options.cleanup {
        RouterNamespaceCleanup::new(source.host.as_str(), router_id, cleaner.config)
            .delete_router_namespace(cleaner.shell.as_ref())
            .await;
    }

    settled
}

/// Poll until the router is settled on `host` or the wait times out
pub async fn wait_for_router(
    client: &dyn NetworkControlPlane,
    router_id: &str,
    host: &str,
    wait: &WaitConfig,
) -> Result<(), MoveError> {
    // A timeout too large to represent as an instant never expires
    let deadline = tokio::time::Instant::now().checked_add(wait.timeout);

    loop {
        let reason = match router_status(client, router_id).await {
            Ok((ports, floating_ips)) => match check_settled(&ports, &floating_ips, host) {
                Ok(()) => {
                    tracing::debug!(router_id = %router_id, host = %host, "Router settled");
                    return Ok(());
                }
                Err(reason) => reason,
            },
            Err(e) => e.to_string(),
        };

        if deadline.is_some_and(|deadline| tokio::time::Instant::now() >= deadline) {
            return Err(MoveError::NotSettled {
                router_id: router_id.to_string(),
                host: host.to_string(),
                reason,
            });
        }

        tracing::debug!(router_id = %router_id, reason = %reason, "Waiting for router");
        tokio::time::sleep(wait.interval).await;
    }
}

async fn router_status(
    client: &dyn NetworkControlPlane,
    router_id: &str,
) -> Result<(Vec<Port>, Vec<FloatingIp>), ClientError> {
    let ports = client.list_ports(router_id).await?;
    let floating_ips = client.list_floating_ips(router_id).await?;
    Ok((ports, floating_ips))
}

/// Whether a router's ports and floating IPs are active on `host`
///
/// Distributed ports exist on every host and are ignored.
pub fn check_settled(
    ports: &[Port],
    floating_ips: &[FloatingIp],
    host: &str,
) -> Result<(), String> {
    for port in ports.iter().filter(|port| !port.is_distributed()) {
        if port.binding_host_id != host {
            return Err(format!(
                "port {} is bound to host {:?}",
                port.id, port.binding_host_id
            ));
        }
        if port.status != STATUS_ACTIVE {
            return Err(format!("port {} is {}", port.id, port.status));
        }
    }

    match floating_ips.iter().find(|fip| fip.status != STATUS_ACTIVE) {
        Some(fip) => Err(format!("floating IP {} is {}", fip.id, fip.status)),
        None => Ok(()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::FailoverConfig;
    use crate::memory::InMemoryControlPlane;
    use crate::types::VIF_TYPE_DISTRIBUTED;

    fn port(host: &str, status: &str, vif_type: &str) -> Port {
        Port {
            id: "p1".to_string(),
            binding_host_id: host.to_string(),
            binding_vif_type: vif_type.to_string(),
            status: status.to_string(),
        }
    }

    fn fip(status: &str) -> FloatingIp {
        FloatingIp {
            id: "f1".to_string(),
            status: status.to_string(),
        }
    }

    #[test]
    fn active_ports_on_host_are_settled() {
        let ports = [port("net-1", "ACTIVE", "ovs")];
        assert_eq!(check_settled(&ports, &[fip("ACTIVE")], "net-1"), Ok(()));
    }

    #[test]
    fn port_on_another_host_is_not_settled() {
        let ports = [port("net-0", "ACTIVE", "ovs")];
        assert!(check_settled(&ports, &[], "net-1").is_err());
    }

    #[test]
    fn down_port_is_not_settled() {
        let ports = [port("net-1", "DOWN", "ovs")];
        assert_eq!(
            check_settled(&ports, &[], "net-1"),
            Err("port p1 is DOWN".to_string())
        );
    }

    #[test]
    fn distributed_ports_are_ignored() {
        let ports = [port("", "DOWN", VIF_TYPE_DISTRIBUTED)];
        assert_eq!(check_settled(&ports, &[], "net-1"), Ok(()));
    }

    #[test]
    fn inactive_floating_ip_is_not_settled() {
        let ports = [port("net-1", "ACTIVE", "ovs")];
        assert!(check_settled(&ports, &[fip("DOWN")], "net-1").is_err());
    }

    #[tokio::test]
    async fn unbounded_wait_returns_once_settled() {
        let plane = InMemoryControlPlane::new();
        plane.add_live_l3_agent("a1", "net-1");
        plane.add_router("a1", "r1");
        let config = FailoverConfig {
            wait_for_router_timeout_secs: u64::MAX,
            ..FailoverConfig::default()
        };

        let wait = config.wait_config();
        assert!(wait_for_router(&plane, "r1", "net-1", &wait).await.is_ok());
    }

    #[tokio::test]
    async fn unsettled_router_times_out() {
        let plane = InMemoryControlPlane::new();
        plane.add_live_l3_agent("a1", "net-1");
        plane.add_router("a1", "r1");
        plane.set_port_status("r1", "DOWN");
        let wait = WaitConfig {
            timeout: Duration::ZERO,
            interval: Duration::from_millis(1),
        };

        let err = wait_for_router(&plane, "r1", "net-1", &wait).await.unwrap_err();
        assert!(matches!(err, MoveError::NotSettled { .. }));
    }

    #[test]
    fn default_options_move_without_waiting() {
        let options = MoveOptions::default();
        assert!(!options.now);
        assert!(!options.noop);
        assert!(options.wait_for_router.is_none());
        assert!(options.cleanup.is_none());
    }
}
