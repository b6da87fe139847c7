// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

use std::collections::HashSet;

use super::{MoveOptions, record};
use crate::error::{FailoverError, MoveError};
use crate::neutron::NetworkControlPlane;
use crate::types::Agent;

/// Schedule every network on every alive DHCP agent that lacks it
///
/// Only `noop` is honoured from `options`.
pub async fn replicate_dhcp(
    client: &dyn NetworkControlPlane,
    options: &MoveOptions,
) -> Result<usize, FailoverError> {
    let dhcp_agents: Vec<Agent> = client
        .list_agents()
        .await
        .map_err(FailoverError::ListAgents)?
        .into_iter()
        .filter(|agent| agent.is_dhcp() && agent.is_alive_and_enabled())
        .collect();
    if dhcp_agents.is_empty() {
        tracing::warn!("No alive DHCP agents, nothing to replicate");
        return Ok(0);
    }

    let networks = client
        .list_networks()
        .await
        .map_err(FailoverError::ListNetworks)?;

    let mut errors = 0;
    let mut scheduled = 0;
    for network in &networks {
        let hosting: HashSet<String> = match client
            .list_dhcp_agents_hosting_network(&network.id)
            .await
        {
            Ok(agents) => agents.into_iter().map(|agent| agent.id).collect(),
            Err(source) => {
                record(
                    &mut errors,
                    &MoveError::ListDhcpAgents {
                        network_id: network.id.clone(),
                        source,
                    },
                );
                continue;
            }
        };

        for agent in dhcp_agents.iter().filter(|agent| !hosting.contains(&agent.id)) {
            if options.noop {
                tracing::info!(
                    network_id = %network.id,
                    agent_id = %agent.id,
                    host = %agent.host,
                    "Would schedule network on DHCP agent (noop)"
                );
                continue;
            }

            match client.add_network_to_dhcp_agent(&agent.id, &network.id).await {
                Ok(()) => {
                    tracing::info!(
                        network_id = %network.id,
                        agent_id = %agent.id,
                        host = %agent.host,
                        "Scheduled network on DHCP agent"
                    );
                    scheduled += 1;
                }
                Err(source) => record(
                    &mut errors,
                    &MoveError::DhcpSchedule {
                        network_id: network.id.clone(),
                        agent_id: agent.id.clone(),
                        source,
                    },
                ),
            }
        }
    }

    tracing::info!(
        networks = networks.len(),
        scheduled = scheduled,
        errors = errors,
        "DHCP replication finished"
    );
    Ok(errors)
}
