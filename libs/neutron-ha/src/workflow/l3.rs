// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! L3 agent operations: check, migrate, evacuate, rebalance

use std::collections::HashSet;

use super::{MoveOptions, choose_destination, move_router, record};
use crate::error::{FailoverError, MoveError};
use crate::filter::RouterFilter;
use crate::neutron::NetworkControlPlane;
use crate::picker::AgentPicker;
use crate::types::Agent;

async fn l3_agents(client: &dyn NetworkControlPlane) -> Result<Vec<Agent>, FailoverError> {
    let agents = client
        .list_agents()
        .await
        .map_err(FailoverError::ListAgents)?;
    Ok(agents.into_iter().filter(Agent::is_l3).collect())
}

/// Router ids on an agent, or `None` after counting the listing failure
async fn router_ids_on(
    client: &dyn NetworkControlPlane,
    agent: &Agent,
    errors: &mut usize,
) -> Option<Vec<String>> {
    match client.list_routers_on_agent(&agent.id).await {
        Ok(routers) => Some(routers.into_iter().map(|router| router.id).collect()),
        Err(source) => {
            record(
                errors,
                &MoveError::ListRouters {
                    agent_id: agent.id.clone(),
                    source,
                },
            );
            None
        }
    }
}

/// Count the routers stranded on dead or disabled L3 agents
pub async fn l3_agent_check(client: &dyn NetworkControlPlane) -> Result<usize, FailoverError> {
    let agents = l3_agents(client).await?;
    let mut errors = 0;

    for agent in agents.iter().filter(|agent| !agent.is_alive_and_enabled()) {
        let Some(router_ids) = router_ids_on(client, agent, &mut errors).await else {
            continue;
        };
        for router_id in &router_ids {
            tracing::warn!(
                agent_id = %agent.id,
                host = %agent.host,
                router_id = %router_id,
                "Router hosted on dead or disabled L3 agent"
            );
        }
        errors += router_ids.len();
    }

    if errors == 0 {
        tracing::info!("All routers are hosted on alive L3 agents");
    }
    Ok(errors)
}

/// Move every router off dead or disabled L3 agents
pub async fn l3_agent_migrate(
    client: &dyn NetworkControlPlane,
    mut picker: Option<&mut dyn AgentPicker>,
    filter: &dyn RouterFilter,
    options: &MoveOptions,
) -> Result<usize, FailoverError> {
    let agents = l3_agents(client).await?;
    let (alive, dead): (Vec<Agent>, Vec<Agent>) = agents
        .into_iter()
        .partition(Agent::is_alive_and_enabled);

    if dead.is_empty() {
        tracing::info!("No dead or disabled L3 agents, nothing to migrate");
        return Ok(0);
    }

    let candidates: Vec<Agent> = alive
        .into_iter()
        .filter(Agent::can_host_routers)
        .collect();
    if candidates.is_empty() {
        tracing::error!(
            dead_agents = dead.len(),
            "No alive L3 agent left to migrate routers to"
        );
        return Ok(1);
    }

    let mut errors = 0;
    for agent in &dead {
        let Some(router_ids) = router_ids_on(client, agent, &mut errors).await else {
            continue;
        };
        let router_ids = filter.filter_routers(router_ids);
        tracing::info!(
            agent_id = %agent.id,
            host = %agent.host,
            routers = router_ids.len(),
            "Migrating routers off dead agent"
        );

        for router_id in &router_ids {
            let Some(destination) =
                choose_destination(picker.as_deref_mut(), &candidates, router_id, &mut errors)
                    .await?
            else {
                continue;
            };
            if let Err(e) = move_router(client, router_id, agent, &destination, options).await {
                record(&mut errors, &e);
            }
        }
    }

    Ok(errors)
}

/// Move every router off the L3 agent running on `host`
pub async fn l3_agent_evacuate(
    client: &dyn NetworkControlPlane,
    host: &str,
    mut picker: Option<&mut dyn AgentPicker>,
    filter: &dyn RouterFilter,
    options: &MoveOptions,
) -> Result<usize, FailoverError> {
    let agents = l3_agents(client).await?;

    let Some(source) = agents.iter().find(|agent| agent.host == host).cloned() else {
        tracing::warn!(host = %host, "No L3 agent on host, nothing to evacuate");
        return Ok(0);
    };

    let candidates: Vec<Agent> = agents
        .into_iter()
        .filter(|agent| agent.id != source.id && agent.can_host_routers())
        .collect();
    if candidates.is_empty() {
        tracing::error!(host = %host, "No other alive L3 agent to evacuate routers to");
        return Ok(1);
    }

    let mut errors = 0;
    let Some(router_ids) = router_ids_on(client, &source, &mut errors).await else {
        return Ok(errors);
    };
    let router_ids = filter.filter_routers(router_ids);
    tracing::info!(
        agent_id = %source.id,
        host = %host,
        routers = router_ids.len(),
        "Evacuating L3 agent"
    );

    for router_id in &router_ids {
        let Some(destination) =
            choose_destination(picker.as_deref_mut(), &candidates, router_id, &mut errors).await?
        else {
            continue;
        };
        if let Err(e) = move_router(client, router_id, &source, &destination, options).await {
            record(&mut errors, &e);
        }
    }

    Ok(errors)
}

/// Even out router counts across alive L3 agents
///
/// Moves one router at a time from the busiest agent to the least busy one
/// until they differ by at most one router, or the busiest agent has no
/// router left that the filter allows. A router that fails to move is not
/// tried again in the same run.
pub async fn l3_agent_rebalance(
    client: &dyn NetworkControlPlane,
    filter: &dyn RouterFilter,
    options: &MoveOptions,
) -> Result<usize, FailoverError> {
    let agents: Vec<Agent> = l3_agents(client)
        .await?
        .into_iter()
        .filter(Agent::can_host_routers)
        .collect();
    if agents.len() < 2 {
        tracing::info!(agents = agents.len(), "Not enough alive L3 agents to rebalance");
        return Ok(0);
    }

    let mut errors = 0;
    let mut hosted: Vec<Vec<String>> = Vec::with_capacity(agents.len());
    for agent in &agents {
        let Some(router_ids) = router_ids_on(client, agent, &mut errors).await else {
            // Balancing against a partial picture would pile routers onto
            // the agent that could not be listed.
            return Ok(errors);
        };
        hosted.push(router_ids);
    }

    let mut skipped: HashSet<String> = HashSet::new();
    loop {
        let (Some(busiest), Some(idlest)) = (busiest_index(&hosted), idlest_index(&hosted)) else {
            break;
        };
        if hosted[busiest].len() <= hosted[idlest].len() + 1 {
            break;
        }

        let Some(router_id) = filter
            .filter_routers(hosted[busiest].clone())
            .into_iter()
            .find(|id| !skipped.contains(id))
        else {
            tracing::info!(
                agent_id = %agents[busiest].id,
                "No movable router left on busiest agent"
            );
            break;
        };

        let moved = match move_router(
            client,
            &router_id,
            &agents[busiest],
            &agents[idlest],
            options,
        )
        .await
        {
            Ok(()) => true,
            Err(e) => {
                record(&mut errors, &e);
                skipped.insert(router_id.clone());
                matches!(e, MoveError::NotSettled { .. })
            }
        };
        if moved {
            hosted[busiest].retain(|id| *id != router_id);
            hosted[idlest].push(router_id);
        }
    }

    let counts: Vec<(&str, usize)> = agents
        .iter()
        .zip(&hosted)
        .map(|(agent, ids)| (agent.id.as_str(), ids.len()))
        .collect();
    tracing::info!(counts = ?counts, "Rebalance finished");
    Ok(errors)
}

/// Index of the agent with the most routers, first one on ties
fn busiest_index(hosted: &[Vec<String>]) -> Option<usize> {
    hosted
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, usize)>, (i, ids)| match best {
            Some((_, most)) if most >= ids.len() => best,
            _ => Some((i, ids.len())),
        })
        .map(|(i, _)| i)
}

/// Index of the agent with the fewest routers, first one on ties
fn idlest_index(hosted: &[Vec<String>]) -> Option<usize> {
    hosted
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, usize)>, (i, ids)| match best {
            Some((_, least)) if least <= ids.len() => best,
            _ => Some((i, ids.len())),
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosted(counts: &[usize]) -> Vec<Vec<String>> {
        counts
            .iter()
            .map(|n| (0..*n).map(|i| format!("r{}", i)).collect())
            .collect()
    }

    #[test]
    fn busiest_and_idlest_prefer_first_on_ties() {
        let h = hosted(&[2, 3, 3, 0, 0]);
        assert_eq!(busiest_index(&h), Some(1));
        assert_eq!(idlest_index(&h), Some(3));
    }

    #[test]
    fn no_agents_no_index() {
        assert_eq!(busiest_index(&[]), None);
        assert_eq!(idlest_index(&[]), None);
    }
}
