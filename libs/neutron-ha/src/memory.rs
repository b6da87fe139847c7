// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! In-process control plane for tests
//!
//! Nothing in the binary uses it; the workflow tests and the picker tests
//! drive it in place of a Neutron server.
//!
//! Keeps agents, routers and their bindings in memory and answers the
//! [`NetworkControlPlane`] contract from that state. Each router gets one
//! port bound to the host of the agent currently hosting it and one
//! floating IP, both `ACTIVE` unless overridden, which is what a healthy
//! Neutron reports once a move has settled.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::ClientError;
use crate::neutron::NetworkControlPlane;
use crate::types::{
    Agent, DHCP_AGENT_TYPE, FloatingIp, L3_AGENT_TYPE, Network, Port, Router, STATUS_ACTIVE,
};

#[derive(Default)]
struct State {
    agents: BTreeMap<String, Agent>,
    routers: HashMap<String, Router>,
    routers_by_agent: HashMap<String, BTreeSet<String>>,
    networks: BTreeMap<String, Network>,
    networks_by_dhcp_agent: HashMap<String, BTreeSet<String>>,
    port_status: HashMap<String, String>,
    failing_adds: HashSet<(String, String)>,
    failing_removes: HashSet<String>,
    calls: Vec<String>,
}

/// Control plane backed by in-memory maps
#[derive(Default)]
pub struct InMemoryControlPlane {
    state: Mutex<State>,
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::error!("In-memory control plane mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn add_agent(&self, agent: Agent) {
        self.state().agents.insert(agent.id.clone(), agent);
    }

    /// Add an alive, enabled L3 agent
    pub fn add_live_l3_agent(&self, id: &str, host: &str) {
        let mut configurations = Map::new();
        configurations.insert("agent_mode".to_string(), Value::from("legacy"));
        self.add_agent(Agent {
            id: id.to_string(),
            agent_type: L3_AGENT_TYPE.to_string(),
            alive: true,
            admin_state_up: true,
            host: host.to_string(),
            configurations,
        });
    }

    /// Add an L3 agent that is neither alive nor enabled
    pub fn add_dead_l3_agent(&self, id: &str, host: &str) {
        self.add_agent(Agent {
            id: id.to_string(),
            agent_type: L3_AGENT_TYPE.to_string(),
            alive: false,
            admin_state_up: false,
            host: host.to_string(),
            configurations: Map::new(),
        });
    }

    pub fn add_dhcp_agent(&self, id: &str, host: &str, alive: bool) {
        self.add_agent(Agent {
            id: id.to_string(),
            agent_type: DHCP_AGENT_TYPE.to_string(),
            alive,
            admin_state_up: true,
            host: host.to_string(),
            configurations: Map::new(),
        });
    }

    /// Bind a new router to an agent
    pub fn add_router(&self, agent_id: &str, router_id: &str) {
        let mut state = self.state();
        state.routers.insert(
            router_id.to_string(),
            Router {
                id: router_id.to_string(),
                properties: Map::new(),
            },
        );
        state
            .routers_by_agent
            .entry(agent_id.to_string())
            .or_default()
            .insert(router_id.to_string());
    }

    pub fn add_network(&self, network_id: &str) {
        self.state().networks.insert(
            network_id.to_string(),
            Network {
                id: network_id.to_string(),
                name: network_id.to_string(),
            },
        );
    }

    pub fn host_network(&self, dhcp_agent_id: &str, network_id: &str) {
        self.state()
            .networks_by_dhcp_agent
            .entry(dhcp_agent_id.to_string())
            .or_default()
            .insert(network_id.to_string());
    }

    /// Report the router's ports with the given status instead of `ACTIVE`
    pub fn set_port_status(&self, router_id: &str, status: &str) {
        self.state()
            .port_status
            .insert(router_id.to_string(), status.to_string());
    }

    /// Make every `add_router_to_agent(agent_id, router_id, _)` fail
    pub fn fail_add(&self, agent_id: &str, router_id: &str) {
        self.state()
            .failing_adds
            .insert((agent_id.to_string(), router_id.to_string()));
    }

    /// Make every removal of the router fail
    pub fn fail_remove(&self, router_id: &str) {
        self.state().failing_removes.insert(router_id.to_string());
    }

    /// Router ids bound to an agent, sorted
    pub fn routers_on(&self, agent_id: &str) -> Vec<String> {
        self.state()
            .routers_by_agent
            .get(agent_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Network ids hosted by a DHCP agent, sorted
    pub fn networks_on(&self, dhcp_agent_id: &str) -> Vec<String> {
        self.state()
            .networks_by_dhcp_agent
            .get(dhcp_agent_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Mutating calls received so far, e.g. `remove dead-0 router-1`
    pub fn mutations(&self) -> Vec<String> {
        self.state().calls.clone()
    }
}

impl State {
    fn agent_hosting(&self, router_id: &str) -> Option<&Agent> {
        self.routers_by_agent
            .iter()
            .find(|(_, ids)| ids.contains(router_id))
            .and_then(|(agent_id, _)| self.agents.get(agent_id))
    }
}

#[async_trait]
impl NetworkControlPlane for InMemoryControlPlane {
    async fn list_agents(&self) -> Result<Vec<Agent>, ClientError> {
        Ok(self.state().agents.values().cloned().collect())
    }

    async fn list_routers_on_agent(&self, agent_id: &str) -> Result<Vec<Router>, ClientError> {
        let state = self.state();
        Ok(state
            .routers_by_agent
            .get(agent_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.routers.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn remove_router_from_agent(
        &self,
        agent_id: &str,
        router_id: &str,
    ) -> Result<(), ClientError> {
        let mut state = self.state();
        state.calls.push(format!("remove {} {}", agent_id, router_id));

        if state.failing_removes.contains(router_id) {
            return Err(ClientError::Rejected(format!(
                "removal of router {} refused",
                router_id
            )));
        }

        let removed = state
            .routers_by_agent
            .get_mut(agent_id)
            .is_some_and(|ids| ids.remove(router_id));
        if !removed {
            return Err(ClientError::Rejected(format!(
                "router {} is not hosted by agent {}",
                router_id, agent_id
            )));
        }
        Ok(())
    }

    async fn add_router_to_agent(
        &self,
        agent_id: &str,
        router_id: &str,
        now: bool,
    ) -> Result<(), ClientError> {
        let mut state = self.state();
        state
            .calls
            .push(format!("add {} {} now={}", agent_id, router_id, now));

        if state
            .failing_adds
            .contains(&(agent_id.to_string(), router_id.to_string()))
        {
            return Err(ClientError::Rejected(format!(
                "agent {} refused router {}",
                agent_id, router_id
            )));
        }
        if let Some(current) = state.agent_hosting(router_id) {
            return Err(ClientError::Rejected(format!(
                "router {} is already hosted by agent {}",
                router_id, current.id
            )));
        }

        state
            .routers_by_agent
            .entry(agent_id.to_string())
            .or_default()
            .insert(router_id.to_string());
        Ok(())
    }

    async fn list_ports(&self, device_id: &str) -> Result<Vec<Port>, ClientError> {
        let state = self.state();
        let Some(agent) = state.agent_hosting(device_id) else {
            return Ok(Vec::new());
        };
        let status = state
            .port_status
            .get(device_id)
            .cloned()
            .unwrap_or_else(|| STATUS_ACTIVE.to_string());

        Ok(vec![Port {
            id: format!("{}-gw", device_id),
            binding_host_id: agent.host.clone(),
            binding_vif_type: "ovs".to_string(),
            status,
        }])
    }

    async fn list_floating_ips(&self, router_id: &str) -> Result<Vec<FloatingIp>, ClientError> {
        Ok(vec![FloatingIp {
            id: format!("{}-fip", router_id),
            status: STATUS_ACTIVE.to_string(),
        }])
    }

    async fn list_networks(&self) -> Result<Vec<Network>, ClientError> {
        Ok(self.state().networks.values().cloned().collect())
    }

    async fn list_dhcp_agents_hosting_network(
        &self,
        network_id: &str,
    ) -> Result<Vec<Agent>, ClientError> {
        let state = self.state();
        Ok(state
            .networks_by_dhcp_agent
            .iter()
            .filter(|(_, ids)| ids.contains(network_id))
            .filter_map(|(agent_id, _)| state.agents.get(agent_id).cloned())
            .collect())
    }

    async fn add_network_to_dhcp_agent(
        &self,
        agent_id: &str,
        network_id: &str,
    ) -> Result<(), ClientError> {
        let mut state = self.state();
        state
            .calls
            .push(format!("add-network {} {}", agent_id, network_id));
        state
            .networks_by_dhcp_agent
            .entry(agent_id.to_string())
            .or_default()
            .insert(network_id.to_string());
        Ok(())
    }
}
