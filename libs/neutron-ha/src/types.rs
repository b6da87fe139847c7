// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Neutron resource types consumed by the failover workflow
//!
//! Only the fields the workflow reads are modelled; other fields are
//! dropped on deserialisation. [`Router`] is the exception: its remaining
//! attributes are kept in a flattened `properties` map.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Agent type string of L3 agents
pub const L3_AGENT_TYPE: &str = "L3 agent";

/// Agent type string of DHCP agents
pub const DHCP_AGENT_TYPE: &str = "DHCP agent";

/// `agent_mode` of L3 agents that only serve compute-local distributed routing
pub const AGENT_MODE_DVR: &str = "dvr";

/// Port and floating IP status once the dataplane is wired
pub const STATUS_ACTIVE: &str = "ACTIVE";

/// `binding:vif_type` of distributed router ports, which live on every host
pub const VIF_TYPE_DISTRIBUTED: &str = "distributed";

/// A Neutron agent (L3, DHCP, ...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,

    #[serde(default)]
    pub agent_type: String,

    #[serde(default)]
    pub alive: bool,

    #[serde(default)]
    pub admin_state_up: bool,

    #[serde(default)]
    pub host: String,

    /// Free-form agent configuration as reported by the agent
    #[serde(default)]
    pub configurations: Map<String, Value>,
}

impl Agent {
    /// Whether the agent may receive routers or networks
    pub fn is_alive_and_enabled(&self) -> bool {
        self.alive && self.admin_state_up
    }

    /// The operating mode tag from the agent configuration, if reported
    pub fn agent_mode(&self) -> Option<&str> {
        self.configurations
            .get("agent_mode")
            .and_then(Value::as_str)
    }

    pub fn is_l3(&self) -> bool {
        self.agent_type == L3_AGENT_TYPE
    }

    pub fn is_dhcp(&self) -> bool {
        self.agent_type == DHCP_AGENT_TYPE
    }

    /// Whether a centralized router can be scheduled on this agent.
    ///
    /// `dvr` mode agents run on compute nodes and never host the
    /// centralized part of a router.
    pub fn can_host_routers(&self) -> bool {
        self.is_alive_and_enabled() && self.agent_mode() != Some(AGENT_MODE_DVR)
    }
}

/// A Neutron router as listed on an L3 agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Router {
    pub id: String,

    /// Remaining router properties, opaque to the workflow
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

/// A Neutron port attached to a router
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub id: String,

    #[serde(rename = "binding:host_id", default)]
    pub binding_host_id: String,

    #[serde(rename = "binding:vif_type", default)]
    pub binding_vif_type: String,

    #[serde(default)]
    pub status: String,
}

impl Port {
    pub fn is_distributed(&self) -> bool {
        self.binding_vif_type == VIF_TYPE_DISTRIBUTED
    }
}

/// A floating IP associated through a router
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FloatingIp {
    pub id: String,

    #[serde(default)]
    pub status: String,
}

/// A Neutron network, as needed for DHCP replication
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub id: String,

    #[serde(default)]
    pub name: String,
}
