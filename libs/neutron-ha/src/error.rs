// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Error types
//!
//! Errors come in two families:
//!
//! - [`FailoverError`] aborts the whole operation. It covers configuration
//!   mistakes (an agent id that does not exist, picking from an empty
//!   selection, no picker supplied) and a control plane that cannot even be
//!   listed.
//! - [`MoveError`] describes a single router or network that could not be
//!   handled. The workflow logs it, counts it and moves on.

use thiserror::Error;

/// Errors returned by a [`crate::neutron::NetworkControlPlane`]
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} {path} returned {status}: {body}")]
    Status {
        method: String,
        path: String,
        status: u16,
        body: String,
    },

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("{0}")]
    Rejected(String),
}

/// Errors from [`crate::picker::AgentPicker::pick`]
#[derive(Debug, Error)]
pub enum PickError {
    #[error("cannot pick an agent from an empty selection")]
    EmptySelection,

    #[error("Cannot find agent with agent id: {0}")]
    AgentIdNotFound(String),

    #[error("Cannot find agent with host: {0}")]
    HostNotFound(String),

    #[error("failed to count routers per agent: {0}")]
    Refresh(#[source] ClientError),
}

impl PickError {
    /// Whether the error is a configuration problem that no amount of
    /// per-router retrying will fix
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Refresh(_))
    }
}

/// Errors that abort a workflow operation
#[derive(Debug, Error)]
pub enum FailoverError {
    #[error(transparent)]
    Pick(PickError),

    #[error("an agent picker is required to move router {router_id}")]
    NoPicker { router_id: String },

    #[error("failed to list agents: {0}")]
    ListAgents(#[source] ClientError),

    #[error("failed to list networks: {0}")]
    ListNetworks(#[source] ClientError),
}

impl FailoverError {
    /// Whether running the operation again may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ListAgents(_) | Self::ListNetworks(_))
    }
}

/// A router (or network) that could not be moved; counted, never fatal
#[derive(Debug, Error)]
pub enum MoveError {
    #[error("failed to list routers on agent {agent_id}: {source}")]
    ListRouters {
        agent_id: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to pick a destination for router {router_id}: {source}")]
    Pick {
        router_id: String,
        #[source]
        source: PickError,
    },

    #[error("failed to remove router {router_id} from agent {agent_id}: {source}")]
    RemoveFailed {
        router_id: String,
        agent_id: String,
        #[source]
        source: ClientError,
    },

    #[error(
        "failed to add router {router_id} to agent {agent_id}, restored on {source_agent_id}: {source}"
    )]
    AddFailed {
        router_id: String,
        agent_id: String,
        source_agent_id: String,
        #[source]
        source: ClientError,
    },

    #[error(
        "router {router_id} is unbound: add to agent {agent_id} failed ({add_error}) and restoring it on {source_agent_id} failed ({restore_error})"
    )]
    Orphaned {
        router_id: String,
        agent_id: String,
        source_agent_id: String,
        add_error: ClientError,
        restore_error: ClientError,
    },

    #[error("router {router_id} did not become active on host {host}: {reason}")]
    NotSettled {
        router_id: String,
        host: String,
        reason: String,
    },

    #[error("failed to schedule network {network_id} on DHCP agent {agent_id}: {source}")]
    DhcpSchedule {
        network_id: String,
        agent_id: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to list DHCP agents of network {network_id}: {source}")]
    ListDhcpAgents {
        network_id: String,
        #[source]
        source: ClientError,
    },
}
