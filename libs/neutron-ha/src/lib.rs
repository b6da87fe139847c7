// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! L3 agent failover for OpenStack Neutron
//!
//! Moves virtual routers off dead, disabled or drained L3 agents and cleans
//! up the router namespaces they leave behind on the old host.
//!
//! - [`neutron`]: the control plane contract and its REST client
//! - [`filter`]: which routers an operation may touch
//! - [`picker`]: which agent receives a router
//! - [`workflow`]: check, migrate, evacuate, rebalance, replicate-dhcp
//! - [`netns`] and [`shell`]: namespace cleanup over ssh

pub mod clock;
pub mod config;
pub mod error;
pub mod filter;
pub mod memory;
pub mod netns;
pub mod neutron;
pub mod picker;
pub mod shell;
pub mod types;
pub mod workflow;

pub use config::FailoverConfig;
pub use error::{ClientError, FailoverError, MoveError, PickError};
pub use neutron::{NetworkControlPlane, NeutronClient};
