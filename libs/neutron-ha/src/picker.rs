// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Destination agent selection
//!
//! The workflow hands every picker the current candidate agents through
//! [`AgentPicker::set_agents`] and then asks it for one agent per router.
//! Every variant refuses to pick from an empty candidate set.

use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use indexmap::IndexMap;
use rand::seq::IndexedRandom;
use strum::{Display, EnumString, VariantNames};

use crate::clock::{Clock, SystemClock};
use crate::error::PickError;
use crate::neutron::NetworkControlPlane;
use crate::types::Agent;

/// Default maximum age of the least-busy router count cache
pub const ROUTER_CACHE_MAX_AGE_SECONDS: i64 = 30;

#[async_trait]
pub trait AgentPicker: Send {
    /// Replace the candidate agents
    async fn set_agents(&mut self, agents: Vec<Agent>) -> Result<(), PickError>;

    /// Choose one of the candidate agents
    async fn pick(&mut self) -> Result<Agent, PickError>;
}

/// Picks a uniformly random candidate
#[derive(Debug, Default)]
pub struct RandomAgentPicker {
    agents: Vec<Agent>,
}

impl RandomAgentPicker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentPicker for RandomAgentPicker {
    async fn set_agents(&mut self, agents: Vec<Agent>) -> Result<(), PickError> {
        self.agents = agents;
        Ok(())
    }

    async fn pick(&mut self) -> Result<Agent, PickError> {
        self.agents
            .choose(&mut rand::rng())
            .cloned()
            .ok_or(PickError::EmptySelection)
    }
}

/// Router counts per agent id, in candidate order
struct RouterCache {
    counts: IndexMap<String, usize>,
    created_at: DateTime<Utc>,
}

/// Picks the candidate hosting the fewest routers
///
/// Counts are queried for every candidate when the candidates are set and
/// again whenever a pick finds the counts older than the configured maximum
/// age. Between refreshes each pick adds one to the chosen agent's count, so
/// consecutive picks spread routers without asking the control plane again.
pub struct LeastBusyAgentPicker {
    client: Arc<dyn NetworkControlPlane>,
    clock: Arc<dyn Clock>,
    max_age: TimeDelta,
    agents: Vec<Agent>,
    cache: Option<RouterCache>,
}

impl LeastBusyAgentPicker {
    pub fn new(client: Arc<dyn NetworkControlPlane>) -> Self {
        Self::with_clock(
            client,
            Arc::new(SystemClock),
            TimeDelta::seconds(ROUTER_CACHE_MAX_AGE_SECONDS),
        )
    }

    pub fn with_clock(
        client: Arc<dyn NetworkControlPlane>,
        clock: Arc<dyn Clock>,
        max_age: TimeDelta,
    ) -> Self {
        Self {
            client,
            clock,
            max_age,
            agents: Vec::new(),
            cache: None,
        }
    }

    /// Router count per agent id as currently cached
    pub fn router_count_per_agent_id(&self) -> Option<&IndexMap<String, usize>> {
        self.cache.as_ref().map(|cache| &cache.counts)
    }

    pub fn cache_created_at(&self) -> Option<DateTime<Utc>> {
        self.cache.as_ref().map(|cache| cache.created_at)
    }

    fn is_stale(&self) -> bool {
        match &self.cache {
            None => true,
            Some(cache) => self.clock.now() - cache.created_at > self.max_age,
        }
    }

    /// Re-count routers for every candidate. The cache is only replaced once
    /// all counts are in.
    async fn refresh(&mut self) -> Result<(), PickError> {
        let mut counts = IndexMap::with_capacity(self.agents.len());
        for agent in &self.agents {
            let routers = self
                .client
                .list_routers_on_agent(&agent.id)
                .await
                .map_err(PickError::Refresh)?;
            counts.insert(agent.id.clone(), routers.len());
        }

        tracing::debug!(counts = ?counts, "Refreshed router count cache");

        self.cache = Some(RouterCache {
            counts,
            created_at: self.clock.now(),
        });
        Ok(())
    }
}

#[async_trait]
impl AgentPicker for LeastBusyAgentPicker {
    async fn set_agents(&mut self, agents: Vec<Agent>) -> Result<(), PickError> {
        self.agents = agents;
        self.refresh().await
    }

    async fn pick(&mut self) -> Result<Agent, PickError> {
        if self.agents.is_empty() {
            return Err(PickError::EmptySelection);
        }
        if self.is_stale() {
            tracing::debug!("Router count cache expired");
            self.refresh().await?;
        }
        let Some(cache) = self.cache.as_mut() else {
            return Err(PickError::EmptySelection);
        };

        let mut chosen: Option<(&Agent, usize)> = None;
        for agent in &self.agents {
            let count = cache.counts.get(&agent.id).copied().unwrap_or(0);
            if chosen.is_none_or(|(_, least)| count < least) {
                chosen = Some((agent, count));
            }
        }
        let Some((agent, _)) = chosen else {
            return Err(PickError::EmptySelection);
        };

        *cache.counts.entry(agent.id.clone()).or_insert(0) += 1;
        Ok(agent.clone())
    }
}

/// Picks the candidate with a given agent id
#[derive(Debug)]
pub struct AgentIdBasedAgentPicker {
    agent_id: String,
    agents: Vec<Agent>,
}

impl AgentIdBasedAgentPicker {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            agents: Vec::new(),
        }
    }
}

#[async_trait]
impl AgentPicker for AgentIdBasedAgentPicker {
    async fn set_agents(&mut self, agents: Vec<Agent>) -> Result<(), PickError> {
        self.agents = agents;
        Ok(())
    }

    async fn pick(&mut self) -> Result<Agent, PickError> {
        if self.agents.is_empty() {
            return Err(PickError::EmptySelection);
        }
        self.agents
            .iter()
            .find(|agent| agent.id == self.agent_id)
            .cloned()
            .ok_or_else(|| PickError::AgentIdNotFound(self.agent_id.clone()))
    }
}

/// Picks the candidate running on a given host
#[derive(Debug)]
pub struct HostBasedAgentPicker {
    host: String,
    agents: Vec<Agent>,
}

impl HostBasedAgentPicker {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            agents: Vec::new(),
        }
    }
}

#[async_trait]
impl AgentPicker for HostBasedAgentPicker {
    async fn set_agents(&mut self, agents: Vec<Agent>) -> Result<(), PickError> {
        self.agents = agents;
        Ok(())
    }

    async fn pick(&mut self) -> Result<Agent, PickError> {
        if self.agents.is_empty() {
            return Err(PickError::EmptySelection);
        }
        self.agents
            .iter()
            .find(|agent| agent.host == self.host)
            .cloned()
            .ok_or_else(|| PickError::HostNotFound(self.host.clone()))
    }
}

/// How destination agents are chosen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, VariantNames)]
#[strum(serialize_all = "kebab-case")]
pub enum AgentSelectionMode {
    #[default]
    LeastBusy,
    Random,
    ByAgentId,
    ByHost,
}

/// Build the picker for a selection mode
///
/// A target agent id or host given alongside the default mode selects the
/// matching targeted picker. An explicit targeted mode without its target is
/// a configuration error.
pub fn build_picker(
    mode: AgentSelectionMode,
    target_agent_id: Option<&str>,
    target_host: Option<&str>,
    client: Arc<dyn NetworkControlPlane>,
    clock: Arc<dyn Clock>,
    cache_max_age: TimeDelta,
) -> Result<Box<dyn AgentPicker>> {
    if target_agent_id.is_some() && target_host.is_some() {
        bail!("a target agent id and a target host are mutually exclusive");
    }

    let picker: Box<dyn AgentPicker> = match (mode, target_agent_id, target_host) {
        (AgentSelectionMode::ByAgentId, None, _) => {
            bail!("agent selection mode by-agent-id requires a target agent id")
        }
        (AgentSelectionMode::ByHost, _, None) => {
            bail!("agent selection mode by-host requires a target host")
        }
        (AgentSelectionMode::ByAgentId | AgentSelectionMode::LeastBusy, Some(id), _) => {
            Box::new(AgentIdBasedAgentPicker::new(id))
        }
        (AgentSelectionMode::ByHost | AgentSelectionMode::LeastBusy, _, Some(host)) => {
            Box::new(HostBasedAgentPicker::new(host))
        }
        (AgentSelectionMode::Random, None, None) => Box::new(RandomAgentPicker::new()),
        (AgentSelectionMode::Random, _, _) => {
            bail!("agent selection mode random does not take a target")
        }
        (AgentSelectionMode::LeastBusy, None, None) => Box::new(LeastBusyAgentPicker::with_clock(
            client,
            clock,
            cache_max_age,
        )),
    };

    tracing::debug!(mode = %mode, "Agent picker selected");
    Ok(picker)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::InMemoryControlPlane;

    fn agent(id: &str, host: &str) -> Agent {
        Agent {
            id: id.to_string(),
            host: host.to_string(),
            ..Default::default()
        }
    }

    fn two_agents() -> Vec<Agent> {
        vec![agent("live-agent-0", "host-0"), agent("live-agent-1", "host-1")]
    }

    fn setup() -> (Arc<InMemoryControlPlane>, ManualClock) {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.add_live_l3_agent("live-agent-0", "live-agent-0-host");
        plane.add_live_l3_agent("live-agent-1", "live-agent-1-host");
        (plane, ManualClock::default())
    }

    async fn least_busy(
        plane: &Arc<InMemoryControlPlane>,
        clock: &ManualClock,
    ) -> LeastBusyAgentPicker {
        let mut picker = LeastBusyAgentPicker::with_clock(
            plane.clone(),
            Arc::new(clock.clone()),
            TimeDelta::seconds(ROUTER_CACHE_MAX_AGE_SECONDS),
        );
        picker
            .set_agents(vec![agent("live-agent-0", ""), agent("live-agent-1", "")])
            .await
            .unwrap();
        picker
    }

    fn counts(values: &[(&str, usize)]) -> IndexMap<String, usize> {
        values.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[tokio::test]
    async fn least_busy_queries_router_count_per_agent() {
        let (plane, clock) = setup();
        plane.add_router("live-agent-0", "router");

        let picker = least_busy(&plane, &clock).await;

        assert_eq!(
            picker.router_count_per_agent_id(),
            Some(&counts(&[("live-agent-0", 1), ("live-agent-1", 0)]))
        );
    }

    #[tokio::test]
    async fn agent_with_fewest_routers_is_picked() {
        let (plane, clock) = setup();
        plane.add_router("live-agent-0", "router");
        let mut picker = least_busy(&plane, &clock).await;

        assert_eq!(picker.pick().await.unwrap().id, "live-agent-1");
    }

    #[tokio::test]
    async fn picking_increases_internal_router_count() {
        let (plane, clock) = setup();
        plane.add_router("live-agent-0", "router");
        let mut picker = least_busy(&plane, &clock).await;

        assert_eq!(picker.pick().await.unwrap().id, "live-agent-1");
        assert_eq!(
            picker.router_count_per_agent_id(),
            Some(&counts(&[("live-agent-0", 1), ("live-agent-1", 1)]))
        );
    }

    #[tokio::test]
    async fn ties_go_to_the_first_candidate() {
        let (plane, clock) = setup();
        let mut picker = least_busy(&plane, &clock).await;

        assert_eq!(picker.pick().await.unwrap().id, "live-agent-0");
        assert_eq!(picker.pick().await.unwrap().id, "live-agent-1");
        assert_eq!(picker.pick().await.unwrap().id, "live-agent-0");
    }

    #[tokio::test]
    async fn fresh_cache_is_not_requeried() {
        let (plane, clock) = setup();
        let mut picker = least_busy(&plane, &clock).await;

        plane.add_router("live-agent-0", "router-2");
        plane.add_router("live-agent-0", "router-3");
        clock.advance(TimeDelta::seconds(ROUTER_CACHE_MAX_AGE_SECONDS));

        // Still within the max age: the cached zero count wins.
        assert_eq!(picker.pick().await.unwrap().id, "live-agent-0");
    }

    #[tokio::test]
    async fn router_cache_updated_when_expired() {
        let (plane, clock) = setup();
        let mut picker = least_busy(&plane, &clock).await;
        let created = picker.cache_created_at().unwrap();

        plane.add_router("live-agent-0", "router-2");
        plane.add_router("live-agent-0", "router-3");
        clock.advance(TimeDelta::seconds(ROUTER_CACHE_MAX_AGE_SECONDS + 1));

        assert_eq!(picker.pick().await.unwrap().id, "live-agent-1");
        assert!(picker.cache_created_at().unwrap() > created);
    }

    #[tokio::test]
    async fn cache_reloaded_if_difference_is_a_day() {
        let (plane, clock) = setup();
        let mut picker = least_busy(&plane, &clock).await;

        plane.add_router("live-agent-0", "router-2");
        plane.add_router("live-agent-0", "router-3");
        clock.advance(TimeDelta::days(1));

        assert_eq!(picker.pick().await.unwrap().id, "live-agent-1");
    }

    #[tokio::test]
    async fn pick_on_empty_selection_fails_for_every_picker() {
        let (plane, clock) = setup();
        let mut pickers: Vec<Box<dyn AgentPicker>> = vec![
            Box::new(RandomAgentPicker::new()),
            Box::new(LeastBusyAgentPicker::with_clock(
                plane.clone(),
                Arc::new(clock),
                TimeDelta::seconds(1),
            )),
            Box::new(AgentIdBasedAgentPicker::new("live-agent-0")),
            Box::new(HostBasedAgentPicker::new("host-0")),
        ];

        for picker in pickers.iter_mut() {
            picker.set_agents(Vec::new()).await.unwrap();
            assert!(matches!(
                picker.pick().await,
                Err(PickError::EmptySelection)
            ));
        }
    }

    #[tokio::test]
    async fn random_picks_a_candidate() {
        let mut picker = RandomAgentPicker::new();
        picker.set_agents(two_agents()).await.unwrap();

        let picked = picker.pick().await.unwrap();

        assert!(two_agents().contains(&picked));
    }

    #[tokio::test]
    async fn picking_an_agent_by_agent_id() {
        let mut picker = AgentIdBasedAgentPicker::new("live-agent-0");
        picker.set_agents(two_agents()).await.unwrap();

        assert_eq!(picker.pick().await.unwrap().id, "live-agent-0");
    }

    #[tokio::test]
    async fn agent_id_not_found() {
        let mut picker = AgentIdBasedAgentPicker::new("invalid");
        picker.set_agents(two_agents()).await.unwrap();

        let err = picker.pick().await.unwrap_err();

        assert_eq!(err.to_string(), "Cannot find agent with agent id: invalid");
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn picking_an_agent_by_host() {
        let mut picker = HostBasedAgentPicker::new("host-0");
        picker.set_agents(two_agents()).await.unwrap();

        assert_eq!(picker.pick().await.unwrap().host, "host-0");
    }

    #[tokio::test]
    async fn host_not_found() {
        let mut picker = HostBasedAgentPicker::new("invalid");
        picker.set_agents(two_agents()).await.unwrap();

        let err = picker.pick().await.unwrap_err();

        assert_eq!(err.to_string(), "Cannot find agent with host: invalid");
    }

    #[test]
    fn selection_modes_parse_from_kebab_case() {
        assert_eq!(
            AgentSelectionMode::from_str("least-busy").unwrap(),
            AgentSelectionMode::LeastBusy
        );
        assert_eq!(
            AgentSelectionMode::from_str("by-agent-id").unwrap(),
            AgentSelectionMode::ByAgentId
        );
        assert_eq!(AgentSelectionMode::ByHost.to_string(), "by-host");
        assert_eq!(
            AgentSelectionMode::VARIANTS,
            &["least-busy", "random", "by-agent-id", "by-host"]
        );
    }

    fn build(
        mode: AgentSelectionMode,
        id: Option<&str>,
        host: Option<&str>,
    ) -> Result<Box<dyn AgentPicker>> {
        let (plane, clock) = setup();
        build_picker(mode, id, host, plane, Arc::new(clock), TimeDelta::seconds(30))
    }

    #[tokio::test]
    async fn default_mode_with_target_host_picks_by_host() {
        let mut picker = build(AgentSelectionMode::LeastBusy, None, Some("host-1")).unwrap();
        picker.set_agents(two_agents()).await.unwrap();

        assert_eq!(picker.pick().await.unwrap().id, "live-agent-1");
    }

    #[test]
    fn targeted_modes_require_their_target() {
        assert!(build(AgentSelectionMode::ByAgentId, None, Some("h")).is_err());
        assert!(build(AgentSelectionMode::ByHost, Some("a"), None).is_err());
        assert!(build(AgentSelectionMode::LeastBusy, Some("a"), Some("h")).is_err());
        assert!(build(AgentSelectionMode::Random, Some("a"), None).is_err());
        assert!(build(AgentSelectionMode::Random, None, None).is_ok());
    }
}
