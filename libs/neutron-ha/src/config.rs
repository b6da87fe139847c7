// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Failover configuration

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::TimeDelta;

use crate::netns::CleanupConfig;
use crate::workflow::WaitConfig;

/// Default Neutron HTTP timeout (seconds)
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Default age after which the least-busy picker re-counts routers (seconds)
const DEFAULT_ROUTER_CACHE_MAX_AGE_SECS: u64 = 30;

const DEFAULT_WAIT_FOR_ROUTER_TIMEOUT_SECS: u64 = 60;
const DEFAULT_WAIT_FOR_ROUTER_INTERVAL_MS: u64 = 1000;

const DEFAULT_SSH_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SSH_COMMAND_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SSH_USER: &str = "root";

/// Tunables read from the environment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailoverConfig {
    /// Neutron HTTP request timeout
    pub http_timeout_secs: u64,
    /// Maximum age of the least-busy router count cache
    pub router_cache_max_age_secs: u64,
    /// How long to wait for a moved router to settle
    pub wait_for_router_timeout_secs: u64,
    /// Poll interval while waiting for a router to settle
    pub wait_for_router_interval_ms: u64,
    pub ssh_connect_timeout_secs: u64,
    pub ssh_command_timeout_secs: u64,
    /// Remote user for namespace cleanup
    pub ssh_user: String,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            router_cache_max_age_secs: DEFAULT_ROUTER_CACHE_MAX_AGE_SECS,
            wait_for_router_timeout_secs: DEFAULT_WAIT_FOR_ROUTER_TIMEOUT_SECS,
            wait_for_router_interval_ms: DEFAULT_WAIT_FOR_ROUTER_INTERVAL_MS,
            ssh_connect_timeout_secs: DEFAULT_SSH_CONNECT_TIMEOUT_SECS,
            ssh_command_timeout_secs: DEFAULT_SSH_COMMAND_TIMEOUT_SECS,
            ssh_user: DEFAULT_SSH_USER.to_string(),
        }
    }
}

impl FailoverConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            http_timeout_secs: parse_var(&lookup, "HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?,
            router_cache_max_age_secs: parse_var(
                &lookup,
                "ROUTER_CACHE_MAX_AGE_SECS",
                DEFAULT_ROUTER_CACHE_MAX_AGE_SECS,
            )?,
            wait_for_router_timeout_secs: parse_var(
                &lookup,
                "WAIT_FOR_ROUTER_TIMEOUT_SECS",
                DEFAULT_WAIT_FOR_ROUTER_TIMEOUT_SECS,
            )?,
            wait_for_router_interval_ms: parse_var(
                &lookup,
                "WAIT_FOR_ROUTER_INTERVAL_MS",
                DEFAULT_WAIT_FOR_ROUTER_INTERVAL_MS,
            )?,
            ssh_connect_timeout_secs: parse_var(
                &lookup,
                "SSH_CONNECT_TIMEOUT_SECS",
                DEFAULT_SSH_CONNECT_TIMEOUT_SECS,
            )?,
            ssh_command_timeout_secs: parse_var(
                &lookup,
                "SSH_COMMAND_TIMEOUT_SECS",
                DEFAULT_SSH_COMMAND_TIMEOUT_SECS,
            )?,
            ssh_user: lookup("SSH_USER").unwrap_or_else(|| DEFAULT_SSH_USER.to_string()),
        };

        if max_age_from_secs(config.router_cache_max_age_secs).is_none() {
            return Err(anyhow!("out of range for a cache age").context(format!(
                "Invalid ROUTER_CACHE_MAX_AGE_SECS: {:?}",
                config.router_cache_max_age_secs.to_string()
            )));
        }

        Ok(config)
    }

    /// Cache age limit; values too large for a `TimeDelta` mean "never stale"
    pub fn router_cache_max_age(&self) -> TimeDelta {
        max_age_from_secs(self.router_cache_max_age_secs).unwrap_or(TimeDelta::MAX)
    }

    pub fn wait_config(&self) -> WaitConfig {
        WaitConfig {
            timeout: Duration::from_secs(self.wait_for_router_timeout_secs),
            interval: Duration::from_millis(self.wait_for_router_interval_ms),
        }
    }

    pub fn cleanup_config(&self) -> CleanupConfig {
        CleanupConfig {
            connect_timeout: Duration::from_secs(self.ssh_connect_timeout_secs),
            command_timeout: Duration::from_secs(self.ssh_command_timeout_secs),
        }
    }
}

fn max_age_from_secs(secs: u64) -> Option<TimeDelta> {
    i64::try_from(secs).ok().and_then(TimeDelta::try_seconds)
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: {:?}", name, value)),
    }
}
