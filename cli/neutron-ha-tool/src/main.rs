// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Neutron L3 agent failover CLI
//!
//! Checks for routers stranded on dead L3 agents, migrates them to healthy
//! agents, evacuates or rebalances agents, and replicates networks across
//! DHCP agents. The process exits non-zero when any router or network
//! could not be handled.

mod retry;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::builder::PossibleValuesParser;
use clap::{ArgAction, ArgGroup, Parser};
use neutron_ha::clock::SystemClock;
use neutron_ha::filter::{NullRouterFilter, RouterFilter, WhitelistRouterFilter};
use neutron_ha::picker::{AgentPicker, AgentSelectionMode, build_picker};
use neutron_ha::shell::SshShell;
use neutron_ha::workflow::{
    MoveOptions, NamespaceCleaner, l3_agent_check, l3_agent_evacuate, l3_agent_migrate,
    l3_agent_rebalance, replicate_dhcp,
};
use neutron_ha::{FailoverConfig, FailoverError, NetworkControlPlane, NeutronClient};
use strum::VariantNames;

use crate::retry::{Backoff, should_retry};

#[derive(Parser, Debug)]
#[command(name = "neutron-ha-tool")]
#[command(about = "Neutron L3 agent failover tool", long_about = None)]
#[command(version)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args([
            "l3_agent_check",
            "l3_agent_migrate",
            "l3_agent_evacuate",
            "l3_agent_rebalance",
            "replicate_dhcp",
        ])
))]
struct Cli {
    /// Report routers hosted on dead or disabled L3 agents
    #[arg(long)]
    l3_agent_check: bool,

    /// Migrate routers off dead or disabled L3 agents
    #[arg(long)]
    l3_agent_migrate: bool,

    /// Move every router off the L3 agent running on HOST
    #[arg(long, value_name = "HOST")]
    l3_agent_evacuate: Option<String>,

    /// Even out router counts across alive L3 agents
    #[arg(long)]
    l3_agent_rebalance: bool,

    /// Schedule every network on every alive DHCP agent
    #[arg(long)]
    replicate_dhcp: bool,

    /// Ask Neutron for an immediate router transfer
    #[arg(long)]
    now: bool,

    /// Log intended changes without making them
    #[arg(long)]
    noop: bool,

    /// Repeat the operation until it reports no errors
    #[arg(long)]
    retry: bool,

    /// Maximum delay between retries, in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 10000)]
    retry_max_interval: u64,

    /// Accept invalid TLS certificates from Neutron
    #[arg(long)]
    insecure: bool,

    /// Delete the router namespace on the source host over ssh after a move
    #[arg(long)]
    ssh_delete_namespace: bool,

    /// How destination agents are chosen
    #[arg(
        long,
        value_name = "MODE",
        default_value = "least-busy",
        value_parser = PossibleValuesParser::new(AgentSelectionMode::VARIANTS.iter().copied())
    )]
    agent_selection_mode: String,

    /// Only touch the routers listed in this file, one id per line
    #[arg(long, value_name = "PATH")]
    router_list_file: Option<PathBuf>,

    /// Move routers to the agent with this id
    #[arg(long, value_name = "ID", conflicts_with = "target_host")]
    target_agent_id: Option<String>,

    /// Move routers to the agent running on this host
    #[arg(long, value_name = "HOST")]
    target_host: Option<String>,

    /// Wait for moved routers to become active on their new agent
    #[arg(long, value_name = "BOOL", default_value_t = true, action = ArgAction::Set)]
    wait_for_router: bool,

    /// Log debug output
    #[arg(long, conflicts_with = "quiet")]
    debug: bool,

    /// Only log warnings and errors
    #[arg(long)]
    quiet: bool,

    /// Neutron API endpoint
    #[arg(long, env = "NEUTRON_URL")]
    neutron_url: String,

    /// Pre-issued Keystone token
    #[arg(long, env = "OS_AUTH_TOKEN", hide_env_values = true)]
    os_token: String,
}

#[derive(Debug, Clone)]
enum Action {
    Check,
    Migrate,
    Evacuate(String),
    Rebalance,
    ReplicateDhcp,
}

impl Cli {
    fn action(&self) -> Action {
        if let Some(host) = &self.l3_agent_evacuate {
            Action::Evacuate(host.clone())
        } else if self.l3_agent_migrate {
            Action::Migrate
        } else if self.l3_agent_rebalance {
            Action::Rebalance
        } else if self.replicate_dhcp {
            Action::ReplicateDhcp
        } else {
            Action::Check
        }
    }

    fn log_filter(&self) -> &'static str {
        if self.debug {
            "neutron_ha=debug,neutron_ha_tool=debug"
        } else if self.quiet {
            "neutron_ha=warn,neutron_ha_tool=warn"
        } else {
            "neutron_ha=info,neutron_ha_tool=info"
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_filter().to_string()),
        ))
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    let config = FailoverConfig::from_env()?;

    let client = Arc::new(
        NeutronClient::new(
            &cli.neutron_url,
            &cli.os_token,
            config.http_timeout_secs,
            cli.insecure,
        )
        .context("Failed to create Neutron client")?,
    );

    let filter: Box<dyn RouterFilter> = match &cli.router_list_file {
        Some(path) => {
            let filter = WhitelistRouterFilter::from_file(path)?;
            tracing::info!(
                path = %path.display(),
                routers = filter.len(),
                "Restricting to routers from list file"
            );
            Box::new(filter)
        }
        None => Box::new(NullRouterFilter),
    };

    let mode: AgentSelectionMode = cli
        .agent_selection_mode
        .parse()
        .with_context(|| format!("Invalid agent selection mode: {}", cli.agent_selection_mode))?;
    let mut picker = build_picker(
        mode,
        cli.target_agent_id.as_deref(),
        cli.target_host.as_deref(),
        client.clone(),
        Arc::new(SystemClock),
        config.router_cache_max_age(),
    )?;

    let options = MoveOptions {
        now: cli.now,
        noop: cli.noop,
        wait_for_router: cli.wait_for_router.then(|| config.wait_config()),
        cleanup: cli.ssh_delete_namespace.then(|| NamespaceCleaner {
            shell: Arc::new(SshShell::new(config.ssh_user.clone())),
            config: config.cleanup_config(),
        }),
    };

    let action = cli.action();
    tracing::debug!(action = ?action, noop = cli.noop, "Starting");

    let mut backoff = Backoff::new(Duration::from_millis(cli.retry_max_interval));
    let outcome = loop {
        let outcome = run(&action, &*client, picker.as_mut(), filter.as_ref(), &options).await;
        if !cli.retry || !should_retry(&outcome) {
            break outcome;
        }

        let delay = backoff.next_delay();
        match &outcome {
            Ok(errors) => tracing::warn!(
                errors = errors,
                delay_ms = delay.as_millis() as u64,
                "Operation reported errors, retrying"
            ),
            Err(e) => tracing::warn!(
                error = %e,
                delay_ms = delay.as_millis() as u64,
                "Operation failed, retrying"
            ),
        }
        tokio::time::sleep(delay).await;
    };

    match outcome.context("Operation aborted")? {
        0 => {
            tracing::info!("Operation completed without errors");
            Ok(ExitCode::SUCCESS)
        }
        errors => {
            tracing::error!(errors = errors, "Operation completed with errors");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(
    action: &Action,
    client: &dyn NetworkControlPlane,
    picker: &mut dyn AgentPicker,
    filter: &dyn RouterFilter,
    options: &MoveOptions,
) -> Result<usize, FailoverError> {
    match action {
        Action::Check => l3_agent_check(client).await,
        Action::Migrate => l3_agent_migrate(client, Some(picker), filter, options).await,
        Action::Evacuate(host) => {
            l3_agent_evacuate(client, host, Some(picker), filter, options).await
        }
        Action::Rebalance => l3_agent_rebalance(client, filter, options).await,
        Action::ReplicateDhcp => replicate_dhcp(client, options).await,
    }
}
