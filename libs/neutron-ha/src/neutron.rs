// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Neutron control plane client
//!
//! [`NetworkControlPlane`] is the contract the workflow depends on.
//! [`NeutronClient`] implements it against the Neutron v2.0 REST API using a
//! pre-issued Keystone token.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use url::Url;

use crate::error::ClientError;
use crate::types::{Agent, FloatingIp, Network, Port, Router};

/// Operations on the network control plane used by the failover workflow
#[async_trait]
pub trait NetworkControlPlane: Send + Sync {
    async fn list_agents(&self) -> Result<Vec<Agent>, ClientError>;

    async fn list_routers_on_agent(&self, agent_id: &str) -> Result<Vec<Router>, ClientError>;

    async fn remove_router_from_agent(
        &self,
        agent_id: &str,
        router_id: &str,
    ) -> Result<(), ClientError>;

    /// Bind a router to an agent. `now` requests an immediate transfer
    /// instead of a scheduled one.
    async fn add_router_to_agent(
        &self,
        agent_id: &str,
        router_id: &str,
        now: bool,
    ) -> Result<(), ClientError>;

    /// Ports whose `device_id` is the given router
    async fn list_ports(&self, device_id: &str) -> Result<Vec<Port>, ClientError>;

    async fn list_floating_ips(&self, router_id: &str) -> Result<Vec<FloatingIp>, ClientError>;

    async fn list_networks(&self) -> Result<Vec<Network>, ClientError>;

    async fn list_dhcp_agents_hosting_network(
        &self,
        network_id: &str,
    ) -> Result<Vec<Agent>, ClientError>;

    async fn add_network_to_dhcp_agent(
        &self,
        agent_id: &str,
        network_id: &str,
    ) -> Result<(), ClientError>;
}

#[derive(Deserialize)]
struct AgentList {
    agents: Vec<Agent>,
}

#[derive(Deserialize)]
struct RouterList {
    routers: Vec<Router>,
}

#[derive(Deserialize)]
struct PortList {
    ports: Vec<Port>,
}

#[derive(Deserialize)]
struct FloatingIpList {
    floatingips: Vec<FloatingIp>,
}

#[derive(Deserialize)]
struct NetworkList {
    networks: Vec<Network>,
}

/// Neutron v2.0 REST client
#[derive(Clone)]
pub struct NeutronClient {
    client: Client,
    base_url: Url,
}

impl NeutronClient {
    /// Create a new Neutron client
    ///
    /// `base_url` is the network endpoint without the `/v2.0` suffix.
    /// `insecure` disables TLS certificate verification.
    pub fn new(
        base_url: &str,
        token: &str,
        timeout_secs: u64,
        insecure: bool,
    ) -> Result<Self, ClientError> {
        // reqwest is built without a default provider; a second install
        // attempt returns Err and is harmless.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let mut headers = HeaderMap::new();
        let mut token_value = HeaderValue::from_str(token)
            .map_err(|e| ClientError::Rejected(format!("invalid token header: {}", e)))?;
        token_value.set_sensitive(true);
        headers.insert("X-Auth-Token", token_value);

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("neutron-ha/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .danger_accept_invalid_certs(insecure)
            .build()?;

        // A trailing slash makes Url::join append instead of replacing the
        // last path segment.
        let mut base = base_url.trim_end_matches('/').to_string();
        base.push('/');

        Ok(Self {
            client,
            base_url: Url::parse(&base)?,
        })
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, ClientError> {
        let mut url = self.base_url.join(path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> Result<Response, ClientError> {
        let url = self.url(path, query)?;
        tracing::debug!(method = %method, url = %url, "Neutron request");

        let mut request = self.client.request(method.clone(), url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                method = %method,
                path = %path,
                status = %status,
                "Neutron request failed"
            );
            return Err(ClientError::Status {
                method: method.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        let response = self.send(Method::GET, path, query, None).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl NetworkControlPlane for NeutronClient {
    async fn list_agents(&self) -> Result<Vec<Agent>, ClientError> {
        let list: AgentList = self.get("v2.0/agents", &[]).await?;
        Ok(list.agents)
    }

    async fn list_routers_on_agent(&self, agent_id: &str) -> Result<Vec<Router>, ClientError> {
        let path = format!("v2.0/agents/{}/l3-routers", agent_id);
        let list: RouterList = self.get(&path, &[]).await?;
        Ok(list.routers)
    }

    async fn remove_router_from_agent(
        &self,
        agent_id: &str,
        router_id: &str,
    ) -> Result<(), ClientError> {
        let path = format!("v2.0/agents/{}/l3-routers/{}", agent_id, router_id);
        self.send(Method::DELETE, &path, &[], None).await?;
        Ok(())
    }

    async fn add_router_to_agent(
        &self,
        agent_id: &str,
        router_id: &str,
        now: bool,
    ) -> Result<(), ClientError> {
        let path = format!("v2.0/agents/{}/l3-routers", agent_id);
        let body = if now {
            json!({ "router_id": router_id, "now": true })
        } else {
            json!({ "router_id": router_id })
        };
        self.send(Method::POST, &path, &[], Some(body)).await?;
        Ok(())
    }

    async fn list_ports(&self, device_id: &str) -> Result<Vec<Port>, ClientError> {
        let list: PortList = self
            .get("v2.0/ports", &[("device_id", device_id)])
            .await?;
        Ok(list.ports)
    }

    async fn list_floating_ips(&self, router_id: &str) -> Result<Vec<FloatingIp>, ClientError> {
        let list: FloatingIpList = self
            .get("v2.0/floatingips", &[("router_id", router_id)])
            .await?;
        Ok(list.floatingips)
    }

    async fn list_networks(&self) -> Result<Vec<Network>, ClientError> {
        let list: NetworkList = self.get("v2.0/networks", &[]).await?;
        Ok(list.networks)
    }

    async fn list_dhcp_agents_hosting_network(
        &self,
        network_id: &str,
    ) -> Result<Vec<Agent>, ClientError> {
        let path = format!("v2.0/networks/{}/dhcp-agents", network_id);
        let list: AgentList = self.get(&path, &[]).await?;
        Ok(list.agents)
    }

    async fn add_network_to_dhcp_agent(
        &self,
        agent_id: &str,
        network_id: &str,
    ) -> Result<(), ClientError> {
        let path = format!("v2.0/agents/{}/dhcp-networks", agent_id);
        self.send(
            Method::POST,
            &path,
            &[],
            Some(json!({ "network_id": network_id })),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_joined_under_the_endpoint_prefix() {
        let client = NeutronClient::new("http://net.example.com:9696/prefix/", "t", 5, false)
            .unwrap();

        let url = client.url("v2.0/agents", &[]).unwrap();
        assert_eq!(url.as_str(), "http://net.example.com:9696/prefix/v2.0/agents");

        let url = client
            .url("v2.0/ports", &[("device_id", "r 1")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://net.example.com:9696/prefix/v2.0/ports?device_id=r+1"
        );
    }

    #[test]
    fn token_must_be_a_valid_header_value() {
        assert!(NeutronClient::new("http://localhost", "bad\ntoken", 5, false).is_err());
    }
}
