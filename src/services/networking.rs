//! Networking v2: VPC peering connections, routers and ports.

use super::{get_wrapped, post_wrapped, put_wrapped, with_query};
use otc_framework::{CloudError, ServiceClient};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

// --- Peering connections ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VpcInfo {
    pub vpc_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tenant_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Peering {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub request_vpc_info: VpcInfo,
    #[serde(default)]
    pub accept_vpc_info: VpcInfo,
}

#[derive(Debug, Serialize)]
pub struct PeeringCreate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub request_vpc_info: VpcInfo,
    pub accept_vpc_info: VpcInfo,
}

#[derive(Debug, Default, Serialize)]
pub struct PeeringUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Answer of the accepting tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeeringDecision {
    Accept,
    Reject,
}

impl PeeringDecision {
    fn path(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
        }
    }

    /// Status the peering settles in after this decision.
    pub fn target_status(self) -> &'static str {
        match self {
            Self::Accept => "ACTIVE",
            Self::Reject => "REJECTED",
        }
    }
}

#[instrument(skip(client, opts), fields(name = %opts.name))]
pub async fn create_peering(client: &ServiceClient, opts: &PeeringCreate) -> Result<Peering, CloudError> {
    debug!(?opts, "Creating peering connection");
    post_wrapped(client, &client.url(&["vpc", "peerings"]), "peering", opts).await
}

#[instrument(skip(client))]
pub async fn get_peering(client: &ServiceClient, id: &str) -> Result<Peering, CloudError> {
    get_wrapped(client, &client.url(&["vpc", "peerings", id]), "peering").await
}

#[instrument(skip(client, opts))]
pub async fn update_peering(client: &ServiceClient, id: &str, opts: &PeeringUpdate) -> Result<Peering, CloudError> {
    debug!(?opts, "Updating peering connection");
    put_wrapped(client, &client.url(&["vpc", "peerings", id]), "peering", opts).await
}

#[instrument(skip(client))]
pub async fn decide_peering(client: &ServiceClient, id: &str, decision: PeeringDecision) -> Result<Peering, CloudError> {
    info!(?decision, "Answering peering request");
    let url = client.url(&["vpc", "peerings", id, decision.path()]);
    let response: serde_json::Value = client.put(&url, &serde_json::json!({})).await?;
    super::unwrap(&url, response, "peering")
}

#[instrument(skip(client))]
pub async fn delete_peering(client: &ServiceClient, id: &str) -> Result<(), CloudError> {
    client.delete(&client.url(&["vpc", "peerings", id])).await
}

// --- Routers ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub destination: String,
    pub nexthop: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Router {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub routes: Vec<Route>,
}

#[derive(Debug, Serialize)]
struct RoutesUpdate<'a> {
    routes: &'a [Route],
}

#[instrument(skip(client))]
pub async fn get_router(client: &ServiceClient, id: &str) -> Result<Router, CloudError> {
    get_wrapped(client, &client.url(&["routers", id]), "router").await
}

/// Replaces the whole route table of a router.
#[instrument(skip(client, routes), fields(count = routes.len()))]
pub async fn set_routes(client: &ServiceClient, id: &str, routes: &[Route]) -> Result<Router, CloudError> {
    debug!(?routes, "Replacing routes");
    put_wrapped(client, &client.url(&["routers", id]), "router", RoutesUpdate { routes }).await
}

// --- Ports ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedIp {
    pub subnet_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPair {
    pub ip_address: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mac_address: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Port {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub network_id: String,
    #[serde(default)]
    pub admin_state_up: bool,
    #[serde(default)]
    pub mac_address: String,
    #[serde(default)]
    pub fixed_ips: Vec<FixedIp>,
    #[serde(default)]
    pub security_groups: Vec<String>,
    #[serde(default)]
    pub allowed_address_pairs: Vec<AddressPair>,
    #[serde(default)]
    pub device_owner: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Default, Serialize)]
pub struct PortCreate {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub network_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_state_up: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_ips: Option<Vec<FixedIp>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_groups: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_address_pairs: Option<Vec<AddressPair>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct PortUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_state_up: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_ips: Option<Vec<FixedIp>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_groups: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_address_pairs: Option<Vec<AddressPair>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

#[instrument(skip(client, opts), fields(network_id = %opts.network_id))]
pub async fn create_port(client: &ServiceClient, opts: &PortCreate) -> Result<Port, CloudError> {
    debug!(?opts, "Creating port");
    post_wrapped(client, &client.url(&["ports"]), "port", opts).await
}

#[instrument(skip(client))]
pub async fn get_port(client: &ServiceClient, id: &str) -> Result<Port, CloudError> {
    get_wrapped(client, &client.url(&["ports", id]), "port").await
}

#[instrument(skip(client))]
pub async fn list_ports(client: &ServiceClient, network_id: &str, name: &str) -> Result<Vec<Port>, CloudError> {
    let url = with_query(client.url(&["ports"]), &[("network_id", network_id), ("name", name)]);
    get_wrapped(client, &url, "ports").await
}

#[instrument(skip(client, opts))]
pub async fn update_port(client: &ServiceClient, id: &str, opts: &PortUpdate) -> Result<Port, CloudError> {
    debug!(?opts, "Updating port");
    put_wrapped(client, &client.url(&["ports", id]), "port", opts).await
}

#[instrument(skip(client))]
pub async fn delete_port(client: &ServiceClient, id: &str) -> Result<(), CloudError> {
    client.delete(&client.url(&["ports", id])).await
}
