//! VPC v1: VPCs, subnets, elastic IPs and their bandwidths.

use super::{get_wrapped, post_wrapped, put_wrapped, with_query};
use otc_framework::mapper::Nullable;
use otc_framework::{CloudError, ServiceClient};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

// --- VPCs ---

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Vpc {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub cidr: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub enable_shared_snat: bool,
}

#[derive(Debug, Serialize)]
pub struct VpcCreate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct VpcUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Default)]
pub struct VpcFilter<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub cidr: &'a str,
    pub status: &'a str,
}

fn vpcs_url(client: &ServiceClient) -> String {
    client.url(&["vpcs"])
}

fn vpc_url(client: &ServiceClient, id: &str) -> String {
    client.url(&["vpcs", id])
}

#[instrument(skip(client, opts), fields(name = %opts.name))]
pub async fn create_vpc(client: &ServiceClient, opts: &VpcCreate) -> Result<Vpc, CloudError> {
    debug!(?opts, "Creating VPC");
    post_wrapped(client, &vpcs_url(client), "vpc", opts).await
}

#[instrument(skip(client))]
pub async fn get_vpc(client: &ServiceClient, id: &str) -> Result<Vpc, CloudError> {
    get_wrapped(client, &vpc_url(client, id), "vpc").await
}

#[instrument(skip(client))]
pub async fn list_vpcs(client: &ServiceClient, filter: &VpcFilter<'_>) -> Result<Vec<Vpc>, CloudError> {
    let url = with_query(
        vpcs_url(client),
        &[
            ("id", filter.id),
            ("name", filter.name),
            ("cidr", filter.cidr),
            ("status", filter.status),
        ],
    );
    get_wrapped(client, &url, "vpcs").await
}

#[instrument(skip(client, opts))]
pub async fn update_vpc(client: &ServiceClient, id: &str, opts: &VpcUpdate) -> Result<Vpc, CloudError> {
    debug!(?opts, "Updating VPC");
    put_wrapped(client, &vpc_url(client, id), "vpc", opts).await
}

#[instrument(skip(client))]
pub async fn delete_vpc(client: &ServiceClient, id: &str) -> Result<(), CloudError> {
    client.delete(&vpc_url(client, id)).await
}

// --- Subnets ---

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cidr: String,
    #[serde(default)]
    pub gateway_ip: String,
    #[serde(default)]
    pub vpc_id: String,
    #[serde(default)]
    pub dhcp_enable: bool,
    #[serde(default)]
    pub primary_dns: String,
    #[serde(default)]
    pub secondary_dns: String,
    #[serde(default, rename = "dnsList")]
    pub dns_list: Vec<String>,
    #[serde(default)]
    pub availability_zone: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub neutron_network_id: String,
    #[serde(default)]
    pub neutron_subnet_id: String,
}

#[derive(Debug, Serialize)]
pub struct SubnetCreate {
    pub name: String,
    pub cidr: String,
    pub gateway_ip: String,
    pub vpc_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub dhcp_enable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_dns: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_dns: Option<String>,
    #[serde(rename = "dnsList", skip_serializing_if = "Option::is_none")]
    pub dns_list: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct SubnetUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dhcp_enable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_dns: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_dns: Option<String>,
    #[serde(rename = "dnsList", skip_serializing_if = "Option::is_none")]
    pub dns_list: Option<Vec<String>>,
}

#[derive(Debug, Default)]
pub struct SubnetFilter<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub cidr: &'a str,
    pub vpc_id: &'a str,
    pub gateway_ip: &'a str,
    pub status: &'a str,
}

#[instrument(skip(client, opts), fields(name = %opts.name, vpc_id = %opts.vpc_id))]
pub async fn create_subnet(client: &ServiceClient, opts: &SubnetCreate) -> Result<Subnet, CloudError> {
    debug!(?opts, "Creating subnet");
    post_wrapped(client, &client.url(&["subnets"]), "subnet", opts).await
}

#[instrument(skip(client))]
pub async fn get_subnet(client: &ServiceClient, id: &str) -> Result<Subnet, CloudError> {
    get_wrapped(client, &client.url(&["subnets", id]), "subnet").await
}

#[instrument(skip(client))]
pub async fn list_subnets(client: &ServiceClient, filter: &SubnetFilter<'_>) -> Result<Vec<Subnet>, CloudError> {
    let url = with_query(
        client.url(&["subnets"]),
        &[
            ("id", filter.id),
            ("name", filter.name),
            ("cidr", filter.cidr),
            ("vpc_id", filter.vpc_id),
            ("gateway_ip", filter.gateway_ip),
            ("status", filter.status),
        ],
    );
    get_wrapped(client, &url, "subnets").await
}

/// Updates and deletes go through the owning VPC.
#[instrument(skip(client, opts))]
pub async fn update_subnet(
    client: &ServiceClient,
    vpc_id: &str,
    id: &str,
    opts: &SubnetUpdate,
) -> Result<Subnet, CloudError> {
    debug!(?opts, "Updating subnet");
    put_wrapped(client, &client.url(&["vpcs", vpc_id, "subnets", id]), "subnet", opts).await
}

#[instrument(skip(client))]
pub async fn delete_subnet(client: &ServiceClient, vpc_id: &str, id: &str) -> Result<(), CloudError> {
    client.delete(&client.url(&["vpcs", vpc_id, "subnets", id])).await
}

// --- Elastic IPs ---

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublicIp {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, rename = "type")]
    pub ip_type: String,
    #[serde(default)]
    pub public_ip_address: String,
    #[serde(default)]
    pub private_ip_address: Option<String>,
    #[serde(default)]
    pub port_id: Option<String>,
    #[serde(default)]
    pub bandwidth_id: String,
    #[serde(default)]
    pub bandwidth_name: String,
    #[serde(default)]
    pub bandwidth_size: i64,
    #[serde(default)]
    pub bandwidth_share_type: String,
    #[serde(default)]
    pub ip_version: i64,
}

#[derive(Debug, Serialize)]
pub struct PublicIpSpec {
    #[serde(rename = "type")]
    pub ip_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BandwidthSpec {
    pub name: String,
    pub size: i64,
    pub share_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_mode: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PublicIpCreate {
    pub publicip: PublicIpSpec,
    pub bandwidth: BandwidthSpec,
}

/// `port_id: null` unbinds, a string binds.
#[derive(Debug, Serialize)]
pub struct PublicIpUpdate {
    #[serde(skip_serializing_if = "Nullable::is_absent")]
    pub port_id: Nullable<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct BandwidthUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Bandwidth {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: i64,
}

#[instrument(skip(client, opts), fields(ip_type = %opts.publicip.ip_type))]
pub async fn create_public_ip(client: &ServiceClient, opts: &PublicIpCreate) -> Result<PublicIp, CloudError> {
    debug!(?opts, "Creating elastic IP");
    let url = client.url(&["publicips"]);
    let response: serde_json::Value = client.post(&url, opts).await?;
    super::unwrap(&url, response, "publicip")
}

#[instrument(skip(client))]
pub async fn get_public_ip(client: &ServiceClient, id: &str) -> Result<PublicIp, CloudError> {
    get_wrapped(client, &client.url(&["publicips", id]), "publicip").await
}

#[instrument(skip(client, opts))]
pub async fn update_public_ip(client: &ServiceClient, id: &str, opts: &PublicIpUpdate) -> Result<PublicIp, CloudError> {
    debug!(?opts, "Updating elastic IP");
    put_wrapped(client, &client.url(&["publicips", id]), "publicip", opts).await
}

#[instrument(skip(client))]
pub async fn delete_public_ip(client: &ServiceClient, id: &str) -> Result<(), CloudError> {
    client.delete(&client.url(&["publicips", id])).await
}

#[instrument(skip(client, opts))]
pub async fn update_bandwidth(client: &ServiceClient, id: &str, opts: &BandwidthUpdate) -> Result<Bandwidth, CloudError> {
    debug!(?opts, "Updating bandwidth");
    put_wrapped(client, &client.url(&["bandwidths", id]), "bandwidth", opts).await
}
