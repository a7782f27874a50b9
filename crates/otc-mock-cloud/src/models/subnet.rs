use crate::client::StoreClient;
use crate::entity::{filter_matches, CloudEntity};
use crate::error::ApiError;
use crate::models::Vpc;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PRIMARY_DNS: &str = "100.125.4.25";
pub const DEFAULT_SECONDARY_DNS: &str = "100.125.129.199";

#[derive(Debug, Clone, Serialize)]
pub struct Subnet {
    pub id: String,
    pub name: String,
    pub description: String,
    pub cidr: String,
    pub gateway_ip: String,
    pub vpc_id: String,
    pub dhcp_enable: bool,
    pub primary_dns: String,
    pub secondary_dns: String,
    #[serde(rename = "dnsList")]
    pub dns_list: Vec<String>,
    pub availability_zone: String,
    pub neutron_network_id: String,
    pub neutron_subnet_id: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct SubnetCreate {
    pub name: String,
    pub cidr: String,
    pub gateway_ip: String,
    pub vpc_id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub dhcp_enable: Option<bool>,
    #[serde(default)]
    pub primary_dns: Option<String>,
    #[serde(default)]
    pub secondary_dns: Option<String>,
    #[serde(default, rename = "dnsList")]
    pub dns_list: Option<Vec<String>>,
    #[serde(default)]
    pub availability_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubnetUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub dhcp_enable: Option<bool>,
    pub primary_dns: Option<String>,
    pub secondary_dns: Option<String>,
    #[serde(rename = "dnsList")]
    pub dns_list: Option<Vec<String>>,
}

/// The gateway must be an address of the subnet's own /24-or-larger prefix.
fn gateway_in_cidr(cidr: &str, gateway: &str) -> bool {
    let (Some((net, len)), Ok(gw)) = (cidr.split_once('/'), gateway.parse::<std::net::Ipv4Addr>()) else {
        return false;
    };
    let (Ok(net), Ok(len)) = (net.parse::<std::net::Ipv4Addr>(), len.parse::<u32>()) else {
        return false;
    };
    if len > 32 {
        return false;
    }
    let mask = if len == 0 { 0 } else { u32::MAX << (32 - len) };
    u32::from(net) & mask == u32::from(gw) & mask
}

#[async_trait]
impl CloudEntity for Subnet {
    const KIND: &'static str = "subnet";

    type Create = SubnetCreate;
    type Update = SubnetUpdate;
    type Action = ();
    type Context = StoreClient<Vpc>;

    fn from_create_params(id: String, params: SubnetCreate) -> Result<Self, ApiError> {
        if !gateway_in_cidr(&params.cidr, &params.gateway_ip) {
            return Err(ApiError::new(
                400,
                "VPC.0003",
                format!("gateway_ip {} is not within {}", params.gateway_ip, params.cidr),
            ));
        }
        let primary_dns = params
            .primary_dns
            .unwrap_or_else(|| DEFAULT_PRIMARY_DNS.to_owned());
        let secondary_dns = params
            .secondary_dns
            .unwrap_or_else(|| DEFAULT_SECONDARY_DNS.to_owned());
        let dns_list = params
            .dns_list
            .unwrap_or_else(|| vec![primary_dns.clone(), secondary_dns.clone()]);
        Ok(Self {
            neutron_network_id: id.clone(),
            neutron_subnet_id: uuid::Uuid::new_v4().to_string(),
            id,
            name: params.name,
            description: params.description.unwrap_or_default(),
            cidr: params.cidr,
            gateway_ip: params.gateway_ip,
            vpc_id: params.vpc_id,
            dhcp_enable: params.dhcp_enable.unwrap_or(true),
            primary_dns,
            secondary_dns,
            dns_list,
            availability_zone: params.availability_zone.unwrap_or_default(),
            status: "UNKNOWN".to_owned(),
        })
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> &str {
        &self.status
    }

    fn set_status(&mut self, status: &str) {
        self.status = status.to_owned();
    }

    fn settled_status(&self) -> String {
        "ACTIVE".to_owned()
    }

    fn matches(&self, filter: &[(String, String)]) -> bool {
        filter_matches(filter, |key| match key {
            "id" => Some(self.id.as_str()),
            "vpc_id" => Some(self.vpc_id.as_str()),
            "name" => Some(self.name.as_str()),
            "cidr" => Some(self.cidr.as_str()),
            "gateway_ip" => Some(self.gateway_ip.as_str()),
            _ => None,
        })
    }

    async fn on_create(&mut self, vpcs: &StoreClient<Vpc>) -> Result<(), ApiError> {
        match vpcs.exists(&self.vpc_id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ApiError::new(400, "VPC.0202", format!("vpc {} does not exist", self.vpc_id))),
            Err(e) => Err(ApiError::new(500, "Common.0500", e.to_string())),
        }
    }

    async fn on_update(&mut self, update: SubnetUpdate, _ctx: &StoreClient<Vpc>) -> Result<(), ApiError> {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(dhcp_enable) = update.dhcp_enable {
            self.dhcp_enable = dhcp_enable;
        }
        if let Some(primary) = update.primary_dns {
            self.primary_dns = primary;
        }
        if let Some(secondary) = update.secondary_dns {
            self.secondary_dns = secondary;
        }
        if let Some(list) = update.dns_list {
            self.dns_list = list;
        }
        self.status = "UNKNOWN".to_owned();
        Ok(())
    }
}
