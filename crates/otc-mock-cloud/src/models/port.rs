use crate::client::StoreClient;
use crate::entity::{filter_matches, CloudEntity};
use crate::error::ApiError;
use crate::models::{octet, Subnet};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SECURITY_GROUP: &str = "default";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedIp {
    pub subnet_id: String,
    pub ip_address: String,
}

#[derive(Debug, Deserialize)]
pub struct FixedIpSpec {
    pub subnet_id: String,
    #[serde(default)]
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressPair {
    pub ip_address: String,
    #[serde(default)]
    pub mac_address: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Port {
    pub id: String,
    pub name: String,
    pub network_id: String,
    pub admin_state_up: bool,
    pub mac_address: String,
    pub fixed_ips: Vec<FixedIp>,
    pub security_groups: Vec<String>,
    pub allowed_address_pairs: Vec<AddressPair>,
    pub device_owner: String,
    pub device_id: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct PortCreate {
    #[serde(default)]
    pub name: String,
    pub network_id: String,
    #[serde(default)]
    pub admin_state_up: Option<bool>,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub fixed_ips: Option<Vec<FixedIpSpec>>,
    #[serde(default)]
    pub security_groups: Option<Vec<String>>,
    #[serde(default)]
    pub allowed_address_pairs: Option<Vec<AddressPair>>,
    #[serde(default)]
    pub device_owner: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PortUpdate {
    pub name: Option<String>,
    pub admin_state_up: Option<bool>,
    pub fixed_ips: Option<Vec<FixedIpSpec>>,
    pub security_groups: Option<Vec<String>>,
    pub allowed_address_pairs: Option<Vec<AddressPair>>,
    pub device_owner: Option<String>,
    pub device_id: Option<String>,
}

impl Port {
    fn assign(&self, specs: Vec<FixedIpSpec>) -> Vec<FixedIp> {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, spec)| FixedIp {
                ip_address: spec
                    .ip_address
                    .unwrap_or_else(|| format!("192.168.0.{}", octet(&self.id, i as u8))),
                subnet_id: spec.subnet_id,
            })
            .collect()
    }
}

#[async_trait]
impl CloudEntity for Port {
    const KIND: &'static str = "port";

    type Create = PortCreate;
    type Update = PortUpdate;
    type Action = ();
    type Context = StoreClient<Subnet>;

    fn from_create_params(id: String, params: PortCreate) -> Result<Self, ApiError> {
        let mac_address = params.mac_address.unwrap_or_else(|| {
            format!("fa:16:3e:{:02x}:{:02x}:{:02x}", octet(&id, 3), octet(&id, 4), octet(&id, 5))
        });
        let mut port = Self {
            id,
            name: params.name,
            network_id: params.network_id,
            admin_state_up: params.admin_state_up.unwrap_or(true),
            mac_address,
            fixed_ips: Vec::new(),
            security_groups: params
                .security_groups
                .unwrap_or_else(|| vec![DEFAULT_SECURITY_GROUP.to_owned()]),
            allowed_address_pairs: params.allowed_address_pairs.unwrap_or_default(),
            device_owner: params.device_owner.unwrap_or_default(),
            device_id: params.device_id.unwrap_or_default(),
            status: "BUILD".to_owned(),
        };
        port.fixed_ips = match params.fixed_ips {
            Some(specs) => port.assign(specs),
            None => vec![FixedIp {
                subnet_id: String::new(),
                ip_address: format!("192.168.0.{}", octet(&port.id, 0)),
            }],
        };
        Ok(port)
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
        if self.device_id.is_empty() { "DOWN" } else { "ACTIVE" }.to_owned()
    }

    fn matches(&self, filter: &[(String, String)]) -> bool {
        filter_matches(filter, |key| match key {
            "id" => Some(self.id.as_str()),
            "name" => Some(self.name.as_str()),
            "network_id" => Some(self.network_id.as_str()),
            _ => None,
        })
    }

    async fn on_create(&mut self, subnets: &StoreClient<Subnet>) -> Result<(), ApiError> {
        let exists = subnets
            .exists(&self.network_id)
            .await
            .map_err(|e| ApiError::new(500, "Common.0500", e.to_string()))?;
        if exists {
            Ok(())
        } else {
            Err(ApiError::new(404, "NetworkNotFound", format!("network {} could not be found", self.network_id)))
        }
    }

    async fn on_update(&mut self, update: PortUpdate, _ctx: &StoreClient<Subnet>) -> Result<(), ApiError> {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(up) = update.admin_state_up {
            self.admin_state_up = up;
        }
        if let Some(specs) = update.fixed_ips {
            self.fixed_ips = self.assign(specs);
        }
        if let Some(groups) = update.security_groups {
            self.security_groups = groups;
        }
        if let Some(pairs) = update.allowed_address_pairs {
            self.allowed_address_pairs = pairs;
        }
        if let Some(owner) = update.device_owner {
            self.device_owner = owner;
        }
        if let Some(device) = update.device_id {
            self.device_id = device;
        }
        Ok(())
    }
}
