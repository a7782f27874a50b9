use crate::client::StoreClient;
use crate::entity::{filter_matches, CloudEntity};
use crate::error::ApiError;
use crate::models::{double_option, octet, Port};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct Eip {
    pub id: String,
    pub status: String,
    #[serde(rename = "type")]
    pub ip_type: String,
    pub public_ip_address: String,
    pub private_ip_address: Option<String>,
    pub port_id: Option<String>,
    pub bandwidth_id: String,
    pub bandwidth_name: String,
    pub bandwidth_size: i64,
    pub bandwidth_share_type: String,
    pub ip_version: i64,
}

#[derive(Debug, Deserialize)]
pub struct PublicIpSpec {
    #[serde(rename = "type")]
    pub ip_type: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub port_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BandwidthSpec {
    pub name: String,
    pub size: i64,
    pub share_type: String,
    #[serde(default)]
    pub charge_mode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EipCreate {
    pub publicip: PublicIpSpec,
    pub bandwidth: BandwidthSpec,
}

/// `port_id: null` unbinds, a string binds, an absent key leaves the binding alone.
#[derive(Debug, Deserialize)]
pub struct EipUpdate {
    #[serde(default, deserialize_with = "double_option")]
    pub port_id: Option<Option<String>>,
}

#[derive(Debug)]
pub enum EipAction {
    UpdateBandwidth { name: Option<String>, size: Option<i64> },
}

const IP_TYPES: &[&str] = &["5_bgp", "5_mailbgp", "5_gray"];

fn check_size(size: i64) -> Result<(), ApiError> {
    if (1..=1000).contains(&size) {
        Ok(())
    } else {
        Err(ApiError::new(400, "VPC.0402", format!("bandwidth size {size} is out of range")))
    }
}

impl Eip {
    async fn bind(&mut self, port_id: Option<String>, ports: &StoreClient<Port>) -> Result<(), ApiError> {
        match port_id {
            Some(port_id) => {
                let port = ports
                    .list(vec![("id".to_owned(), port_id.clone())])
                    .await
                    .map_err(|e| ApiError::new(500, "Common.0500", e.to_string()))?
                    .into_iter()
                    .next()
                    .ok_or_else(|| ApiError::new(400, "VPC.0504", format!("port {port_id} does not exist")))?;
                self.private_ip_address = port.fixed_ips.first().map(|ip| ip.ip_address.clone());
                self.port_id = Some(port_id);
            }
            None => {
                self.port_id = None;
                self.private_ip_address = None;
            }
        }
        self.status = "PENDING_UPDATE".to_owned();
        Ok(())
    }
}

#[async_trait]
impl CloudEntity for Eip {
    const KIND: &'static str = "publicip";

    type Create = EipCreate;
    type Update = EipUpdate;
    type Action = EipAction;
    type Context = StoreClient<Port>;

    fn from_create_params(id: String, params: EipCreate) -> Result<Self, ApiError> {
        if !IP_TYPES.contains(&params.publicip.ip_type.as_str()) {
            return Err(ApiError::new(
                400,
                "VPC.0401",
                format!("publicip type {} is not supported", params.publicip.ip_type),
            ));
        }
        check_size(params.bandwidth.size)?;
        let public_ip_address = params
            .publicip
            .ip_address
            .unwrap_or_else(|| format!("80.158.{}.{}", octet(&id, 1), octet(&id, 2)));
        Ok(Self {
            bandwidth_id: uuid::Uuid::new_v4().to_string(),
            id,
            status: "PENDING_CREATE".to_owned(),
            ip_type: params.publicip.ip_type,
            public_ip_address,
            private_ip_address: None,
            port_id: params.publicip.port_id,
            bandwidth_name: params.bandwidth.name,
            bandwidth_size: params.bandwidth.size,
            bandwidth_share_type: params.bandwidth.share_type,
            ip_version: 4,
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
        if self.port_id.is_some() { "ACTIVE" } else { "DOWN" }.to_owned()
    }

    fn matches(&self, filter: &[(String, String)]) -> bool {
        filter_matches(filter, |key| match key {
            "id" => Some(self.id.as_str()),
            "bandwidth_id" => Some(self.bandwidth_id.as_str()),
            "public_ip_address" => Some(self.public_ip_address.as_str()),
            _ => None,
        })
    }

    async fn on_create(&mut self, ports: &StoreClient<Port>) -> Result<(), ApiError> {
        if let Some(port_id) = self.port_id.take() {
            self.bind(Some(port_id), ports).await?;
            self.status = "PENDING_CREATE".to_owned();
        }
        Ok(())
    }

    async fn on_update(&mut self, update: EipUpdate, ports: &StoreClient<Port>) -> Result<(), ApiError> {
        match update.port_id {
            Some(port_id) if port_id.is_some() && self.port_id.is_some() && port_id != self.port_id => {
                Err(ApiError::new(409, "VPC.0505", format!("publicip {} is already bound", self.id)))
            }
            Some(port_id) => self.bind(port_id, ports).await,
            None => Ok(()),
        }
    }

    async fn handle_action(&mut self, action: EipAction, _ctx: &StoreClient<Port>) -> Result<(), ApiError> {
        match action {
            EipAction::UpdateBandwidth { name, size } => {
                if let Some(size) = size {
                    check_size(size)?;
                    self.bandwidth_size = size;
                }
                if let Some(name) = name {
                    self.bandwidth_name = name;
                }
                Ok(())
            }
        }
    }
}
