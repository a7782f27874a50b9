use crate::entity::{filter_matches, CloudEntity};
use crate::error::ApiError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct Vpc {
    pub id: String,
    pub name: String,
    pub cidr: String,
    pub description: String,
    pub status: String,
    pub enable_shared_snat: bool,
}

#[derive(Debug, Deserialize)]
pub struct VpcCreate {
    pub name: String,
    #[serde(default)]
    pub cidr: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VpcUpdate {
    pub name: Option<String>,
    pub cidr: Option<String>,
    pub description: Option<String>,
}

fn check_cidr(cidr: &str) -> Result<(), ApiError> {
    match cidr.split_once('/') {
        Some((ip, len)) if ip.parse::<std::net::Ipv4Addr>().is_ok() && len.parse::<u8>().is_ok_and(|l| l <= 32) => Ok(()),
        _ => Err(ApiError::new(400, "VPC.0002", format!("invalid cidr {cidr:?}"))),
    }
}

#[async_trait]
impl CloudEntity for Vpc {
    const KIND: &'static str = "vpc";

    type Create = VpcCreate;
    type Update = VpcUpdate;
    type Action = ();
    type Context = ();

    fn from_create_params(id: String, params: VpcCreate) -> Result<Self, ApiError> {
        let cidr = params.cidr.unwrap_or_else(|| "192.168.0.0/16".to_owned());
        check_cidr(&cidr)?;
        Ok(Self {
            id,
            name: params.name,
            cidr,
            description: params.description.unwrap_or_default(),
            status: "CREATING".to_owned(),
            enable_shared_snat: false,
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
            "name" => Some(self.name.as_str()),
            "cidr" => Some(self.cidr.as_str()),
            "status" => Some(self.status.as_str()),
            _ => None,
        })
    }

    async fn on_update(&mut self, update: VpcUpdate, _ctx: &()) -> Result<(), ApiError> {
        if let Some(cidr) = update.cidr {
            check_cidr(&cidr)?;
            self.cidr = cidr;
        }
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        Ok(())
    }
}
