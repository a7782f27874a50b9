use crate::client::StoreClient;
use crate::entity::{filter_matches, CloudEntity};
use crate::error::ApiError;
use crate::models::Vpc;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const PENDING_ACCEPTANCE: &str = "PENDING_ACCEPTANCE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VpcInfo {
    pub vpc_id: String,
    #[serde(default)]
    pub tenant_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Peering {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: String,
    pub request_vpc_info: VpcInfo,
    pub accept_vpc_info: VpcInfo,
    #[serde(skip)]
    decision: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PeeringCreate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub request_vpc_info: VpcInfo,
    pub accept_vpc_info: VpcInfo,
}

#[derive(Debug, Deserialize)]
pub struct PeeringUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeeringAction {
    Accept,
    Reject,
}

pub struct PeeringContext {
    pub project_id: String,
    pub vpcs: StoreClient<Vpc>,
}

impl Peering {
    fn cross_tenant(&self) -> bool {
        self.accept_vpc_info.tenant_id != self.request_vpc_info.tenant_id
    }
}

#[async_trait]
impl CloudEntity for Peering {
    const KIND: &'static str = "peering";

    type Create = PeeringCreate;
    type Update = PeeringUpdate;
    type Action = PeeringAction;
    type Context = PeeringContext;

    fn from_create_params(id: String, params: PeeringCreate) -> Result<Self, ApiError> {
        if params.request_vpc_info.vpc_id == params.accept_vpc_info.vpc_id {
            return Err(ApiError::bad_request("a vpc cannot peer with itself"));
        }
        Ok(Self {
            id,
            name: params.name,
            description: params.description.unwrap_or_default(),
            status: "CREATING".to_owned(),
            request_vpc_info: params.request_vpc_info,
            accept_vpc_info: params.accept_vpc_info,
            decision: None,
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
        match self.decision {
            Some(true) => "ACTIVE",
            Some(false) => "REJECTED",
            None if self.cross_tenant() => PENDING_ACCEPTANCE,
            None => "ACTIVE",
        }
        .to_owned()
    }

    fn matches(&self, filter: &[(String, String)]) -> bool {
        filter_matches(filter, |key| match key {
            "id" => Some(self.id.as_str()),
            "name" => Some(self.name.as_str()),
            "vpc_id" => Some(self.request_vpc_info.vpc_id.as_str()),
            "status" => Some(self.status.as_str()),
            _ => None,
        })
    }

    async fn on_create(&mut self, ctx: &PeeringContext) -> Result<(), ApiError> {
        if self.request_vpc_info.tenant_id.is_empty() {
            self.request_vpc_info.tenant_id = ctx.project_id.clone();
        }
        if self.accept_vpc_info.tenant_id.is_empty() {
            self.accept_vpc_info.tenant_id = ctx.project_id.clone();
        }
        let mut local = vec![&self.request_vpc_info.vpc_id];
        if !self.cross_tenant() {
            local.push(&self.accept_vpc_info.vpc_id);
        }
        for vpc_id in local {
            let exists = ctx
                .vpcs
                .exists(vpc_id)
                .await
                .map_err(|e| ApiError::new(500, "Common.0500", e.to_string()))?;
            if !exists {
                return Err(ApiError::new(400, "VPC.0202", format!("vpc {vpc_id} does not exist")));
            }
        }
        Ok(())
    }

    async fn on_update(&mut self, update: PeeringUpdate, _ctx: &PeeringContext) -> Result<(), ApiError> {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        Ok(())
    }

    async fn handle_action(&mut self, action: PeeringAction, _ctx: &PeeringContext) -> Result<(), ApiError> {
        if self.status != PENDING_ACCEPTANCE || self.decision.is_some() {
            return Err(ApiError::conflict(format!(
                "peering {} is {}, not pending acceptance",
                self.id, self.status
            )));
        }
        self.decision = Some(action == PeeringAction::Accept);
        Ok(())
    }
}
