//! Shared harness: a configured provider wired to a fresh in-memory cloud.

#![allow(dead_code)]

use otc_framework::diff::{Plan, PlanAction};
use otc_framework::executor::Outcome;
use otc_framework::{InstanceState, ProviderConfig, Value};
use otc_mock_cloud::{MockCloud, MockCloudOptions};
use otc_provider::OtcProvider;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const VPC: &str = "opentelekomcloud_vpc_v1";
pub const SUBNET: &str = "opentelekomcloud_vpc_subnet_v1";
pub const EIP: &str = "opentelekomcloud_vpc_eip_v1";
pub const PEERING: &str = "opentelekomcloud_vpc_peering_connection_v2";
pub const ACCEPTER: &str = "opentelekomcloud_vpc_peering_connection_accepter_v2";
pub const ROUTE: &str = "opentelekomcloud_networking_router_route_v2";
pub const PORT: &str = "opentelekomcloud_networking_port_v2";
pub const BACKUP: &str = "opentelekomcloud_rds_backup_v3";

/// Builds an attribute map the way the engine would send it.
pub fn config(json: serde_json::Value) -> BTreeMap<String, Value> {
    serde_json::from_value(json).expect("config must be a JSON object")
}

pub struct Harness {
    pub cloud: MockCloud,
    pub provider: Arc<OtcProvider>,
}

impl Harness {
    pub async fn start() -> Self {
        Self::start_with(MockCloudOptions::default()).await
    }

    pub async fn start_with(options: MockCloudOptions) -> Self {
        let cloud = MockCloud::start(options);
        let provider = OtcProvider::new(ProviderConfig::default())
            .expect("Failed to build registry")
            .with_transport(cloud.transport());
        provider
            .configure(cloud.provider_config())
            .await
            .expect("Failed to configure provider");
        Self {
            cloud,
            provider: Arc::new(provider),
        }
    }

    /// Plans and asserts the plan is free of errors.
    pub fn plan(&self, type_name: &str, prior: Option<&InstanceState>, config: &BTreeMap<String, Value>) -> Plan {
        let plan = self
            .provider
            .plan(type_name, prior.cloned(), config)
            .expect("Failed to plan");
        assert!(plan.is_valid(), "plan has errors: {:?}", plan.diagnostics);
        plan
    }

    pub async fn apply(
        &self,
        type_name: &str,
        prior: Option<&InstanceState>,
        planned: Option<BTreeMap<String, Value>>,
    ) -> Outcome {
        self.provider
            .apply(type_name, prior.cloned(), planned)
            .await
            .expect("Failed to route apply")
    }

    pub async fn create(&self, type_name: &str, config: BTreeMap<String, Value>) -> InstanceState {
        let plan = self.plan(type_name, None, &config);
        assert_eq!(plan.action(), PlanAction::Create);
        self.apply(type_name, None, Some(plan.planned))
            .await
            .into_result()
            .expect("Failed to create")
    }

    pub async fn update(&self, type_name: &str, prior: &InstanceState, config: BTreeMap<String, Value>) -> InstanceState {
        let plan = self.plan(type_name, Some(prior), &config);
        assert_eq!(plan.action(), PlanAction::Update, "unexpected diff: {:?}", plan.diff);
        self.apply(type_name, Some(prior), Some(plan.planned))
            .await
            .into_result()
            .expect("Failed to update")
    }

    pub async fn destroy(&self, type_name: &str, state: &InstanceState) -> Outcome {
        let outcome = self.apply(type_name, Some(state), None).await;
        assert!(outcome.is_ok(), "destroy failed: {:?}", outcome.error);
        assert!(outcome.state.is_gone());
        outcome
    }

    pub async fn refresh(&self, type_name: &str, state: &InstanceState) -> InstanceState {
        self.provider
            .read(type_name, state.clone())
            .await
            .expect("Failed to route read")
            .into_result()
            .expect("Failed to read")
    }

    pub async fn vpc(&self, name: &str, cidr: &str) -> InstanceState {
        self.create(VPC, config(json!({ "name": name, "cidr": cidr }))).await
    }

    pub async fn subnet(&self, vpc: &InstanceState, name: &str, cidr: &str, gateway_ip: &str) -> InstanceState {
        let cfg = config(json!({
            "name": name,
            "cidr": cidr,
            "gateway_ip": gateway_ip,
            "vpc_id": vpc.id,
        }));
        self.create(SUBNET, cfg).await
    }
}

/// A string attribute of a state, empty when unset.
pub fn attr<'a>(state: &'a InstanceState, path: &str) -> &'a str {
    state.get_str(path)
}
