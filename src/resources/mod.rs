//! # Resource Adapters
//!
//! One [`Resource`](otc_framework::Resource) per cloud object type. Each adapter declares its
//! schema and maps between [`ResourceData`] and the typed bindings of [`crate::services`];
//! planning, tags, gone-handling and error wrapping come from the framework executor.
//!
//! | Type name | Adapter | Service | Tags |
//! |-----------|---------|---------|------|
//! | `opentelekomcloud_vpc_v1` | [`vpc::VpcResource`] | VPC v1 | yes |
//! | `opentelekomcloud_vpc_subnet_v1` | [`subnet::SubnetResource`] | VPC v1 | yes |
//! | `opentelekomcloud_vpc_eip_v1` | [`eip::EipResource`] | VPC v1 | yes |
//! | `opentelekomcloud_vpc_peering_connection_v2` | [`peering::PeeringResource`] | Networking v2 | - |
//! | `opentelekomcloud_vpc_peering_connection_accepter_v2` | [`peering_accepter::PeeringAccepterResource`] | Networking v2 | - |
//! | `opentelekomcloud_networking_router_route_v2` | [`router_route::RouterRouteResource`] | Networking v2 | - |
//! | `opentelekomcloud_networking_port_v2` | [`port::PortResource`] | Networking v2 | - |
//! | `opentelekomcloud_rds_backup_v3` | [`rds_backup::RdsBackupResource`] | RDS v3 | - |

use crate::services::networking::{Peering, Port};
use crate::services::rds::Backup;
use crate::services::vpc::{PublicIp, Subnet, Vpc};
use otc_framework::diff::Plan;
use otc_framework::mapper::{expand_singleton, flatten_singleton};
use otc_framework::schema::Block;
use otc_framework::state::values_differ;
use otc_framework::{
    CloudError, InstanceState, ProviderError, RequestContext, ResourceData, ServiceClient,
    ServiceVersion, StateChangeConf, Value,
};
use std::future::Future;
use std::time::Duration;

pub mod eip;
pub mod peering;
pub mod peering_accepter;
pub mod port;
pub mod rds_backup;
pub mod router_route;
pub mod subnet;
pub mod vpc;

/// A cloud object that reports a lifecycle status.
pub(crate) trait Status {
    fn status(&self) -> &str;
}

macro_rules! impl_status {
    ($($t:ty),* $(,)?) => {
        $(impl Status for $t {
            fn status(&self) -> &str {
                &self.status
            }
        })*
    };
}

impl_status!(Vpc, Subnet, PublicIp, Peering, Port, Backup);

/// A client for `service` in the resource's region.
pub(crate) async fn service_client(
    ctx: &RequestContext,
    d: &ResourceData,
    service: ServiceVersion,
) -> Result<ServiceClient, ProviderError> {
    Ok(ctx.client(service, &ctx.region(d)).await?)
}

/// Polls `fetch` until the object's status reaches a target of `conf`.
pub(crate) async fn wait_status<T, F, Fut>(
    ctx: &RequestContext,
    conf: StateChangeConf,
    timeout: Duration,
    fetch: F,
) -> Result<Option<T>, ProviderError>
where
    T: Status,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, CloudError>>,
{
    let object = conf
        .timeout(timeout)
        .cancel_on(ctx.cancel_token())
        .wait_for_state(|| {
            let pending = fetch();
            async move {
                let object = pending.await?;
                let status = object.status().to_owned();
                Ok((Some(object), status))
            }
        })
        .await?;
    Ok(object)
}

/// The string at `path`, unless unset or empty.
pub(crate) fn opt_string(d: &ResourceData, path: &str) -> Option<String> {
    d.get_ok(path).and_then(Value::as_str).map(str::to_owned)
}

/// The new string at `path` when it changed. A cleared value is sent as `""`.
pub(crate) fn changed_string(d: &ResourceData, path: &str) -> Option<String> {
    d.has_change(path).then(|| d.get_string(path))
}

/// Completes a `max_items(1)` block of the plan so it compares equal to what read stores.
///
/// Fields left out of the configuration keep their prior value when computed and take their
/// zero value otherwise. A changed force-new field marks the whole block force-new.
pub(crate) fn complete_singleton(plan: &mut Plan, prior: Option<&InstanceState>, name: &str, block: &Block) {
    let Some(mut fields) = expand_singleton(plan.get(name)).cloned() else {
        return;
    };
    let old = prior
        .filter(|p| !p.is_gone())
        .and_then(|p| p.attributes.get(name))
        .and_then(expand_singleton);

    for (field, attribute) in block.iter() {
        if fields.get(field).is_some_and(|v| !v.is_null()) {
            continue;
        }
        let value = match old.and_then(|o| o.get(field)) {
            Some(v) if attribute.computed => v.clone(),
            _ => Value::zero(&attribute.kind),
        };
        fields.insert(field.clone(), value);
    }

    let replace = old.is_some_and(|o| {
        block.iter().any(|(field, attribute)| {
            attribute.force_new
                && values_differ(
                    o.get(field).unwrap_or(&Value::Null),
                    fields.get(field).unwrap_or(&Value::Null),
                )
        })
    });

    plan.set_new(name, flatten_singleton(fields), prior);
    if replace {
        plan.force_new(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otc_framework::diff::{plan, PlanAction};
    use otc_framework::schema::{Attribute, Kind, Schema};
    use otc_framework::value_map;
    use std::collections::BTreeMap;

    fn block() -> Block {
        Block::new()
            .attr("type", Attribute::required(Kind::String).force_new())
            .attr("ip_address", Attribute::optional_computed(Kind::String).force_new())
            .attr("port_id", Attribute::optional(Kind::String))
    }

    fn schema() -> Schema {
        Schema::new(Block::new().attr(
            "publicip",
            Attribute::required(Kind::block_list(block())).max_items(1),
        ))
    }

    fn prior(port: &str) -> InstanceState {
        InstanceState::new("eip-1").with_attribute(
            "publicip",
            Value::List(vec![value_map! {
                "type" => "5_bgp",
                "ip_address" => "80.158.1.1",
                "port_id" => port,
            }]),
        )
    }

    fn config(fields: Value) -> BTreeMap<String, Value> {
        BTreeMap::from([("publicip".to_owned(), Value::List(vec![fields]))])
    }

    #[test]
    fn test_unset_computed_field_keeps_prior() {
        let prior = prior("");
        let mut p = plan(&schema(), Some(&prior), &config(value_map! {"type" => "5_bgp"}));
        complete_singleton(&mut p, Some(&prior), "publicip", &block());

        assert_eq!(p.action(), PlanAction::NoOp);
        assert_eq!(p.get("publicip").get_path("0.ip_address"), Some(&Value::from("80.158.1.1")));
    }

    #[test]
    fn test_cleared_optional_field_is_an_update() {
        let prior = prior("port-1");
        let mut p = plan(&schema(), Some(&prior), &config(value_map! {"type" => "5_bgp"}));
        complete_singleton(&mut p, Some(&prior), "publicip", &block());

        assert_eq!(p.action(), PlanAction::Update);
        assert_eq!(p.get("publicip").get_path("0.port_id"), Some(&Value::from("")));
    }

    #[test]
    fn test_nested_force_new_replaces() {
        let prior = prior("");
        let mut p = plan(&schema(), Some(&prior), &config(value_map! {"type" => "5_mailbgp"}));
        complete_singleton(&mut p, Some(&prior), "publicip", &block());

        assert_eq!(p.action(), PlanAction::Replace);
        assert_eq!(p.diff.replace_paths(), vec!["publicip".to_owned()]);
    }
}
