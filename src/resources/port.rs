//! `opentelekomcloud_networking_port_v2`

use super::{opt_string, service_client, wait_status};
use crate::services::networking::{self, AddressPair, FixedIp, Port, PortCreate, PortUpdate};
use async_trait::async_trait;
use otc_framework::mapper::{expand_string_list, flatten_string_list, flatten_string_set};
use otc_framework::prelude::*;
use otc_framework::Verb;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

pub const NAME: &str = "opentelekomcloud_networking_port_v2";

fn fixed_ip_block() -> Block {
    Block::new()
        .attr("subnet_id", Attribute::required(Kind::String))
        .attr(
            "ip_address",
            Attribute::optional_computed(Kind::String).validate(validation::ip_address()),
        )
}

fn address_pair_block() -> Block {
    Block::new()
        .attr(
            "ip_address",
            Attribute::required(Kind::String).validate(validation::ip_address()),
        )
        .attr("mac_address", Attribute::optional_computed(Kind::String))
}

fn field(item: &Value, name: &str) -> String {
    item.get_path(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

fn expand_fixed_ips(d: &ResourceData) -> Vec<FixedIp> {
    d.get("fixed_ip")
        .as_slice()
        .unwrap_or_default()
        .iter()
        .map(|item| FixedIp {
            subnet_id: field(item, "subnet_id"),
            ip_address: field(item, "ip_address"),
        })
        .collect()
}

fn expand_address_pairs(d: &ResourceData) -> Vec<AddressPair> {
    d.get("allowed_address_pairs")
        .as_slice()
        .unwrap_or_default()
        .iter()
        .map(|item| AddressPair {
            ip_address: field(item, "ip_address"),
            mac_address: field(item, "mac_address"),
        })
        .collect()
}

/// `Some(vec![])` strips every group, `None` leaves the cloud default.
fn expand_security_groups(d: &ResourceData) -> Option<Vec<String>> {
    if d.get_bool("no_security_groups") {
        return Some(Vec::new());
    }
    let groups = expand_string_list(d.get("security_group_ids"));
    (!groups.is_empty()).then_some(groups)
}

fn flatten_fixed_ips(port: &Port) -> Value {
    Value::List(
        port.fixed_ips
            .iter()
            .map(|ip| {
                Value::Map(BTreeMap::from([
                    ("subnet_id".to_owned(), Value::from(ip.subnet_id.clone())),
                    ("ip_address".to_owned(), Value::from(ip.ip_address.clone())),
                ]))
            })
            .collect(),
    )
}

fn flatten_address_pairs(port: &Port) -> Value {
    Value::List(
        port.allowed_address_pairs
            .iter()
            .map(|pair| {
                Value::Map(BTreeMap::from([
                    ("ip_address".to_owned(), Value::from(pair.ip_address.clone())),
                    ("mac_address".to_owned(), Value::from(pair.mac_address.clone())),
                ]))
            })
            .collect(),
    )
}

pub struct PortResource;

#[async_trait]
impl Resource for PortResource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn schema(&self) -> Schema {
        Schema::new(
            Block::new()
                .attr("name", Attribute::optional(Kind::String))
                .attr("network_id", Attribute::required(Kind::String).force_new())
                .attr(
                    "admin_state_up",
                    Attribute::optional_computed(Kind::Bool)
                        .diff_suppress(validation::suppress_bool_string),
                )
                .attr("mac_address", Attribute::optional_computed(Kind::String).force_new())
                .attr("device_owner", Attribute::optional_computed(Kind::String))
                .attr("device_id", Attribute::optional_computed(Kind::String))
                .attr(
                    "security_group_ids",
                    Attribute::optional_computed(Kind::set_of(Kind::String))
                        .conflicts_with(&["no_security_groups"]),
                )
                .attr(
                    "no_security_groups",
                    Attribute::optional(Kind::Bool).conflicts_with(&["security_group_ids"]),
                )
                .attr("fixed_ip", Attribute::optional_computed(Kind::block_list(fixed_ip_block())))
                .attr(
                    "allowed_address_pairs",
                    Attribute::optional(Kind::block_set(address_pair_block()))
                        .set_hash(SetHash::KeyField("ip_address".to_owned())),
                )
                .attr("all_fixed_ips", Attribute::computed(Kind::list_of(Kind::String)))
                .attr("status", Attribute::computed(Kind::String))
                .attr("region", Attribute::region()),
        )
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::default()
            .with_create(Duration::from_secs(10 * 60))
            .with_delete(Duration::from_secs(10 * 60))
    }

    async fn create(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = service_client(ctx, d, ServiceVersion::NetworkV2).await?;
        let fixed_ips = expand_fixed_ips(d);
        let pairs = expand_address_pairs(d);
        let opts = PortCreate {
            name: d.get_string("name"),
            network_id: d.get_string("network_id"),
            admin_state_up: d.get("admin_state_up").as_bool(),
            mac_address: opt_string(d, "mac_address"),
            fixed_ips: (!fixed_ips.is_empty()).then_some(fixed_ips),
            security_groups: expand_security_groups(d),
            allowed_address_pairs: (!pairs.is_empty()).then_some(pairs),
            device_owner: opt_string(d, "device_owner"),
            device_id: opt_string(d, "device_id"),
        };
        let created = networking::create_port(&client, &opts).await?;
        d.set_id(created.id.clone());
        info!(id = %created.id, "Port created");

        let (client, id) = (&client, created.id.as_str());
        let conf = StateChangeConf::new(&["BUILD"], &["ACTIVE", "DOWN"]);
        wait_status(ctx, conf, d.timeout(Verb::Create), move || networking::get_port(client, id)).await?;
        Ok(())
    }

    async fn read(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = service_client(ctx, d, ServiceVersion::NetworkV2).await?;
        let port = networking::get_port(&client, d.id()).await?;
        let region = ctx.region(d);

        d.set("fixed_ip", flatten_fixed_ips(&port))?;
        d.set("allowed_address_pairs", flatten_address_pairs(&port))?;
        d.set(
            "all_fixed_ips",
            flatten_string_list(port.fixed_ips.iter().map(|ip| ip.ip_address.clone())),
        )?;
        d.set("security_group_ids", flatten_string_set(port.security_groups))?;
        d.set("admin_state_up", port.admin_state_up)?;
        d.set_many([
            ("name", port.name),
            ("network_id", port.network_id),
            ("mac_address", port.mac_address),
            ("device_owner", port.device_owner),
            ("device_id", port.device_id),
            ("status", port.status),
            ("region", region),
        ])?;
        Ok(())
    }

    async fn update(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = service_client(ctx, d, ServiceVersion::NetworkV2).await?;
        let groups_changed = d.has_changes(&["security_group_ids", "no_security_groups"]);
        let opts = PortUpdate {
            name: d.has_change("name").then(|| d.get_string("name")),
            admin_state_up: d
                .has_change("admin_state_up")
                .then(|| d.get_bool("admin_state_up")),
            fixed_ips: d.has_change("fixed_ip").then(|| expand_fixed_ips(d)),
            security_groups: if groups_changed {
                Some(expand_security_groups(d).unwrap_or_default())
            } else {
                None
            },
            allowed_address_pairs: d
                .has_change("allowed_address_pairs")
                .then(|| expand_address_pairs(d)),
            device_owner: d.has_change("device_owner").then(|| d.get_string("device_owner")),
            device_id: d.has_change("device_id").then(|| d.get_string("device_id")),
        };
        networking::update_port(&client, d.id(), &opts).await?;
        Ok(())
    }

    async fn delete(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = service_client(ctx, d, ServiceVersion::NetworkV2).await?;
        let id = d.id().to_owned();
        networking::delete_port(&client, &id).await?;

        let (client, id) = (&client, id.as_str());
        let conf = StateChangeConf::delete().with_pending(&["ACTIVE", "DOWN", "BUILD", "DELETING"]);
        wait_status(ctx, conf, d.timeout(Verb::Delete), move || networking::get_port(client, id)).await?;
        Ok(())
    }
}
