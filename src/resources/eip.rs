//! `opentelekomcloud_vpc_eip_v1`
//!
//! An elastic IP with its dedicated bandwidth. Both are single nested blocks; the plan is
//! completed in [`Resource::customize_diff`] because nested computed and force-new fields are
//! not handled by the generic plan. Rebinding to another port unbinds first, the cloud
//! refuses a direct switch.

use super::{complete_singleton, opt_string, service_client, wait_status};
use crate::services::vpc::{self, BandwidthSpec, BandwidthUpdate, PublicIpCreate, PublicIpSpec, PublicIpUpdate};
use async_trait::async_trait;
use otc_framework::diff::Plan;
use otc_framework::mapper::{flatten_singleton, Nullable};
use otc_framework::prelude::*;
use otc_framework::{tags, Verb};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

pub const NAME: &str = "opentelekomcloud_vpc_eip_v1";

const PORT_ID: &str = "publicip.0.port_id";

fn publicip_block() -> Block {
    Block::new()
        .attr(
            "type",
            Attribute::required(Kind::String)
                .force_new()
                .validate(validation::string_in_slice(&["5_bgp", "5_mailbgp", "5_gray"], false)),
        )
        .attr(
            "ip_address",
            Attribute::optional_computed(Kind::String)
                .force_new()
                .validate(validation::ip_address()),
        )
        .attr("port_id", Attribute::optional(Kind::String))
}

fn bandwidth_block() -> Block {
    Block::new()
        .attr(
            "name",
            Attribute::required(Kind::String).validate(validation::string_len_between(1, 64)),
        )
        .attr(
            "size",
            Attribute::required(Kind::Int).validate(validation::int_between(1, 1000)),
        )
        .attr(
            "share_type",
            Attribute::required(Kind::String)
                .force_new()
                .validate(validation::string_in_slice(&["PER", "WHOLE"], false)),
        )
        .attr(
            "charge_mode",
            Attribute::optional_computed(Kind::String)
                .force_new()
                .validate(validation::string_in_slice(&["bandwidth", "traffic"], false)),
        )
}

pub struct EipResource;

impl EipResource {
    /// Binds (`Value`) or unbinds (`Null`) the IP and waits for the cloud to settle.
    async fn bind(
        ctx: &RequestContext,
        client: &ServiceClient,
        id: &str,
        port_id: Nullable<String>,
        timeout: Duration,
    ) -> Result<(), ProviderError> {
        let target = match port_id {
            Nullable::Value(_) => "ACTIVE",
            _ => "DOWN",
        };
        debug!(id, ?port_id, "Changing elastic IP binding");
        vpc::update_public_ip(client, id, &PublicIpUpdate { port_id }).await?;
        let conf = StateChangeConf::update().with_target(&[target]);
        wait_status(ctx, conf, timeout, move || vpc::get_public_ip(client, id)).await?;
        Ok(())
    }
}

#[async_trait]
impl Resource for EipResource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn schema(&self) -> Schema {
        Schema::new(
            Block::new()
                .attr(
                    "publicip",
                    Attribute::required(Kind::block_list(publicip_block())).max_items(1),
                )
                .attr(
                    "bandwidth",
                    Attribute::required(Kind::block_list(bandwidth_block())).max_items(1),
                )
                .attr("address", Attribute::computed(Kind::String))
                .attr("private_ip", Attribute::computed(Kind::String))
                .attr("status", Attribute::computed(Kind::String))
                .attr("region", Attribute::region())
                .attr(tags::TAGS_ATTRIBUTE, tags::attribute()),
        )
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::default()
            .with_create(Duration::from_secs(10 * 60))
            .with_delete(Duration::from_secs(10 * 60))
    }

    fn tags(&self) -> Option<TagSpec> {
        Some(TagSpec::new(ServiceVersion::VpcV2, "publicips"))
    }

    async fn create(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = service_client(ctx, d, ServiceVersion::VpcV1).await?;
        let opts = PublicIpCreate {
            publicip: PublicIpSpec {
                ip_type: d.get_string("publicip.0.type"),
                ip_address: opt_string(d, "publicip.0.ip_address"),
                port_id: opt_string(d, PORT_ID),
            },
            bandwidth: BandwidthSpec {
                name: d.get_string("bandwidth.0.name"),
                size: d.get_int("bandwidth.0.size"),
                share_type: d.get_string("bandwidth.0.share_type"),
                charge_mode: opt_string(d, "bandwidth.0.charge_mode"),
            },
        };
        let created = vpc::create_public_ip(&client, &opts).await?;
        d.set_id(created.id.clone());
        info!(id = %created.id, address = %created.public_ip_address, "Elastic IP created");

        let (client, id) = (&client, created.id.as_str());
        let conf = StateChangeConf::build().with_target(&["ACTIVE", "DOWN"]);
        wait_status(ctx, conf, d.timeout(Verb::Create), move || vpc::get_public_ip(client, id)).await?;
        Ok(())
    }

    async fn read(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = service_client(ctx, d, ServiceVersion::VpcV1).await?;
        let eip = vpc::get_public_ip(&client, d.id()).await?;
        let region = ctx.region(d);
        let charge_mode = d.get_string("bandwidth.0.charge_mode");

        let publicip = BTreeMap::from([
            ("type".to_owned(), Value::from(eip.ip_type)),
            ("ip_address".to_owned(), Value::from(eip.public_ip_address.clone())),
            ("port_id".to_owned(), Value::from(eip.port_id.unwrap_or_default())),
        ]);
        let bandwidth = BTreeMap::from([
            ("name".to_owned(), Value::from(eip.bandwidth_name)),
            ("size".to_owned(), Value::from(eip.bandwidth_size)),
            ("share_type".to_owned(), Value::from(eip.bandwidth_share_type)),
            ("charge_mode".to_owned(), Value::from(charge_mode)),
        ]);
        d.set("publicip", flatten_singleton(publicip))?;
        d.set("bandwidth", flatten_singleton(bandwidth))?;
        d.set_many([
            ("address", eip.public_ip_address),
            ("private_ip", eip.private_ip_address.unwrap_or_default()),
            ("status", eip.status),
            ("region", region),
        ])?;
        Ok(())
    }

    async fn update(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = service_client(ctx, d, ServiceVersion::VpcV1).await?;
        let id = d.id().to_owned();
        let timeout = d.timeout(Verb::Update);

        if d.has_change(PORT_ID) {
            let (old, new) = d.get_change(PORT_ID);
            if !old.is_zero() && !new.is_zero() {
                Self::bind(ctx, &client, &id, Nullable::Null, timeout).await?;
            }
            let port_id = d.get_nullable::<String>(PORT_ID)?;
            Self::bind(ctx, &client, &id, port_id, timeout).await?;
        }

        if d.has_changes(&["bandwidth.0.name", "bandwidth.0.size"]) {
            let eip = vpc::get_public_ip(&client, &id).await?;
            let opts = BandwidthUpdate {
                name: d
                    .has_change("bandwidth.0.name")
                    .then(|| d.get_string("bandwidth.0.name")),
                size: d
                    .has_change("bandwidth.0.size")
                    .then(|| d.get_int("bandwidth.0.size")),
            };
            vpc::update_bandwidth(&client, &eip.bandwidth_id, &opts).await?;
        }
        Ok(())
    }

    async fn delete(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = service_client(ctx, d, ServiceVersion::VpcV1).await?;
        let id = d.id().to_owned();
        vpc::delete_public_ip(&client, &id).await?;

        let (client, id) = (&client, id.as_str());
        let conf = StateChangeConf::delete().with_pending(&["ACTIVE", "DOWN", "DELETING"]);
        wait_status(ctx, conf, d.timeout(Verb::Delete), move || vpc::get_public_ip(client, id)).await?;
        Ok(())
    }

    fn customize_diff(&self, plan: &mut Plan, prior: Option<&InstanceState>) -> Result<(), ProviderError> {
        complete_singleton(plan, prior, "publicip", &publicip_block());
        complete_singleton(plan, prior, "bandwidth", &bandwidth_block());
        Ok(())
    }
}
