//! `opentelekomcloud_vpc_subnet_v1`
//!
//! Subnets report `UNKNOWN` while the cloud provisions or reconfigures them. Updates and
//! deletes address the subnet through its VPC.

use super::{changed_string, opt_string, service_client, vpc::name_validator, wait_status};
use crate::services::vpc::{self, SubnetCreate, SubnetUpdate};
use async_trait::async_trait;
use otc_framework::mapper::{expand_string_list, flatten_string_list};
use otc_framework::prelude::*;
use otc_framework::{tags, Verb};
use std::time::Duration;
use tracing::info;

pub const NAME: &str = "opentelekomcloud_vpc_subnet_v1";

const PENDING: &[&str] = &["UNKNOWN"];
const TARGET: &[&str] = &["ACTIVE"];

pub struct SubnetResource;

#[async_trait]
impl Resource for SubnetResource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn schema(&self) -> Schema {
        Schema::new(
            Block::new()
                .attr("name", Attribute::required(Kind::String).validate(name_validator()))
                .attr("description", Attribute::optional(Kind::String))
                .attr(
                    "cidr",
                    Attribute::required(Kind::String).force_new().validate(validation::cidr()),
                )
                .attr(
                    "gateway_ip",
                    Attribute::required(Kind::String)
                        .force_new()
                        .validate(validation::ip_address()),
                )
                .attr("vpc_id", Attribute::required(Kind::String).force_new())
                .attr("dhcp_enable", Attribute::optional(Kind::Bool).default_value(true))
                .attr(
                    "primary_dns",
                    Attribute::optional_computed(Kind::String).validate(validation::ip_address()),
                )
                .attr(
                    "secondary_dns",
                    Attribute::optional_computed(Kind::String).validate(validation::ip_address()),
                )
                .attr("dns_list", Attribute::optional_computed(Kind::list_of(Kind::String)))
                .attr("availability_zone", Attribute::optional_computed(Kind::String).force_new())
                .attr("region", Attribute::region())
                .attr("subnet_id", Attribute::computed(Kind::String))
                .attr("network_id", Attribute::computed(Kind::String))
                .attr("status", Attribute::computed(Kind::String))
                .attr(tags::TAGS_ATTRIBUTE, tags::attribute()),
        )
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::default()
            .with_create(Duration::from_secs(10 * 60))
            .with_delete(Duration::from_secs(10 * 60))
    }

    fn tags(&self) -> Option<TagSpec> {
        Some(TagSpec::new(ServiceVersion::VpcV2, "subnets"))
    }

    async fn create(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = service_client(ctx, d, ServiceVersion::VpcV1).await?;
        let dns_list = expand_string_list(d.get("dns_list"));
        let opts = SubnetCreate {
            name: d.get_string("name"),
            cidr: d.get_string("cidr"),
            gateway_ip: d.get_string("gateway_ip"),
            vpc_id: d.get_string("vpc_id"),
            description: opt_string(d, "description"),
            dhcp_enable: d.get_bool("dhcp_enable"),
            primary_dns: opt_string(d, "primary_dns"),
            secondary_dns: opt_string(d, "secondary_dns"),
            dns_list: (!dns_list.is_empty()).then_some(dns_list),
            availability_zone: opt_string(d, "availability_zone"),
        };
        let created = vpc::create_subnet(&client, &opts).await?;
        d.set_id(created.id.clone());
        info!(id = %created.id, "Subnet created, waiting for it to become active");

        let (client, id) = (&client, created.id.as_str());
        let conf = StateChangeConf::new(PENDING, TARGET);
        wait_status(ctx, conf, d.timeout(Verb::Create), move || vpc::get_subnet(client, id)).await?;
        Ok(())
    }

    async fn read(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = service_client(ctx, d, ServiceVersion::VpcV1).await?;
        let subnet = vpc::get_subnet(&client, d.id()).await?;
        let region = ctx.region(d);

        d.set_many([
            ("name", subnet.name),
            ("description", subnet.description),
            ("cidr", subnet.cidr),
            ("gateway_ip", subnet.gateway_ip),
            ("vpc_id", subnet.vpc_id),
            ("primary_dns", subnet.primary_dns),
            ("secondary_dns", subnet.secondary_dns),
            ("availability_zone", subnet.availability_zone),
            ("subnet_id", subnet.neutron_subnet_id),
            ("network_id", subnet.neutron_network_id),
            ("status", subnet.status),
            ("region", region),
        ])?;
        d.set("dhcp_enable", subnet.dhcp_enable)?;
        d.set("dns_list", flatten_string_list(subnet.dns_list))?;
        Ok(())
    }

    async fn update(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        let fields = ["name", "description", "dhcp_enable", "primary_dns", "secondary_dns", "dns_list"];
        if !d.has_changes(&fields) {
            return Ok(());
        }
        let client = service_client(ctx, d, ServiceVersion::VpcV1).await?;
        let opts = SubnetUpdate {
            name: changed_string(d, "name"),
            description: changed_string(d, "description"),
            dhcp_enable: d.has_change("dhcp_enable").then(|| d.get_bool("dhcp_enable")),
            primary_dns: changed_string(d, "primary_dns"),
            secondary_dns: changed_string(d, "secondary_dns"),
            dns_list: d
                .has_change("dns_list")
                .then(|| expand_string_list(d.get("dns_list"))),
        };
        let (vpc_id, id) = (d.get_string("vpc_id"), d.id().to_owned());
        vpc::update_subnet(&client, &vpc_id, &id, &opts).await?;

        let (client, id) = (&client, id.as_str());
        let conf = StateChangeConf::new(PENDING, TARGET);
        wait_status(ctx, conf, d.timeout(Verb::Update), move || vpc::get_subnet(client, id)).await?;
        Ok(())
    }

    async fn delete(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = service_client(ctx, d, ServiceVersion::VpcV1).await?;
        let (vpc_id, id) = (d.get_string("vpc_id"), d.id().to_owned());
        vpc::delete_subnet(&client, &vpc_id, &id).await?;

        let (client, id) = (&client, id.as_str());
        let conf = StateChangeConf::delete().with_pending(&["ACTIVE", "UNKNOWN", "DELETING"]);
        wait_status(ctx, conf, d.timeout(Verb::Delete), move || vpc::get_subnet(client, id)).await?;
        Ok(())
    }
}
