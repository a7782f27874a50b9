//! `opentelekomcloud_vpc_subnet_v1` data source.

use super::single;
use crate::resources::service_client;
use crate::services::vpc::{self, SubnetFilter};
use async_trait::async_trait;
use otc_framework::mapper::flatten_string_list;
use otc_framework::prelude::*;

pub const NAME: &str = "opentelekomcloud_vpc_subnet_v1";

pub struct SubnetDataSource;

#[async_trait]
impl DataSource for SubnetDataSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn schema(&self) -> Schema {
        let filter = Attribute::optional_computed;
        Schema::new(
            Block::new()
                .attr("id", filter(Kind::String))
                .attr("name", filter(Kind::String))
                .attr("cidr", filter(Kind::String).validate(validation::cidr()))
                .attr("vpc_id", filter(Kind::String))
                .attr("gateway_ip", filter(Kind::String).validate(validation::ip_address()))
                .attr("status", filter(Kind::String))
                .attr("description", Attribute::computed(Kind::String))
                .attr("dhcp_enable", Attribute::computed(Kind::Bool))
                .attr("primary_dns", Attribute::computed(Kind::String))
                .attr("secondary_dns", Attribute::computed(Kind::String))
                .attr("dns_list", Attribute::computed(Kind::list_of(Kind::String)))
                .attr("availability_zone", Attribute::computed(Kind::String))
                .attr("subnet_id", Attribute::computed(Kind::String))
                .attr("network_id", Attribute::computed(Kind::String))
                .attr("region", Attribute::region()),
        )
    }

    async fn read(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = service_client(ctx, d, ServiceVersion::VpcV1).await?;
        let (id, name, cidr, vpc_id, gateway_ip, status) = (
            d.get_string("id"),
            d.get_string("name"),
            d.get_string("cidr"),
            d.get_string("vpc_id"),
            d.get_string("gateway_ip"),
            d.get_string("status"),
        );
        let filter = SubnetFilter {
            id: &id,
            name: &name,
            cidr: &cidr,
            vpc_id: &vpc_id,
            gateway_ip: &gateway_ip,
            status: &status,
        };
        let found = single("subnet", vpc::list_subnets(&client, &filter).await?)?;
        let region = ctx.region(d);

        d.set_id(found.id.clone());
        d.set("dhcp_enable", found.dhcp_enable)?;
        d.set("dns_list", flatten_string_list(found.dns_list))?;
        d.set_many([
            ("id", found.id),
            ("name", found.name),
            ("cidr", found.cidr),
            ("vpc_id", found.vpc_id),
            ("gateway_ip", found.gateway_ip),
            ("status", found.status),
            ("description", found.description),
            ("primary_dns", found.primary_dns),
            ("secondary_dns", found.secondary_dns),
            ("availability_zone", found.availability_zone),
            ("subnet_id", found.neutron_subnet_id),
            ("network_id", found.neutron_network_id),
            ("region", region),
        ])?;
        Ok(())
    }
}
