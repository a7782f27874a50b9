//! `opentelekomcloud_vpc_v1` data source.

use super::single;
use crate::resources::service_client;
use crate::services::vpc::{self, VpcFilter};
use async_trait::async_trait;
use otc_framework::prelude::*;

pub const NAME: &str = "opentelekomcloud_vpc_v1";

pub struct VpcDataSource;

#[async_trait]
impl DataSource for VpcDataSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn schema(&self) -> Schema {
        Schema::new(
            Block::new()
                .attr("id", Attribute::optional_computed(Kind::String))
                .attr("name", Attribute::optional_computed(Kind::String))
                .attr(
                    "cidr",
                    Attribute::optional_computed(Kind::String).validate(validation::cidr()),
                )
                .attr(
                    "status",
                    Attribute::optional_computed(Kind::String)
                        .validate(validation::string_in_slice(&["CREATING", "OK", "ACTIVE", "ERROR"], true)),
                )
                .attr("description", Attribute::computed(Kind::String))
                .attr("shared", Attribute::computed(Kind::Bool))
                .attr("region", Attribute::region()),
        )
    }

    async fn read(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = service_client(ctx, d, ServiceVersion::VpcV1).await?;
        let (id, name, cidr, status) = (
            d.get_string("id"),
            d.get_string("name"),
            d.get_string("cidr"),
            d.get_string("status").to_uppercase(),
        );
        let filter = VpcFilter {
            id: &id,
            name: &name,
            cidr: &cidr,
            status: &status,
        };
        let found = single("vpc", vpc::list_vpcs(&client, &filter).await?)?;
        let region = ctx.region(d);

        d.set_id(found.id.clone());
        d.set_many([
            ("id", found.id),
            ("name", found.name),
            ("cidr", found.cidr),
            ("status", found.status),
            ("description", found.description),
            ("region", region),
        ])?;
        d.set("shared", found.enable_shared_snat)?;
        Ok(())
    }
}
