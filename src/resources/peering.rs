//! `opentelekomcloud_vpc_peering_connection_v2`
//!
//! A peering inside one tenant becomes `ACTIVE` on its own. A cross-tenant peering stops in
//! `PENDING_ACCEPTANCE` until the peer tenant answers with the accepter resource.

use super::{changed_string, opt_string, service_client, vpc::name_validator, wait_status};
use crate::services::networking::{self, Peering, PeeringCreate, PeeringUpdate, VpcInfo};
use async_trait::async_trait;
use otc_framework::prelude::*;
use otc_framework::Verb;
use std::time::Duration;
use tracing::info;

pub const NAME: &str = "opentelekomcloud_vpc_peering_connection_v2";

/// Writes the fields shared by the peering and accepter resources.
pub(crate) fn set_peering(d: &mut ResourceData, peering: Peering) -> Result<(), ProviderError> {
    d.set_many([
        ("name", peering.name),
        ("description", peering.description),
        ("status", peering.status),
        ("vpc_id", peering.request_vpc_info.vpc_id),
        ("peer_vpc_id", peering.accept_vpc_info.vpc_id),
        ("peer_tenant_id", peering.accept_vpc_info.tenant_id),
    ])?;
    Ok(())
}

pub struct PeeringResource;

#[async_trait]
impl Resource for PeeringResource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn schema(&self) -> Schema {
        Schema::new(
            Block::new()
                .attr("name", Attribute::required(Kind::String).validate(name_validator()))
                .attr("description", Attribute::optional(Kind::String))
                .attr("vpc_id", Attribute::required(Kind::String).force_new())
                .attr("peer_vpc_id", Attribute::required(Kind::String).force_new())
                .attr("peer_tenant_id", Attribute::optional_computed(Kind::String).force_new())
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
        let opts = PeeringCreate {
            name: d.get_string("name"),
            description: opt_string(d, "description"),
            request_vpc_info: VpcInfo {
                vpc_id: d.get_string("vpc_id"),
                tenant_id: String::new(),
            },
            accept_vpc_info: VpcInfo {
                vpc_id: d.get_string("peer_vpc_id"),
                tenant_id: d.get_string("peer_tenant_id"),
            },
        };
        let created = networking::create_peering(&client, &opts).await?;
        d.set_id(created.id.clone());
        info!(id = %created.id, "Peering connection requested");

        let (client, id) = (&client, created.id.as_str());
        let conf = StateChangeConf::new(&["CREATING"], &["PENDING_ACCEPTANCE", "ACTIVE"]);
        wait_status(ctx, conf, d.timeout(Verb::Create), move || networking::get_peering(client, id)).await?;
        Ok(())
    }

    async fn read(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = service_client(ctx, d, ServiceVersion::NetworkV2).await?;
        let peering = networking::get_peering(&client, d.id()).await?;
        let region = ctx.region(d);
        set_peering(d, peering)?;
        d.set("region", region)?;
        Ok(())
    }

    async fn update(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        if !d.has_changes(&["name", "description"]) {
            return Ok(());
        }
        let client = service_client(ctx, d, ServiceVersion::NetworkV2).await?;
        let opts = PeeringUpdate {
            name: changed_string(d, "name"),
            description: changed_string(d, "description"),
        };
        networking::update_peering(&client, d.id(), &opts).await?;
        Ok(())
    }

    async fn delete(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = service_client(ctx, d, ServiceVersion::NetworkV2).await?;
        let id = d.id().to_owned();
        networking::delete_peering(&client, &id).await?;

        let (client, id) = (&client, id.as_str());
        let conf = StateChangeConf::delete().with_pending(&[
            "ACTIVE",
            "PENDING_ACCEPTANCE",
            "REJECTED",
            "EXPIRED",
            "DELETING",
        ]);
        wait_status(ctx, conf, d.timeout(Verb::Delete), move || networking::get_peering(client, id)).await?;
        Ok(())
    }
}
