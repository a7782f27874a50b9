//! `opentelekomcloud_vpc_peering_connection_accepter_v2`
//!
//! Answers a cross-tenant peering request from the peer side. The resource ID is the
//! peering's ID; deleting it only forgets the state, the peering itself stays.

use super::{peering::set_peering, service_client, wait_status};
use crate::services::networking::{self, PeeringDecision};
use async_trait::async_trait;
use otc_framework::diag::Diagnostic;
use otc_framework::prelude::*;
use otc_framework::Verb;
use tracing::{info, warn};

pub const NAME: &str = "opentelekomcloud_vpc_peering_connection_accepter_v2";

const PENDING_ACCEPTANCE: &str = "PENDING_ACCEPTANCE";

pub struct PeeringAccepterResource;

impl PeeringAccepterResource {
    async fn answer(ctx: &RequestContext, d: &mut ResourceData, verb: Verb) -> Result<(), ProviderError> {
        let client = service_client(ctx, d, ServiceVersion::NetworkV2).await?;
        let id = d.get_string("vpc_peering_connection_id");
        let decision = if d.get_bool("accept") {
            PeeringDecision::Accept
        } else {
            PeeringDecision::Reject
        };

        let peering = networking::get_peering(&client, &id).await?;
        if peering.status == decision.target_status() {
            d.set_id(id);
            return Ok(());
        }
        if peering.status != PENDING_ACCEPTANCE {
            return Err(ProviderError::Validation(format!(
                "peering connection {id} is {}, only {PENDING_ACCEPTANCE} connections can be answered",
                peering.status
            )));
        }

        networking::decide_peering(&client, &id, decision).await?;
        d.set_id(id.clone());
        info!(%id, ?decision, "Peering request answered");

        let (client, id) = (&client, id.as_str());
        let conf = StateChangeConf::new(&[PENDING_ACCEPTANCE], &[decision.target_status()]);
        wait_status(ctx, conf, d.timeout(verb), move || networking::get_peering(client, id)).await?;
        Ok(())
    }
}

#[async_trait]
impl Resource for PeeringAccepterResource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn schema(&self) -> Schema {
        Schema::new(
            Block::new()
                .attr("vpc_peering_connection_id", Attribute::required(Kind::String).force_new())
                .attr("accept", Attribute::optional(Kind::Bool))
                .attr("name", Attribute::computed(Kind::String))
                .attr("description", Attribute::computed(Kind::String))
                .attr("status", Attribute::computed(Kind::String))
                .attr("vpc_id", Attribute::computed(Kind::String))
                .attr("peer_vpc_id", Attribute::computed(Kind::String))
                .attr("peer_tenant_id", Attribute::computed(Kind::String))
                .attr("region", Attribute::region()),
        )
    }

    async fn create(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        Self::answer(ctx, d, Verb::Create).await
    }

    async fn read(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = service_client(ctx, d, ServiceVersion::NetworkV2).await?;
        let peering = networking::get_peering(&client, d.id()).await?;
        let region = ctx.region(d);
        d.set("vpc_peering_connection_id", peering.id.clone())?;
        set_peering(d, peering)?;
        d.set("region", region)?;
        Ok(())
    }

    async fn update(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        if d.has_change("accept") {
            Self::answer(ctx, d, Verb::Update).await?;
        }
        Ok(())
    }

    async fn delete(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        warn!(id = d.id(), "Removing peering accepter from state only");
        ctx.warn(
            Diagnostic::warning("the peering connection was not deleted")
                .with_detail(format!(
                    "{} only stops tracking peering connection {}; delete it from the requesting side",
                    NAME,
                    d.id()
                )),
        );
        Ok(())
    }
}
