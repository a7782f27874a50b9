//! `opentelekomcloud_vpc_v1`

use super::{changed_string, opt_string, service_client, wait_status};
use crate::services::vpc::{self, VpcCreate, VpcUpdate};
use async_trait::async_trait;
use otc_framework::prelude::*;
use otc_framework::{tags, Verb};
use std::time::Duration;
use tracing::info;

pub const NAME: &str = "opentelekomcloud_vpc_v1";

pub(crate) fn name_validator() -> validation::Validator {
    validation::all(vec![
        validation::string_len_between(1, 64),
        validation::string_matches(r"^[\w.-]*$", "only letters, digits, '_', '-' and '.' are allowed"),
    ])
}

pub struct VpcResource;

#[async_trait]
impl Resource for VpcResource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn schema(&self) -> Schema {
        Schema::new(
            Block::new()
                .attr("name", Attribute::required(Kind::String).validate(name_validator()))
                .attr("cidr", Attribute::required(Kind::String).validate(validation::cidr()))
                .attr(
                    "description",
                    Attribute::optional(Kind::String).validate(validation::string_len_between(0, 255)),
                )
                .attr("region", Attribute::region())
                .attr("status", Attribute::computed(Kind::String))
                .attr("shared", Attribute::computed(Kind::Bool))
                .attr(tags::TAGS_ATTRIBUTE, tags::attribute()),
        )
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::default()
            .with_create(Duration::from_secs(10 * 60))
            .with_delete(Duration::from_secs(3 * 60))
    }

    fn tags(&self) -> Option<TagSpec> {
        Some(TagSpec::new(ServiceVersion::VpcV2, "vpcs"))
    }

    async fn create(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = service_client(ctx, d, ServiceVersion::VpcV1).await?;
        let opts = VpcCreate {
            name: d.get_string("name"),
            cidr: opt_string(d, "cidr"),
            description: opt_string(d, "description"),
        };
        let created = vpc::create_vpc(&client, &opts).await?;
        d.set_id(created.id.clone());
        info!(id = %created.id, "VPC created, waiting for it to become active");

        let (client, id) = (&client, created.id.as_str());
        wait_status(ctx, StateChangeConf::build(), d.timeout(Verb::Create), move || {
            vpc::get_vpc(client, id)
        })
        .await?;
        Ok(())
    }

    async fn read(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = service_client(ctx, d, ServiceVersion::VpcV1).await?;
        let found = vpc::get_vpc(&client, d.id()).await?;
        let region = ctx.region(d);

        d.set_many([
            ("name", found.name),
            ("cidr", found.cidr),
            ("description", found.description),
            ("status", found.status),
            ("region", region),
        ])?;
        d.set("shared", found.enable_shared_snat)?;
        Ok(())
    }

    async fn update(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        if !d.has_changes(&["name", "cidr", "description"]) {
            return Ok(());
        }
        let client = service_client(ctx, d, ServiceVersion::VpcV1).await?;
        let opts = VpcUpdate {
            name: changed_string(d, "name"),
            cidr: changed_string(d, "cidr"),
            description: changed_string(d, "description"),
        };
        let id = d.id().to_owned();
        vpc::update_vpc(&client, &id, &opts).await?;

        let (client, id) = (&client, id.as_str());
        wait_status(ctx, StateChangeConf::build(), d.timeout(Verb::Update), move || {
            vpc::get_vpc(client, id)
        })
        .await?;
        Ok(())
    }

    async fn delete(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = service_client(ctx, d, ServiceVersion::VpcV1).await?;
        let id = d.id().to_owned();
        vpc::delete_vpc(&client, &id).await?;

        let (client, id) = (&client, id.as_str());
        wait_status(ctx, StateChangeConf::delete(), d.timeout(Verb::Delete), move || {
            vpc::get_vpc(client, id)
        })
        .await?;
        Ok(())
    }
}
