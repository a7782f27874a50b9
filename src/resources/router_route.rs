//! `opentelekomcloud_networking_router_route_v2`
//!
//! One static route of a router. The router's route table is replaced as a whole, so every
//! change happens under a lock keyed by the router ID.

use super::service_client;
use crate::services::networking::{self, Route};
use async_trait::async_trait;
use otc_framework::prelude::*;
use otc_framework::CloudError;
use tracing::{debug, info};

pub const NAME: &str = "opentelekomcloud_networking_router_route_v2";

const SEPARATOR: &str = "-route-";

/// `<router>-route-<destination>-<nexthop>`
pub fn route_id(router_id: &str, destination: &str, nexthop: &str) -> String {
    format!("{router_id}{SEPARATOR}{destination}-{nexthop}")
}

/// Inverse of [`route_id`]. Next hops are IP addresses and never contain `-`.
pub fn parse_route_id(id: &str) -> Result<(String, Route), ProviderError> {
    let invalid = || ProviderError::Import {
        id: id.to_owned(),
        reason: format!("expected <router>{SEPARATOR}<destination>-<nexthop>"),
    };
    let (router_id, rest) = id.split_once(SEPARATOR).ok_or_else(invalid)?;
    let (destination, nexthop) = rest.rsplit_once('-').ok_or_else(invalid)?;
    if router_id.is_empty() || destination.is_empty() || nexthop.is_empty() {
        return Err(invalid());
    }
    Ok((
        router_id.to_owned(),
        Route {
            destination: destination.to_owned(),
            nexthop: nexthop.to_owned(),
        },
    ))
}

fn wanted(d: &ResourceData) -> Route {
    Route {
        destination: d.get_string("destination"),
        nexthop: d.get_string("next_hop"),
    }
}

pub struct RouterRouteResource;

#[async_trait]
impl Resource for RouterRouteResource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn schema(&self) -> Schema {
        Schema::new(
            Block::new()
                .attr("router_id", Attribute::required(Kind::String).force_new())
                .attr(
                    "destination",
                    Attribute::required(Kind::String).force_new().validate(validation::cidr()),
                )
                .attr(
                    "next_hop",
                    Attribute::required(Kind::String)
                        .force_new()
                        .validate(validation::ip_address()),
                )
                .attr("region", Attribute::region()),
        )
    }

    async fn create(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = service_client(ctx, d, ServiceVersion::NetworkV2).await?;
        let router_id = d.get_string("router_id");
        let route = wanted(d);

        let _lock = ctx.locks().lock(&router_id).await;
        let router = networking::get_router(&client, &router_id).await?;
        let mut routes = router.routes;
        if routes.contains(&route) {
            return Err(ProviderError::Validation(format!(
                "router {router_id} already has a route to {} via {}",
                route.destination, route.nexthop
            )));
        }
        routes.push(route.clone());
        networking::set_routes(&client, &router_id, &routes).await?;

        d.set_id(route_id(&router_id, &route.destination, &route.nexthop));
        info!(id = d.id(), "Route added");
        Ok(())
    }

    async fn read(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = service_client(ctx, d, ServiceVersion::NetworkV2).await?;
        let (router_id, route) = parse_route_id(d.id())?;
        let router = networking::get_router(&client, &router_id).await?;
        if !router.routes.contains(&route) {
            debug!(id = d.id(), "Route no longer on router");
            d.clear_id();
            return Ok(());
        }
        let region = ctx.region(d);
        d.set_many([
            ("router_id", router_id),
            ("destination", route.destination),
            ("next_hop", route.nexthop),
            ("region", region),
        ])?;
        Ok(())
    }

    async fn delete(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = service_client(ctx, d, ServiceVersion::NetworkV2).await?;
        let router_id = d.get_string("router_id");
        let route = wanted(d);

        let _lock = ctx.locks().lock(&router_id).await;
        let router = networking::get_router(&client, &router_id).await?;
        let before = router.routes.len();
        let routes: Vec<Route> = router.routes.into_iter().filter(|r| *r != route).collect();
        if routes.len() == before {
            return Err(CloudError::NotFound {
                url: client.url(&["routers", &router_id]),
            }
            .into());
        }
        networking::set_routes(&client, &router_id, &routes).await?;
        info!(id = d.id(), "Route removed");
        Ok(())
    }

    async fn import(&self, _ctx: &RequestContext, d: &mut ResourceData, id: &str) -> Result<(), ProviderError> {
        parse_route_id(id)?;
        d.set_id(id);
        Ok(())
    }
}
