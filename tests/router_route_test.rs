mod common;

use common::{attr, config, Harness, ROUTE};
use otc_framework::diff::PlanAction;
use otc_mock_cloud::models::router::{Route, RouterCreate};
use serde_json::json;
use std::collections::BTreeMap;

async fn router(h: &Harness) -> String {
    h.cloud
        .stores()
        .routers
        .create(RouterCreate {
            name: "router-main".to_owned(),
            routes: vec![],
        })
        .await
        .expect("Failed to create router")
        .id
}

fn route_config(router_id: &str, destination: &str, next_hop: &str) -> BTreeMap<String, otc_framework::Value> {
    config(json!({"router_id": router_id, "destination": destination, "next_hop": next_hop}))
}

async fn routes_of(h: &Harness, router_id: &str) -> Vec<Route> {
    h.cloud.stores().routers.get(router_id).await.expect("router missing").routes
}

/// Routes added concurrently to one router all survive.
#[tokio::test(start_paused = true)]
async fn test_concurrent_routes_on_one_router() {
    let h = Harness::start().await;
    let router_id = router(&h).await;

    let (a, b, c) = tokio::join!(
        h.create(ROUTE, route_config(&router_id, "10.1.0.0/16", "192.168.0.4")),
        h.create(ROUTE, route_config(&router_id, "10.2.0.0/16", "192.168.0.5")),
        h.create(ROUTE, route_config(&router_id, "0.0.0.0/0", "192.168.0.1")),
    );

    assert_eq!(a.id, format!("{router_id}-route-10.1.0.0/16-192.168.0.4"));
    assert_eq!(attr(&b, "destination"), "10.2.0.0/16");
    assert_eq!(attr(&c, "next_hop"), "192.168.0.1");
    assert_eq!(routes_of(&h, &router_id).await.len(), 3);

    let (_, _) = tokio::join!(h.destroy(ROUTE, &a), h.destroy(ROUTE, &b));
    let left = routes_of(&h, &router_id).await;
    assert_eq!(
        left,
        vec![Route {
            destination: "0.0.0.0/0".to_owned(),
            nexthop: "192.168.0.1".to_owned(),
        }]
    );
}

/// Adding a route the router already has is an error, and changing the next hop replaces.
#[tokio::test(start_paused = true)]
async fn test_duplicate_route_and_replacement() {
    let h = Harness::start().await;
    let router_id = router(&h).await;
    let route = h.create(ROUTE, route_config(&router_id, "10.1.0.0/16", "192.168.0.4")).await;

    let cfg = route_config(&router_id, "10.1.0.0/16", "192.168.0.4");
    let plan = h.plan(ROUTE, None, &cfg);
    let outcome = h.apply(ROUTE, None, Some(plan.planned)).await;
    let err = outcome.error.expect("duplicate route must fail");
    assert!(err.to_string().contains("already has a route"), "{err}");

    let moved = h.plan(ROUTE, Some(&route), &route_config(&router_id, "10.1.0.0/16", "192.168.0.9"));
    assert_eq!(moved.action(), PlanAction::Replace);
}

/// A route is imported by its composite ID; removing it from the router makes it gone.
#[tokio::test(start_paused = true)]
async fn test_route_import_and_drift() {
    let h = Harness::start().await;
    let router_id = router(&h).await;
    let route = h.create(ROUTE, route_config(&router_id, "10.3.0.0/16", "192.168.0.7")).await;

    let imported = h
        .provider
        .import_state(ROUTE, &route.id)
        .await
        .expect("Failed to route import")
        .into_result()
        .expect("Failed to import route");
    assert_eq!(imported.id, route.id);
    assert_eq!(attr(&imported, "router_id"), router_id);
    assert_eq!(attr(&imported, "destination"), "10.3.0.0/16");
    assert_eq!(attr(&imported, "next_hop"), "192.168.0.7");

    let bad = h
        .provider
        .import_state(ROUTE, "no-separator-here")
        .await
        .expect("Failed to route import");
    assert!(bad.error.expect("malformed id must fail").to_string().contains("invalid import id"));

    h.cloud
        .stores()
        .routers
        .update(
            &router_id,
            otc_mock_cloud::models::router::RouterUpdate {
                name: None,
                routes: Some(vec![]),
            },
        )
        .await
        .expect("Failed to clear routes");

    let outcome = h.provider.read(ROUTE, route.clone()).await.expect("Failed to route read");
    assert!(outcome.is_ok());
    assert!(outcome.state.is_gone());

    // Deleting a route that is already gone succeeds.
    h.destroy(ROUTE, &route).await;
}
