mod common;

use common::{attr, config, Harness, EIP, PORT};
use otc_framework::diff::PlanAction;
use otc_framework::transport::Method;
use otc_framework::{InstanceState, Value};
use serde_json::json;

async fn network_with_port(h: &Harness) -> InstanceState {
    let vpc = h.vpc("vpc-eip", "192.168.0.0/16").await;
    let subnet = h.subnet(&vpc, "subnet-eip", "192.168.0.0/24", "192.168.0.1").await;
    h.create(
        PORT,
        config(json!({"name": "port-eip", "network_id": attr(&subnet, "network_id")})),
    )
    .await
}

fn eip_config(port_id: Option<&str>, size: i64) -> serde_json::Value {
    let mut publicip = json!({"type": "5_bgp"});
    if let Some(port_id) = port_id {
        publicip["port_id"] = json!(port_id);
    }
    json!({
        "publicip": [publicip],
        "bandwidth": [{"name": "bw-eip", "size": size, "share_type": "PER"}],
    })
}

/// An EIP created bound to a port reports the port's address, and unbinding it only
/// changes the binding.
#[tokio::test(start_paused = true)]
async fn test_eip_bind_and_unbind() {
    let h = Harness::start().await;
    let port = network_with_port(&h).await;
    let port_ip = h
        .cloud
        .stores()
        .ports
        .get(&port.id)
        .await
        .expect("port missing from cloud")
        .fixed_ips[0]
        .ip_address
        .clone();

    let bound = h.create(EIP, config(eip_config(Some(&port.id), 10))).await;
    assert_eq!(attr(&bound, "status"), "ACTIVE");
    assert_eq!(attr(&bound, "publicip.0.port_id"), port.id);
    assert_eq!(attr(&bound, "private_ip"), port_ip);
    assert!(attr(&bound, "address").starts_with("80.158."));
    assert_eq!(attr(&bound, "publicip.0.ip_address"), attr(&bound, "address"));

    let same = h.plan(EIP, Some(&bound), &config(eip_config(Some(&port.id), 10)));
    assert_eq!(same.action(), PlanAction::NoOp, "unexpected diff: {:?}", same.diff);

    h.cloud.clear_calls();
    let unbound = h.update(EIP, &bound, config(eip_config(None, 10))).await;

    assert_eq!(unbound.id, bound.id);
    assert_eq!(attr(&unbound, "status"), "DOWN");
    assert_eq!(attr(&unbound, "private_ip"), "");
    assert_eq!(attr(&unbound, "publicip.0.port_id"), "");
    assert_eq!(attr(&unbound, "address"), attr(&bound, "address"));

    let puts = h.cloud.calls_to(Method::Put, "/publicips/");
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].body, json!({"publicip": {"port_id": null}}));
}

/// Bandwidth size changes in place; the share type forces a new IP.
#[tokio::test(start_paused = true)]
async fn test_eip_bandwidth_changes() {
    let h = Harness::start().await;
    let eip = h.create(EIP, config(eip_config(None, 5))).await;
    assert_eq!(attr(&eip, "status"), "DOWN");

    let resized = h.update(EIP, &eip, config(eip_config(None, 50))).await;
    assert_eq!(resized.get("bandwidth.0.size"), Some(&Value::Int(50)));
    let stored = h.cloud.stores().eips.get(&eip.id).await.expect("EIP missing from cloud");
    assert_eq!(stored.bandwidth_size, 50);

    let mut whole = eip_config(None, 50);
    whole["bandwidth"][0]["share_type"] = json!("WHOLE");
    let plan = h.plan(EIP, Some(&resized), &config(whole));
    assert_eq!(plan.action(), PlanAction::Replace);
    assert_eq!(plan.diff.replace_paths(), vec!["bandwidth"]);
}

/// Out-of-range bandwidth sizes never reach the cloud.
#[tokio::test(start_paused = true)]
async fn test_eip_size_is_validated() {
    let h = Harness::start().await;
    let plan = h
        .provider
        .plan(EIP, None, &config(eip_config(None, 5000)))
        .expect("Failed to plan");

    assert!(!plan.is_valid());
    let error = plan.diagnostics.errors().next().expect("missing error");
    assert_eq!(error.attribute.as_deref(), Some("bandwidth.0.size"));
}

/// A port reports its cloud defaults, and a string boolean for `admin_state_up` does not
/// cause a diff.
#[tokio::test(start_paused = true)]
async fn test_port_defaults_and_bool_strings() {
    let h = Harness::start().await;
    let port = network_with_port(&h).await;

    assert_eq!(attr(&port, "status"), "DOWN");
    assert_eq!(port.get("admin_state_up"), Some(&Value::Bool(true)));
    assert_eq!(
        port.get("security_group_ids"),
        Some(&Value::Set(vec![Value::from("default")]))
    );
    assert!(attr(&port, "mac_address").starts_with("fa:16:3e:"));
    assert_eq!(
        port.get("all_fixed_ips").and_then(Value::as_slice).map(<[Value]>::len),
        Some(1)
    );

    let cfg = config(json!({
        "name": "port-eip",
        "network_id": attr(&port, "network_id"),
        "admin_state_up": "true",
    }));
    let plan = h.plan(PORT, Some(&port), &cfg);
    assert_eq!(plan.action(), PlanAction::NoOp, "unexpected diff: {:?}", plan.diff);
}

/// Renaming a port sends only the name.
#[tokio::test(start_paused = true)]
async fn test_port_rename() {
    let h = Harness::start().await;
    let port = network_with_port(&h).await;

    h.cloud.clear_calls();
    let renamed = h
        .update(
            PORT,
            &port,
            config(json!({"name": "port-renamed", "network_id": attr(&port, "network_id")})),
        )
        .await;

    assert_eq!(attr(&renamed, "name"), "port-renamed");
    let puts = h.cloud.calls_to(Method::Put, "/ports/");
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].body, json!({"port": {"name": "port-renamed"}}));
}

/// Explicit security groups and `no_security_groups` are mutually exclusive.
#[tokio::test(start_paused = true)]
async fn test_port_security_group_conflict() {
    let h = Harness::start().await;
    let plan = h
        .provider
        .plan(
            PORT,
            None,
            &config(json!({
                "network_id": "net-1",
                "security_group_ids": ["sg-1"],
                "no_security_groups": true,
            })),
        )
        .expect("Failed to plan");

    assert!(!plan.is_valid());
    let summaries: Vec<_> = plan.diagnostics.errors().map(|d| d.summary.clone()).collect();
    assert!(summaries.iter().any(|s| s.contains("conflicts with")), "{summaries:?}");
    assert!(h.cloud.calls_to(Method::Post, "/ports").is_empty());
}
