mod common;

use common::{config, Harness, VPC};
use otc_framework::transport::Method;
use otc_framework::InstanceState;
use otc_mock_cloud::{MockCloudOptions, Timing};
use serde_json::json;
use std::time::Duration;

fn slow_cloud() -> MockCloudOptions {
    MockCloudOptions {
        timing: Timing {
            settle_reads: 100_000,
            delete_reads: 1,
        },
        ..Default::default()
    }
}

/// Stop interrupts a create that is waiting for the VPC; the ID recorded so far is kept.
#[tokio::test(start_paused = true)]
async fn test_stop_cancels_waiting_create() {
    let h = Harness::start_with(slow_cloud()).await;
    let cfg = config(json!({"name": "vpc-slow", "cidr": "10.0.0.0/16"}));
    let plan = h.plan(VPC, None, &cfg);

    let provider = h.provider.clone();
    let task = tokio::spawn(async move { provider.apply(VPC, None, Some(plan.planned)).await });

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(!task.is_finished());
    h.provider.stop();

    let outcome = task.await.expect("apply task panicked").expect("Failed to route apply");
    let err = outcome.error.expect("create must be cancelled");
    assert!(err.source.is_cancelled(), "{err}");
    assert!(!outcome.state.id.is_empty(), "the created VPC must stay in state");

    let stored = h.cloud.stores().vpcs.list(vec![]).await.expect("Failed to list VPCs");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, outcome.state.id);
}

/// Once stopped, new operations fail before touching the cloud.
#[tokio::test(start_paused = true)]
async fn test_calls_after_stop_are_cancelled() {
    let h = Harness::start().await;
    h.provider.stop();
    h.cloud.clear_calls();

    let plan = h.plan(VPC, None, &config(json!({"name": "vpc-late", "cidr": "10.0.0.0/16"})));
    let outcome = h.provider.apply(VPC, None, Some(plan.planned)).await.expect("Failed to route apply");

    assert!(outcome.error.expect("create must be cancelled").source.is_cancelled());
    assert_eq!(outcome.state, InstanceState::default());
    assert!(h.cloud.calls_to(Method::Post, "/vpcs").is_empty());
}

/// A VPC that never settles fails the create after its timeout, keeping the ID.
#[tokio::test(start_paused = true)]
async fn test_create_times_out() {
    let h = Harness::start_with(slow_cloud()).await;
    let plan = h.plan(VPC, None, &config(json!({"name": "vpc-stuck", "cidr": "10.0.0.0/16"})));

    let outcome = h.provider.apply(VPC, None, Some(plan.planned)).await.expect("Failed to route apply");

    let err = outcome.error.expect("create must time out");
    assert!(err.to_string().contains("timeout while waiting for state to become"), "{err}");
    assert!(!outcome.state.id.is_empty());
}

/// A transient 503 on create is retried by the client and the create succeeds.
#[tokio::test(start_paused = true)]
async fn test_transient_errors_are_retried() {
    let h = Harness::start().await;
    h.cloud.fail_next(Method::Post, "/vpcs", 503, 2);

    let state = h.vpc("vpc-retry", "10.9.0.0/16").await;

    assert!(!state.id.is_empty());
    let attempts = h
        .cloud
        .calls_to(Method::Post, "/vpcs")
        .into_iter()
        .filter(|c| c.path.ends_with("/vpcs"))
        .count();
    assert_eq!(attempts, 3);
}
