//! The host protocol end to end: JSON lines in, JSON lines out, against the mock cloud.

use otc_framework::ProviderConfig;
use otc_mock_cloud::cloud::AUTH_URL;
use otc_mock_cloud::{MockCloud, MockCloudOptions};
use otc_provider::rpc::{serve, HANDSHAKE};
use otc_provider::OtcProvider;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::task::JoinHandle;

const PIPE_SIZE: usize = 64 * 1024;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("otc_provider=debug,otc_framework=debug")
        .with_test_writer()
        .try_init();
}

/// The engine side of the pipe. Requests are sent one at a time so each reply is the next line.
struct Engine {
    input: DuplexStream,
    output: Lines<BufReader<DuplexStream>>,
    server: JoinHandle<std::io::Result<()>>,
    next_id: u64,
}

impl Engine {
    async fn launch(cloud: &MockCloud) -> Self {
        init_tracing();
        let provider = OtcProvider::new(ProviderConfig::default())
            .expect("Failed to build registry")
            .with_transport(cloud.transport());
        let (input, server_input) = duplex(PIPE_SIZE);
        let (server_output, output) = duplex(PIPE_SIZE);
        let server = tokio::spawn(serve(Arc::new(provider), BufReader::new(server_input), server_output));

        let mut output = BufReader::new(output).lines();
        let first = output.next_line().await.unwrap();
        assert_eq!(first.as_deref(), Some(HANDSHAKE));
        Self {
            input,
            output,
            server,
            next_id: 1,
        }
    }

    async fn call(&mut self, method: &str, params: Value) -> Value {
        let id = self.next_id;
        self.next_id += 1;
        let mut line = serde_json::to_vec(&json!({"id": id, "method": method, "params": params})).unwrap();
        line.push(b'\n');
        self.input.write_all(&line).await.unwrap();

        let reply = self.output.next_line().await.unwrap().expect("provider closed the pipe");
        let reply: Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(reply["id"], id);
        reply
    }

    /// Calls `method` and asserts no error diagnostics came back.
    async fn ok(&mut self, method: &str, params: Value) -> Value {
        let reply = self.call(method, params).await;
        let errors: Vec<_> = reply["diagnostics"]
            .as_array()
            .into_iter()
            .flatten()
            .filter(|d| d["severity"] == "error")
            .collect();
        assert!(errors.is_empty(), "{method} failed: {errors:?}");
        reply["result"].clone()
    }

    async fn shut_down(mut self) {
        let reply = self.call("Stop", Value::Null).await;
        assert_eq!(reply["result"], json!({}));
        assert_eq!(self.output.next_line().await.unwrap(), None);
        self.server.await.unwrap().unwrap();
    }
}

fn configure_params(cloud: &MockCloud) -> Value {
    json!({
        "auth_url": AUTH_URL,
        "region": cloud.region(),
        "domain_name": "OTC-EU-DE-00000000001000000001",
        "project_name": format!("{}_mock", cloud.region()),
        "user_name": "mock-user",
        "password": "mock-password",
        "retry_base_delay_ms": 1,
    })
}

/// Configure, plan, create, refresh, look up and destroy a VPC through the host protocol.
#[tokio::test(start_paused = true)]
async fn test_vpc_lifecycle_over_the_wire() {
    let cloud = MockCloud::start(MockCloudOptions::default());
    let mut engine = Engine::launch(&cloud).await;

    let schema = engine.ok("GetSchema", Value::Null).await;
    assert!(schema["data_source_schemas"]["opentelekomcloud_vpc_subnet_v1"].is_object());

    engine.ok("Configure", configure_params(&cloud)).await;

    let config = json!({"name": "vpc-wire", "cidr": "172.16.0.0/16"});
    let plan = engine
        .ok(
            "PlanResourceChange",
            json!({"type_name": "opentelekomcloud_vpc_v1", "prior_state": null, "config": config}),
        )
        .await;
    assert_eq!(plan["action"], "create");

    let applied = engine
        .ok(
            "ApplyResourceChange",
            json!({
                "type_name": "opentelekomcloud_vpc_v1",
                "prior_state": null,
                "planned_state": plan["planned_state"],
            }),
        )
        .await;
    let state = applied["new_state"].clone();
    let id = state["id"].as_str().unwrap().to_owned();
    assert!(!id.is_empty());
    assert_eq!(state["attributes"]["status"], "ACTIVE");
    assert_eq!(state["attributes"]["name"], "vpc-wire");

    let read = engine
        .ok(
            "ReadResource",
            json!({"type_name": "opentelekomcloud_vpc_v1", "current_state": state}),
        )
        .await;
    assert_eq!(read["new_state"]["id"], id.as_str());

    let replan = engine
        .ok(
            "PlanResourceChange",
            json!({"type_name": "opentelekomcloud_vpc_v1", "prior_state": read["new_state"], "config": config}),
        )
        .await;
    assert_eq!(replan["action"], "no-op");
    assert_eq!(replan["requires_replace"], json!([]));

    let found = engine
        .ok(
            "ReadDataSource",
            json!({"type_name": "opentelekomcloud_vpc_v1", "config": {"name": "vpc-wire"}}),
        )
        .await;
    assert_eq!(found["state"]["id"], id.as_str());
    assert_eq!(found["state"]["attributes"]["cidr"], "172.16.0.0/16");

    let destroyed = engine
        .ok(
            "ApplyResourceChange",
            json!({
                "type_name": "opentelekomcloud_vpc_v1",
                "prior_state": read["new_state"],
                "planned_state": null,
            }),
        )
        .await;
    assert!(destroyed["new_state"].is_null());
    assert!(cloud.stores().vpcs.get(&id).await.is_err());

    engine.shut_down().await;
}

/// Failures come back as diagnostics on the request that caused them.
#[tokio::test(start_paused = true)]
async fn test_errors_travel_as_diagnostics() {
    let cloud = MockCloud::start(MockCloudOptions::default());
    let mut engine = Engine::launch(&cloud).await;

    let early = engine
        .call(
            "ReadResource",
            json!({"type_name": "opentelekomcloud_vpc_v1", "current_state": {"id": "vpc-1"}}),
        )
        .await;
    assert!(early.get("result").is_none());
    assert_eq!(early["diagnostics"][0]["summary"], "provider is not configured");

    let mut bad_login = configure_params(&cloud);
    bad_login["auth_url"] = Value::Null;
    let rejected = engine.call("Configure", bad_login).await;
    assert_eq!(rejected["diagnostics"][0]["severity"], "error");

    engine.ok("Configure", configure_params(&cloud)).await;

    let plan = engine
        .call(
            "PlanResourceChange",
            json!({"type_name": "opentelekomcloud_vpc_subnet_v1", "prior_state": null, "config": {"name": "s"}}),
        )
        .await;
    let attributes: Vec<_> = plan["diagnostics"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|d| d["attribute"].as_str())
        .collect();
    assert!(attributes.contains(&"cidr"));
    assert!(attributes.contains(&"vpc_id"));

    engine.shut_down().await;
}
