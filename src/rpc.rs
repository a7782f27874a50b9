//! # Host Protocol
//!
//! The engine launches the provider binary and talks JSON lines over stdin/stdout. The
//! provider first writes the [`HANDSHAKE`] line, then answers one [`Response`] per
//! [`Request`]. Requests run concurrently; responses are written as they complete and carry
//! the request `id`.
//!
//! | Method | Params | Result |
//! |--------|--------|--------|
//! | `GetSchema` | - | `{resource_schemas, data_source_schemas}` |
//! | `Configure` | provider config object | `{}` |
//! | `ValidateResourceConfig` | `{type_name, config}` | `{}` |
//! | `PlanResourceChange` | `{type_name, prior_state, config}` | `{planned_state, action, requires_replace}` |
//! | `ApplyResourceChange` | `{type_name, prior_state, planned_state}` | `{new_state}` |
//! | `ReadResource` | `{type_name, current_state}` | `{new_state}` |
//! | `ImportResourceState` | `{type_name, id}` | `{imported}` |
//! | `ReadDataSource` | `{type_name, config}` | `{state}` |
//! | `Stop` | - | `{}` once every in-flight request answered |
//!
//! A state that no longer exists is sent as `null`. Errors and warnings travel in
//! `diagnostics`; an operation that failed part-way still returns the state to persist.

use crate::provider::{CallError, OtcProvider};
use otc_framework::diff::PlanAction;
use otc_framework::{Diagnostic, Diagnostics, InstanceState, ProviderConfig, Value};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument};

pub const HANDSHAKE: &str = "OTC_PROVIDER|1|stdio";

const RESPONSE_BUFFER: usize = 32;

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Diagnostics::is_empty")]
    pub diagnostics: Diagnostics,
}

impl Response {
    fn failed(id: Option<u64>, diagnostics: Diagnostics) -> Self {
        Self {
            id,
            result: None,
            diagnostics,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum RpcError {
    #[error("malformed request: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown method {0}")]
    UnknownMethod(String),

    #[error(transparent)]
    Call(#[from] CallError),
}

impl RpcError {
    fn diagnostics(&self) -> Diagnostics {
        match self {
            Self::Call(e) => e.diagnostics(),
            other => Diagnostic::from_error(other).into(),
        }
    }
}

#[derive(Deserialize)]
struct ConfigParams {
    type_name: String,
    #[serde(default)]
    config: BTreeMap<String, Value>,
}

#[derive(Deserialize)]
struct PlanParams {
    type_name: String,
    #[serde(default)]
    prior_state: Option<InstanceState>,
    #[serde(default)]
    config: BTreeMap<String, Value>,
}

#[derive(Deserialize)]
struct ApplyParams {
    type_name: String,
    #[serde(default)]
    prior_state: Option<InstanceState>,
    #[serde(default)]
    planned_state: Option<BTreeMap<String, Value>>,
}

#[derive(Deserialize)]
struct ReadParams {
    type_name: String,
    current_state: InstanceState,
}

#[derive(Deserialize)]
struct ImportParams {
    type_name: String,
    id: String,
}

fn params<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, RpcError> {
    Ok(serde_json::from_value(value)?)
}

fn state_json(state: &InstanceState) -> serde_json::Value {
    if state.is_gone() {
        serde_json::Value::Null
    } else {
        json!(state)
    }
}

fn action_name(action: PlanAction) -> &'static str {
    match action {
        PlanAction::Create => "create",
        PlanAction::Update => "update",
        PlanAction::Replace => "replace",
        PlanAction::NoOp => "no-op",
    }
}

async fn dispatch(
    provider: &OtcProvider,
    method: &str,
    raw: serde_json::Value,
) -> Result<(serde_json::Value, Diagnostics), RpcError> {
    match method {
        "GetSchema" => Ok((provider.schema(), Diagnostics::new())),
        "Configure" => {
            let config: ProviderConfig = if raw.is_null() { ProviderConfig::default() } else { params(raw)? };
            provider.configure(config).await?;
            Ok((json!({}), Diagnostics::new()))
        }
        "ValidateResourceConfig" => {
            let p: ConfigParams = params(raw)?;
            let diags = provider.validate(&p.type_name, &p.config)?;
            Ok((json!({}), diags))
        }
        "PlanResourceChange" => {
            let p: PlanParams = params(raw)?;
            let plan = provider.plan(&p.type_name, p.prior_state, &p.config)?;
            let result = json!({
                "planned_state": plan.planned,
                "action": action_name(plan.action()),
                "requires_replace": plan.diff.replace_paths(),
            });
            Ok((result, plan.diagnostics))
        }
        "ApplyResourceChange" => {
            let p: ApplyParams = params(raw)?;
            let outcome = provider.apply(&p.type_name, p.prior_state, p.planned_state).await?;
            Ok((json!({ "new_state": state_json(&outcome.state) }), outcome.diagnostics()))
        }
        "ReadResource" => {
            let p: ReadParams = params(raw)?;
            let outcome = provider.read(&p.type_name, p.current_state).await?;
            Ok((json!({ "new_state": state_json(&outcome.state) }), outcome.diagnostics()))
        }
        "ImportResourceState" => {
            let p: ImportParams = params(raw)?;
            let outcome = provider.import_state(&p.type_name, &p.id).await?;
            Ok((json!({ "imported": state_json(&outcome.state) }), outcome.diagnostics()))
        }
        "ReadDataSource" => {
            let p: ConfigParams = params(raw)?;
            let (state, diags) = provider.read_data_source(&p.type_name, &p.config).await?;
            Ok((json!({ "state": state }), diags))
        }
        other => Err(RpcError::UnknownMethod(other.to_owned())),
    }
}

#[instrument(skip(provider, request), fields(id = request.id, method = %request.method))]
async fn handle(provider: &OtcProvider, request: Request) -> Response {
    match dispatch(provider, &request.method, request.params).await {
        Ok((result, diagnostics)) => Response {
            id: Some(request.id),
            result: Some(result),
            diagnostics,
        },
        Err(e) => {
            debug!(error = %e, "Request failed");
            Response::failed(Some(request.id), e.diagnostics())
        }
    }
}

async fn write_response<W: AsyncWrite + Unpin>(output: &mut W, response: &Response) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(response)?;
    line.push(b'\n');
    output.write_all(&line).await?;
    output.flush().await
}

/// Runs the protocol until `Stop` or end of input. In-flight requests are always answered
/// before returning.
pub async fn serve<R, W>(provider: Arc<OtcProvider>, input: R, mut output: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    output.write_all(format!("{HANDSHAKE}\n").as_bytes()).await?;
    output.flush().await?;

    let (sender, mut receiver) = mpsc::channel::<Response>(RESPONSE_BUFFER);
    let mut tasks = JoinSet::new();
    let mut lines = input.lines();
    let mut draining = false;
    let mut stop_id = None;

    loop {
        if draining && tasks.is_empty() {
            break;
        }
        tokio::select! {
            line = lines.next_line(), if !draining => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match serde_json::from_str::<Request>(&line) {
                    Ok(request) if request.method == "Stop" => {
                        info!(id = request.id, in_flight = tasks.len(), "Stopping");
                        provider.stop();
                        stop_id = Some(request.id);
                        draining = true;
                    }
                    Ok(request) => {
                        let provider = provider.clone();
                        let sender = sender.clone();
                        tasks.spawn(async move {
                            let response = handle(&provider, request).await;
                            let _ = sender.send(response).await;
                        });
                    }
                    Err(e) => {
                        let diagnostics = RpcError::from(e).diagnostics();
                        write_response(&mut output, &Response::failed(None, diagnostics)).await?;
                    }
                },
                None => {
                    debug!(in_flight = tasks.len(), "Input closed");
                    draining = true;
                }
            },
            Some(response) = receiver.recv() => write_response(&mut output, &response).await?,
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    error!(error = %e, "Request task failed");
                }
            }
        }
    }

    while let Ok(response) = receiver.try_recv() {
        write_response(&mut output, &response).await?;
    }
    if let Some(id) = stop_id {
        let done = Response {
            id: Some(id),
            result: Some(json!({})),
            diagnostics: Diagnostics::new(),
        };
        write_response(&mut output, &done).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use otc_framework::mock::MockTransport;

    async fn run(input: &str) -> Vec<serde_json::Value> {
        let provider = OtcProvider::new(ProviderConfig::default())
            .unwrap()
            .with_transport(MockTransport::new().transport());
        let mut output = Vec::new();
        serve(Arc::new(provider), input.as_bytes(), &mut output).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(HANDSHAKE));
        lines.map(|l| serde_json::from_str(l).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_schema_request() {
        let responses = run("{\"id\":1,\"method\":\"GetSchema\"}\n").await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], 1);
        assert!(responses[0]["result"]["resource_schemas"]["opentelekomcloud_vpc_v1"].is_object());
    }

    #[tokio::test]
    async fn test_bad_lines_are_answered_with_diagnostics() {
        let responses = run("not json\n{\"id\":2,\"method\":\"Explode\"}\n").await;
        assert_eq!(responses.len(), 2);
        assert!(responses[0]["id"].is_null());
        assert_eq!(responses[1]["id"], 2);
        let summary = responses[1]["diagnostics"][0]["summary"].as_str().unwrap();
        assert!(summary.contains("unknown method Explode"));
    }

    #[tokio::test]
    async fn test_stop_is_answered_last() {
        let responses = run(concat!(
            "{\"id\":1,\"method\":\"ValidateResourceConfig\",\"params\":{\"type_name\":\"opentelekomcloud_vpc_v1\",\"config\":{\"cidr\":\"10.0.0.0/8\"}}}\n",
            "{\"id\":2,\"method\":\"Stop\"}\n",
            "{\"id\":3,\"method\":\"GetSchema\"}\n",
        ))
        .await;
        let ids: Vec<_> = responses.iter().map(|r| r["id"].as_u64()).collect();
        assert_eq!(ids, vec![Some(1), Some(2)]);

        let summary = responses[0]["diagnostics"][0]["summary"].as_str().unwrap();
        assert!(summary.contains("missing required argument \"name\""));
    }
}
