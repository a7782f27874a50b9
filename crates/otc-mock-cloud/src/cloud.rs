//! # Mock Cloud
//!
//! [`MockCloud`] wires one store actor per object kind and implements the framework's
//! [`Transport`], so a `ClientFactory` built on it runs the whole provider stack in memory.
//! Besides answering requests it records them, serves Keystone, and lets tests inject failures
//! or delete objects behind the provider's back.

use crate::error::ApiError;
use crate::models::peering::PeeringContext;
use crate::routes::{dispatch, ApiRequest, Stores};
use crate::store::{StoreActor, Timing};
use async_trait::async_trait;
use otc_framework::error::CloudError;
use otc_framework::transport::{HttpRequest, HttpResponse, Method, Transport};
use otc_framework::ProviderConfig;
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

const STORE_BUFFER: usize = 64;

pub const AUTH_URL: &str = "https://iam.eu-de.otc.t-systems.com/v3";

#[derive(Debug, Clone)]
pub struct MockCloudOptions {
    pub project_id: String,
    pub region: String,
    pub token: String,
    pub timing: Timing,
}

impl Default for MockCloudOptions {
    fn default() -> Self {
        Self {
            project_id: "5dd3c0b24cdc4d31952c49589182a89d".to_owned(),
            region: "eu-de".to_owned(),
            token: "mock-token".to_owned(),
            timing: Timing::default(),
        }
    }
}

/// One request as the cloud received it.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub body: serde_json::Value,
}

impl Call {
    fn matches(&self, method: Method, fragment: &str) -> bool {
        self.method == method && self.path.contains(fragment)
    }
}

/// The object kinds that can be deleted out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Vpc,
    Subnet,
    Eip,
    Peering,
    Router,
    Port,
    Backup,
}

#[derive(Debug)]
struct Failure {
    method: Method,
    fragment: String,
    status: u16,
    remaining: u32,
}

struct Inner {
    options: MockCloudOptions,
    stores: Stores,
    calls: Mutex<Vec<Call>>,
    failures: Mutex<Vec<Failure>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

#[derive(Clone)]
pub struct MockCloud {
    inner: Arc<Inner>,
}

impl MockCloud {
    /// Spawns the store actors. Must be called inside a tokio runtime.
    pub fn start(options: MockCloudOptions) -> Self {
        let timing = options.timing;
        let (vpc_actor, vpcs) = StoreActor::new(STORE_BUFFER, timing);
        let (subnet_actor, subnets) = StoreActor::new(STORE_BUFFER, timing);
        let (eip_actor, eips) = StoreActor::new(STORE_BUFFER, timing);
        let (peering_actor, peerings) = StoreActor::new(STORE_BUFFER, timing);
        let (router_actor, routers) = StoreActor::new(STORE_BUFFER, timing);
        let (port_actor, ports) = StoreActor::new(STORE_BUFFER, timing);
        let (backup_actor, backups) = StoreActor::new(STORE_BUFFER, timing);

        tokio::spawn(vpc_actor.run(()));
        tokio::spawn(subnet_actor.run(vpcs.clone()));
        tokio::spawn(eip_actor.run(ports.clone()));
        tokio::spawn(peering_actor.run(PeeringContext {
            project_id: options.project_id.clone(),
            vpcs: vpcs.clone(),
        }));
        tokio::spawn(router_actor.run(()));
        tokio::spawn(port_actor.run(subnets.clone()));
        tokio::spawn(backup_actor.run(()));

        info!(project_id = %options.project_id, region = %options.region, "Mock cloud started");
        Self {
            inner: Arc::new(Inner {
                options,
                stores: Stores::new(vpcs, subnets, eips, peerings, routers, ports, backups),
                calls: Mutex::new(Vec::new()),
                failures: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::new(self.clone())
    }

    pub fn project_id(&self) -> &str {
        &self.inner.options.project_id
    }

    pub fn region(&self) -> &str {
        &self.inner.options.region
    }

    /// Password credentials accepted by the Keystone mock.
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            auth_url: Some(AUTH_URL.to_owned()),
            region: Some(self.region().to_owned()),
            domain_name: Some("OTC-EU-DE-00000000001000000001".to_owned()),
            project_name: Some(format!("{}_mock", self.region())),
            user_name: Some("mock-user".to_owned()),
            password: Some("mock-password".to_owned()),
            retry_base_delay_ms: Some(1),
            ..Default::default()
        }
    }

    pub fn stores(&self) -> &Stores {
        &self.inner.stores
    }

    /// Every request received so far, Keystone included.
    pub fn calls(&self) -> Vec<Call> {
        lock(&self.inner.calls).clone()
    }

    /// Requests with this method whose path contains `fragment`.
    pub fn calls_to(&self, method: Method, fragment: &str) -> Vec<Call> {
        lock(&self.inner.calls)
            .iter()
            .filter(|c| c.matches(method, fragment))
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.inner.calls).clear();
    }

    /// The next `times` requests matching `method` and `fragment` fail with `status`.
    pub fn fail_next(&self, method: Method, fragment: &str, status: u16, times: u32) {
        lock(&self.inner.failures).push(Failure {
            method,
            fragment: fragment.to_owned(),
            status,
            remaining: times,
        });
    }

    /// Deletes an object as if someone removed it outside the provider.
    pub async fn delete_out_of_band(&self, kind: EntityKind, id: &str) -> bool {
        let stores = &self.inner.stores;
        let removed = match kind {
            EntityKind::Vpc => stores.vpcs.remove(id).await,
            EntityKind::Subnet => stores.subnets.remove(id).await,
            EntityKind::Eip => stores.eips.remove(id).await,
            EntityKind::Peering => stores.peerings.remove(id).await,
            EntityKind::Router => stores.routers.remove(id).await,
            EntityKind::Port => stores.ports.remove(id).await,
            EntityKind::Backup => stores.backups.remove(id).await,
        };
        removed.unwrap_or(false)
    }

    fn take_failure(&self, call: &Call) -> Option<u16> {
        let mut failures = lock(&self.inner.failures);
        let index = failures
            .iter()
            .position(|f| f.remaining > 0 && call.matches(f.method, &f.fragment))?;
        let failure = &mut failures[index];
        failure.remaining -= 1;
        let status = failure.status;
        if failure.remaining == 0 {
            failures.remove(index);
        }
        Some(status)
    }

    fn keystone(&self, call: &Call) -> Option<HttpResponse> {
        let options = &self.inner.options;
        match (call.method, call.path.as_str()) {
            (Method::Post, "/v3/auth/tokens") => {
                let endpoint = |host: &str| {
                    json!([{
                        "interface": "public",
                        "region": options.region,
                        "region_id": options.region,
                        "url": format!("https://{host}.{}.otc.t-systems.com/", options.region),
                    }])
                };
                let body = json!({"token": {
                    "project": {"id": options.project_id, "name": format!("{}_mock", options.region)},
                    "catalog": [
                        {"type": "vpc", "name": "vpc", "endpoints": endpoint("vpc")},
                        {"type": "network", "name": "neutron", "endpoints": endpoint("vpc")},
                        {"type": "rds", "name": "rds", "endpoints": endpoint("rds")},
                    ],
                }});
                Some(HttpResponse::json(201, &body).with_header("x-subject-token", options.token.clone()))
            }
            (Method::Get, "/v3/projects") => Some(HttpResponse::json(
                200,
                &json!({"projects": [{"id": options.project_id}]}),
            )),
            _ => None,
        }
    }

    fn authorized(&self, request: &HttpRequest) -> bool {
        let token_ok = request
            .headers
            .get("x-auth-token")
            .is_some_and(|t| *t == self.inner.options.token);
        let signed = request
            .headers
            .get("authorization")
            .is_some_and(|a| a.starts_with("SDK-HMAC-SHA256 "));
        token_ok || signed
    }
}

#[async_trait]
impl Transport for MockCloud {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, CloudError> {
        let call = Call {
            method: request.method,
            path: request.path().to_owned(),
            query: request.query().map(str::to_owned),
            body: request.json(),
        };
        debug!(method = %call.method, path = %call.path, "Mock request");
        lock(&self.inner.calls).push(call.clone());

        if let Some(status) = self.take_failure(&call) {
            debug!(status, "Injected failure");
            return Ok(ApiError::new(status, "Mock.0001", "injected failure").into_response());
        }
        if let Some(response) = self.keystone(&call) {
            return Ok(response);
        }
        if !self.authorized(&request) {
            return Ok(ApiError::new(401, "APIGW.0301", "incorrect token or signature").into_response());
        }

        let api_request = ApiRequest::new(call.method, &call.path, call.query.as_deref(), call.body);
        Ok(dispatch(&self.inner.stores, &self.inner.options.project_id, &api_request).await)
    }
}
