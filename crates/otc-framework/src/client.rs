//! # Client Factory
//!
//! Vends versioned per-service clients. Authentication happens once per process; every client
//! composes the cached [`AuthInfo`] with a service endpoint.
//!
//! ## Endpoint resolution
//!
//! 1. `endpoints` override from the provider configuration,
//! 2. the token's service catalog (public interface, matching region),
//! 3. `https://{service}.{region}.otc.t-systems.com/` (AK/SK only, which has no catalog).
//!
//! A catalog miss is an endpoint error. All factory failures surface as
//! `error creating <service> client: <cause>`.
//!
//! ## Caching
//!
//! Clients are cached process-wide by `(ServiceVersion, region)` under an exclusive lock.
//! [`crate::context::RequestContext`] adds a request-local layer on top so repeated lookups
//! inside one callback skip the shared map entirely.

use crate::auth::{authenticate, AuthError, AuthInfo};
use crate::config::ProviderConfig;
use crate::error::{classify, CloudError, ErrorClass, Phase};
use crate::transport::{HttpRequest, HttpResponse, Method, Transport};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_CLOUD_DOMAIN: &str = "otc.t-systems.com";

/// A versioned cloud service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceVersion {
    VpcV1,
    /// VPC v2 API, home of the tag endpoints.
    VpcV2,
    /// Neutron-compatible networking API.
    NetworkV2,
    RdsV3,
}

impl ServiceVersion {
    /// Service type as advertised by the catalog and used for endpoint overrides.
    pub fn service_type(self) -> &'static str {
        match self {
            Self::VpcV1 | Self::VpcV2 => "vpc",
            Self::NetworkV2 => "network",
            Self::RdsV3 => "rds",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::VpcV1 => "VPC v1",
            Self::VpcV2 => "VPC v2",
            Self::NetworkV2 => "Networking v2",
            Self::RdsV3 => "RDS v3",
        }
    }

    fn host(self) -> &'static str {
        match self {
            Self::VpcV1 | Self::VpcV2 | Self::NetworkV2 => "vpc",
            Self::RdsV3 => "rds",
        }
    }

    fn version_path(self, project_id: &str) -> String {
        match self {
            Self::VpcV1 => format!("v1/{project_id}"),
            Self::VpcV2 => format!("v2.0/{project_id}"),
            Self::NetworkV2 => "v2.0".to_owned(),
            Self::RdsV3 => format!("v3/{project_id}"),
        }
    }

    /// Full service endpoint, always ending in `/`.
    pub fn resolve(self, base: &str, project_id: &str) -> String {
        let base = base
            .replace("$(tenant_id)s", project_id)
            .replace("$(tenant_id)", project_id)
            .replace("%(tenant_id)s", project_id)
            .replace("{project_id}", project_id);
        let base = base.trim_end_matches('/');
        let path = self.version_path(project_id);
        if base.ends_with(&path) {
            format!("{base}/")
        } else {
            format!("{base}/{path}/")
        }
    }
}

impl fmt::Display for ServiceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    #[error("error creating {service} client: {reason}")]
    Config { service: ServiceVersion, reason: String },

    #[error("error creating {service} client: no public endpoint for service type {:?} in region {region}", .service.service_type())]
    Endpoint { service: ServiceVersion, region: String },

    #[error("error creating {service} client: {source}")]
    Transport {
        service: ServiceVersion,
        source: CloudError,
    },
}

impl ClientError {
    fn from_auth(service: ServiceVersion, err: AuthError) -> Self {
        match err {
            AuthError::Config(reason) => Self::Config { service, reason },
            AuthError::Transport(source) => Self::Transport { service, source },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: ProviderConfig::DEFAULT_MAX_RETRIES,
            base_delay: ProviderConfig::DEFAULT_RETRY_BASE_DELAY,
        }
    }
}

/// A ready-to-use client for one service in one region.
#[derive(Clone)]
pub struct ServiceClient {
    transport: Arc<dyn Transport>,
    auth: Arc<AuthInfo>,
    service: ServiceVersion,
    region: String,
    endpoint: String,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClient")
            .field("service", &self.service)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl ServiceClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        auth: Arc<AuthInfo>,
        service: ServiceVersion,
        region: impl Into<String>,
        endpoint: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            auth,
            service,
            region: region.into(),
            endpoint: endpoint.into(),
            retry,
            cancel: CancellationToken::new(),
        }
    }

    /// Copy of the client whose requests abort when `token` is cancelled.
    pub fn with_cancel(&self, token: CancellationToken) -> Self {
        Self {
            cancel: token,
            ..self.clone()
        }
    }

    pub fn service(&self) -> ServiceVersion {
        self.service
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn project_id(&self) -> &str {
        &self.auth.project_id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Joins path segments onto the service endpoint.
    pub fn url(&self, parts: &[&str]) -> String {
        let mut url = self.endpoint.clone();
        url.push_str(&parts.join("/"));
        url
    }

    /// Sends a request with retries for 5xx and network errors. Non-2xx responses become errors.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<HttpResponse, CloudError> {
        let mut attempt = 0u32;
        loop {
            let mut request = HttpRequest::new(method, url).header("accept", "application/json");
            if let Some(body) = &body {
                request = request.json_body(body);
            }
            let request = self.auth.authorize(request);

            debug!(%method, url, attempt, "Request");
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(CloudError::Cancelled),
                outcome = self.transport.send(request) => outcome,
            };
            let result = outcome.and_then(|response| check_status(method, url, response));

            match result {
                Err(e) if attempt < self.retry.max_retries
                    && classify(&e, Phase::Normal) == ErrorClass::Retryable =>
                {
                    let delay = self.retry.base_delay * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    warn!(%method, url, error = %e, attempt, ?delay, "Retrying request");
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(CloudError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                other => return other,
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, CloudError> {
        let response = self.request(Method::Get, url, None).await?;
        decode(url, &response)
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, url: &str, body: &B) -> Result<T, CloudError> {
        let response = self.request(Method::Post, url, Some(encode(url, body)?)).await?;
        decode(url, &response)
    }

    /// POST whose response body is ignored.
    pub async fn post_empty<B: Serialize>(&self, url: &str, body: &B) -> Result<(), CloudError> {
        self.request(Method::Post, url, Some(encode(url, body)?)).await?;
        Ok(())
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(&self, url: &str, body: &B) -> Result<T, CloudError> {
        let response = self.request(Method::Put, url, Some(encode(url, body)?)).await?;
        decode(url, &response)
    }

    pub async fn delete(&self, url: &str) -> Result<(), CloudError> {
        self.request(Method::Delete, url, None).await?;
        Ok(())
    }
}

fn check_status(method: Method, url: &str, response: HttpResponse) -> Result<HttpResponse, CloudError> {
    if response.is_success() {
        return Ok(response);
    }
    if response.status == 404 {
        return Err(CloudError::NotFound { url: url.to_owned() });
    }
    Err(CloudError::Http {
        method,
        url: url.to_owned(),
        status: response.status,
        message: error_message(&response),
    })
}

/// Pulls a human-readable message out of the usual error body shapes.
fn error_message(response: &HttpResponse) -> String {
    let json: serde_json::Value = match serde_json::from_slice(&response.body) {
        Ok(json) => json,
        Err(_) => return response.text(),
    };
    let candidates = [
        &json["message"],
        &json["error_msg"],
        &json["error"]["message"],
        &json["NeutronError"]["message"],
        &json["badRequest"]["message"],
    ];
    candidates
        .iter()
        .find_map(|v| v.as_str())
        .map(str::to_owned)
        .unwrap_or_else(|| json.to_string())
}

fn encode<B: Serialize>(url: &str, body: &B) -> Result<serde_json::Value, CloudError> {
    serde_json::to_value(body).map_err(|e| CloudError::Decode {
        url: url.to_owned(),
        message: format!("failed to encode request: {e}"),
    })
}

fn decode<T: DeserializeOwned>(url: &str, response: &HttpResponse) -> Result<T, CloudError> {
    let body: &[u8] = if response.body.is_empty() { b"null" } else { &response.body };
    serde_json::from_slice(body).map_err(|e| CloudError::Decode {
        url: url.to_owned(),
        message: e.to_string(),
    })
}

/// Authenticates once and hands out cached service clients.
pub struct ClientFactory {
    config: ProviderConfig,
    transport: Arc<dyn Transport>,
    auth: OnceCell<Arc<AuthInfo>>,
    cache: Mutex<HashMap<(ServiceVersion, String), ServiceClient>>,
}

impl fmt::Debug for ClientFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientFactory")
            .field("config", &self.config)
            .field("authenticated", &self.auth.initialized())
            .finish_non_exhaustive()
    }
}

impl ClientFactory {
    pub fn new(config: ProviderConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            auth: OnceCell::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Authentication artifacts, established on first call.
    pub async fn auth(&self) -> Result<Arc<AuthInfo>, AuthError> {
        self.auth
            .get_or_try_init(|| async {
                authenticate(&self.config, self.transport.as_ref())
                    .await
                    .map(Arc::new)
            })
            .await
            .cloned()
    }

    /// Returns a client for `service` in `region`, building and caching it on first use.
    pub async fn client_for(&self, service: ServiceVersion, region: &str) -> Result<ServiceClient, ClientError> {
        let key = (service, region.to_owned());
        let cached = self.lock_cache().get(&key).cloned();
        if let Some(client) = cached {
            return Ok(client);
        }

        let auth = self
            .auth()
            .await
            .map_err(|e| ClientError::from_auth(service, e))?;
        let base = self.base_endpoint(&auth, service, region)?;
        let endpoint = service.resolve(&base, &auth.project_id);
        debug!(%service, region, endpoint = %endpoint, "Created service client");

        let client = ServiceClient::new(
            self.transport.clone(),
            auth,
            service,
            region,
            endpoint,
            RetryPolicy {
                max_retries: self.config.max_retries(),
                base_delay: self.config.retry_base_delay(),
            },
        );
        let client = self.lock_cache().entry(key).or_insert(client).clone();
        Ok(client)
    }

    pub fn cached_clients(&self) -> usize {
        self.lock_cache().len()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<(ServiceVersion, String), ServiceClient>> {
        self.cache.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn base_endpoint(&self, auth: &AuthInfo, service: ServiceVersion, region: &str) -> Result<String, ClientError> {
        if let Some(url) = self.config.endpoints.get(service.service_type()) {
            return Ok(url.clone());
        }
        match &auth.catalog {
            Some(catalog) => catalog
                .endpoint(service.service_type(), region)
                .map(str::to_owned)
                .ok_or_else(|| ClientError::Endpoint {
                    service,
                    region: region.to_owned(),
                }),
            None => Ok(format!("https://{}.{region}.{DEFAULT_CLOUD_DOMAIN}/", service.host())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use serde_json::json;

    fn ak_sk_config() -> ProviderConfig {
        ProviderConfig {
            auth_url: Some("https://iam.eu-de.otc.t-systems.com/v3".into()),
            project_id: Some("p1".into()),
            access_key: Some("AK".into()),
            secret_key: Some("SK".into()),
            retry_base_delay_ms: Some(10),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_endpoint() {
        assert_eq!(
            ServiceVersion::VpcV1.resolve("https://vpc.eu-de.otc.t-systems.com", "p1"),
            "https://vpc.eu-de.otc.t-systems.com/v1/p1/"
        );
        assert_eq!(
            ServiceVersion::VpcV1.resolve("https://vpc.eu-de.otc.t-systems.com/v1/$(tenant_id)s", "p1"),
            "https://vpc.eu-de.otc.t-systems.com/v1/p1/"
        );
        assert_eq!(
            ServiceVersion::NetworkV2.resolve("https://vpc.eu-de.otc.t-systems.com/", "p1"),
            "https://vpc.eu-de.otc.t-systems.com/v2.0/"
        );
    }

    #[tokio::test]
    async fn test_clients_are_cached_per_service_and_region() {
        let mock = MockTransport::new();
        let factory = ClientFactory::new(ak_sk_config(), mock.transport());

        let a = factory.client_for(ServiceVersion::VpcV1, "eu-de").await.unwrap();
        let _ = factory.client_for(ServiceVersion::VpcV1, "eu-de").await.unwrap();
        let b = factory.client_for(ServiceVersion::VpcV1, "eu-nl").await.unwrap();
        assert_eq!(factory.cached_clients(), 2);
        assert_eq!(a.endpoint(), "https://vpc.eu-de.otc.t-systems.com/v1/p1/");
        assert_eq!(b.endpoint(), "https://vpc.eu-nl.otc.t-systems.com/v1/p1/");
        mock.verify();
    }

    #[tokio::test]
    async fn test_config_error_is_reported_with_service() {
        let mut config = ak_sk_config();
        config.auth_url = None;
        let factory = ClientFactory::new(config, MockTransport::new().transport());
        let err = factory.client_for(ServiceVersion::RdsV3, "eu-de").await.unwrap_err();
        assert!(matches!(err, ClientError::Config { .. }));
        assert!(err.to_string().starts_with("error creating RDS v3 client: "));
    }

    #[tokio::test]
    async fn test_endpoint_override_wins() {
        let mut config = ak_sk_config();
        config.endpoints.insert("vpc".into(), "http://localhost:9000".into());
        let factory = ClientFactory::new(config, MockTransport::new().transport());
        let client = factory.client_for(ServiceVersion::VpcV2, "eu-de").await.unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9000/v2.0/p1/");
    }

    #[tokio::test]
    async fn test_token_auth_uses_catalog() {
        let mock = MockTransport::new();
        mock.expect(Method::Post, "/v3/auth/tokens").respond_with(
            HttpResponse::json(
                201,
                &json!({"token": {
                    "project": {"id": "p9"},
                    "catalog": [{"type": "vpc", "endpoints": [
                        {"interface": "public", "region": "eu-de", "url": "https://vpc.example/"}
                    ]}]
                }}),
            )
            .with_header("X-Subject-Token", "tok"),
        );
        let config = ProviderConfig {
            auth_url: Some("https://iam.example/v3".into()),
            project_name: Some("eu-de_demo".into()),
            user_name: Some("u".into()),
            password: Some("pw".into()),
            domain_name: Some("d".into()),
            ..Default::default()
        };
        let factory = ClientFactory::new(config, mock.transport());

        let client = factory.client_for(ServiceVersion::VpcV1, "eu-de").await.unwrap();
        assert_eq!(client.endpoint(), "https://vpc.example/v1/p9/");

        let err = factory.client_for(ServiceVersion::RdsV3, "eu-de").await.unwrap_err();
        assert!(matches!(err, ClientError::Endpoint { .. }));
        mock.verify();
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_server_errors_then_succeeds() {
        let mock = MockTransport::new();
        mock.expect(Method::Get, "/v1/p1/vpcs/x").respond(503, json!({"message": "busy"}));
        mock.expect(Method::Get, "/v1/p1/vpcs/x").respond(200, json!({"vpc": {"id": "x"}}));
        let factory = ClientFactory::new(ak_sk_config(), mock.transport());
        let client = factory.client_for(ServiceVersion::VpcV1, "eu-de").await.unwrap();

        let body: serde_json::Value = client.get(&client.url(&["vpcs", "x"])).await.unwrap();
        assert_eq!(body["vpc"]["id"], "x");
        mock.verify();
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let mock = MockTransport::new();
        for _ in 0..4 {
            mock.expect(Method::Get, "/v1/p1/vpcs").respond(500, json!({"message": "down"}));
        }
        let factory = ClientFactory::new(ak_sk_config(), mock.transport());
        let client = factory.client_for(ServiceVersion::VpcV1, "eu-de").await.unwrap();

        let err = client.get::<serde_json::Value>(&client.url(&["vpcs"])).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert!(err.to_string().contains("down"));
        mock.verify();
    }

    #[tokio::test]
    async fn test_not_found_and_client_errors_are_not_retried() {
        let mock = MockTransport::new();
        mock.expect(Method::Get, "/v1/p1/vpcs/gone").respond(404, json!({}));
        mock.expect(Method::Delete, "/v1/p1/vpcs/busy").respond(409, json!({"message": "in use"}));
        let factory = ClientFactory::new(ak_sk_config(), mock.transport());
        let client = factory.client_for(ServiceVersion::VpcV1, "eu-de").await.unwrap();

        let err = client.get::<serde_json::Value>(&client.url(&["vpcs", "gone"])).await.unwrap_err();
        assert!(err.is_not_found());
        let err = client.delete(&client.url(&["vpcs", "busy"])).await.unwrap_err();
        assert_eq!(err.status(), Some(409));
        mock.verify();
    }

    #[tokio::test]
    async fn test_cancelled_client_fails_fast() {
        let mock = MockTransport::new();
        let factory = ClientFactory::new(ak_sk_config(), mock.transport());
        let token = CancellationToken::new();
        let client = factory
            .client_for(ServiceVersion::VpcV1, "eu-de")
            .await
            .unwrap()
            .with_cancel(token.clone());
        token.cancel();
        let err = client.delete(&client.url(&["vpcs", "x"])).await.unwrap_err();
        assert_eq!(err, CloudError::Cancelled);
        mock.verify();
    }
}
