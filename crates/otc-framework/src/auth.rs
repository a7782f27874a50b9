//! # Authentication
//!
//! Establishes the credentials every service client composes with. Runs once per process.
//!
//! | Mode | How requests are authorized | Endpoints from |
//! |------|-----------------------------|----------------|
//! | password / token | `X-Auth-Token` from a Keystone v3 project-scoped token | token catalog |
//! | AK/SK | `SDK-HMAC-SHA256` signature over each request | endpoint template |
//!
//! The AK/SK signature follows the cloud's API gateway scheme:
//!
//! ```text
//! CanonicalRequest = METHOD \n URI/ \n QUERY \n HEADERS \n SIGNED_HEADERS \n hex(sha256(body))
//! StringToSign     = "SDK-HMAC-SHA256" \n X-Sdk-Date \n hex(sha256(CanonicalRequest))
//! Signature        = hex(hmac_sha256(secret_key, StringToSign))
//! ```

use crate::config::{AuthMethod, ProviderConfig};
use crate::error::CloudError;
use crate::transport::{HttpRequest, HttpResponse, Method, Transport};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::{debug, info};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNING_ALGORITHM: &str = "SDK-HMAC-SHA256";
const SDK_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Config(String),

    #[error("token exchange failed: {0}")]
    Transport(CloudError),
}

/// Signs requests with an access key / secret key pair.
#[derive(Clone)]
pub struct AkSkSigner {
    access_key: String,
    secret_key: String,
}

impl fmt::Debug for AkSkSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AkSkSigner")
            .field("access_key", &self.access_key)
            .finish_non_exhaustive()
    }
}

impl AkSkSigner {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Adds `Host`, `X-Sdk-Date` and `Authorization` to the request.
    pub fn sign(&self, mut request: HttpRequest, now: DateTime<Utc>) -> HttpRequest {
        let date = now.format(SDK_DATE_FORMAT).to_string();
        let host = host_of(&request.url).to_owned();
        request = request
            .header("host", host)
            .header("x-sdk-date", date.clone());

        let signed: Vec<&str> = request
            .headers
            .keys()
            .filter(|k| matches!(k.as_str(), "host" | "x-sdk-date" | "content-type" | "x-project-id"))
            .map(String::as_str)
            .collect();
        let signed_headers = signed.join(";");
        let canonical_headers: String = signed
            .iter()
            .map(|k| format!("{k}:{}\n", request.headers[*k].trim()))
            .collect();

        let mut uri = request.path().to_owned();
        if !uri.ends_with('/') {
            uri.push('/');
        }
        let mut query: Vec<&str> = request
            .query()
            .map(|q| q.split('&').filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();
        query.sort_unstable();

        let body_hash = hex::encode(Sha256::digest(request.body.as_deref().unwrap_or_default()));
        let canonical_request = format!(
            "{}\n{uri}\n{}\n{canonical_headers}\n{signed_headers}\n{body_hash}",
            request.method,
            query.join("&"),
        );
        let string_to_sign = format!(
            "{SIGNING_ALGORITHM}\n{date}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signature = match HmacSha256::new_from_slice(self.secret_key.as_bytes()) {
            Ok(mut mac) => {
                mac.update(string_to_sign.as_bytes());
                hex::encode(mac.finalize().into_bytes())
            }
            Err(_) => String::new(),
        };

        let authorization = format!(
            "{SIGNING_ALGORITHM} Access={}, SignedHeaders={signed_headers}, Signature={signature}",
            self.access_key
        );
        request.header("authorization", authorization)
    }
}

fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    rest.split('/').next().unwrap_or(rest)
}

#[derive(Debug, Clone)]
pub enum Credentials {
    Token(String),
    AkSk(AkSkSigner),
}

/// One service in the Keystone catalog.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CatalogEntry {
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CatalogEndpoint {
    #[serde(default)]
    pub interface: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub region_id: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Public endpoint of a service in a region. Region-less endpoints match any region.
    pub fn endpoint(&self, service_type: &str, region: &str) -> Option<&str> {
        self.entries
            .iter()
            .filter(|e| e.service_type == service_type)
            .flat_map(|e| e.endpoints.iter())
            .filter(|ep| ep.interface.is_empty() || ep.interface == "public")
            .find(|ep| {
                ep.region == region
                    || ep.region_id == region
                    || (ep.region.is_empty() && ep.region_id.is_empty())
            })
            .map(|ep| ep.url.as_str())
    }
}

/// The result of authenticating: how to authorize requests, in which project, and where.
#[derive(Debug, Clone)]
pub struct AuthInfo {
    pub credentials: Credentials,
    pub project_id: String,
    /// Present for token auth; AK/SK has no catalog.
    pub catalog: Option<Catalog>,
}

impl AuthInfo {
    pub fn authorize(&self, request: HttpRequest) -> HttpRequest {
        match &self.credentials {
            Credentials::Token(token) => request.header("x-auth-token", token.clone()),
            Credentials::AkSk(signer) => signer.sign(
                request.header("x-project-id", self.project_id.clone()),
                Utc::now(),
            ),
        }
    }
}

#[derive(Deserialize)]
struct TokenBody {
    token: TokenDetails,
}

#[derive(Deserialize)]
struct TokenDetails {
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
    project: Option<IdRef>,
}

#[derive(Deserialize)]
struct IdRef {
    id: String,
}

#[derive(Deserialize)]
struct ProjectList {
    #[serde(default)]
    projects: Vec<IdRef>,
}

/// Validates the configuration and performs the one-time authentication.
pub async fn authenticate(
    config: &ProviderConfig,
    transport: &dyn Transport,
) -> Result<AuthInfo, AuthError> {
    config
        .validate()
        .map_err(|e| AuthError::Config(e.to_string()))?;
    let auth_url = config
        .auth_url
        .as_deref()
        .unwrap_or_default()
        .trim_end_matches('/')
        .to_owned();

    match config.auth_method() {
        Some(AuthMethod::AkSk) => {
            let signer = AkSkSigner::new(
                config.access_key.clone().unwrap_or_default(),
                config.secret_key.clone().unwrap_or_default(),
            );
            let project_id = match &config.project_id {
                Some(id) => id.clone(),
                None => {
                    let name = config.project_name.as_deref().unwrap_or_default();
                    lookup_project(&auth_url, name, &signer, transport).await?
                }
            };
            info!(project_id = %project_id, "Authenticated with AK/SK");
            Ok(AuthInfo {
                credentials: Credentials::AkSk(signer),
                project_id,
                catalog: None,
            })
        }
        Some(method) => token_exchange(&auth_url, method, config, transport).await,
        None => Err(AuthError::Config("no credentials configured".to_owned())),
    }
}

async fn lookup_project(
    auth_url: &str,
    name: &str,
    signer: &AkSkSigner,
    transport: &dyn Transport,
) -> Result<String, AuthError> {
    let url = format!("{auth_url}/projects?name={name}");
    let request = signer.sign(HttpRequest::new(Method::Get, url.clone()), Utc::now());
    let response = transport.send(request).await.map_err(AuthError::Transport)?;
    let list: ProjectList = decode(&url, Method::Get, &response)?;
    list.projects
        .into_iter()
        .next()
        .map(|p| p.id)
        .ok_or_else(|| AuthError::Config(format!("project {name:?} not found")))
}

fn scope(config: &ProviderConfig) -> serde_json::Value {
    match &config.project_id {
        Some(id) => serde_json::json!({ "project": { "id": id } }),
        None => serde_json::json!({
            "project": {
                "name": config.project_name,
                "domain": domain(config),
            }
        }),
    }
}

fn domain(config: &ProviderConfig) -> serde_json::Value {
    match (&config.domain_id, &config.domain_name) {
        (Some(id), _) => serde_json::json!({ "id": id }),
        (None, Some(name)) => serde_json::json!({ "name": name }),
        (None, None) => serde_json::json!({}),
    }
}

async fn token_exchange(
    auth_url: &str,
    method: AuthMethod,
    config: &ProviderConfig,
    transport: &dyn Transport,
) -> Result<AuthInfo, AuthError> {
    let identity = match method {
        AuthMethod::Token => serde_json::json!({
            "methods": ["token"],
            "token": { "id": config.token },
        }),
        _ => serde_json::json!({
            "methods": ["password"],
            "password": {
                "user": {
                    "name": config.user_name,
                    "password": config.password,
                    "domain": domain(config),
                }
            }
        }),
    };
    let body = serde_json::json!({
        "auth": { "identity": identity, "scope": scope(config) }
    });

    let url = format!("{auth_url}/auth/tokens");
    debug!(url = %url, "Requesting token");
    let response = transport
        .send(HttpRequest::new(Method::Post, url.clone()).json_body(&body))
        .await
        .map_err(AuthError::Transport)?;

    let details: TokenBody = decode(&url, Method::Post, &response)?;
    let token = response
        .header("x-subject-token")
        .ok_or_else(|| {
            AuthError::Transport(CloudError::Decode {
                url: url.clone(),
                message: "missing X-Subject-Token header".to_owned(),
            })
        })?
        .to_owned();
    let project_id = details
        .token
        .project
        .map(|p| p.id)
        .or_else(|| config.project_id.clone())
        .ok_or_else(|| AuthError::Config("token is not project scoped".to_owned()))?;

    info!(project_id = %project_id, services = details.token.catalog.len(), "Authenticated with token");
    Ok(AuthInfo {
        credentials: Credentials::Token(token),
        project_id,
        catalog: Some(Catalog {
            entries: details.token.catalog,
        }),
    })
}

fn decode<T: serde::de::DeserializeOwned>(
    url: &str,
    method: Method,
    response: &HttpResponse,
) -> Result<T, AuthError> {
    if !response.is_success() {
        return Err(AuthError::Transport(CloudError::Http {
            method,
            url: url.to_owned(),
            status: response.status,
            message: response.text(),
        }));
    }
    serde_json::from_slice(&response.body).map_err(|e| {
        AuthError::Transport(CloudError::Decode {
            url: url.to_owned(),
            message: e.to_string(),
        })
    })
}
