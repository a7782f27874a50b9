//! # HTTP Transport
//!
//! The lowest layer of the client stack. A [`Transport`] sends one [`HttpRequest`] and
//! returns the raw [`HttpResponse`]; it never interprets status codes. Status mapping,
//! retries and JSON decoding happen one layer up in [`crate::client::ServiceClient`].
//!
//! Two implementations exist:
//!
//! | Transport | Used by |
//! |-----------|---------|
//! | [`HttpTransport`] | the provider binary, built on `reqwest` |
//! | [`crate::mock::MockTransport`] | unit tests with an expectation queue |
//!
//! The in-memory cloud in `otc-mock-cloud` is a third implementation used by the
//! end-to-end tests.

use crate::error::CloudError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully resolved request. Header names are stored lowercase.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn json_body(mut self, body: &serde_json::Value) -> Self {
        self.body = Some(body.to_string().into_bytes());
        self.headers
            .insert("content-type".to_owned(), "application/json".to_owned());
        self
    }

    /// Path component of the URL, without scheme, host or query.
    pub fn path(&self) -> &str {
        let without_scheme = self
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.url);
        let path = without_scheme
            .find('/')
            .map(|i| &without_scheme[i..])
            .unwrap_or("/");
        path.split('?').next().unwrap_or(path)
    }

    /// Query string of the URL, if any.
    pub fn query(&self) -> Option<&str> {
        self.url.split_once('?').map(|(_, q)| q)
    }

    /// Body parsed as JSON; `Null` when absent or not JSON.
    pub fn json(&self) -> serde_json::Value {
        self.body
            .as_deref()
            .and_then(|b| serde_json::from_slice(b).ok())
            .unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }

    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self {
            status,
            headers: BTreeMap::from([("content-type".to_owned(), "application/json".to_owned())]),
            body: body.to_string().into_bytes(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends requests. Implementations must be safe to share across concurrent callbacks.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, CloudError>;
}

/// TLS and timeout settings for [`HttpTransport`].
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    pub ca_cert: Option<String>,
    pub insecure: bool,
    pub client_cert: Option<String>,
    pub client_key: Option<String>,
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(tls: &TlsOptions, timeout: Duration) -> Result<Self, CloudError> {
        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(tls.insecure);

        if let Some(path) = &tls.ca_cert {
            let pem = read_pem(path)?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| CloudError::Transport(format!("invalid CA certificate {path}: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }

        if let (Some(cert), Some(key)) = (&tls.client_cert, &tls.client_key) {
            let mut pem = read_pem(cert)?;
            pem.extend_from_slice(b"\n");
            pem.extend_from_slice(&read_pem(key)?);
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| CloudError::Transport(format!("invalid client certificate: {e}")))?;
            builder = builder.identity(identity);
        }

        let client = builder
            .build()
            .map_err(|e| CloudError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

fn read_pem(path: &str) -> Result<Vec<u8>, CloudError> {
    std::fs::read(Path::new(path))
        .map_err(|e| CloudError::Transport(format!("failed to read {path}: {e}")))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, CloudError> {
        debug!(method = %request.method, url = %request.url, "Sending request");

        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CloudError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_owned()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| CloudError::Transport(e.to_string()))?
            .to_vec();

        debug!(status, url = %request.url, "Received response");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_path_and_query() {
        let req = HttpRequest::new(
            Method::Get,
            "https://vpc.eu-de.otc.t-systems.com/v1/p1/vpcs/abc?limit=10",
        );
        assert_eq!(req.path(), "/v1/p1/vpcs/abc");
        assert_eq!(req.query(), Some("limit=10"));

        let bare = HttpRequest::new(Method::Get, "http://host");
        assert_eq!(bare.path(), "/");
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let resp = HttpResponse::new(201).with_header("X-Subject-Token", "tok");
        assert_eq!(resp.header("x-subject-token"), Some("tok"));
        assert!(resp.is_success());
    }

    #[test]
    fn test_json_body() {
        let req = HttpRequest::new(Method::Post, "http://h/x")
            .json_body(&serde_json::json!({"vpc": {"name": "a"}}));
        assert_eq!(req.json()["vpc"]["name"], "a");
        assert_eq!(req.headers.get("content-type").unwrap(), "application/json");
    }
}
