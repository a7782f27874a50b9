//! # Mock Transport & Testing Guide
//!
//! [`MockTransport`] implements [`Transport`] with a FIFO queue of expectations. Each request
//! pops the next expectation; the method and path must match, and the queued response is
//! returned. It lets you unit-test service bindings and resource callbacks without a server.
//!
//! ## When to use which backend
//!
//! | Feature | MockTransport | otc-mock-cloud | mockito + HttpTransport |
//! |---------|---------------|----------------|-------------------------|
//! | **Speed** | Instant | Fast (actor tasks) | Real sockets |
//! | **State** | None (scripted) | Real entity stores | None (scripted) |
//! | **Use case** | Exact call sequences, error injection | End-to-end lifecycles | Wire-level behaviour |
//!
//! ## Example
//!
//! ```rust
//! use otc_framework::mock::MockTransport;
//! use otc_framework::transport::{HttpRequest, Method, Transport};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mock = MockTransport::new();
//!     mock.expect(Method::Get, "/v1/p1/vpcs/abc")
//!         .respond(200, serde_json::json!({"vpc": {"id": "abc"}}));
//!
//!     let transport = mock.transport();
//!     let response = transport
//!         .send(HttpRequest::new(Method::Get, "https://vpc.eu-de.example/v1/p1/vpcs/abc"))
//!         .await
//!         .unwrap();
//!     assert_eq!(response.status, 200);
//!
//!     mock.verify(); // all expectations were consumed
//! }
//! ```
//!
//! An unexpected request does not panic inside the transport; it fails with a transport
//! error and is remembered, and [`MockTransport::verify`] reports it.

use crate::error::CloudError;
use crate::transport::{HttpRequest, HttpResponse, Method, Transport};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

struct Expectation {
    method: Method,
    path: String,
    response: Result<HttpResponse, CloudError>,
}

#[derive(Default)]
struct Inner {
    expectations: Mutex<VecDeque<Expectation>>,
    received: Mutex<Vec<HttpRequest>>,
    mismatches: Mutex<Vec<String>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// A scripted transport with expectation tracking.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// The transport to hand to the code under test.
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::new(self.clone())
    }

    /// Expects a request with this method and URL path next.
    pub fn expect(&self, method: Method, path: &str) -> ExpectationBuilder {
        ExpectationBuilder {
            method,
            path: path.to_owned(),
            inner: self.inner.clone(),
        }
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.inner.received).clone()
    }

    /// Panics unless every expectation was consumed and no request was unexpected.
    pub fn verify(&self) {
        let mismatches = lock(&self.inner.mismatches);
        if !mismatches.is_empty() {
            panic!("Unexpected requests: {mismatches:?}");
        }
        let remaining = lock(&self.inner.expectations);
        if !remaining.is_empty() {
            let pending: Vec<String> = remaining
                .iter()
                .map(|e| format!("{} {}", e.method, e.path))
                .collect();
            panic!("Not all expectations were met. {} remaining: {pending:?}", remaining.len());
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, CloudError> {
        lock(&self.inner.received).push(request.clone());
        let expectation = lock(&self.inner.expectations).pop_front();

        match expectation {
            Some(e) if e.method == request.method && e.path == request.path() => e.response,
            Some(e) => {
                let message = format!(
                    "expected {} {}, got {} {}",
                    e.method,
                    e.path,
                    request.method,
                    request.path()
                );
                lock(&self.inner.mismatches).push(message.clone());
                Err(CloudError::Transport(message))
            }
            None => {
                let message = format!("no expectation for {} {}", request.method, request.path());
                lock(&self.inner.mismatches).push(message.clone());
                Err(CloudError::Transport(message))
            }
        }
    }
}

/// Builder for one expectation.
pub struct ExpectationBuilder {
    method: Method,
    path: String,
    inner: Arc<Inner>,
}

impl ExpectationBuilder {
    fn push(self, response: Result<HttpResponse, CloudError>) {
        lock(&self.inner.expectations).push_back(Expectation {
            method: self.method,
            path: self.path,
            response,
        });
    }

    /// Responds with a JSON body.
    pub fn respond(self, status: u16, body: serde_json::Value) {
        self.push(Ok(HttpResponse::json(status, &body)));
    }

    pub fn respond_with(self, response: HttpResponse) {
        self.push(Ok(response));
    }

    /// Fails below HTTP, e.g. a connection reset.
    pub fn fail(self, error: CloudError) {
        self.push(Err(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_expectations_in_order() {
        let mock = MockTransport::new();
        mock.expect(Method::Post, "/v1/p/vpcs").respond(200, serde_json::json!({"vpc": {}}));
        mock.expect(Method::Get, "/v1/p/vpcs/x")
            .fail(CloudError::Transport("reset".into()));

        let t = mock.transport();
        let ok = t.send(HttpRequest::new(Method::Post, "http://h/v1/p/vpcs")).await;
        assert_eq!(ok.unwrap().status, 200);
        let err = t.send(HttpRequest::new(Method::Get, "http://h/v1/p/vpcs/x")).await;
        assert!(matches!(err, Err(CloudError::Transport(_))));

        mock.verify();
        assert_eq!(mock.requests().len(), 2);
    }

    #[tokio::test]
    #[should_panic(expected = "Unexpected requests")]
    async fn test_mismatch_is_reported() {
        let mock = MockTransport::new();
        mock.expect(Method::Get, "/a").respond(200, serde_json::json!({}));
        let _ = mock.transport().send(HttpRequest::new(Method::Delete, "http://h/a")).await;
        mock.verify();
    }

    #[test]
    #[should_panic(expected = "Not all expectations were met")]
    fn test_unconsumed_expectation_fails_verify() {
        let mock = MockTransport::new();
        mock.expect(Method::Get, "/a").respond(200, serde_json::json!({}));
        mock.verify();
    }
}
