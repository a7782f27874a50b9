//! # Errors & Classification
//!
//! This module defines the error types shared by every layer of the runtime and the
//! classifier that turns SDK failures into one of the outcomes the lifecycle cares about.
//!
//! ## Layers
//!
//! - [`CloudError`] - what the transport and the service clients return. Carries the
//!   not-found sentinel ([`CloudError::NotFound`]) every callback checks for.
//! - [`ProviderError`] - what resource callbacks return. Wraps cloud, waiter, mapper and
//!   client-factory failures and exposes the design-level [`ErrorKind`].
//! - [`OperationError`] - what the executor surfaces to the engine, formatted as
//!   `error <verb> <resource> <id>: <cause>`.
//!
//! ## Classification
//!
//! [`classify`] implements the retry rules:
//!
//! | Cloud error | Normal phase | Delete polling |
//! |-------------|--------------|----------------|
//! | 404 / not-found | Gone | Gone |
//! | 409 | Conflict | Retryable |
//! | other 4xx | Fatal | Fatal |
//! | 5xx, network | Retryable | Retryable |
//! | anything else | Fatal | Fatal |

use crate::client::ClientError;
use crate::mapper::MapperError;
use crate::transport::Method;
use crate::waiter::WaitError;
use std::fmt;

/// Errors produced by the transport and the typed service clients.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CloudError {
    /// The primary resource URL answered 404.
    #[error("resource not found: {url}")]
    NotFound { url: String },

    /// Any other non-success HTTP status.
    #[error("{method} {url} returned {status}: {message}")]
    Http {
        method: Method,
        url: String,
        status: u16,
        message: String,
    },

    /// Connection, TLS or timeout failure below HTTP.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body did not match the expected shape.
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    /// The request context was cancelled while the call was in flight.
    #[error("request cancelled")]
    Cancelled,
}

impl CloudError {
    /// True for the not-found sentinel.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
            || matches!(self, Self::Http { status: 404, .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound { .. } => Some(404),
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Where an error was observed. Only delete polling treats 409 as transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Normal,
    DeletePolling,
}

/// Outcome of classifying a [`CloudError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The resource no longer exists; Read/Delete recover by clearing the ID.
    Gone,
    /// Worth another attempt (5xx, network, 409 during delete).
    Retryable,
    /// 409 outside delete paths.
    Conflict,
    Fatal,
}

/// Maps a cloud error into the retry taxonomy.
pub fn classify(err: &CloudError, phase: Phase) -> ErrorClass {
    match err {
        CloudError::NotFound { .. } => ErrorClass::Gone,
        CloudError::Http { status, .. } => match (*status, phase) {
            (404, _) => ErrorClass::Gone,
            (409, Phase::DeletePolling) => ErrorClass::Retryable,
            (409, Phase::Normal) => ErrorClass::Conflict,
            (500..=599, _) => ErrorClass::Retryable,
            _ => ErrorClass::Fatal,
        },
        CloudError::Transport(_) => ErrorClass::Retryable,
        CloudError::Decode { .. } | CloudError::Cancelled => ErrorClass::Fatal,
    }
}

/// Design-level error taxonomy surfaced to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Validation,
    Gone,
    Transient,
    Conflict,
    Fatal,
}

/// Errors returned by resource and data-source callbacks.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("invalid provider configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error(transparent)]
    Wait(#[from] WaitError),

    #[error(transparent)]
    Mapper(#[from] MapperError),

    #[error("invalid import id {id:?}: {reason}")]
    Import { id: String, reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Fatal(String),
}

impl ProviderError {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Client(ClientError::Config { .. }) => ErrorKind::Config,
            Self::Client(_) => ErrorKind::Fatal,
            Self::Cloud(e) => kind_of(e),
            Self::Wait(WaitError::Refresh(e)) => kind_of(e),
            Self::Wait(_) => ErrorKind::Fatal,
            Self::Mapper(_) | Self::Import { .. } | Self::Cancelled | Self::Fatal(_) => {
                ErrorKind::Fatal
            }
        }
    }

    /// True when the underlying cause is the not-found sentinel.
    pub fn is_gone(&self) -> bool {
        self.kind() == ErrorKind::Gone
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled
                | Self::Cloud(CloudError::Cancelled)
                | Self::Wait(WaitError::Cancelled)
        )
    }
}

fn kind_of(err: &CloudError) -> ErrorKind {
    match classify(err, Phase::Normal) {
        ErrorClass::Gone => ErrorKind::Gone,
        ErrorClass::Retryable => ErrorKind::Transient,
        ErrorClass::Conflict => ErrorKind::Conflict,
        ErrorClass::Fatal => ErrorKind::Fatal,
    }
}

/// The five lifecycle verbs, used to format user-visible failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Create,
    Read,
    Update,
    Delete,
    Import,
}

impl Verb {
    /// `creating`, `reading`, ...
    pub fn progressive(self) -> &'static str {
        match self {
            Self::Create => "creating",
            Self::Read => "reading",
            Self::Update => "updating",
            Self::Delete => "deleting",
            Self::Import => "importing",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.progressive())
    }
}

/// A callback failure wrapped with the operation and resource identifiers.
#[derive(Debug, thiserror::Error)]
pub struct OperationError {
    pub verb: Verb,
    pub resource: String,
    pub id: String,
    #[source]
    pub source: ProviderError,
}

impl OperationError {
    pub fn new(verb: Verb, resource: impl Into<String>, id: impl Into<String>, source: ProviderError) -> Self {
        Self {
            verb,
            resource: resource.into(),
            id: id.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.id.is_empty() {
            write!(f, "error {} {}: {}", self.verb, self.resource, self.source)?;
        } else {
            write!(f, "error {} {} {}: {}", self.verb, self.resource, self.id, self.source)?;
        }
        if self.kind() == ErrorKind::Conflict {
            f.write_str(" (the resource is locked by another operation; retry once it settles)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> CloudError {
        CloudError::Http {
            method: Method::Delete,
            url: "https://vpc.eu-de.otc.t-systems.com/v1/p/vpcs/x".into(),
            status,
            message: String::new(),
        }
    }

    #[test]
    fn test_classify_rules() {
        let gone = CloudError::NotFound { url: "u".into() };
        assert_eq!(classify(&gone, Phase::Normal), ErrorClass::Gone);
        assert_eq!(classify(&http(404), Phase::Normal), ErrorClass::Gone);
        assert_eq!(classify(&http(409), Phase::DeletePolling), ErrorClass::Retryable);
        assert_eq!(classify(&http(409), Phase::Normal), ErrorClass::Conflict);
        assert_eq!(classify(&http(400), Phase::Normal), ErrorClass::Fatal);
        assert_eq!(classify(&http(403), Phase::DeletePolling), ErrorClass::Fatal);
        assert_eq!(classify(&http(503), Phase::Normal), ErrorClass::Retryable);
        assert_eq!(
            classify(&CloudError::Transport("reset".into()), Phase::Normal),
            ErrorClass::Retryable
        );
        assert_eq!(classify(&CloudError::Cancelled, Phase::Normal), ErrorClass::Fatal);
    }

    #[test]
    fn test_operation_error_format() {
        let err = OperationError::new(
            Verb::Create,
            "opentelekomcloud_vpc_v1",
            "abc",
            ProviderError::fatal("boom"),
        );
        assert_eq!(err.to_string(), "error creating opentelekomcloud_vpc_v1 abc: boom");

        let no_id = OperationError::new(Verb::Import, "r", "", ProviderError::fatal("bad"));
        assert_eq!(no_id.to_string(), "error importing r: bad");
    }

    #[test]
    fn test_conflict_carries_hint() {
        let err = OperationError::new(Verb::Update, "r", "id", ProviderError::Cloud(http(409)));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains("retry once it settles"));
    }

    #[test]
    fn test_provider_error_kinds() {
        assert!(ProviderError::Cloud(CloudError::NotFound { url: "u".into() }).is_gone());
        assert_eq!(ProviderError::Cloud(http(502)).kind(), ErrorKind::Transient);
        assert!(ProviderError::Wait(WaitError::Cancelled).is_cancelled());
        assert_eq!(ProviderError::Config("x".into()).kind(), ErrorKind::Config);
    }
}
