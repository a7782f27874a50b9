//! # OTC Framework
//!
//! The resource reconciliation runtime behind the Open Telekom Cloud provider. Resource types
//! are thin: they declare a schema and talk to one cloud API. Everything they share lives here.
//!
//! ## Architecture Overview
//!
//! ```text
//! engine ─▶ Registry ─▶ executor ─▶ Resource callback ─▶ RequestContext::client ─▶ ServiceClient
//!                          │               │                                          │
//!                          │               ├─ ResourceData (State Mapper)             ├─ auth (token / AK/SK)
//!                          │               ├─ StateChangeConf (Async Waiter)          └─ Transport
//!                          │               └─ TagSpec (Tag Side-Channel)
//!                          └─ OperationError / classify (Error Classifier)
//! ```
//!
//! | Component | Module |
//! |-----------|--------|
//! | Client Factory | [`client`], [`auth`], [`transport`], [`config`] |
//! | Schema Registry | [`schema`], [`validation`], [`resource`] |
//! | State Mapper | [`value`], [`mapper`], [`state`], [`diff`] |
//! | Lifecycle Executor | [`executor`], [`context`], [`import`] |
//! | Async Waiter | [`waiter`] |
//! | Tag Side-Channel | [`tags`] |
//! | Error Classifier | [`error`] |
//!
//! ## Writing a resource
//!
//! ```rust
//! use async_trait::async_trait;
//! use otc_framework::prelude::*;
//!
//! struct Keypair;
//!
//! #[async_trait]
//! impl Resource for Keypair {
//!     fn name(&self) -> &'static str {
//!         "example_keypair"
//!     }
//!
//!     fn schema(&self) -> Schema {
//!         Schema::new(
//!             Block::new()
//!                 .attr("name", Attribute::required(Kind::String).force_new())
//!                 .attr("fingerprint", Attribute::computed(Kind::String)),
//!         )
//!     }
//!
//!     async fn create(&self, _ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
//!         let name = d.get_string("name");
//!         d.set_id(name);
//!         Ok(())
//!     }
//!
//!     async fn read(&self, _ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
//!         d.set("fingerprint", "ab:cd")?;
//!         Ok(())
//!     }
//!
//!     async fn delete(&self, _ctx: &RequestContext, _d: &mut ResourceData) -> Result<(), ProviderError> {
//!         Ok(())
//!     }
//! }
//!
//! let registry = RegistryBuilder::new().resource(Keypair).build().unwrap();
//! assert!(registry.resource("example_keypair").is_some());
//! ```
//!
//! ## Concurrency Model
//!
//! - The engine calls the executor concurrently for distinct instances; calls for one
//!   instance are serialized by the engine.
//! - SDK calls and waiter sleeps are the suspension points; all of them race the request's
//!   cancellation token.
//! - The client cache sits behind one exclusive lock; [`mutexkv::MutexKv`] serializes
//!   operations on one cloud object (e.g. routes of one router).
//!
//! ## Testing
//!
//! [`mock::MockTransport`] answers requests from a FIFO expectation queue, so callbacks can
//! be unit-tested against exact call sequences.

pub mod auth;
pub mod client;
pub mod config;
pub mod context;
pub mod diag;
pub mod diff;
pub mod error;
pub mod executor;
pub mod import;
pub mod mapper;
pub mod mock;
pub mod mutexkv;
pub mod resource;
pub mod schema;
pub mod state;
pub mod tags;
pub mod tracing;
pub mod transport;
pub mod validation;
pub mod value;
pub mod waiter;

// Re-export core types for convenience
pub use client::{ClientFactory, ServiceClient, ServiceVersion};
pub use config::ProviderConfig;
pub use context::{ProviderMeta, RequestContext};
pub use diag::{Diagnostic, Diagnostics};
pub use error::{CloudError, ErrorKind, OperationError, ProviderError, Verb};
pub use resource::{DataSource, Registry, RegistryBuilder, Resource};
pub use state::{InstanceState, ResourceData};
pub use value::Value;
pub use waiter::StateChangeConf;

/// Everything a resource implementation usually needs.
pub mod prelude {
    pub use crate::client::{ServiceClient, ServiceVersion};
    pub use crate::context::RequestContext;
    pub use crate::diff::Plan;
    pub use crate::error::{CloudError, ProviderError};
    pub use crate::mapper::{Nullable, FromValue, IntoValue};
    pub use crate::resource::{DataSource, RegistryBuilder, Resource};
    pub use crate::schema::{Attribute, Block, Kind, Schema, SetHash, Timeouts};
    pub use crate::state::{InstanceState, ResourceData};
    pub use crate::tags::TagSpec;
    pub use crate::validation;
    pub use crate::value::Value;
    pub use crate::value_map;
    pub use crate::waiter::StateChangeConf;
}
