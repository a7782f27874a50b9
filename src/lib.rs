//! # OTC Provider
//!
//! Open Telekom Cloud resources for a declarative infrastructure engine. The engine plans and
//! applies changes through [`provider::OtcProvider`]; this crate supplies the resource types
//! and the cloud API bindings, the lifecycle runtime lives in `otc_framework`.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`services`] | typed request/response bindings for VPC, Networking and RDS |
//! | [`resources`] | one adapter per managed resource type |
//! | [`data_sources`] | read-only lookups |
//! | [`provider`] | registry and the engine-facing façade |
//! | [`rpc`] | the JSON-lines host protocol spoken by the binary |
//!
//! ## Testing
//!
//! Unit tests use `otc_framework::mock::MockTransport`. The scenario tests under `tests/`
//! run the full provider against the in-memory cloud of `otc-mock-cloud`.

pub mod data_sources;
pub mod provider;
pub mod resources;
pub mod rpc;
pub mod services;

pub use provider::{build_registry, CallError, OtcProvider};
