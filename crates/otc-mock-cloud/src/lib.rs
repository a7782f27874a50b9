//! # OTC Mock Cloud
//!
//! An in-memory stand-in for the Open Telekom Cloud REST APIs the provider talks to. It plugs
//! into the framework as a [`otc_framework::transport::Transport`], so end-to-end tests run
//! the real client factory, executor and resource adapters without network access.
//!
//! ## Architecture
//!
//! ```text
//! ServiceClient ─send()─▶ MockCloud ─▶ keystone | routes::dispatch
//!                                                   │
//!                         StoreClient<Vpc> ─mpsc─▶ StoreActor<Vpc>   (owns HashMap<id, Vpc>)
//!                         StoreClient<Subnet> ───▶ StoreActor<Subnet> ──▶ StoreClient<Vpc>
//!                         ...
//! ```
//!
//! Each object kind lives in its own [`store::StoreActor`] task that processes requests one
//! at a time, so no store needs a lock. Hooks get the clients of other stores as their
//! context: a subnet checks its VPC, a port its network, an EIP the port it binds to.
//!
//! | Kind | Transitional → settled | Deleting |
//! |------|------------------------|----------|
//! | VPC | `CREATING` → `ACTIVE` | `DELETING` |
//! | Subnet | `UNKNOWN` → `ACTIVE` | `DELETING` |
//! | EIP | `PENDING_CREATE` / `PENDING_UPDATE` → `ACTIVE` (bound) or `DOWN` | `DELETING` |
//! | Peering | `CREATING` → `PENDING_ACCEPTANCE` (cross-tenant) or `ACTIVE` | `DELETING` |
//! | Port | `BUILD` → `DOWN` / `ACTIVE` | `DELETING` |
//! | Backup | `BUILDING` → `COMPLETED` | `DELETING` |
//!
//! ## Example
//!
//! ```rust
//! use otc_framework::{ClientFactory, ServiceVersion};
//! use otc_mock_cloud::{MockCloud, MockCloudOptions};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let cloud = MockCloud::start(MockCloudOptions::default());
//! let factory = ClientFactory::new(cloud.provider_config(), cloud.transport());
//! let client = factory.client_for(ServiceVersion::VpcV1, "eu-de").await.unwrap();
//! let body: serde_json::Value = client.get(&client.url(&["vpcs"])).await.unwrap();
//! assert_eq!(body["vpcs"], serde_json::json!([]));
//! # }
//! ```

pub mod client;
pub mod cloud;
pub mod entity;
pub mod error;
pub mod message;
pub mod models;
pub mod routes;
pub mod store;

pub use client::StoreClient;
pub use cloud::{Call, EntityKind, MockCloud, MockCloudOptions};
pub use entity::CloudEntity;
pub use error::{ApiError, StoreError};
pub use store::{StoreActor, Timing};
