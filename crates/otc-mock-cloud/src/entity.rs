//! # CloudEntity Trait
//!
//! The contract every mocked cloud object (VPC, subnet, EIP, ...) implements to be kept by a
//! [`crate::store::StoreActor`]. Associated types pin the request payloads of each kind, so a
//! subnet payload can never reach the VPC store.
//!
//! Status handling is shared: after create, update and actions the store compares
//! [`CloudEntity::status`] with [`CloudEntity::settled_status`] and, when they differ, lets the
//! entity sit in its transitional status for a configured number of reads.

use crate::error::ApiError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

#[async_trait]
pub trait CloudEntity: Clone + Debug + Serialize + Send + Sync + 'static {
    /// Name used in logs and error bodies, e.g. `vpc`.
    const KIND: &'static str;

    type Create: DeserializeOwned + Debug + Send;
    type Update: DeserializeOwned + Debug + Send;
    type Action: Debug + Send;

    /// Other stores the hooks consult. Use `()` if none are needed.
    type Context: Send + Sync;

    /// Builds the entity from a generated ID and the create payload.
    fn from_create_params(id: String, params: Self::Create) -> Result<Self, ApiError>;

    fn id(&self) -> &str;

    fn status(&self) -> &str;

    fn set_status(&mut self, status: &str);

    /// Status the entity ends up in once the cloud finished working on it.
    fn settled_status(&self) -> String;

    /// Status shown between a delete request and the object disappearing.
    fn deleting_status(&self) -> &'static str {
        "DELETING"
    }

    /// Whether a list query (`key=value` pairs) selects this entity.
    fn matches(&self, _filter: &[(String, String)]) -> bool {
        true
    }

    async fn on_create(&mut self, _ctx: &Self::Context) -> Result<(), ApiError> {
        Ok(())
    }

    async fn on_update(&mut self, update: Self::Update, _ctx: &Self::Context) -> Result<(), ApiError>;

    /// Called before the delete is accepted; a rejection keeps the entity.
    async fn on_delete(&self, _ctx: &Self::Context) -> Result<(), ApiError> {
        Ok(())
    }

    async fn handle_action(&mut self, action: Self::Action, _ctx: &Self::Context) -> Result<(), ApiError> {
        Err(ApiError::bad_request(format!("{} does not support {action:?}", Self::KIND)))
    }
}

/// Shared filter helper: every `key=value` pair must match `lookup(key)` when present.
pub fn filter_matches<'a>(filter: &[(String, String)], lookup: impl Fn(&str) -> Option<&'a str>) -> bool {
    filter.iter().all(|(key, value)| match lookup(key) {
        Some(actual) => actual == value,
        None => true,
    })
}
