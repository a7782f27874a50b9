//! # Store Messages
//!
//! Requests a [`crate::client::StoreClient`] sends to its [`crate::store::StoreActor`]. Each
//! carries a oneshot sender for the reply.

use crate::entity::CloudEntity;
use crate::error::StoreError;
use tokio::sync::oneshot;

pub type Response<T> = oneshot::Sender<Result<T, StoreError>>;

#[derive(Debug)]
pub enum StoreRequest<T: CloudEntity> {
    Create {
        params: T::Create,
        respond_to: Response<T>,
    },
    /// A read; counts towards settling and deleting.
    Get {
        id: String,
        respond_to: Response<T>,
    },
    List {
        filter: Vec<(String, String)>,
        respond_to: Response<Vec<T>>,
    },
    Update {
        id: String,
        update: T::Update,
        respond_to: Response<T>,
    },
    Delete {
        id: String,
        respond_to: Response<()>,
    },
    Action {
        id: String,
        action: T::Action,
        respond_to: Response<T>,
    },
    /// Drops the entity immediately, as if someone deleted it outside the provider.
    Remove {
        id: String,
        respond_to: Response<bool>,
    },
}
