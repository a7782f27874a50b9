//! # Store Client
//!
//! Cheap-to-clone handle that forwards requests to a [`crate::store::StoreActor`] and awaits
//! the oneshot reply.

use crate::entity::CloudEntity;
use crate::error::StoreError;
use crate::message::StoreRequest;
use tokio::sync::{mpsc, oneshot};

pub struct StoreClient<T: CloudEntity> {
    sender: mpsc::Sender<StoreRequest<T>>,
}

impl<T: CloudEntity> Clone for StoreClient<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T: CloudEntity> StoreClient<T> {
    pub fn new(sender: mpsc::Sender<StoreRequest<T>>) -> Self {
        Self { sender }
    }

    async fn call<R>(
        &self,
        request: impl FnOnce(oneshot::Sender<Result<R, StoreError>>) -> StoreRequest<T>,
    ) -> Result<R, StoreError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(request(respond_to))
            .await
            .map_err(|_| StoreError::StoreClosed)?;
        response.await.map_err(|_| StoreError::StoreDropped)?
    }

    pub async fn create(&self, params: T::Create) -> Result<T, StoreError> {
        self.call(|respond_to| StoreRequest::Create { params, respond_to })
            .await
    }

    pub async fn get(&self, id: &str) -> Result<T, StoreError> {
        let id = id.to_owned();
        self.call(|respond_to| StoreRequest::Get { id, respond_to })
            .await
    }

    /// Checks existence without counting as a read of the status simulation.
    pub async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        let items = self.list(Vec::new()).await?;
        Ok(items.iter().any(|item| item.id() == id))
    }

    pub async fn list(&self, filter: Vec<(String, String)>) -> Result<Vec<T>, StoreError> {
        self.call(|respond_to| StoreRequest::List { filter, respond_to })
            .await
    }

    pub async fn update(&self, id: &str, update: T::Update) -> Result<T, StoreError> {
        let id = id.to_owned();
        self.call(|respond_to| StoreRequest::Update {
            id,
            update,
            respond_to,
        })
        .await
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_owned();
        self.call(|respond_to| StoreRequest::Delete { id, respond_to })
            .await
    }

    pub async fn perform_action(&self, id: &str, action: T::Action) -> Result<T, StoreError> {
        let id = id.to_owned();
        self.call(|respond_to| StoreRequest::Action {
            id,
            action,
            respond_to,
        })
        .await
    }

    /// Drops the entity without going through the delete path.
    pub async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_owned();
        self.call(|respond_to| StoreRequest::Remove { id, respond_to })
            .await
    }
}
