//! # Request Context
//!
//! Everything a callback needs beyond its attributes, passed explicitly as a typed container:
//!
//! - [`ProviderMeta`] - process-wide state set up by `Configure` (client factory, keyed
//!   locks, default region),
//! - a cancellation token honoured by every SDK call and waiter sleep,
//! - a request-local client cache layered over the factory's shared cache,
//! - warnings the callback wants surfaced without failing (e.g. tags not applied).
//!
//! A context lives for exactly one engine request. Clients obtained from it carry its
//! cancellation token and must not be kept past the request.

use crate::client::{ClientError, ClientFactory, ServiceClient, ServiceVersion};
use crate::diag::{Diagnostic, Diagnostics};
use crate::mutexkv::MutexKv;
use crate::state::ResourceData;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Process-wide provider state.
#[derive(Debug)]
pub struct ProviderMeta {
    pub factory: ClientFactory,
    pub locks: MutexKv,
    pub default_region: String,
}

impl ProviderMeta {
    pub fn new(factory: ClientFactory) -> Self {
        let default_region = factory.config().region().unwrap_or_default();
        Self {
            factory,
            locks: MutexKv::new(),
            default_region,
        }
    }
}

#[derive(Debug)]
pub struct RequestContext {
    meta: Arc<ProviderMeta>,
    cancel: CancellationToken,
    clients: Mutex<HashMap<(ServiceVersion, String), ServiceClient>>,
    warnings: Mutex<Diagnostics>,
}

impl RequestContext {
    pub fn new(meta: Arc<ProviderMeta>, cancel: CancellationToken) -> Self {
        Self {
            meta,
            cancel,
            clients: Mutex::new(HashMap::new()),
            warnings: Mutex::new(Diagnostics::new()),
        }
    }

    pub fn meta(&self) -> &ProviderMeta {
        &self.meta
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn locks(&self) -> &MutexKv {
        &self.meta.locks
    }

    /// The resource's `region` attribute, or the provider default.
    pub fn region(&self, d: &ResourceData) -> String {
        match d.get("region").as_str() {
            Some(r) if !r.is_empty() => r.to_owned(),
            _ => self.meta.default_region.clone(),
        }
    }

    /// A client bound to this request's cancellation token.
    pub async fn client(&self, service: ServiceVersion, region: &str) -> Result<ServiceClient, ClientError> {
        let key = (service, region.to_owned());
        let cached = self
            .clients
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&key)
            .cloned();
        if let Some(client) = cached {
            return Ok(client);
        }

        let client = self
            .meta
            .factory
            .client_for(service, region)
            .await?
            .with_cancel(self.cancel.clone());
        self.clients
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(key, client.clone());
        Ok(client)
    }

    /// Records a non-fatal warning for the engine.
    pub fn warn(&self, diagnostic: Diagnostic) {
        self.warnings
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(diagnostic);
    }

    pub fn take_warnings(&self) -> Diagnostics {
        std::mem::take(&mut *self.warnings.lock().unwrap_or_else(|p| p.into_inner()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::mock::MockTransport;
    use crate::schema::{Attribute, Block, Schema};
    use crate::state::InstanceState;

    fn meta() -> Arc<ProviderMeta> {
        let config = ProviderConfig {
            auth_url: Some("https://iam.eu-de.otc.t-systems.com/v3".into()),
            region: Some("eu-de".into()),
            project_id: Some("p1".into()),
            access_key: Some("AK".into()),
            secret_key: Some("SK".into()),
            ..Default::default()
        };
        Arc::new(ProviderMeta::new(ClientFactory::new(
            config,
            MockTransport::new().transport(),
        )))
    }

    #[tokio::test]
    async fn test_request_local_cache() {
        let ctx = RequestContext::new(meta(), CancellationToken::new());
        let a = ctx.client(ServiceVersion::VpcV1, "eu-de").await.unwrap();
        let b = ctx.client(ServiceVersion::VpcV1, "eu-de").await.unwrap();
        assert_eq!(a.endpoint(), b.endpoint());
        assert_eq!(ctx.clients.lock().unwrap().len(), 1);
        assert_eq!(ctx.meta().factory.cached_clients(), 1);
    }

    #[test]
    fn test_region_falls_back_to_provider() {
        let ctx = RequestContext::new(meta(), CancellationToken::new());
        let schema = Arc::new(Schema::new(Block::new().attr("region", Attribute::region())));

        let d = ResourceData::from_state(schema.clone(), InstanceState::new("x"));
        assert_eq!(ctx.region(&d), "eu-de");

        let d = ResourceData::from_state(schema, InstanceState::new("x").with_attribute("region", "eu-nl"));
        assert_eq!(ctx.region(&d), "eu-nl");
    }

    #[test]
    fn test_warnings_are_drained() {
        let ctx = RequestContext::new(meta(), CancellationToken::new());
        ctx.warn(Diagnostic::warning("tags"));
        assert_eq!(ctx.take_warnings().len(), 1);
        assert!(ctx.take_warnings().is_empty());
    }
}
