//! # Provider
//!
//! [`OtcProvider`] is what the engine talks to. It owns the [`Registry`] of every resource
//! type and data source, turns a `Configure` call into the process-wide [`ProviderMeta`], and
//! routes each lifecycle call to the framework executor with a fresh [`RequestContext`].
//!
//! | Call | Executor |
//! |------|----------|
//! | [`OtcProvider::plan`] | [`executor::plan`] |
//! | [`OtcProvider::apply`] | create, update or delete depending on prior and planned state |
//! | [`OtcProvider::read`] | [`executor::read`] |
//! | [`OtcProvider::import_state`] | [`executor::import`] |
//! | [`OtcProvider::read_data_source`] | [`executor::read_data_source`] |
//!
//! A replacement is two `apply` calls from the engine: delete with the prior state, then
//! create with no prior state.
//!
//! [`OtcProvider::stop`] cancels every in-flight call. Requests arriving afterwards start
//! already cancelled.

use crate::data_sources::{subnet::SubnetDataSource, vpc::VpcDataSource};
use crate::resources::{
    eip::EipResource, peering::PeeringResource, peering_accepter::PeeringAccepterResource,
    port::PortResource, rds_backup::RdsBackupResource, router_route::RouterRouteResource,
    subnet::SubnetResource, vpc::VpcResource,
};
use otc_framework::diff::{self, Plan};
use otc_framework::executor::{self, Outcome};
use otc_framework::mapper::MapperError;
use otc_framework::resource::{DataSourceEntry, RegistryError, ResourceEntry};
use otc_framework::transport::{HttpTransport, TlsOptions, Transport};
use otc_framework::{
    ClientFactory, Diagnostics, InstanceState, OperationError, ProviderConfig, ProviderError,
    ProviderMeta, Registry, RegistryBuilder, RequestContext, Value,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Errors of a provider call that never reached a resource callback, plus the wrapped
/// callback failures of data sources.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("unknown resource type {0}")]
    UnknownResource(String),

    #[error("unknown data source {0}")]
    UnknownDataSource(String),

    #[error("provider is not configured")]
    NotConfigured,

    #[error("invalid configuration for {name}")]
    Invalid { name: String, diagnostics: Diagnostics },

    #[error("malformed state: {0}")]
    State(#[from] MapperError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Operation(#[from] OperationError),
}

impl CallError {
    /// The engine-facing rendering of this error.
    pub fn diagnostics(&self) -> Diagnostics {
        match self {
            Self::Invalid { diagnostics, .. } => diagnostics.clone(),
            other => {
                let mut diags = Diagnostics::new();
                diags.push(otc_framework::Diagnostic::from_error(other));
                diags
            }
        }
    }
}

/// Every resource type and data source this provider serves.
pub fn build_registry() -> Result<Registry, RegistryError> {
    RegistryBuilder::new()
        .resource(VpcResource)
        .resource(SubnetResource)
        .resource(EipResource)
        .resource(PeeringResource)
        .resource(PeeringAccepterResource)
        .resource(RouterRouteResource)
        .resource(PortResource)
        .resource(RdsBackupResource)
        .data_source(VpcDataSource)
        .data_source(SubnetDataSource)
        .build()
}

fn tls_options(config: &ProviderConfig) -> TlsOptions {
    TlsOptions {
        ca_cert: config.cacert_file.clone(),
        insecure: config.insecure,
        client_cert: config.cert.clone(),
        client_key: config.key.clone(),
    }
}

pub struct OtcProvider {
    registry: Arc<Registry>,
    base_config: ProviderConfig,
    transport: Option<Arc<dyn Transport>>,
    meta: RwLock<Option<Arc<ProviderMeta>>>,
    stop: CancellationToken,
}

impl OtcProvider {
    /// A provider whose `Configure` overlays `config` (file and environment settings).
    pub fn new(config: ProviderConfig) -> Result<Self, RegistryError> {
        Ok(Self {
            registry: Arc::new(build_registry()?),
            base_config: config,
            transport: None,
            meta: RwLock::new(None),
            stop: CancellationToken::new(),
        })
    }

    /// Sends every request through `transport` instead of HTTP.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn schema(&self) -> serde_json::Value {
        self.registry.describe()
    }

    /// Merges `overrides` over the base config, authenticates, and installs the client factory.
    pub async fn configure(&self, overrides: ProviderConfig) -> Result<(), CallError> {
        let mut config = self.base_config.clone();
        config.merge(overrides);
        config
            .validate()
            .map_err(|e| ProviderError::Config(e.to_string()))?;

        let transport = match &self.transport {
            Some(transport) => transport.clone(),
            None => Arc::new(
                HttpTransport::new(&tls_options(&config), config.http_timeout())
                    .map_err(|e| ProviderError::Config(e.to_string()))?,
            ),
        };
        let factory = ClientFactory::new(config, transport);
        let auth = factory
            .auth()
            .await
            .map_err(|e| ProviderError::Config(e.to_string()))?;

        info!(project_id = %auth.project_id, "Provider configured");
        *self.meta.write().await = Some(Arc::new(ProviderMeta::new(factory)));
        Ok(())
    }

    fn resource(&self, type_name: &str) -> Result<&ResourceEntry, CallError> {
        self.registry
            .resource(type_name)
            .ok_or_else(|| CallError::UnknownResource(type_name.to_owned()))
    }

    fn data_source(&self, type_name: &str) -> Result<&DataSourceEntry, CallError> {
        self.registry
            .data_source(type_name)
            .ok_or_else(|| CallError::UnknownDataSource(type_name.to_owned()))
    }

    async fn context(&self) -> Result<RequestContext, CallError> {
        let meta = self.meta.read().await.clone().ok_or(CallError::NotConfigured)?;
        Ok(RequestContext::new(meta, self.stop.child_token()))
    }

    fn coerce_prior(entry: &ResourceEntry, prior: Option<InstanceState>) -> Result<Option<InstanceState>, CallError> {
        Ok(prior
            .map(|p| p.coerce(&entry.schema.block))
            .transpose()?
            .filter(|p| !p.is_gone()))
    }

    /// Checks a configuration without planning it.
    pub fn validate(&self, type_name: &str, config: &BTreeMap<String, Value>) -> Result<Diagnostics, CallError> {
        let entry = self.resource(type_name)?;
        let mut diags = Diagnostics::new();
        diff::validate_config(&entry.schema.block, config, "", &mut diags);
        Ok(diags)
    }

    pub fn plan(
        &self,
        type_name: &str,
        prior: Option<InstanceState>,
        config: &BTreeMap<String, Value>,
    ) -> Result<Plan, CallError> {
        let entry = self.resource(type_name)?;
        let prior = Self::coerce_prior(entry, prior)?;
        Ok(executor::plan(entry, prior.as_ref(), config))
    }

    /// Applies a planned change. `planned: None` destroys; a missing or gone prior creates.
    pub async fn apply(
        &self,
        type_name: &str,
        prior: Option<InstanceState>,
        planned: Option<BTreeMap<String, Value>>,
    ) -> Result<Outcome, CallError> {
        let entry = self.resource(type_name)?;
        let prior = Self::coerce_prior(entry, prior)?;
        let planned = planned
            .map(|p| entry.schema.block.coerce_map(&p))
            .transpose()?;
        let ctx = self.context().await?;

        Ok(match (prior, planned) {
            (Some(prior), None) => executor::delete(entry, &ctx, prior).await,
            (None, None) => Outcome {
                state: InstanceState::default(),
                warnings: Diagnostics::new(),
                error: None,
            },
            (None, Some(planned)) => executor::create(entry, &ctx, planned).await,
            (Some(prior), Some(planned)) => executor::update(entry, &ctx, prior, planned).await,
        })
    }

    pub async fn read(&self, type_name: &str, prior: InstanceState) -> Result<Outcome, CallError> {
        let entry = self.resource(type_name)?;
        let prior = prior.coerce(&entry.schema.block)?;
        let ctx = self.context().await?;
        Ok(executor::read(entry, &ctx, prior).await)
    }

    pub async fn import_state(&self, type_name: &str, id: &str) -> Result<Outcome, CallError> {
        let entry = self.resource(type_name)?;
        let ctx = self.context().await?;
        Ok(executor::import(entry, &ctx, id).await)
    }

    pub async fn read_data_source(
        &self,
        type_name: &str,
        config: &BTreeMap<String, Value>,
    ) -> Result<(InstanceState, Diagnostics), CallError> {
        let entry = self.data_source(type_name)?;
        let mut diagnostics = Diagnostics::new();
        let typed = diff::validate_config(&entry.schema.block, config, "", &mut diagnostics);
        if diagnostics.has_errors() {
            return Err(CallError::Invalid {
                name: type_name.to_owned(),
                diagnostics,
            });
        }
        let ctx = self.context().await?;
        Ok(executor::read_data_source(entry, &ctx, typed).await?)
    }

    /// Cancels every in-flight and future call.
    pub fn stop(&self) {
        warn!("Stop requested, cancelling in-flight operations");
        self.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}
