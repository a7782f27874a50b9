//! # Resource Types & Registry
//!
//! A resource type is one implementation of [`Resource`]: a name, a schema, timeouts, the
//! CRUD callbacks and two optional hooks (tags, custom diff). Callbacks only describe the
//! cloud interaction; the [`crate::executor`] wraps them with the lifecycle contract.
//!
//! ```text
//! RegistryBuilder ──resource()──▶ check name + schema ──build()──▶ Arc<Registry> (immutable)
//! ```
//!
//! ## Callback contract
//!
//! | Callback | Must |
//! |----------|------|
//! | `create` | call [`ResourceData::set_id`] as soon as the cloud returns an ID, then wait |
//! | `read` | return the not-found error (or clear the ID) when the instance is gone |
//! | `update` | send only changed fields ([`ResourceData::has_change`], [`ResourceData::get_nullable`]) |
//! | `delete` | issue the delete and wait for the confirming 404 |
//! | `import` | parse the import string and seed the ID(s); `read` follows |

use crate::context::RequestContext;
use crate::diff::Plan;
use crate::error::ProviderError;
use crate::import::parse_simple_id;
use crate::schema::{Schema, SchemaError, Timeouts};
use crate::state::{InstanceState, ResourceData};
use crate::tags::{TagSpec, TAGS_ATTRIBUTE};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// Unique type name, e.g. `opentelekomcloud_vpc_v1`.
    fn name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    fn timeouts(&self) -> Timeouts {
        Timeouts::default()
    }

    /// Tag endpoint of the type, when it is taggable.
    fn tags(&self) -> Option<TagSpec> {
        None
    }

    async fn create(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError>;

    async fn read(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError>;

    /// Types whose attributes are all force-new never reach update.
    async fn update(&self, _ctx: &RequestContext, _d: &mut ResourceData) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn delete(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError>;

    async fn import(&self, _ctx: &RequestContext, d: &mut ResourceData, id: &str) -> Result<(), ProviderError> {
        d.set_id(parse_simple_id(id)?);
        Ok(())
    }

    /// Runs after the generic plan. May adjust planned values or mark attributes force-new.
    fn customize_diff(&self, _plan: &mut Plan, _prior: Option<&InstanceState>) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[async_trait]
pub trait DataSource: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    async fn read(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError>;
}

/// A registered resource type with its schema built once.
pub struct ResourceEntry {
    pub resource: Arc<dyn Resource>,
    pub schema: Arc<Schema>,
    pub timeouts: Timeouts,
}

impl ResourceEntry {
    pub fn name(&self) -> &'static str {
        self.resource.name()
    }
}

impl fmt::Debug for ResourceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceEntry")
            .field("name", &self.name())
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

pub struct DataSourceEntry {
    pub source: Arc<dyn DataSource>,
    pub schema: Arc<Schema>,
}

impl DataSourceEntry {
    pub fn name(&self) -> &'static str {
        self.source.name()
    }
}

impl fmt::Debug for DataSourceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceEntry")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate type name {0}")]
    Duplicate(String),

    #[error("{name}: {source}")]
    Schema { name: String, source: SchemaError },

    #[error("{0} is taggable but declares no \"tags\" attribute")]
    MissingTags(String),
}

#[derive(Default)]
pub struct RegistryBuilder {
    resources: BTreeMap<String, ResourceEntry>,
    data_sources: BTreeMap<String, DataSourceEntry>,
    errors: Vec<RegistryError>,
}

/// A resource's `id` lives in [`InstanceState::id`]; data sources may still filter on an `id`
/// attribute.
fn reserve_id(schema: &Schema) -> Result<(), SchemaError> {
    match schema.attribute("id") {
        Some(_) => Err(SchemaError {
            path: "id".to_owned(),
            reason: "\"id\" is reserved".to_owned(),
        }),
        None => Ok(()),
    }
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource(mut self, resource: impl Resource) -> Self {
        let name = resource.name().to_owned();
        let schema = resource.schema();
        if self.resources.contains_key(&name) {
            self.errors.push(RegistryError::Duplicate(name));
            return self;
        }
        if let Err(source) = schema.block.check("").and_then(|()| reserve_id(&schema)) {
            self.errors.push(RegistryError::Schema { name, source });
            return self;
        }
        if resource.tags().is_some() && schema.attribute(TAGS_ATTRIBUTE).is_none() {
            self.errors.push(RegistryError::MissingTags(name));
            return self;
        }
        let timeouts = resource.timeouts();
        self.resources.insert(
            name,
            ResourceEntry {
                resource: Arc::new(resource),
                schema: Arc::new(schema),
                timeouts,
            },
        );
        self
    }

    pub fn data_source(mut self, source: impl DataSource) -> Self {
        let name = source.name().to_owned();
        let schema = source.schema();
        if self.data_sources.contains_key(&name) {
            self.errors.push(RegistryError::Duplicate(name));
            return self;
        }
        if let Err(source) = schema.block.check("") {
            self.errors.push(RegistryError::Schema { name, source });
            return self;
        }
        self.data_sources.insert(
            name,
            DataSourceEntry {
                source: Arc::new(source),
                schema: Arc::new(schema),
            },
        );
        self
    }

    /// Freezes the registry. Fails with the first registration error.
    pub fn build(self) -> Result<Registry, RegistryError> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }
        Ok(Registry {
            resources: self.resources,
            data_sources: self.data_sources,
        })
    }
}

/// Every resource and data-source type, fixed at process start.
#[derive(Debug)]
pub struct Registry {
    resources: BTreeMap<String, ResourceEntry>,
    data_sources: BTreeMap<String, DataSourceEntry>,
}

impl Registry {
    pub fn resource(&self, name: &str) -> Option<&ResourceEntry> {
        self.resources.get(name)
    }

    pub fn data_source(&self, name: &str) -> Option<&DataSourceEntry> {
        self.data_sources.get(name)
    }

    pub fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn data_source_names(&self) -> impl Iterator<Item = &str> {
        self.data_sources.keys().map(String::as_str)
    }

    /// Engine-facing schema of every type.
    pub fn describe(&self) -> serde_json::Value {
        let resources: serde_json::Map<String, serde_json::Value> = self
            .resources
            .iter()
            .map(|(name, e)| (name.clone(), e.schema.describe()))
            .collect();
        let data_sources: serde_json::Map<String, serde_json::Value> = self
            .data_sources
            .iter()
            .map(|(name, e)| (name.clone(), e.schema.describe()))
            .collect();
        serde_json::json!({
            "resource_schemas": resources,
            "data_source_schemas": data_sources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ServiceVersion;
    use crate::schema::{Attribute, Block, Kind};

    struct Dummy {
        name: &'static str,
        schema: fn() -> Schema,
        tagged: bool,
    }

    fn valid_schema() -> Schema {
        Schema::new(Block::new().attr("name", Attribute::required(Kind::String)))
    }

    #[async_trait]
    impl Resource for Dummy {
        fn name(&self) -> &'static str {
            self.name
        }
        fn schema(&self) -> Schema {
            (self.schema)()
        }
        fn tags(&self) -> Option<TagSpec> {
            self.tagged.then(|| TagSpec::new(ServiceVersion::VpcV2, "dummies"))
        }
        async fn create(&self, _: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
            d.set_id("x");
            Ok(())
        }
        async fn read(&self, _: &RequestContext, _: &mut ResourceData) -> Result<(), ProviderError> {
            Ok(())
        }
        async fn delete(&self, _: &RequestContext, _: &mut ResourceData) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    fn dummy(name: &'static str) -> Dummy {
        Dummy {
            name,
            schema: valid_schema,
            tagged: false,
        }
    }

    #[test]
    fn test_registry_lookup() {
        let registry = RegistryBuilder::new()
            .resource(dummy("a"))
            .resource(dummy("b"))
            .build()
            .unwrap();
        assert!(registry.resource("a").is_some());
        assert!(registry.resource("c").is_none());
        assert_eq!(registry.resource_names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(registry.describe()["resource_schemas"]["a"].is_object());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = RegistryBuilder::new()
            .resource(dummy("a"))
            .resource(dummy("a"))
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("a".into()));
    }

    #[test]
    fn test_broken_triad_rejected() {
        fn broken() -> Schema {
            let mut attribute = Attribute::required(Kind::String);
            attribute.computed = true;
            Schema::new(Block::new().attr("name", attribute))
        }
        let err = RegistryBuilder::new()
            .resource(Dummy {
                name: "bad",
                schema: broken,
                tagged: false,
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::Schema { .. }));
    }

    struct Lookup;

    #[async_trait]
    impl DataSource for Lookup {
        fn name(&self) -> &'static str {
            "lookup"
        }
        fn schema(&self) -> Schema {
            Schema::new(
                Block::new()
                    .attr("id", Attribute::optional_computed(Kind::String))
                    .attr("name", Attribute::optional_computed(Kind::String)),
            )
        }
        async fn read(&self, _: &RequestContext, _: &mut ResourceData) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    fn with_id() -> Schema {
        Schema::new(
            Block::new()
                .attr("id", Attribute::optional_computed(Kind::String))
                .attr("name", Attribute::required(Kind::String)),
        )
    }

    #[test]
    fn test_id_attribute_reserved_for_resources_only() {
        let err = RegistryBuilder::new()
            .resource(Dummy {
                name: "r",
                schema: with_id,
                tagged: false,
            })
            .build()
            .unwrap_err();
        match err {
            RegistryError::Schema { name, source } => {
                assert_eq!(name, "r");
                assert_eq!(source.path, "id");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let registry = RegistryBuilder::new().data_source(Lookup).build().unwrap();
        assert!(registry.data_source("lookup").is_some());
    }

    #[test]
    fn test_taggable_requires_tags_attribute() {
        let err = RegistryBuilder::new()
            .resource(Dummy {
                name: "t",
                schema: valid_schema,
                tagged: true,
            })
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::MissingTags("t".into()));
    }
}
