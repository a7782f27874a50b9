//! # Attribute Schemas
//!
//! A resource type is described by a [`Schema`]: a tree of named [`Attribute`]s, each with a
//! [`Kind`], the required/optional/computed triad and a set of plan-time behaviours
//! (force-new, sensitive, default, validators, diff-suppression, conflicts).
//!
//! Attributes are built fluently:
//!
//! ```rust
//! use otc_framework::schema::{Attribute, Block, Kind};
//! use otc_framework::validation;
//!
//! let block = Block::new()
//!     .attr("name", Attribute::required(Kind::String).validate(validation::string_len_between(1, 64)))
//!     .attr("cidr", Attribute::required(Kind::String).validate(validation::cidr()))
//!     .attr("status", Attribute::computed(Kind::String));
//! assert!(block.check("").is_ok());
//! ```
//!
//! ## The Triad
//!
//! | required | optional | computed | meaning |
//! |----------|----------|----------|---------|
//! | ✓ | | | user must set it |
//! | | ✓ | | user may set it, no cloud default |
//! | | ✓ | ✓ | user may set it, otherwise the cloud picks |
//! | | | ✓ | cloud-owned, read only |
//!
//! Any other combination is rejected by [`Block::check`], which the registry runs for every
//! resource at startup.

use crate::error::Verb;
use crate::mapper::MapperError;
use crate::validation::Validator;
use crate::value::{normalize_set, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Decides whether two representations of the same attribute are semantically equal.
/// Receives the attribute path, the prior value and the proposed value.
pub type DiffSuppressFn = Arc<dyn Fn(&str, &Value, &Value) -> bool + Send + Sync>;

/// The type of an attribute value.
#[derive(Debug, Clone)]
pub enum Kind {
    String,
    Int,
    Bool,
    Float,
    List(Elem),
    Set(Elem),
    /// Map from string to the inner kind.
    Map(Box<Kind>),
}

/// Element type of a list or set: a primitive kind or a nested block.
#[derive(Debug, Clone)]
pub enum Elem {
    Kind(Box<Kind>),
    Block(Block),
}

impl Kind {
    pub fn list_of(kind: Kind) -> Self {
        Self::List(Elem::Kind(Box::new(kind)))
    }

    pub fn set_of(kind: Kind) -> Self {
        Self::Set(Elem::Kind(Box::new(kind)))
    }

    pub fn map_of(kind: Kind) -> Self {
        Self::Map(Box::new(kind))
    }

    /// A nested block stored as a list of maps.
    pub fn block_list(block: Block) -> Self {
        Self::List(Elem::Block(block))
    }

    pub fn block_set(block: Block) -> Self {
        Self::Set(Elem::Block(block))
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Self::List(_) | Self::Set(_))
    }

    /// The nested block, when the elements are blocks.
    pub fn nested_block(&self) -> Option<&Block> {
        match self {
            Self::List(Elem::Block(b)) | Self::Set(Elem::Block(b)) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Int => f.write_str("int"),
            Self::Bool => f.write_str("bool"),
            Self::Float => f.write_str("float"),
            Self::List(Elem::Kind(k)) => write!(f, "list({k})"),
            Self::List(Elem::Block(_)) => f.write_str("list(block)"),
            Self::Set(Elem::Kind(k)) => write!(f, "set({k})"),
            Self::Set(Elem::Block(_)) => f.write_str("set(block)"),
            Self::Map(k) => write!(f, "map({k})"),
        }
    }
}

/// How members of a set attribute are hashed for ordering and de-duplication.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SetHash {
    #[default]
    AllFields,
    /// Hash only the named field of each member block.
    KeyField(String),
}

#[derive(Clone)]
pub struct Attribute {
    pub kind: Kind,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub force_new: bool,
    pub sensitive: bool,
    pub default: Option<Value>,
    pub validators: Vec<Validator>,
    pub diff_suppress: Option<DiffSuppressFn>,
    pub conflicts_with: Vec<String>,
    pub set_hash: SetHash,
    pub max_items: Option<usize>,
    pub min_items: Option<usize>,
    pub description: String,
}

impl Attribute {
    fn base(kind: Kind) -> Self {
        Self {
            kind,
            required: false,
            optional: false,
            computed: false,
            force_new: false,
            sensitive: false,
            default: None,
            validators: Vec::new(),
            diff_suppress: None,
            conflicts_with: Vec::new(),
            set_hash: SetHash::AllFields,
            max_items: None,
            min_items: None,
            description: String::new(),
        }
    }

    pub fn required(kind: Kind) -> Self {
        Self {
            required: true,
            ..Self::base(kind)
        }
    }

    pub fn optional(kind: Kind) -> Self {
        Self {
            optional: true,
            ..Self::base(kind)
        }
    }

    pub fn computed(kind: Kind) -> Self {
        Self {
            computed: true,
            ..Self::base(kind)
        }
    }

    /// Optional, with the cloud filling in a value when the user leaves it unset.
    pub fn optional_computed(kind: Kind) -> Self {
        Self {
            optional: true,
            computed: true,
            ..Self::base(kind)
        }
    }

    /// The `region` attribute carried by nearly every resource.
    pub fn region() -> Self {
        Self::optional_computed(Kind::String)
            .force_new()
            .description("Region the resource lives in; defaults to the provider region.")
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn validate(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn diff_suppress(
        mut self,
        f: impl Fn(&str, &Value, &Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.diff_suppress = Some(Arc::new(f));
        self
    }

    pub fn conflicts_with(mut self, names: &[&str]) -> Self {
        self.conflicts_with = names.iter().map(|s| (*s).to_owned()).collect();
        self
    }

    pub fn set_hash(mut self, strategy: SetHash) -> Self {
        self.set_hash = strategy;
        self
    }

    pub fn max_items(mut self, n: usize) -> Self {
        self.max_items = Some(n);
        self
    }

    pub fn min_items(mut self, n: usize) -> Self {
        self.min_items = Some(n);
        self
    }

    pub fn description(mut self, text: &str) -> Self {
        self.description = text.to_owned();
        self
    }

    /// True for nested blocks with `max_items(1)`, which the mapper treats as singletons.
    pub fn is_singleton_block(&self) -> bool {
        self.max_items == Some(1) && self.kind.nested_block().is_some()
    }

    /// Converts JSON into a value of this attribute's kind, honouring its set hash.
    pub fn coerce_json(&self, json: &serde_json::Value) -> Result<Value, MapperError> {
        let value = Value::from_json(json, &self.kind)?;
        Ok(self.normalize(value))
    }

    /// Re-applies the attribute's set hashing to a value.
    pub fn normalize(&self, value: Value) -> Value {
        match (value, &self.set_hash) {
            (Value::Set(members), strategy) => Value::Set(normalize_set(members, strategy)),
            (other, _) => other,
        }
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("kind", &self.kind)
            .field("required", &self.required)
            .field("optional", &self.optional)
            .field("computed", &self.computed)
            .field("force_new", &self.force_new)
            .field("sensitive", &self.sensitive)
            .field("default", &self.default)
            .field("validators", &self.validators.len())
            .field("diff_suppress", &self.diff_suppress.is_some())
            .field("conflicts_with", &self.conflicts_with)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
#[error("invalid schema for {path}: {reason}")]
pub struct SchemaError {
    pub path: String,
    pub reason: String,
}

/// An ordered set of named attributes.
#[derive(Debug, Clone, Default)]
pub struct Block {
    attributes: BTreeMap<String, Attribute>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attr(mut self, name: &str, attribute: Attribute) -> Self {
        self.attributes.insert(name.to_owned(), attribute);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Attribute)> {
        self.attributes.iter()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Resolves a dotted path (`publicip.0.type`) to its attribute.
    pub fn lookup(&self, path: &str) -> Option<&Attribute> {
        let mut segments = path.split('.').filter(|s| s.parse::<usize>().is_err());
        let mut attribute = self.get(segments.next()?)?;
        for segment in segments {
            attribute = attribute.kind.nested_block()?.get(segment)?;
        }
        Some(attribute)
    }

    /// Checks the triad and per-attribute consistency, recursing into nested blocks.
    pub fn check(&self, prefix: &str) -> Result<(), SchemaError> {
        for (name, attribute) in &self.attributes {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            let fail = |reason: &str| SchemaError {
                path: path.clone(),
                reason: reason.to_owned(),
            };

            if !attribute.required && !attribute.optional && !attribute.computed {
                return Err(fail("one of required, optional or computed must be set"));
            }
            if attribute.required && attribute.computed {
                return Err(fail("required and computed are mutually exclusive"));
            }
            if attribute.required && attribute.optional {
                return Err(fail("required and optional are mutually exclusive"));
            }
            if attribute.required && attribute.default.is_some() {
                return Err(fail("required attributes cannot have a default"));
            }
            if attribute.computed && !attribute.optional && attribute.default.is_some() {
                return Err(fail("computed-only attributes cannot have a default"));
            }
            if (attribute.max_items.is_some() || attribute.min_items.is_some())
                && !attribute.kind.is_collection()
            {
                return Err(fail("max_items/min_items only apply to lists and sets"));
            }
            for other in &attribute.conflicts_with {
                if !self.attributes.contains_key(other) {
                    return Err(fail(&format!("conflicts_with names unknown attribute {other}")));
                }
            }
            if let Some(block) = attribute.kind.nested_block() {
                block.check(&path)?;
            }
        }
        Ok(())
    }

    /// Converts a JSON object into an attribute map. Keys the block does not declare are dropped.
    pub fn coerce_json_object(
        &self,
        object: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<BTreeMap<String, Value>, MapperError> {
        let mut out = BTreeMap::new();
        for (name, attribute) in &self.attributes {
            if let Some(json) = object.get(name) {
                let value = attribute
                    .coerce_json(json)
                    .map_err(|e| e.at(name))?;
                out.insert(name.clone(), value);
            }
        }
        Ok(out)
    }

    /// Retypes an untyped attribute map (e.g. freshly deserialized state) against this block.
    pub fn coerce_map(
        &self,
        map: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>, MapperError> {
        match Value::Map(map.clone()).to_json() {
            serde_json::Value::Object(object) => self.coerce_json_object(&object),
            _ => Ok(BTreeMap::new()),
        }
    }
}

/// Per-operation timeouts of a resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        let ten_minutes = Duration::from_secs(600);
        Self {
            create: ten_minutes,
            read: ten_minutes,
            update: ten_minutes,
            delete: ten_minutes,
        }
    }
}

impl Timeouts {
    pub fn with_create(mut self, d: Duration) -> Self {
        self.create = d;
        self
    }

    pub fn with_update(mut self, d: Duration) -> Self {
        self.update = d;
        self
    }

    pub fn with_delete(mut self, d: Duration) -> Self {
        self.delete = d;
        self
    }

    /// Timeout applying to a verb. Import shares the read timeout.
    pub fn for_verb(&self, verb: Verb) -> Duration {
        match verb {
            Verb::Create => self.create,
            Verb::Read | Verb::Import => self.read,
            Verb::Update => self.update,
            Verb::Delete => self.delete,
        }
    }
}

/// The schema of a resource or data source.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub version: u64,
    pub block: Block,
}

impl Schema {
    pub fn new(block: Block) -> Self {
        Self { version: 0, block }
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.block.get(name)
    }

    /// Engine-facing description of the attribute tree.
    pub fn describe(&self) -> serde_json::Value {
        serde_json::json!({
            "version": self.version,
            "block": describe_block(&self.block),
        })
    }
}

fn describe_block(block: &Block) -> serde_json::Value {
    let attributes: serde_json::Map<String, serde_json::Value> = block
        .iter()
        .map(|(name, a)| {
            let mut entry = serde_json::json!({
                "type": a.kind.to_string(),
                "required": a.required,
                "optional": a.optional,
                "computed": a.computed,
                "force_new": a.force_new,
                "sensitive": a.sensitive,
            });
            if let Some(obj) = entry.as_object_mut() {
                if !a.description.is_empty() {
                    obj.insert("description".into(), a.description.clone().into());
                }
                if let Some(default) = &a.default {
                    obj.insert("default".into(), default.to_json());
                }
                if let Some(n) = a.max_items {
                    obj.insert("max_items".into(), n.into());
                }
                if let Some(nested) = a.kind.nested_block() {
                    obj.insert("block".into(), describe_block(nested));
                }
            }
            (name.clone(), entry)
        })
        .collect();
    serde_json::Value::Object(attributes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triad_is_enforced() {
        let neither = Block::new().attr("x", Attribute::base(Kind::String));
        assert!(neither.check("").is_err());

        let mut both = Attribute::required(Kind::String);
        both.computed = true;
        let err = Block::new().attr("x", both).check("").unwrap_err();
        assert_eq!(err.path, "x");

        let ok = Block::new()
            .attr("a", Attribute::required(Kind::String))
            .attr("b", Attribute::optional_computed(Kind::Int))
            .attr("c", Attribute::computed(Kind::Bool));
        assert!(ok.check("").is_ok());
    }

    #[test]
    fn test_nested_block_paths() {
        let inner = Block::new().attr("type", Attribute::required(Kind::String).force_new());
        let block = Block::new().attr(
            "publicip",
            Attribute::required(Kind::block_list(inner)).max_items(1),
        );
        assert!(block.check("").is_ok());
        assert!(block.get("publicip").unwrap().is_singleton_block());
        assert!(block.lookup("publicip.0.type").unwrap().force_new);
        assert!(block.lookup("publicip.0.nope").is_none());

        let broken = Block::new().attr(
            "outer",
            Attribute::optional(Kind::block_list(Block::new().attr("x", Attribute::base(Kind::Int)))),
        );
        assert_eq!(broken.check("").unwrap_err().path, "outer.x");
    }

    #[test]
    fn test_conflicts_must_name_known_attributes() {
        let block = Block::new().attr(
            "no_security_groups",
            Attribute::optional(Kind::Bool).conflicts_with(&["security_group_ids"]),
        );
        assert!(block.check("").is_err());
    }

    #[test]
    fn test_coerce_json_object_drops_unknown_keys() {
        let block = Block::new()
            .attr("name", Attribute::required(Kind::String))
            .attr("shared", Attribute::computed(Kind::Bool));
        let json = serde_json::json!({"name": "vpc1", "shared": "false", "extra": 1});
        let map = block.coerce_json_object(json.as_object().unwrap()).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["shared"], Value::Bool(false));
    }

    #[test]
    fn test_timeouts_per_verb() {
        let t = Timeouts::default().with_create(Duration::from_secs(60));
        assert_eq!(t.for_verb(Verb::Create), Duration::from_secs(60));
        assert_eq!(t.for_verb(Verb::Import), Duration::from_secs(600));
    }
}
