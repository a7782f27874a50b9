//! # Instance State & Resource Data
//!
//! [`InstanceState`] is what the engine persists for a live resource: the cloud ID plus the
//! attribute map. An empty ID means the resource does not exist.
//!
//! [`ResourceData`] is the view a callback works with. It layers three maps:
//!
//! 1. `prior` - the last persisted state (the `old` side of every change),
//! 2. `planned` - the values the plan settled on (the `new` side),
//! 3. `written` - values the callback has set during this invocation.
//!
//! Reads look through the layers top-down (`written`, then `planned`, then `prior`).
//! [`ResourceData::has_change`] compares `prior` with `planned`, so it answers the question
//! "did the user ask for something different" independently of what the callback wrote.

use crate::error::Verb;
use crate::mapper::{FromValue, IntoValue, MapperError, MultiError, Nullable};
use crate::schema::{Block, Schema, Timeouts};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const SENSITIVE_PLACEHOLDER: &str = "<sensitive>";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceState {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl InstanceState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_owned(), value.into());
        self
    }

    /// True when the instance does not exist.
    pub fn is_gone(&self) -> bool {
        self.id.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.attributes, path)
    }

    pub fn get_str(&self, path: &str) -> &str {
        self.get(path).and_then(Value::as_str).unwrap_or_default()
    }

    /// Re-types attributes that went through an untyped round trip (e.g. JSON from the engine).
    pub fn coerce(self, block: &Block) -> Result<Self, MapperError> {
        Ok(Self {
            id: self.id,
            attributes: block.coerce_map(&self.attributes)?,
        })
    }

    /// JSON rendering with sensitive attributes replaced by a placeholder. Use for logging.
    pub fn redacted(&self, block: &Block) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "attributes": redact_map(&self.attributes, block),
        })
    }
}

fn redact_map(map: &BTreeMap<String, Value>, block: &Block) -> serde_json::Value {
    let object = map
        .iter()
        .map(|(name, value)| {
            let rendered = match block.get(name) {
                Some(a) if a.sensitive && !value.is_null() => {
                    serde_json::Value::String(SENSITIVE_PLACEHOLDER.to_owned())
                }
                Some(a) => match (a.kind.nested_block(), value.as_slice()) {
                    (Some(nested), Some(items)) => serde_json::Value::Array(
                        items
                            .iter()
                            .map(|item| match item.as_map() {
                                Some(m) => redact_map(m, nested),
                                None => item.to_json(),
                            })
                            .collect(),
                    ),
                    _ => value.to_json(),
                },
                None => value.to_json(),
            };
            (name.clone(), rendered)
        })
        .collect();
    serde_json::Value::Object(object)
}

fn lookup<'a>(map: &'a BTreeMap<String, Value>, path: &str) -> Option<&'a Value> {
    let (head, rest) = match path.split_once('.') {
        Some((h, r)) => (h, Some(r)),
        None => (path, None),
    };
    let value = map.get(head)?;
    match rest {
        Some(rest) => value.get_path(rest),
        None => Some(value),
    }
}

/// Two values differ unless they are canonically equal or both zero.
pub fn values_differ(old: &Value, new: &Value) -> bool {
    if old.is_zero() && new.is_zero() {
        return false;
    }
    old.canonical() != new.canonical()
}

/// The attribute view handed to resource callbacks.
#[derive(Debug, Clone)]
pub struct ResourceData {
    schema: Arc<Schema>,
    id: String,
    prior: BTreeMap<String, Value>,
    planned: BTreeMap<String, Value>,
    written: BTreeMap<String, Value>,
    timeouts: Timeouts,
    new_resource: bool,
}

impl ResourceData {
    /// View for Create/Update: `prior` is the persisted state, `planned` the plan's outcome.
    pub fn new(schema: Arc<Schema>, prior: InstanceState, planned: BTreeMap<String, Value>) -> Self {
        Self {
            schema,
            new_resource: prior.id.is_empty(),
            id: prior.id,
            prior: prior.attributes,
            planned,
            written: BTreeMap::new(),
            timeouts: Timeouts::default(),
        }
    }

    /// View for Read/Delete: nothing is planned, so there are no changes.
    pub fn from_state(schema: Arc<Schema>, state: InstanceState) -> Self {
        let planned = state.attributes.clone();
        Self::new(schema, state, planned)
    }

    /// View for Import: only the ID is known.
    pub fn for_import(schema: Arc<Schema>, id: impl Into<String>) -> Self {
        Self::from_state(schema, InstanceState::new(id))
    }

    /// View for data sources: the config is the only input.
    pub fn from_config(schema: Arc<Schema>, config: BTreeMap<String, Value>) -> Self {
        Self::new(schema, InstanceState::default(), config)
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Records the cloud ID. Create callbacks call this as soon as the ID is known.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// Marks the instance as gone.
    pub fn clear_id(&mut self) {
        self.id.clear();
    }

    pub fn is_new_resource(&self) -> bool {
        self.new_resource
    }

    pub fn timeout(&self, verb: Verb) -> Duration {
        self.timeouts.for_verb(verb)
    }

    /// Current value of an attribute path; `Null` when unknown.
    pub fn get(&self, path: &str) -> &Value {
        const NULL: &Value = &Value::Null;
        lookup(&self.written, path)
            .or_else(|| lookup(&self.planned, path))
            .or_else(|| lookup(&self.prior, path))
            .unwrap_or(NULL)
    }

    /// The value, unless it is null or the zero value of its kind.
    pub fn get_ok(&self, path: &str) -> Option<&Value> {
        let value = self.get(path);
        (!value.is_zero()).then_some(value)
    }

    pub fn get_as<T: FromValue>(&self, path: &str) -> Result<T, MapperError> {
        T::from_value(self.get(path)).map_err(|e| e.at(path))
    }

    pub fn get_string(&self, path: &str) -> String {
        self.get(path).as_str().unwrap_or_default().to_owned()
    }

    pub fn get_bool(&self, path: &str) -> bool {
        self.get(path).as_bool().unwrap_or_default()
    }

    pub fn get_int(&self, path: &str) -> i64 {
        self.get(path).as_int().unwrap_or_default()
    }

    /// `(old, new)` for an attribute path.
    pub fn get_change(&self, path: &str) -> (Value, Value) {
        let old = lookup(&self.prior, path).cloned().unwrap_or_default();
        let new = lookup(&self.planned, path).cloned().unwrap_or_default();
        (old, new)
    }

    pub fn has_change(&self, path: &str) -> bool {
        let (old, new) = self.get_change(path);
        values_differ(&old, &new)
    }

    pub fn has_changes(&self, paths: &[&str]) -> bool {
        paths.iter().any(|p| self.has_change(p))
    }

    /// Field for a partial update request: absent when unchanged, explicit null when the
    /// user removed the value, the new value otherwise.
    pub fn get_nullable<T: FromValue>(&self, path: &str) -> Result<Nullable<T>, MapperError> {
        if !self.has_change(path) {
            return Ok(Nullable::Absent);
        }
        let (_, new) = self.get_change(path);
        if new.is_zero() {
            Ok(Nullable::Null)
        } else {
            T::from_value(&new).map(Nullable::Value).map_err(|e| e.at(path))
        }
    }

    /// Sets a top-level attribute. The value is converted to the attribute's declared kind.
    pub fn set(&mut self, name: &str, value: impl IntoValue) -> Result<(), MapperError> {
        let attribute = self
            .schema
            .attribute(name)
            .ok_or_else(|| MapperError::UnknownAttribute(name.to_owned()))?;
        let typed = attribute
            .coerce_json(&value.into_value().to_json())
            .map_err(|e| e.at(name))?;
        self.written.insert(name.to_owned(), typed);
        Ok(())
    }

    /// Sets several attributes, reporting every failure rather than the first.
    pub fn set_many<I, V>(&mut self, values: I) -> Result<(), MapperError>
    where
        I: IntoIterator<Item = (&'static str, V)>,
        V: IntoValue,
    {
        let mut errors = MultiError::new();
        for (name, value) in values {
            errors.check(self.set(name, value));
        }
        errors.into_result()
    }

    /// Final state: prior overlaid with planned and written values.
    pub fn into_state(self) -> InstanceState {
        let mut attributes = self.prior;
        attributes.extend(self.planned);
        attributes.extend(self.written);
        InstanceState {
            id: self.id,
            attributes,
        }
    }
}
