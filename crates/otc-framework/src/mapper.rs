//! # State Mapper
//!
//! Translates between the engine's untyped [`Value`] bag and the typed request/response
//! structs of the service SDK. There is no reflection: each direction is an explicit trait.
//!
//! - [`FromValue`] reads a typed value out of an attribute (`state → request`).
//! - [`IntoValue`] turns a typed response field into an attribute (`response → state`).
//! - [`Nullable`] models the three states an optional request field can have: left out,
//!   sent as an explicit `null`, or sent with a value.
//! - [`MultiError`] collects every failed attribute set before reporting, so the engine
//!   sees the complete list rather than the first failure.
//!
//! ## Helpers
//!
//! | Helper | Direction | Shape |
//! |--------|-----------|-------|
//! | [`expand_string_list`] | in | list/set of strings → `Vec<String>` |
//! | [`expand_string_map`] | in | map → `BTreeMap<String, String>` |
//! | [`expand_singleton`] | in | MaxItems=1 block → its only element |
//! | [`flatten_string_list`] | out | strings → list |
//! | [`flatten_string_set`] | out | strings → canonical set |
//! | [`flatten_string_map`] | out | string map → map |
//! | [`flatten_singleton`] | out | one block → one-element list |

use crate::schema::SetHash;
use crate::value::{normalize_set, Value};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MapperError {
    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("{path}: {source}")]
    At {
        path: String,
        #[source]
        source: Box<MapperError>,
    },

    #[error("unknown attribute {0:?}")]
    UnknownAttribute(String),

    #[error("{0}")]
    Invalid(String),

    #[error("{}", join(.0))]
    Multiple(Vec<MapperError>),
}

fn join(errors: &[MapperError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl MapperError {
    /// Prefixes the error with an attribute path segment.
    pub fn at(self, segment: &str) -> Self {
        match self {
            Self::At { path, source } => Self::At {
                path: format!("{segment}.{path}"),
                source,
            },
            other => Self::At {
                path: segment.to_owned(),
                source: Box::new(other),
            },
        }
    }

    fn mismatch(expected: &str, found: &Value) -> Self {
        Self::TypeMismatch {
            expected: expected.to_owned(),
            found: found.type_name().to_owned(),
        }
    }
}

/// Accumulates errors from a sequence of attribute sets.
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<MapperError>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the error, if any, and keeps going.
    pub fn check(&mut self, result: Result<(), MapperError>) {
        if let Err(e) = result {
            self.errors.push(e);
        }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<(), MapperError> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.into_iter().next().unwrap_or(MapperError::Multiple(Vec::new()))),
            _ => Err(MapperError::Multiple(self.errors)),
        }
    }
}

pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, MapperError>;
}

pub trait IntoValue {
    fn into_value(self) -> Value;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, MapperError> {
        Ok(value.clone())
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, MapperError> {
        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Null => Ok(String::new()),
            other => Err(MapperError::mismatch("string", other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, MapperError> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Null => Ok(false),
            other => Err(MapperError::mismatch("bool", other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, MapperError> {
        match value {
            Value::Int(i) => Ok(*i),
            Value::Null => Ok(0),
            other => Err(MapperError::mismatch("int", other)),
        }
    }
}

macro_rules! narrow_int {
    ($($t:ty),*) => {$(
        impl FromValue for $t {
            fn from_value(value: &Value) -> Result<Self, MapperError> {
                let wide = i64::from_value(value)?;
                <$t>::try_from(wide).map_err(|_| {
                    MapperError::Invalid(format!("{wide} is out of range for {}", stringify!($t)))
                })
            }
        }

        impl IntoValue for $t {
            fn into_value(self) -> Value {
                Value::Int(i64::from(self))
            }
        }
    )*};
}

narrow_int!(i32, u32, u16);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, MapperError> {
        match value {
            Value::Null => Ok(0.0),
            other => other.as_float().ok_or_else(|| MapperError::mismatch("float", other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, MapperError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self, MapperError> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::List(items) | Value::Set(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| T::from_value(item).map_err(|e| e.at(&i.to_string())))
                .collect(),
            other => Err(MapperError::mismatch("list", other)),
        }
    }
}

impl<T: FromValue> FromValue for BTreeMap<String, T> {
    fn from_value(value: &Value) -> Result<Self, MapperError> {
        match value {
            Value::Null => Ok(BTreeMap::new()),
            Value::Map(map) => map
                .iter()
                .map(|(k, v)| T::from_value(v).map(|t| (k.clone(), t)).map_err(|e| e.at(k)))
                .collect(),
            other => Err(MapperError::mismatch("map", other)),
        }
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::String(self)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::String(self.to_owned())
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl IntoValue for i64 {
    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        self.map(IntoValue::into_value).unwrap_or(Value::Null)
    }
}

impl<T: IntoValue> IntoValue for Vec<T> {
    fn into_value(self) -> Value {
        Value::List(self.into_iter().map(IntoValue::into_value).collect())
    }
}

impl<T: IntoValue> IntoValue for BTreeMap<String, T> {
    fn into_value(self) -> Value {
        Value::Map(self.into_iter().map(|(k, v)| (k, v.into_value())).collect())
    }
}

impl<T: IntoValue> IntoValue for HashMap<String, T> {
    fn into_value(self) -> Value {
        Value::Map(self.into_iter().map(|(k, v)| (k, v.into_value())).collect())
    }
}

/// An optional request field with an explicit-null state.
///
/// Use with `#[serde(default, skip_serializing_if = "Nullable::is_absent")]` so that
/// `Absent` leaves the field out of the JSON body while `Null` sends `null`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Nullable<T> {
    #[default]
    Absent,
    Null,
    Value(T),
}

impl<T> Nullable<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn as_option(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl<T> From<Option<T>> for Nullable<T> {
    fn from(o: Option<T>) -> Self {
        o.map(Self::Value).unwrap_or(Self::Null)
    }
}

impl<T: Serialize> Serialize for Nullable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Value(v) => v.serialize(serializer),
            Self::Absent | Self::Null => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Nullable<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Nullable::from)
    }
}

impl<T: fmt::Display> fmt::Display for Nullable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("<absent>"),
            Self::Null => f.write_str("null"),
            Self::Value(v) => v.fmt(f),
        }
    }
}

/// Strings of a list or set attribute; null and empty members are skipped.
pub fn expand_string_list(value: &Value) -> Vec<String> {
    value
        .as_slice()
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

pub fn expand_string_map(value: &Value) -> BTreeMap<String, String> {
    value
        .as_map()
        .map(|m| {
            m.iter()
                .map(|(k, v)| {
                    let text = match v {
                        Value::String(s) => s.clone(),
                        Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    (k.clone(), text)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// The zeroth element of a MaxItems=1 nested block.
pub fn expand_singleton(value: &Value) -> Option<&BTreeMap<String, Value>> {
    value.as_slice()?.first()?.as_map()
}

pub fn flatten_string_list<I, S>(items: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Value::List(items.into_iter().map(|s| Value::String(s.into())).collect())
}

pub fn flatten_string_set<I, S>(items: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let members = items.into_iter().map(|s| Value::String(s.into())).collect();
    Value::Set(normalize_set(members, &SetHash::AllFields))
}

pub fn flatten_string_map<I, K, V>(items: I) -> Value
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    Value::Map(
        items
            .into_iter()
            .map(|(k, v)| (k.into(), Value::String(v.into())))
            .collect(),
    )
}

/// Wraps one block in a one-element list.
pub fn flatten_singleton(fields: BTreeMap<String, Value>) -> Value {
    Value::List(vec![Value::Map(fields)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_map;

    #[derive(Serialize)]
    struct UpdateOpts {
        #[serde(skip_serializing_if = "Nullable::is_absent")]
        port_id: Nullable<String>,
        #[serde(skip_serializing_if = "Nullable::is_absent")]
        name: Nullable<String>,
    }

    #[test]
    fn test_nullable_three_states() {
        let body = UpdateOpts {
            port_id: Nullable::Null,
            name: Nullable::Absent,
        };
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"port_id":null}"#);

        let body = UpdateOpts {
            port_id: Nullable::Value("p1".into()),
            name: Nullable::Value("n".into()),
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"port_id":"p1","name":"n"}"#
        );
    }

    #[test]
    fn test_multi_error_collects_everything() {
        let mut errs = MultiError::new();
        errs.check(Ok(()));
        errs.check(Err(MapperError::Invalid("a".into()).at("name")));
        errs.check(Err(MapperError::Invalid("b".into()).at("cidr")));
        assert_eq!(errs.len(), 2);
        let err = errs.into_result().unwrap_err();
        assert_eq!(err.to_string(), "name: a; cidr: b");
    }

    #[test]
    fn test_error_paths_nest() {
        let err = MapperError::Invalid("bad".into()).at("type").at("0").at("publicip");
        assert_eq!(err.to_string(), "publicip.0.type: bad");
    }

    #[test]
    fn test_from_value() {
        let list = Value::List(vec!["a".into(), "b".into()]);
        assert_eq!(Vec::<String>::from_value(&list).unwrap(), vec!["a", "b"]);
        assert_eq!(Option::<i64>::from_value(&Value::Null).unwrap(), None);
        assert!(u16::from_value(&Value::Int(70000)).is_err());
        assert!(bool::from_value(&Value::from("x")).is_err());
    }

    #[test]
    fn test_singletons() {
        let block = value_map! { "type" => "5_bgp" };
        let wrapped = flatten_singleton(block.as_map().unwrap().clone());
        assert_eq!(
            expand_singleton(&wrapped).unwrap().get("type"),
            Some(&Value::from("5_bgp"))
        );
        assert!(expand_singleton(&Value::List(vec![])).is_none());
    }

    #[test]
    fn test_string_helpers() {
        let set = flatten_string_set(["b", "a", "a"]);
        assert_eq!(expand_string_list(&set).len(), 2);
        let map = flatten_string_map([("k", "v")]);
        assert_eq!(expand_string_map(&map)["k"], "v");
    }
}
