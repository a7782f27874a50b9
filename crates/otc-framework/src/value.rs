//! # Attribute Values
//!
//! The engine hands every callback an untyped, recursive attribute bag. [`Value`] is the
//! sum type for that bag: primitives, lists, sets and string-keyed maps of the same.
//! Nested blocks are represented as a `List` (or `Set`) of `Map`s.
//!
//! Conversion from JSON is schema-driven ([`Value::from_json`]): the same JSON array
//! becomes a `List` or a `Set` depending on what the attribute declares, and scalar
//! strings such as `"true"` or `"5"` are accepted where the schema says bool or int.
//!
//! Sets are kept in a canonical order (sorted by hash code, duplicates removed) so that
//! two sets with the same members compare equal. See [`normalize_set`].

use crate::mapper::MapperError;
use crate::schema::{Elem, Kind, SetHash};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// One attribute value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Set(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True for null and for the zero value of every kind.
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Bool(b) => !b,
            Self::Int(i) => *i == 0,
            Self::Float(f) => *f == 0.0,
            Self::String(s) => s.is_empty(),
            Self::List(v) | Self::Set(v) => v.is_empty(),
            Self::Map(m) => m.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Elements of a list or a set.
    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Self::List(v) | Self::Set(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::Map(_) => "map",
        }
    }

    /// Walks a dotted path such as `publicip.0.type`. Numeric segments index lists and sets.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            current = match current {
                Self::Map(m) => m.get(segment)?,
                Self::List(v) | Self::Set(v) => v.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// The zero value of a kind. Missing response fields map to this instead of being removed.
    pub fn zero(kind: &Kind) -> Value {
        match kind {
            Kind::String => Self::String(String::new()),
            Kind::Int => Self::Int(0),
            Kind::Bool => Self::Bool(false),
            Kind::Float => Self::Float(0.0),
            Kind::List(_) => Self::List(Vec::new()),
            Kind::Set(_) => Self::Set(Vec::new()),
            Kind::Map(_) => Self::Map(BTreeMap::new()),
        }
    }

    /// Copy of the value with every nested set put in canonical order.
    pub fn canonical(&self) -> Value {
        match self {
            Self::List(v) => Self::List(v.iter().map(Value::canonical).collect()),
            Self::Set(v) => Self::Set(normalize_set(
                v.iter().map(Value::canonical).collect(),
                &SetHash::AllFields,
            )),
            Self::Map(m) => Self::Map(m.iter().map(|(k, v)| (k.clone(), v.canonical())).collect()),
            other => other.clone(),
        }
    }

    /// Converts JSON into a value of the given kind.
    pub fn from_json(json: &serde_json::Value, kind: &Kind) -> Result<Value, MapperError> {
        use serde_json::Value as Json;

        if json.is_null() {
            return Ok(Self::Null);
        }
        let mismatch = || MapperError::TypeMismatch {
            expected: kind.to_string(),
            found: json_type(json).to_owned(),
        };

        match kind {
            Kind::String => match json {
                Json::String(s) => Ok(Self::String(s.clone())),
                Json::Bool(b) => Ok(Self::String(b.to_string())),
                Json::Number(n) => Ok(Self::String(n.to_string())),
                _ => Err(mismatch()),
            },
            Kind::Int => match json {
                Json::Number(n) => n.as_i64().map(Self::Int).ok_or_else(mismatch),
                Json::String(s) => s.trim().parse().map(Self::Int).map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            Kind::Float => match json {
                Json::Number(n) => n.as_f64().map(Self::Float).ok_or_else(mismatch),
                Json::String(s) => s.trim().parse().map(Self::Float).map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            Kind::Bool => match json {
                Json::Bool(b) => Ok(Self::Bool(*b)),
                Json::String(s) if s.eq_ignore_ascii_case("true") => Ok(Self::Bool(true)),
                Json::String(s) if s.eq_ignore_ascii_case("false") => Ok(Self::Bool(false)),
                _ => Err(mismatch()),
            },
            Kind::List(elem) | Kind::Set(elem) => {
                let items = json.as_array().ok_or_else(mismatch)?;
                let values = items
                    .iter()
                    .map(|item| elem_from_json(item, elem))
                    .collect::<Result<Vec<_>, _>>()?;
                if matches!(kind, Kind::Set(_)) {
                    Ok(Self::Set(normalize_set(values, &SetHash::AllFields)))
                } else {
                    Ok(Self::List(values))
                }
            }
            Kind::Map(inner) => {
                let object = json.as_object().ok_or_else(mismatch)?;
                let mut map = BTreeMap::new();
                for (key, item) in object {
                    map.insert(key.clone(), Value::from_json(item, inner)?);
                }
                Ok(Self::Map(map))
            }
        }
    }

    /// Converts JSON without a schema: arrays become lists, numbers become ints when integral.
    pub fn from_untyped_json(json: &serde_json::Value) -> Value {
        use serde_json::Value as Json;
        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            Json::String(s) => Self::String(s.clone()),
            Json::Array(items) => Self::List(items.iter().map(Value::from_untyped_json).collect()),
            Json::Object(object) => Self::Map(
                object
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_untyped_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Int(i) => Json::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Self::String(s) => Json::String(s.clone()),
            Self::List(v) | Self::Set(v) => Json::Array(v.iter().map(Value::to_json).collect()),
            Self::Map(m) => Json::Object(m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
        }
    }
}

fn elem_from_json(json: &serde_json::Value, elem: &Elem) -> Result<Value, MapperError> {
    match elem {
        Elem::Kind(kind) => Value::from_json(json, kind),
        Elem::Block(block) => {
            let object = json.as_object().ok_or_else(|| MapperError::TypeMismatch {
                expected: "block".to_owned(),
                found: json_type(json).to_owned(),
            })?;
            block.coerce_json_object(object).map(Value::Map)
        }
    }
}

fn json_type(json: &serde_json::Value) -> &'static str {
    use serde_json::Value as Json;
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

/// Hash code of a value, computed over its canonical JSON text.
pub fn hash_code(value: &Value) -> u32 {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.canonical().to_json().to_string(),
    };
    crc32fast::hash(text.as_bytes())
}

/// Orders set members by hash code and drops members whose hash collides with an earlier one.
///
/// The same strategy must be used on the way in and on read-back, otherwise the engine
/// sees a spurious diff.
pub fn normalize_set(values: Vec<Value>, strategy: &SetHash) -> Vec<Value> {
    let mut keyed: Vec<(u32, Value)> = values
        .into_iter()
        .map(|value| (set_member_hash(&value, strategy), value))
        .collect();
    keyed.sort_by_key(|(hash, _)| *hash);
    keyed.dedup_by_key(|(hash, _)| *hash);
    keyed.into_iter().map(|(_, value)| value).collect()
}

fn set_member_hash(value: &Value, strategy: &SetHash) -> u32 {
    match (strategy, value) {
        (SetHash::KeyField(field), Value::Map(map)) => {
            hash_code(map.get(field.as_str()).unwrap_or(&Value::Null))
        }
        _ => hash_code(value),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(Value::from_untyped_json(&json))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u16> for Value {
    fn from(i: u16) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(m: BTreeMap<String, Value>) -> Self {
        Self::Map(m)
    }
}

/// Builds a `Value::Map` from `key => value` pairs.
#[macro_export]
macro_rules! value_map {
    ($($key:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut map = ::std::collections::BTreeMap::<String, $crate::Value>::new();
        $(map.insert(String::from($key), $crate::Value::from($value));)*
        $crate::Value::Map(map)
    }};
}
