//! The dynamic property value model.
//!
//! Resource properties arrive as self-describing trees. [`PropertyValue`] is the
//! in-memory form every other module works on; [`PropertyValue::from_json`] and
//! [`PropertyValue::to_json`] convert from and to the JSON representation used at
//! the protocol boundary.
//!
//! # Unknown values
//!
//! During a preview the caller may not know a property yet. Such values travel as
//! the string [`UNKNOWN_SENTINEL`] and become [`PropertyValue::Unknown`] when
//! [`MarshalOptions::keep_unknowns`] is set.
//!
//! ```
//! use command_provider::value::{MarshalOptions, PropertyValue, UNKNOWN_SENTINEL};
//! use serde_json::json;
//!
//! let value = PropertyValue::from_json(
//!     &json!({"compare": UNKNOWN_SENTINEL, "stdin": null}),
//!     MarshalOptions::boundary(),
//! );
//! let map = value.as_object().unwrap();
//! assert!(map["compare"].is_unknown());
//! assert!(!map.contains_key("stdin"));
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

/// The string that encodes an unresolved value at the JSON boundary.
pub const UNKNOWN_SENTINEL: &str = "04da6b54-80e4-46f7-96ec-b56ff0331ba9";

/// An object's entries, keyed by property name.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// A self-describing property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// An explicit null.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number. All numbers are carried as `f64`.
    Number(f64),
    /// A string.
    String(String),
    /// An ordered sequence of values.
    Array(Vec<PropertyValue>),
    /// A mapping from unique string keys to values.
    Object(PropertyMap),
    /// A value that has not been resolved upstream yet.
    Unknown,
}

/// Options controlling conversion from JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MarshalOptions {
    /// Decode [`UNKNOWN_SENTINEL`] strings as [`PropertyValue::Unknown`]. When unset they
    /// become [`PropertyValue::Null`].
    pub keep_unknowns: bool,
    /// Drop object entries whose value is null.
    pub skip_nulls: bool,
}

impl MarshalOptions {
    /// The options used for every request crossing the provider boundary.
    pub fn boundary() -> Self {
        Self {
            keep_unknowns: true,
            skip_nulls: true,
        }
    }
}

impl PropertyValue {
    /// Convert a JSON value into a property value.
    pub fn from_json(value: &Value, opts: MarshalOptions) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => Self::Number(n.as_f64().unwrap_or_default()),
            Value::String(s) if s == UNKNOWN_SENTINEL => {
                if opts.keep_unknowns {
                    Self::Unknown
                } else {
                    Self::Null
                }
            },
            Value::String(s) => Self::String(s.clone()),
            Value::Array(items) => {
                Self::Array(items.iter().map(|v| Self::from_json(v, opts)).collect())
            },
            Value::Object(obj) => Self::Object(map_from_json(obj, opts)),
        }
    }

    /// Convert back into JSON. Unknown values become [`UNKNOWN_SENTINEL`]; numbers
    /// that are not finite become null.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::String(s) => Value::String(s.clone()),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(map) => map_to_json(map),
            Self::Unknown => Value::String(UNKNOWN_SENTINEL.to_string()),
        }
    }

    /// The name of this value's runtime type, as used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Unknown => "unknown",
        }
    }

    /// Whether this is an explicit null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this value is unresolved.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Whether this value or anything nested in it is unresolved.
    pub fn contains_unknowns(&self) -> bool {
        match self {
            Self::Unknown => true,
            Self::Array(items) => items.iter().any(Self::contains_unknowns),
            Self::Object(map) => map.values().any(Self::contains_unknowns),
            _ => false,
        }
    }

    /// The string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The entries, if this is an object.
    pub fn as_object(&self) -> Option<&PropertyMap> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// The elements, if this is an array.
    pub fn as_array(&self) -> Option<&[PropertyValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for PropertyValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<PropertyMap> for PropertyValue {
    fn from(map: PropertyMap) -> Self {
        Self::Object(map)
    }
}

impl From<Vec<PropertyValue>> for PropertyValue {
    fn from(items: Vec<PropertyValue>) -> Self {
        Self::Array(items)
    }
}

/// Convert a JSON object into a property map, applying `opts`.
pub fn map_from_json(obj: &serde_json::Map<String, Value>, opts: MarshalOptions) -> PropertyMap {
    obj.iter()
        .filter(|(_, v)| !(opts.skip_nulls && v.is_null()))
        .map(|(k, v)| (k.clone(), PropertyValue::from_json(v, opts)))
        .collect()
}

/// Convert a property map back into a JSON object.
pub fn map_to_json(map: &PropertyMap) -> Value {
    Value::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
}

fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}
