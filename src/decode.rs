//! Typed decoding on top of the shared traversal.
//!
//! A type implements [`Decode`] by describing its [`Shape`] and building itself from
//! the [`Decoded`] tree the traversal produced for that shape. Records use
//! [`RecordFields`] to take their fields out by static name.
//!
//! ```
//! use command_provider::decode::{decode_as, Decode, RecordFields};
//! use command_provider::schema::{RecordSchema, SchemaError, Shape};
//! use command_provider::validation::Decoded;
//! use command_provider::value::{MarshalOptions, PropertyValue};
//! use serde_json::json;
//!
//! struct Endpoint {
//!     host: String,
//!     port: Option<u64>,
//! }
//!
//! impl Decode for Endpoint {
//!     fn shape() -> Shape {
//!         RecordSchema::new("Endpoint")
//!             .with_field("Host", "", String::shape())
//!             .with_field("Port", ",optional", Option::<u64>::shape())
//!             .into()
//!     }
//!
//!     fn from_decoded(decoded: Decoded) -> Result<Self, SchemaError> {
//!         let mut fields = RecordFields::new("Endpoint", decoded)?;
//!         Ok(Self {
//!             host: fields.take("Host")?,
//!             port: fields.take("Port")?,
//!         })
//!     }
//! }
//!
//! let value = PropertyValue::from_json(&json!({"host": "db"}), MarshalOptions::boundary());
//! let endpoint: Endpoint = decode_as(&value).unwrap();
//! assert_eq!(endpoint.host, "db");
//! assert_eq!(endpoint.port, None);
//! ```

use std::collections::{BTreeMap, HashMap};

use crate::schema::{SchemaError, Shape};
use crate::validation::{decode_at, validate_at, CheckFailure, DecodeError, Decoded};
use crate::value::PropertyValue;

/// A Rust type that can be decoded from a property tree.
pub trait Decode: Sized {
    /// The static shape of this type.
    fn shape() -> Shape;

    /// Build a value from the traversal's output for [`Decode::shape`].
    fn from_decoded(decoded: Decoded) -> Result<Self, SchemaError>;
}

/// Decode `value` into `T`, stopping at the first failure.
pub fn decode_as<T: Decode>(value: &PropertyValue) -> Result<T, DecodeError> {
    decode_property("", value)
}

/// Decode the property at `path` into `T`; failures are reported relative to `path`.
pub fn decode_property<T: Decode>(path: &str, value: &PropertyValue) -> Result<T, DecodeError> {
    let decoded = decode_at(path, value, &T::shape())?;
    Ok(T::from_decoded(decoded)?)
}

/// Validate the property at `path` against `T`'s shape, collecting every failure.
pub fn validate_property<T: Decode>(
    path: &str,
    value: &PropertyValue,
) -> Result<Vec<CheckFailure>, SchemaError> {
    validate_at(path, value, &T::shape())
}

/// Decoded record fields, taken out one at a time by static field name.
#[derive(Debug)]
pub struct RecordFields {
    record: &'static str,
    fields: BTreeMap<String, Decoded>,
}

impl RecordFields {
    /// Unwrap a decoded record.
    pub fn new(record: &'static str, decoded: Decoded) -> Result<Self, SchemaError> {
        match decoded {
            Decoded::Record(fields) => Ok(Self { record, fields }),
            _ => Err(SchemaError::ShapeMismatch { target: record }),
        }
    }

    /// Remove and convert the field declared as `name`.
    pub fn take<T: Decode>(&mut self, name: &str) -> Result<T, SchemaError> {
        let decoded = self
            .fields
            .remove(name)
            .ok_or_else(|| SchemaError::UndeclaredField {
                record: self.record.to_string(),
                field: name.to_string(),
            })?;
        T::from_decoded(decoded)
    }
}

impl Decode for bool {
    fn shape() -> Shape {
        Shape::Bool
    }

    fn from_decoded(decoded: Decoded) -> Result<Self, SchemaError> {
        match decoded {
            Decoded::Bool(b) => Ok(b),
            _ => Err(SchemaError::ShapeMismatch { target: "bool" }),
        }
    }
}

impl Decode for f64 {
    fn shape() -> Shape {
        Shape::Number
    }

    fn from_decoded(decoded: Decoded) -> Result<Self, SchemaError> {
        match decoded {
            Decoded::Number(n) => Ok(n),
            _ => Err(SchemaError::ShapeMismatch { target: "f64" }),
        }
    }
}

// Numbers travel as f64; integer targets truncate.
impl Decode for i64 {
    fn shape() -> Shape {
        Shape::Number
    }

    fn from_decoded(decoded: Decoded) -> Result<Self, SchemaError> {
        match decoded {
            Decoded::Number(n) => Ok(n as i64),
            _ => Err(SchemaError::ShapeMismatch { target: "i64" }),
        }
    }
}

impl Decode for u64 {
    fn shape() -> Shape {
        Shape::Number
    }

    fn from_decoded(decoded: Decoded) -> Result<Self, SchemaError> {
        match decoded {
            Decoded::Number(n) => Ok(n as u64),
            _ => Err(SchemaError::ShapeMismatch { target: "u64" }),
        }
    }
}

impl Decode for String {
    fn shape() -> Shape {
        Shape::String
    }

    fn from_decoded(decoded: Decoded) -> Result<Self, SchemaError> {
        match decoded {
            Decoded::String(s) => Ok(s),
            _ => Err(SchemaError::ShapeMismatch { target: "String" }),
        }
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn shape() -> Shape {
        Shape::array(T::shape())
    }

    fn from_decoded(decoded: Decoded) -> Result<Self, SchemaError> {
        match decoded {
            Decoded::Array(items) => items.into_iter().map(T::from_decoded).collect(),
            _ => Err(SchemaError::ShapeMismatch { target: "Vec" }),
        }
    }
}

impl<T: Decode> Decode for BTreeMap<String, T> {
    fn shape() -> Shape {
        Shape::map(T::shape())
    }

    fn from_decoded(decoded: Decoded) -> Result<Self, SchemaError> {
        match decoded {
            Decoded::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| Ok((k, T::from_decoded(v)?)))
                .collect(),
            _ => Err(SchemaError::ShapeMismatch { target: "BTreeMap" }),
        }
    }
}

impl<T: Decode> Decode for HashMap<String, T> {
    fn shape() -> Shape {
        Shape::map(T::shape())
    }

    fn from_decoded(decoded: Decoded) -> Result<Self, SchemaError> {
        match decoded {
            Decoded::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| Ok((k, T::from_decoded(v)?)))
                .collect(),
            _ => Err(SchemaError::ShapeMismatch { target: "HashMap" }),
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn shape() -> Shape {
        Shape::optional(T::shape())
    }

    fn from_decoded(decoded: Decoded) -> Result<Self, SchemaError> {
        match decoded {
            Decoded::Absent => Ok(None),
            other => T::from_decoded(other).map(Some),
        }
    }
}
