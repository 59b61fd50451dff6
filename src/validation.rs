//! Shape-directed validation and decoding of property trees.
//!
//! A single recursive traversal walks a [`PropertyValue`] alongside a [`Shape`]. It has
//! two entry points:
//!
//! - [`validate`] keeps going after a mismatch and returns every [`CheckFailure`] it can
//!   reach, so a caller sees all problems at once.
//! - [`decode`] stops at the first mismatch and otherwise produces a [`Decoded`] tree
//!   that [`crate::decode::Decode`] implementations turn into Rust values.
//!
//! Only a [`SchemaError`] aborts [`validate`]; it signals a broken shape declaration,
//! not bad input.
//!
//! # Example
//!
//! ```
//! use command_provider::schema::{RecordSchema, Shape};
//! use command_provider::validation::validate;
//! use command_provider::value::{MarshalOptions, PropertyValue};
//! use serde_json::json;
//!
//! let shape: Shape = RecordSchema::new("Endpoint")
//!     .with_field("Host", "host", Shape::String)
//!     .with_field("Port", "port,optional", Shape::Number)
//!     .into();
//!
//! let input = PropertyValue::from_json(&json!({"port": "80"}), MarshalOptions::boundary());
//! let failures = validate(&input, &shape).unwrap();
//! assert_eq!(failures.len(), 2);
//! assert_eq!(failures[0].property, "host");
//! assert_eq!(failures[1].reason(), "expected a number value, received a string value");
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::{SchemaError, Shape};
use crate::value::PropertyValue;

/// What went wrong at a property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// The value's runtime type does not match the expected shape.
    TypeMismatch {
        /// The expected kind.
        expected: String,
        /// The type of the value actually received.
        actual: String,
    },
    /// A required property is absent or null.
    MissingRequiredProperty {
        /// The wire name of the missing property.
        name: String,
    },
    /// The value has the right type but violates a constraint.
    Invalid {
        /// Why the value was rejected.
        reason: String,
    },
}

/// A single problem found in a property tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckFailure {
    /// Path of the offending property, e.g. `create.command[0]`.
    pub property: String,
    /// What went wrong.
    #[serde(flatten)]
    pub kind: FailureKind,
}

impl CheckFailure {
    /// A type mismatch at `path`.
    pub fn type_mismatch(path: &str, expected: &str, actual: &PropertyValue) -> Self {
        Self {
            property: path.to_string(),
            kind: FailureKind::TypeMismatch {
                expected: expected.to_string(),
                actual: actual.type_name().to_string(),
            },
        }
    }

    /// A missing required property at `path`.
    pub fn missing_required(path: &str, name: &str) -> Self {
        Self {
            property: path.to_string(),
            kind: FailureKind::MissingRequiredProperty {
                name: name.to_string(),
            },
        }
    }

    /// A constraint violation at `path`.
    pub fn invalid(path: &str, reason: impl Into<String>) -> Self {
        Self {
            property: path.to_string(),
            kind: FailureKind::Invalid {
                reason: reason.into(),
            },
        }
    }

    /// Human-readable reason.
    pub fn reason(&self) -> String {
        match &self.kind {
            FailureKind::TypeMismatch { expected, actual } => {
                format!("expected a {} value, received a {} value", expected, actual)
            },
            FailureKind::MissingRequiredProperty { name } => {
                format!("missing required property {}", name)
            },
            FailureKind::Invalid { reason } => reason.clone(),
        }
    }
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.property.is_empty() {
            write!(f, "{}", self.reason())
        } else {
            write!(f, "{}: {}", self.property, self.reason())
        }
    }
}

/// Why [`decode`] failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// The input does not fit the shape.
    #[error("{0}")]
    Failure(CheckFailure),

    /// The input contains a value that is not known yet.
    #[error("{path}: value is not known yet")]
    Unresolved {
        /// Path of the unresolved value.
        path: String,
    },

    /// The shape declaration itself is broken.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// The output of [`decode`]: a tree mirroring the shape, with zero values filled in
/// for absent optional record fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A boolean.
    Bool(bool),
    /// A number.
    Number(f64),
    /// A string.
    String(String),
    /// Sequence elements, in order.
    Array(Vec<Decoded>),
    /// Map entries.
    Map(BTreeMap<String, Decoded>),
    /// Record fields keyed by their static field name.
    Record(BTreeMap<String, Decoded>),
    /// An absent optional value.
    Absent,
}

impl Decoded {
    /// The zero value of `shape`.
    pub fn zero(shape: &Shape) -> Self {
        match shape {
            Shape::Bool => Self::Bool(false),
            Shape::Number => Self::Number(0.0),
            Shape::String => Self::String(String::new()),
            Shape::Array(_) => Self::Array(Vec::new()),
            Shape::Map { .. } => Self::Map(BTreeMap::new()),
            Shape::Record(schema) => Self::Record(
                schema
                    .fields()
                    .iter()
                    .map(|field| (field.name.clone(), Self::zero(&field.shape)))
                    .collect(),
            ),
            Shape::Optional(_) | Shape::Unsupported(_) => Self::Absent,
        }
    }
}

/// Validate `value` against `shape`, collecting every failure.
pub fn validate(value: &PropertyValue, shape: &Shape) -> Result<Vec<CheckFailure>, SchemaError> {
    validate_at("", value, shape)
}

/// Like [`validate`], reporting paths relative to `path`.
pub fn validate_at(
    path: &str,
    value: &PropertyValue,
    shape: &Shape,
) -> Result<Vec<CheckFailure>, SchemaError> {
    let mut failures = Vec::new();
    let result = Walker {
        failures: Some(&mut failures),
    }
    .walk(path, value, shape);

    match result {
        Ok(_) | Err(DecodeError::Unresolved { .. }) => Ok(failures),
        Err(DecodeError::Failure(failure)) => {
            failures.push(failure);
            Ok(failures)
        },
        Err(DecodeError::Schema(err)) => Err(err),
    }
}

/// Decode `value` against `shape`, stopping at the first failure.
pub fn decode(value: &PropertyValue, shape: &Shape) -> Result<Decoded, DecodeError> {
    decode_at("", value, shape)
}

/// Like [`decode`], reporting paths relative to `path`.
pub fn decode_at(path: &str, value: &PropertyValue, shape: &Shape) -> Result<Decoded, DecodeError> {
    Walker { failures: None }.walk(path, value, shape)
}

/// The shared traversal. With a failure sink it records mismatches and keeps going;
/// without one it returns the first mismatch.
struct Walker<'a> {
    failures: Option<&'a mut Vec<CheckFailure>>,
}

impl Walker<'_> {
    fn collecting(&self) -> bool {
        self.failures.is_some()
    }

    fn report(&mut self, failure: CheckFailure) -> Result<Decoded, DecodeError> {
        match self.failures.as_mut() {
            Some(failures) => {
                failures.push(failure);
                Ok(Decoded::Absent)
            },
            None => Err(DecodeError::Failure(failure)),
        }
    }

    fn walk(
        &mut self,
        path: &str,
        value: &PropertyValue,
        shape: &Shape,
    ) -> Result<Decoded, DecodeError> {
        if value.is_unknown() {
            if self.collecting() {
                return Ok(Decoded::Absent);
            }
            return Err(DecodeError::Unresolved {
                path: path.to_string(),
            });
        }

        match shape {
            Shape::Bool => match value {
                PropertyValue::Bool(b) => Ok(Decoded::Bool(*b)),
                other => self.report(CheckFailure::type_mismatch(path, shape.kind_name(), other)),
            },
            Shape::Number => match value {
                PropertyValue::Number(n) => Ok(Decoded::Number(*n)),
                other => self.report(CheckFailure::type_mismatch(path, shape.kind_name(), other)),
            },
            Shape::String => match value {
                PropertyValue::String(s) => Ok(Decoded::String(s.clone())),
                other => self.report(CheckFailure::type_mismatch(path, shape.kind_name(), other)),
            },
            Shape::Array(elem) => {
                let Some(items) = value.as_array() else {
                    return self.report(CheckFailure::type_mismatch(path, shape.kind_name(), value));
                };
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let item_path = format!("{}[{}]", path, i);
                    out.push(self.walk(&item_path, item, elem)?);
                }
                Ok(Decoded::Array(out))
            },
            Shape::Map { key, value: elem } => {
                key.require_string()?;
                let Some(entries) = value.as_object() else {
                    return self.report(CheckFailure::type_mismatch(path, shape.kind_name(), value));
                };
                let mut out = BTreeMap::new();
                for (k, v) in entries {
                    let entry_path = join_path(path, k);
                    out.insert(k.clone(), self.walk(&entry_path, v, elem)?);
                }
                Ok(Decoded::Map(out))
            },
            Shape::Record(schema) => {
                let Some(entries) = value.as_object() else {
                    return self.report(CheckFailure::type_mismatch(path, shape.kind_name(), value));
                };
                let mut out = BTreeMap::new();
                for field in schema.fields() {
                    let desc = field.descriptor()?;
                    let field_path = join_path(path, &desc.wire_name);
                    match entries.get(&desc.wire_name) {
                        None | Some(PropertyValue::Null) => {
                            if desc.optional {
                                out.insert(field.name.clone(), Decoded::zero(&field.shape));
                            } else {
                                self.report(CheckFailure::missing_required(
                                    &field_path,
                                    &desc.wire_name,
                                ))?;
                            }
                        },
                        Some(v) => {
                            let decoded = self.walk(&field_path, v, &field.shape)?;
                            out.insert(field.name.clone(), decoded);
                        },
                    }
                }
                Ok(Decoded::Record(out))
            },
            Shape::Optional(inner) => {
                if value.is_null() {
                    Ok(Decoded::Absent)
                } else {
                    self.walk(path, value, inner)
                }
            },
            Shape::Unsupported(name) => Err(SchemaError::UnsupportedShape(name.clone()).into()),
        }
    }
}

/// Join a property path and a key with a dot, omitting the dot at the root.
pub fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{KeyShape, RecordSchema};
    use crate::value::MarshalOptions;
    use serde_json::json;

    fn prop(value: serde_json::Value) -> PropertyValue {
        PropertyValue::from_json(&value, MarshalOptions::boundary())
    }

    fn server_shape() -> Shape {
        RecordSchema::new("Server")
            .with_field("Name", "", Shape::String)
            .with_field("Replicas", "replicas,optional", Shape::Number)
            .with_field("Enabled", "enabled,optional", Shape::Bool)
            .with_field("Ports", "ports,optional", Shape::array(Shape::Number))
            .with_field("Labels", "labels,optional", Shape::map(Shape::String))
            .with_field(
                "Endpoint",
                "endpoint,optional",
                Shape::optional(
                    RecordSchema::new("Endpoint")
                        .with_field("Host", "host", Shape::String)
                        .into(),
                ),
            )
            .into()
    }

    #[test]
    fn test_validate_valid_record() {
        let input = prop(json!({
            "name": "web",
            "replicas": 3,
            "enabled": true,
            "ports": [80, 443],
            "labels": {"env": "prod"},
            "endpoint": {"host": "localhost"}
        }));
        assert!(validate(&input, &server_shape()).unwrap().is_empty());
    }

    #[test]
    fn test_decode_valid_record_matches_source() {
        let input = prop(json!({
            "name": "web",
            "ports": [80, 443],
            "labels": {"env": "prod"},
            "endpoint": {"host": "localhost"}
        }));
        let decoded = decode(&input, &server_shape()).unwrap();
        let Decoded::Record(fields) = decoded else {
            panic!("expected a record");
        };
        assert_eq!(fields["Name"], Decoded::String("web".to_string()));
        assert_eq!(
            fields["Ports"],
            Decoded::Array(vec![Decoded::Number(80.0), Decoded::Number(443.0)])
        );
        assert_eq!(
            fields["Labels"],
            Decoded::Map(BTreeMap::from([(
                "env".to_string(),
                Decoded::String("prod".to_string())
            )]))
        );
        let Decoded::Record(endpoint) = &fields["Endpoint"] else {
            panic!("expected a nested record");
        };
        assert_eq!(endpoint["Host"], Decoded::String("localhost".to_string()));
    }

    #[test]
    fn test_decode_fills_zero_values() {
        let decoded = decode(&prop(json!({"name": "web", "replicas": null})), &server_shape())
            .unwrap();
        let Decoded::Record(fields) = decoded else {
            panic!("expected a record");
        };
        assert_eq!(fields["Replicas"], Decoded::Number(0.0));
        assert_eq!(fields["Enabled"], Decoded::Bool(false));
        assert_eq!(fields["Ports"], Decoded::Array(vec![]));
        assert_eq!(fields["Labels"], Decoded::Map(BTreeMap::new()));
        assert_eq!(fields["Endpoint"], Decoded::Absent);
    }

    #[test]
    fn test_missing_required_property() {
        let input = prop(json!({"replicas": 1}));

        let failures = validate(&input, &server_shape()).unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].property, "name");
        assert_eq!(
            failures[0].kind,
            FailureKind::MissingRequiredProperty {
                name: "name".to_string()
            }
        );

        let err = decode(&input, &server_shape()).unwrap_err();
        assert_eq!(err, DecodeError::Failure(failures[0].clone()));
        assert_eq!(err.to_string(), "name: missing required property name");
    }

    #[test]
    fn test_explicit_null_counts_as_missing() {
        let failures = validate(&prop(json!({"name": null})), &server_shape());
        // skip_nulls drops the entry, plain conversion keeps it: both are missing
        assert_eq!(failures.unwrap().len(), 1);

        let kept = PropertyValue::from_json(&json!({"name": null}), MarshalOptions::default());
        assert_eq!(validate(&kept, &server_shape()).unwrap().len(), 1);
    }

    #[test]
    fn test_type_mismatch_kinds() {
        let input = prop(json!({"name": 7, "replicas": "three", "enabled": "yes"}));

        let failures = validate(&input, &server_shape()).unwrap();
        assert_eq!(failures.len(), 3);
        assert_eq!(
            failures[1].kind,
            FailureKind::TypeMismatch {
                expected: "number".to_string(),
                actual: "string".to_string()
            }
        );

        match decode(&input, &server_shape()).unwrap_err() {
            DecodeError::Failure(failure) => {
                assert_eq!(failure.property, "name");
                assert_eq!(
                    failure.kind,
                    FailureKind::TypeMismatch {
                        expected: "string".to_string(),
                        actual: "number".to_string()
                    }
                );
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_container_mismatch_names_shape_kind() {
        let cases = [
            (Shape::array(Shape::Number), json!("80")),
            (Shape::map(Shape::String), json!([])),
            (Shape::optional(Shape::map(Shape::Bool)), json!(true)),
        ];
        for (shape, value) in cases {
            let failures = validate(&prop(value), &shape).unwrap();
            assert_eq!(failures.len(), 1);
            match &failures[0].kind {
                FailureKind::TypeMismatch { expected, .. } => {
                    assert_eq!(expected, shape.kind_name())
                },
                other => panic!("unexpected failure: {other:?}"),
            }
        }
    }

    #[test]
    fn test_nested_paths() {
        let input = prop(json!({
            "name": "web",
            "ports": [80, "http", 443, false],
            "labels": {"env": 1},
            "endpoint": {}
        }));
        let failures = validate(&input, &server_shape()).unwrap();
        let paths: Vec<_> = failures.iter().map(|f| f.property.as_str()).collect();
        assert_eq!(paths, vec!["ports[1]", "ports[3]", "labels.env", "endpoint.host"]);
    }

    #[test]
    fn test_validate_continues_past_wrong_container() {
        let input = prop(json!({"name": "web", "ports": "80", "labels": []}));
        let failures = validate(&input, &server_shape()).unwrap();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].reason(), "expected a array value, received a string value");
        assert_eq!(failures[1].property, "labels");
    }

    #[test]
    fn test_root_not_object() {
        let failures = validate(&prop(json!("web")), &server_shape()).unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].property, "");
        assert_eq!(
            failures[0].to_string(),
            "expected a object value, received a string value"
        );
    }

    #[test]
    fn test_unknown_is_valid_but_not_decodable() {
        let input = prop(json!({
            "name": crate::value::UNKNOWN_SENTINEL,
            "ports": [1, crate::value::UNKNOWN_SENTINEL]
        }));
        assert!(validate(&input, &server_shape()).unwrap().is_empty());
        assert_eq!(
            decode(&input, &server_shape()).unwrap_err(),
            DecodeError::Unresolved {
                path: "name".to_string()
            }
        );
    }

    #[test]
    fn test_schema_errors_abort() {
        let bad_key = Shape::Map {
            key: KeyShape::Number,
            value: Box::new(Shape::String),
        };
        assert_eq!(
            validate(&prop(json!({"a": "b"})), &bad_key).unwrap_err(),
            SchemaError::NonStringMapKey("number")
        );

        let bad_tag: Shape = RecordSchema::new("Bad")
            .with_field("Name", "name,sometimes", Shape::String)
            .into();
        assert!(matches!(
            decode(&prop(json!({"name": "x"})), &bad_tag),
            Err(DecodeError::Schema(SchemaError::UnknownTagOption { .. }))
        ));

        let unsupported = Shape::array(Shape::Unsupported("chan int".to_string()));
        assert_eq!(
            validate(&prop(json!([1])), &unsupported).unwrap_err(),
            SchemaError::UnsupportedShape("chan int".to_string())
        );
        // empty arrays never reach the element shape
        assert!(validate(&prop(json!([])), &unsupported).unwrap().is_empty());
    }

    #[test]
    fn test_paths_relative_to_prefix() {
        let failures = validate_at("create", &prop(json!({})), &server_shape()).unwrap();
        assert_eq!(failures[0].property, "create.name");
    }

    #[test]
    fn test_check_failure_serializes_flat() {
        let failure = CheckFailure::missing_required("create.command", "command");
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(
            json,
            json!({
                "property": "create.command",
                "kind": "missing_required_property",
                "name": "command"
            })
        );
    }
}
