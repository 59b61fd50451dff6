//! Static shape descriptions for decoding property trees.
//!
//! A [`Shape`] describes the static type a property tree is decoded into. Records are
//! described by a [`RecordSchema`]: an ordered list of fields, each declared with its
//! static name, a tag and the shape of its value. The tag follows the
//! `"<wire name>,<option>,..."` convention and is resolved into a [`FieldDescriptor`]
//! when the record is traversed.
//!
//! ```
//! use command_provider::schema::{RecordSchema, Shape};
//!
//! let schema = RecordSchema::new("Endpoint")
//!     .with_field("Host", "host", Shape::String)
//!     .with_field("Port", ",optional", Shape::Number);
//!
//! let port = schema.fields()[1].descriptor().unwrap();
//! assert_eq!(port.wire_name, "port");
//! assert!(port.optional);
//! ```

use thiserror::Error;

/// Errors in a static shape description.
///
/// These indicate a programming error in the record declarations, never bad input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A field tag carries an option that is not recognized.
    #[error("unknown option '{option}' in tag for struct field {field}")]
    UnknownTagOption {
        /// The offending option.
        option: String,
        /// The static field name.
        field: String,
    },

    /// A map shape was declared with a key type other than string.
    #[error("map schema must have string keys, found {0} keys")]
    NonStringMapKey(&'static str),

    /// The shape cannot be decoded at all.
    #[error("unsupported type {0}")]
    UnsupportedShape(String),

    /// A decoded value did not have the shape the target type declared.
    #[error("decoded value for {target} does not match its declared shape")]
    ShapeMismatch {
        /// The target type being built.
        target: &'static str,
    },

    /// A record field was read that the record schema does not declare.
    #[error("record {record} has no field {field}")]
    UndeclaredField {
        /// The record name.
        record: String,
        /// The field name.
        field: String,
    },
}

/// The key type of a map shape. Only [`KeyShape::String`] can be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyShape {
    /// String keys.
    String,
    /// Boolean keys.
    Bool,
    /// Numeric keys.
    Number,
}

impl KeyShape {
    fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Bool => "bool",
            Self::Number => "number",
        }
    }

    /// Fail unless this is a string key.
    pub fn require_string(self) -> Result<(), SchemaError> {
        match self {
            Self::String => Ok(()),
            other => Err(SchemaError::NonStringMapKey(other.name())),
        }
    }
}

/// The static shape a property value is decoded into.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// A boolean.
    Bool,
    /// Any numeric type.
    Number,
    /// A string.
    String,
    /// An ordered sequence of a single element shape.
    Array(Box<Shape>),
    /// An associative map.
    Map {
        /// The key type.
        key: KeyShape,
        /// The value shape.
        value: Box<Shape>,
    },
    /// A record with named fields.
    Record(RecordSchema),
    /// A nilable wrapper: null decodes to absent.
    Optional(Box<Shape>),
    /// A static type the decoder cannot handle, named for diagnostics.
    Unsupported(String),
}

impl Shape {
    /// An array of `elem`.
    pub fn array(elem: Shape) -> Self {
        Self::Array(Box::new(elem))
    }

    /// A string-keyed map of `value`.
    pub fn map(value: Shape) -> Self {
        Self::Map {
            key: KeyShape::String,
            value: Box::new(value),
        }
    }

    /// A nilable `inner`.
    pub fn optional(inner: Shape) -> Self {
        Self::Optional(Box::new(inner))
    }

    /// The kind name used in type mismatch diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Number => "number",
            Self::String => "string",
            Self::Array(_) => "array",
            Self::Map { .. } | Self::Record(_) => "object",
            Self::Optional(inner) => inner.kind_name(),
            Self::Unsupported(_) => "unsupported",
        }
    }
}

/// How a static field maps onto the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// The property key the field is read from.
    pub wire_name: String,
    /// Whether the property may be absent or null.
    pub optional: bool,
    /// Whether changing the property implies replacing the resource.
    pub force_new: bool,
}

impl FieldDescriptor {
    /// Resolve a descriptor from a static field name and its tag.
    ///
    /// An empty wire name in the tag falls back to the field name with its first
    /// character lower-cased.
    pub fn from_tag(field: &str, tag: &str) -> Result<Self, SchemaError> {
        let mut parts = tag.split(',');
        let wire_name = match parts.next() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => default_wire_name(field),
        };

        let mut desc = Self {
            wire_name,
            optional: false,
            force_new: false,
        };
        for option in parts {
            match option {
                "optional" => desc.optional = true,
                "forceNew" => desc.force_new = true,
                other => {
                    return Err(SchemaError::UnknownTagOption {
                        option: other.to_string(),
                        field: field.to_string(),
                    })
                },
            }
        }
        Ok(desc)
    }
}

fn default_wire_name(field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A single declared record field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    /// The static field name.
    pub name: String,
    /// The declaration tag.
    pub tag: String,
    /// The shape of the field's value.
    pub shape: Shape,
}

impl FieldSchema {
    /// Resolve this field's descriptor from its tag.
    pub fn descriptor(&self) -> Result<FieldDescriptor, SchemaError> {
        FieldDescriptor::from_tag(&self.name, &self.tag)
    }
}

/// The fields of a record, in declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordSchema {
    name: String,
    fields: Vec<FieldSchema>,
}

impl RecordSchema {
    /// Create an empty record schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Declare a field.
    pub fn with_field(
        mut self,
        name: impl Into<String>,
        tag: impl Into<String>,
        shape: Shape,
    ) -> Self {
        self.fields.push(FieldSchema {
            name: name.into(),
            tag: tag.into(),
            shape,
        });
        self
    }

    /// The record's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared fields.
    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    /// Wire names of the fields tagged `forceNew`.
    pub fn force_new_properties(&self) -> Result<Vec<String>, SchemaError> {
        let mut names = Vec::new();
        for field in &self.fields {
            let desc = field.descriptor()?;
            if desc.force_new {
                names.push(desc.wire_name);
            }
        }
        Ok(names)
    }
}

impl From<RecordSchema> for Shape {
    fn from(schema: RecordSchema) -> Self {
        Shape::Record(schema)
    }
}
