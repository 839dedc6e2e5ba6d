//! Field descriptors.
//!
//! A [`Field`] describes one entry of a document class: its [`FieldKind`], whether it is
//! the primary key, an optional custom index mapping, and for references the target
//! class, [`Cardinality`] and inverse field name.
//!
//! ```
//! use helios_odm::fields::{Cardinality, Field};
//!
//! let tags = Field::reference("tags", "Tag")
//!     .multi()
//!     .back_populates("stories")
//!     .backref_multi();
//!
//! let reference = tags.as_reference().unwrap();
//! assert_eq!(reference.cardinality, Cardinality::Multi);
//! assert_eq!(reference.back_populates.as_deref(), Some("stories"));
//! ```

mod coerce;

use serde_json::{Map, Value as Json, json};

use crate::error::ValidationError;
use crate::types::Value;

/// Whether a relationship holds one or many referenced documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cardinality {
    /// At most one referenced document.
    #[default]
    Single,
    /// Any number of referenced documents.
    Multi,
}

impl Cardinality {
    /// Returns true for [`Cardinality::Multi`].
    pub fn is_multi(self) -> bool {
        matches!(self, Cardinality::Multi)
    }
}

/// Relationship metadata carried by reference fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    /// Name of the referenced document class.
    pub target: String,
    /// Cardinality of this side.
    pub cardinality: Cardinality,
    /// Name of the inverse field on the target class.
    pub back_populates: Option<String>,
    /// Cardinality used when the inverse field is synthesised.
    pub backref_cardinality: Cardinality,
}

/// The type of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Mirror of the store-assigned document identity.
    Id,
    String,
    Text,
    Unicode,
    UnicodeText,
    Integer,
    SmallInteger,
    BigInteger,
    Boolean,
    Float,
    Decimal,
    Binary,
    /// Duration stored as seconds.
    Interval,
    /// Opaque, unindexed object.
    Dict,
    DateTime,
    Date,
    Time,
    /// Reference to documents of another class.
    Reference(Reference),
}

impl FieldKind {
    /// Name of the kind, used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Id => "id",
            FieldKind::String => "string",
            FieldKind::Text => "text",
            FieldKind::Unicode => "unicode",
            FieldKind::UnicodeText => "unicode text",
            FieldKind::Integer => "integer",
            FieldKind::SmallInteger => "small integer",
            FieldKind::BigInteger => "big integer",
            FieldKind::Boolean => "boolean",
            FieldKind::Float => "float",
            FieldKind::Decimal => "decimal",
            FieldKind::Binary => "binary",
            FieldKind::Interval => "interval",
            FieldKind::Dict => "dict",
            FieldKind::DateTime => "datetime",
            FieldKind::Date => "date",
            FieldKind::Time => "time",
            FieldKind::Reference(_) => "reference",
        }
    }

    /// Default index mapping for the kind.
    pub fn default_mapping(&self) -> Map<String, Json> {
        let mapping = match self {
            FieldKind::Id | FieldKind::String | FieldKind::Unicode => json!({"type": "keyword"}),
            FieldKind::Text | FieldKind::UnicodeText => json!({"type": "text"}),
            FieldKind::Integer | FieldKind::SmallInteger | FieldKind::Interval => {
                json!({"type": "integer"})
            }
            FieldKind::BigInteger => json!({"type": "long"}),
            FieldKind::Boolean => json!({"type": "boolean"}),
            FieldKind::Float => json!({"type": "float"}),
            FieldKind::Decimal => json!({"type": "double"}),
            FieldKind::Binary => json!({"type": "binary"}),
            FieldKind::Dict => json!({"type": "object", "enabled": false}),
            FieldKind::DateTime | FieldKind::Date => {
                json!({"type": "date", "format": "date_optional_time"})
            }
            FieldKind::Time => json!({"type": "date", "format": "HH:mm:ss"}),
            FieldKind::Reference(_) => json!({"type": "keyword"}),
        };
        match mapping {
            Json::Object(map) => map,
            _ => Map::new(),
        }
    }
}

/// A field descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    kind: FieldKind,
    primary_key: bool,
    custom_mapping: Option<Map<String, Json>>,
}

impl Field {
    /// Creates a field of the given kind.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            primary_key: false,
            custom_mapping: None,
        }
    }

    pub fn id(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Id)
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub fn unicode(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Unicode)
    }

    pub fn unicode_text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::UnicodeText)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn small_integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::SmallInteger)
    }

    pub fn big_integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::BigInteger)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Float)
    }

    pub fn decimal(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Decimal)
    }

    pub fn binary(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Binary)
    }

    pub fn interval(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Interval)
    }

    pub fn dict(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Dict)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::DateTime)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Date)
    }

    pub fn time(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Time)
    }

    /// Creates a single-valued reference to `target`.
    pub fn reference(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::Reference(Reference {
                target: target.into(),
                cardinality: Cardinality::Single,
                back_populates: None,
                backref_cardinality: Cardinality::Single,
            }),
        )
    }

    /// Marks the field as the primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Sets a custom mapping merged over the default one.
    pub fn with_mapping(mut self, mapping: Map<String, Json>) -> Self {
        self.custom_mapping = Some(mapping);
        self
    }

    /// Makes a reference multi-valued. No-op on scalar fields.
    pub fn multi(mut self) -> Self {
        if let FieldKind::Reference(reference) = &mut self.kind {
            reference.cardinality = Cardinality::Multi;
        }
        self
    }

    /// Names the inverse field on the target class. No-op on scalar fields.
    pub fn back_populates(mut self, name: impl Into<String>) -> Self {
        if let FieldKind::Reference(reference) = &mut self.kind {
            reference.back_populates = Some(name.into());
        }
        self
    }

    /// Makes the synthesised inverse field multi-valued. No-op on scalar fields.
    pub fn backref_multi(mut self) -> Self {
        if let FieldKind::Reference(reference) = &mut self.kind {
            reference.backref_cardinality = Cardinality::Multi;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    /// Returns the relationship metadata for reference fields.
    pub fn as_reference(&self) -> Option<&Reference> {
        match &self.kind {
            FieldKind::Reference(reference) => Some(reference),
            _ => None,
        }
    }

    pub(crate) fn as_reference_mut(&mut self) -> Option<&mut Reference> {
        match &mut self.kind {
            FieldKind::Reference(reference) => Some(reference),
            _ => None,
        }
    }

    /// Returns true for reference fields.
    pub fn is_relationship(&self) -> bool {
        self.as_reference().is_some()
    }

    /// Returns true for multi-valued references.
    pub fn is_multi(&self) -> bool {
        self.as_reference()
            .map(|r| r.cardinality.is_multi())
            .unwrap_or(false)
    }

    /// The effective index mapping: the kind's default with the custom mapping merged over it.
    pub fn mapping(&self) -> Map<String, Json> {
        let mut mapping = self.kind.default_mapping();
        if let Some(custom) = &self.custom_mapping {
            for (key, value) in custom {
                mapping.insert(key.clone(), value.clone());
            }
        }
        mapping
    }

    /// The parameters the field was declared with.
    pub fn params(&self) -> Map<String, Json> {
        let mut params = Map::new();
        if self.primary_key {
            params.insert("primary_key".to_string(), json!(true));
        }
        if let Some(reference) = self.as_reference() {
            params.insert("document_type".to_string(), json!(reference.target));
            params.insert(
                "uselist".to_string(),
                json!(reference.cardinality.is_multi()),
            );
            if let Some(backref) = &reference.back_populates {
                params.insert("backref_name".to_string(), json!(backref));
            }
        }
        params
    }

    /// Converts a raw value into this field's application value.
    pub fn coerce(&self, raw: Value) -> Result<Value, ValidationError> {
        coerce::coerce(self, raw)
    }
}
