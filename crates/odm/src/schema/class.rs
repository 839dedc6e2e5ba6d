//! Document class definitions.

use std::collections::BTreeSet;

use serde_json::{Map, Value as Json, json};

use crate::fields::{Field, FieldKind, Reference};

/// The store identity field, always queryable.
pub const ID_FIELD: &str = "_id";

/// Default nesting depth for client-serving serialisation.
pub const DEFAULT_NESTING_DEPTH: u32 = 1;

/// A registered document schema.
///
/// Built through [`DocumentClass::builder`] and finalised by
/// [`SchemaRegistry::finalize`](super::SchemaRegistry::finalize), which guarantees exactly
/// one primary key and resolvable relationship targets.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentClass {
    pub(crate) name: String,
    pub(crate) index: Option<String>,
    pub(crate) fields: Vec<Field>,
    pub(crate) nested_relationships: Vec<String>,
    pub(crate) nesting_depth: u32,
    pub(crate) pk_index: usize,
}

impl DocumentClass {
    /// Starts declaring a document class.
    pub fn builder(name: impl Into<String>) -> DocumentClassBuilder {
        DocumentClassBuilder {
            name: name.into(),
            index: None,
            fields: Vec::new(),
            nested_relationships: Vec::new(),
            nesting_depth: DEFAULT_NESTING_DEPTH,
        }
    }

    /// The class name, also used as the type discriminator.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Explicit index name, if one was declared.
    pub fn index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    /// All fields in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// The primary key field.
    pub fn pk_field(&self) -> &Field {
        &self.fields[self.pk_index]
    }

    /// Name of the primary key field.
    pub fn pk_field_name(&self) -> &str {
        self.pk_field().name()
    }

    /// Kind of the primary key field.
    pub fn pk_field_type(&self) -> &FieldKind {
        self.pk_field().kind()
    }

    /// Returns true when the primary key mirrors the store identity.
    pub fn pk_is_id(&self) -> bool {
        matches!(self.pk_field_type(), FieldKind::Id)
    }

    /// The relationship fields.
    pub fn relationships(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_relationship())
    }

    /// Relationship metadata for `name`, if it is a reference field.
    pub fn relationship(&self, name: &str) -> Option<&Reference> {
        self.field(name).and_then(Field::as_reference)
    }

    /// Relationship names that may be expanded when serving clients.
    pub fn nested_relationships(&self) -> &[String] {
        &self.nested_relationships
    }

    /// Default nesting depth when serving clients.
    pub fn nesting_depth(&self) -> u32 {
        self.nesting_depth
    }

    /// Names accepted in filters, sort and projection: every field plus `_id`.
    pub fn fields_to_query(&self) -> BTreeSet<String> {
        self.fields
            .iter()
            .map(|f| f.name().to_string())
            .chain(std::iter::once(ID_FIELD.to_string()))
            .collect()
    }

    /// Declared parameters of a field.
    pub fn get_field_params(&self, name: &str) -> Option<Map<String, Json>> {
        self.field(name).map(Field::params)
    }

    /// The index mapping for this class.
    pub fn mapping(&self) -> Json {
        let properties: Map<String, Json> = self
            .fields
            .iter()
            .map(|f| (f.name().to_string(), Json::Object(f.mapping())))
            .collect();
        json!({ "properties": properties })
    }
}

/// Declaration of a document class, registered with a
/// [`SchemaRegistry`](super::SchemaRegistry).
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentClassBuilder {
    pub(crate) name: String,
    pub(crate) index: Option<String>,
    pub(crate) fields: Vec<Field>,
    pub(crate) nested_relationships: Vec<String>,
    pub(crate) nesting_depth: u32,
}

impl DocumentClassBuilder {
    /// Adds a field.
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Stores documents of this class in a specific index.
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// Allows these relationships to be expanded when serving clients.
    pub fn nested_relationships<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nested_relationships = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the default nesting depth.
    pub fn nesting_depth(mut self, depth: u32) -> Self {
        self.nesting_depth = depth;
        self
    }

    /// The declared class name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| f.name() == name)
    }
}
