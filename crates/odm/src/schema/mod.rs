//! Document class registration.
//!
//! Registration is an explicit two-pass step. Pass one ([`SchemaRegistry::register`])
//! records every class with its declared fields. Pass two ([`SchemaRegistry::finalize`])
//! runs once all classes are known: it resolves relationship targets, synthesises the
//! inverse fields named by `back_populates`, checks primary keys and freezes the result
//! into an immutable [`Schema`].
//!
//! ```
//! use helios_odm::fields::Field;
//! use helios_odm::schema::{DocumentClass, SchemaRegistry};
//!
//! let mut registry = SchemaRegistry::new();
//! registry
//!     .register(
//!         DocumentClass::builder("Story")
//!             .field(Field::string("name").primary_key())
//!             .field(Field::reference("author", "Person").back_populates("story")),
//!     )
//!     .register(DocumentClass::builder("Person").field(Field::string("name").primary_key()));
//!
//! let schema = registry.finalize().unwrap();
//! let person = schema.class("Person").unwrap();
//! assert!(person.relationship("story").is_some());
//! ```

mod backref;
mod class;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::SchemaError;

pub use class::{DEFAULT_NESTING_DEPTH, DocumentClass, DocumentClassBuilder, ID_FIELD};

/// Collects class declarations before relationships are wired.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    classes: Vec<DocumentClassBuilder>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a class. Registering a name again replaces the earlier declaration.
    pub fn register(&mut self, class: DocumentClassBuilder) -> &mut Self {
        match self.classes.iter_mut().find(|c| c.name == class.name) {
            Some(existing) => *existing = class,
            None => self.classes.push(class),
        }
        self
    }

    /// Number of registered classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns true if no class is registered.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Wires relationships and freezes the registered classes.
    ///
    /// Fails fast on unresolvable targets, conflicting inverse fields and classes without
    /// exactly one primary key.
    pub fn finalize(&self) -> Result<Schema, SchemaError> {
        let mut classes = self.classes.clone();
        backref::wire_backrefs(&mut classes)?;

        let mut frozen = BTreeMap::new();
        for builder in classes {
            let class = freeze(builder)?;
            tracing::debug!(
                "Registered document class '{}' with {} fields",
                class.name(),
                class.fields().len()
            );
            frozen.insert(class.name().to_string(), Arc::new(class));
        }
        Ok(Schema { classes: frozen })
    }
}

fn freeze(builder: DocumentClassBuilder) -> Result<DocumentClass, SchemaError> {
    for (i, field) in builder.fields.iter().enumerate() {
        if builder.fields[..i].iter().any(|f| f.name() == field.name()) {
            return Err(SchemaError::DuplicateField {
                class: builder.name.clone(),
                field: field.name().to_string(),
            });
        }
    }

    let pk_indices: Vec<usize> = builder
        .fields
        .iter()
        .enumerate()
        .filter(|(_, f)| f.is_primary_key())
        .map(|(i, _)| i)
        .collect();
    let pk_index = match pk_indices.as_slice() {
        [index] => *index,
        other => {
            return Err(SchemaError::PrimaryKey {
                class: builder.name.clone(),
                count: other.len(),
            });
        }
    };
    if builder.fields[pk_index].is_relationship() {
        return Err(SchemaError::ReferencePrimaryKey {
            class: builder.name.clone(),
            field: builder.fields[pk_index].name().to_string(),
        });
    }

    Ok(DocumentClass {
        name: builder.name,
        index: builder.index,
        fields: builder.fields,
        nested_relationships: builder.nested_relationships,
        nesting_depth: builder.nesting_depth,
        pk_index,
    })
}

/// The immutable set of registered document classes.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    classes: BTreeMap<String, Arc<DocumentClass>>,
}

impl Schema {
    /// Looks up a class by name.
    pub fn class(&self, name: &str) -> Result<&Arc<DocumentClass>, SchemaError> {
        self.classes.get(name).ok_or_else(|| SchemaError::UnknownClass {
            class: name.to_string(),
        })
    }

    /// All registered classes, ordered by name.
    pub fn classes(&self) -> impl Iterator<Item = &Arc<DocumentClass>> {
        self.classes.values()
    }

    /// Number of registered classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns true if the schema has no classes.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{Cardinality, Field};

    fn story_registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                DocumentClass::builder("Story")
                    .field(Field::string("name").primary_key())
                    .field(Field::reference("author", "Person").back_populates("story"))
                    .field(
                        Field::reference("tags", "Tag")
                            .multi()
                            .back_populates("stories")
                            .backref_multi(),
                    ),
            )
            .register(DocumentClass::builder("Person").field(Field::string("name").primary_key()))
            .register(DocumentClass::builder("Tag").field(Field::string("name").primary_key()));
        registry
    }

    #[test]
    fn test_inverse_fields_are_synthesised() {
        let schema = story_registry().finalize().unwrap();

        let person = schema.class("Person").unwrap();
        let story = person.relationship("story").unwrap();
        assert_eq!(story.target, "Story");
        assert_eq!(story.cardinality, Cardinality::Single);
        assert_eq!(story.back_populates.as_deref(), Some("author"));

        let tag = schema.class("Tag").unwrap();
        let stories = tag.relationship("stories").unwrap();
        assert_eq!(stories.cardinality, Cardinality::Multi);
        assert_eq!(stories.back_populates.as_deref(), Some("tags"));
    }

    #[test]
    fn test_reregistration_does_not_duplicate_inverse() {
        let mut registry = story_registry();
        registry.register(DocumentClass::builder("Tag").field(Field::string("name").primary_key()));
        let schema = registry.finalize().unwrap();
        let tag = schema.class("Tag").unwrap();
        assert_eq!(tag.fields().iter().filter(|f| f.name() == "stories").count(), 1);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_declared_inverse_is_reused() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                DocumentClass::builder("Person")
                    .field(Field::string("name").primary_key())
                    .field(Field::reference("parent", "Parent").back_populates("children")),
            )
            .register(
                DocumentClass::builder("Parent")
                    .field(Field::string("name").primary_key())
                    .field(Field::reference("children", "Person").multi()),
            );
        let schema = registry.finalize().unwrap();
        let parent = schema.class("Parent").unwrap();
        assert_eq!(parent.fields().len(), 2);
        assert_eq!(
            parent.relationship("children").unwrap().back_populates.as_deref(),
            Some("parent")
        );
        assert!(parent.field("children").unwrap().is_multi());
    }

    #[test]
    fn test_unknown_target_fails_fast() {
        let mut registry = SchemaRegistry::new();
        registry.register(
            DocumentClass::builder("Story")
                .field(Field::string("name").primary_key())
                .field(Field::reference("author", "Ghost").back_populates("story")),
        );
        let err = registry.finalize().unwrap_err();
        assert!(matches!(err, SchemaError::UnknownTarget { ref target, .. } if target == "Ghost"));
    }

    #[test]
    fn test_exactly_one_primary_key() {
        let mut registry = SchemaRegistry::new();
        registry.register(DocumentClass::builder("Item").field(Field::string("name")));
        assert!(matches!(
            registry.finalize().unwrap_err(),
            SchemaError::PrimaryKey { count: 0, .. }
        ));

        let mut registry = SchemaRegistry::new();
        registry.register(
            DocumentClass::builder("Item")
                .field(Field::string("a").primary_key())
                .field(Field::string("b").primary_key()),
        );
        assert!(matches!(
            registry.finalize().unwrap_err(),
            SchemaError::PrimaryKey { count: 2, .. }
        ));
    }

    #[test]
    fn test_conflicting_inverse_field() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                DocumentClass::builder("Story")
                    .field(Field::string("name").primary_key())
                    .field(Field::reference("author", "Person").back_populates("story")),
            )
            .register(
                DocumentClass::builder("Person")
                    .field(Field::string("name").primary_key())
                    .field(Field::string("story")),
            );
        assert!(matches!(
            registry.finalize().unwrap_err(),
            SchemaError::ConflictingInverse { .. }
        ));
    }

    #[test]
    fn test_fields_to_query_includes_identity() {
        let schema = story_registry().finalize().unwrap();
        let fields = schema.class("Story").unwrap().fields_to_query();
        assert!(fields.contains("_id"));
        assert!(fields.contains("name"));
        assert!(fields.contains("tags"));
    }

    #[test]
    fn test_unknown_class_lookup() {
        let schema = story_registry().finalize().unwrap();
        assert!(matches!(
            schema.class("Nope").unwrap_err(),
            SchemaError::UnknownClass { .. }
        ));
    }
}
