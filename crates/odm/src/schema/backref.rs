//! Inverse ("back-populated") field synthesis.

use crate::error::SchemaError;
use crate::fields::{Field, Reference};

use super::class::DocumentClassBuilder;

/// Resolves every reference target and injects the inverse fields named by
/// `back_populates`.
///
/// Running this again over already wired classes changes nothing.
pub(super) fn wire_backrefs(classes: &mut [DocumentClassBuilder]) -> Result<(), SchemaError> {
    let forward: Vec<(String, String, Reference)> = classes
        .iter()
        .flat_map(|class| {
            class.fields.iter().filter_map(|field| {
                field
                    .as_reference()
                    .map(|r| (class.name.clone(), field.name().to_string(), r.clone()))
            })
        })
        .collect();

    for (class_name, field_name, reference) in forward {
        let Some(target) = classes.iter_mut().find(|c| c.name == reference.target) else {
            return Err(SchemaError::UnknownTarget {
                class: class_name,
                field: field_name,
                target: reference.target,
            });
        };

        let Some(backref) = reference.back_populates else {
            continue;
        };

        match target.field_mut(&backref) {
            Some(existing) => {
                let conflict = || SchemaError::ConflictingInverse {
                    class: reference.target.clone(),
                    field: backref.clone(),
                    expected: class_name.clone(),
                };
                let inverse = existing.as_reference_mut().ok_or_else(conflict)?;
                if inverse.target != class_name {
                    return Err(conflict());
                }
                if inverse.back_populates.is_none() {
                    inverse.back_populates = Some(field_name.clone());
                } else if inverse.back_populates.as_deref() != Some(field_name.as_str()) {
                    return Err(conflict());
                }
            }
            None => {
                let mut inverse = Field::reference(backref.clone(), class_name.clone())
                    .back_populates(field_name.clone());
                if reference.backref_cardinality.is_multi() {
                    inverse = inverse.multi();
                }
                tracing::debug!(
                    "Synthesised inverse field '{}.{}' for '{}.{}'",
                    reference.target,
                    backref,
                    class_name,
                    field_name
                );
                target.fields.push(inverse);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DocumentClass;

    #[test]
    fn test_wiring_twice_is_idempotent() {
        let mut classes = vec![
            DocumentClass::builder("Story")
                .field(Field::string("name").primary_key())
                .field(
                    Field::reference("tags", "Tag")
                        .multi()
                        .back_populates("stories")
                        .backref_multi(),
                ),
            DocumentClass::builder("Tag").field(Field::string("name").primary_key()),
        ];
        wire_backrefs(&mut classes).unwrap();
        let once = classes.clone();
        wire_backrefs(&mut classes).unwrap();
        assert_eq!(once, classes);
        assert_eq!(classes[1].fields.len(), 2);
    }

    #[test]
    fn test_references_without_inverse_still_resolved() {
        let mut classes = vec![
            DocumentClass::builder("Story")
                .field(Field::string("name").primary_key())
                .field(Field::reference("editor", "Missing")),
        ];
        assert!(wire_backrefs(&mut classes).is_err());
    }
}
