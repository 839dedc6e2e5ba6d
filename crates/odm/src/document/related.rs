//! Relationship values and lazy resolution.

use std::fmt;

use serde_json::Value as Json;

use crate::error::OdmResult;
use crate::query::CollectionQuery;
use crate::types::Value;

use super::Document;

/// One member of a relationship field: a raw key or a resolved document.
#[derive(Clone)]
pub enum RelatedItem {
    /// Primary key of a document that has not been resolved.
    Key(Value),
    /// A resolved document.
    Document(Document),
}

impl fmt::Debug for RelatedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelatedItem::Key(key) => write!(f, "Key({})", key),
            RelatedItem::Document(document) => document.fmt(f),
        }
    }
}

impl RelatedItem {
    /// Creates a raw key.
    pub fn key(value: impl Into<Value>) -> Self {
        RelatedItem::Key(value.into())
    }

    /// Returns the document if this member is resolved.
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            RelatedItem::Document(document) => Some(document),
            RelatedItem::Key(_) => None,
        }
    }

    /// The referenced primary key, `Null` for a document without one.
    pub fn pk(&self) -> Value {
        match self {
            RelatedItem::Key(key) => key.clone(),
            RelatedItem::Document(document) => document.pk(),
        }
    }

    fn pk_text(&self) -> Option<String> {
        match self {
            RelatedItem::Key(key) if key.is_null() => None,
            RelatedItem::Key(key) => Some(key.to_string()),
            RelatedItem::Document(document) => document.pk_string(),
        }
    }

    /// Returns true when both members designate the same document: the same instance, or
    /// equal non-null primary keys.
    pub fn is_same(&self, other: &RelatedItem) -> bool {
        if let (RelatedItem::Document(a), RelatedItem::Document(b)) = (self, other)
            && a.ptr_eq(b)
        {
            return true;
        }
        match (self.pk_text(), other.pk_text()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Reads stored relationship keys.
    pub(crate) fn keys_from_json(raw: &Json) -> Vec<RelatedItem> {
        match raw {
            Json::Null => Vec::new(),
            Json::Array(items) => items
                .iter()
                .filter(|item| !item.is_null())
                .map(|item| RelatedItem::Key(Value::from_json(item)))
                .collect(),
            other => vec![RelatedItem::Key(Value::from_json(other))],
        }
    }
}

impl From<Document> for RelatedItem {
    fn from(document: Document) -> Self {
        RelatedItem::Document(document)
    }
}

impl From<&Document> for RelatedItem {
    fn from(document: &Document) -> Self {
        RelatedItem::Document(document.clone())
    }
}

impl From<Value> for RelatedItem {
    fn from(key: Value) -> Self {
        RelatedItem::Key(key)
    }
}

impl From<&str> for RelatedItem {
    fn from(key: &str) -> Self {
        RelatedItem::Key(key.into())
    }
}

impl From<String> for RelatedItem {
    fn from(key: String) -> Self {
        RelatedItem::Key(key.into())
    }
}

impl Document {
    /// Members of a relationship field as currently held, without resolving keys.
    pub fn related_items(&self, name: &str) -> OdmResult<Vec<RelatedItem>> {
        self.relationship(name)?;
        Ok(self
            .inner
            .state
            .read()
            .relations
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    /// Resolves a relationship field and returns its documents.
    ///
    /// Keys that match no stored document are left out.
    pub async fn related(&self, name: &str) -> OdmResult<Vec<Document>> {
        self.load_related(name).await?;
        Ok(self
            .related_items(name)?
            .into_iter()
            .filter_map(|item| match item {
                RelatedItem::Document(document) => Some(document),
                RelatedItem::Key(_) => None,
            })
            .collect())
    }

    /// Replaces the raw keys of a relationship field with the documents they designate.
    ///
    /// The target collection is queried for exactly the held keys. When nothing is found
    /// the field keeps its keys; otherwise each key is replaced by its document, and keys
    /// without a match stay as they are.
    pub async fn load_related(&self, name: &str) -> OdmResult<()> {
        let items = self.related_items(name)?;
        let Some(resolved) = self.resolve_items(name, &items).await? else {
            return Ok(());
        };
        self.inner
            .state
            .write()
            .relations
            .insert(name.to_string(), resolved);
        Ok(())
    }

    /// Looks up the raw keys among `items` in the target collection of `name`.
    ///
    /// Returns `None` when there are no keys or none of them matched. Otherwise matched
    /// keys are replaced by their documents in place.
    pub(super) async fn resolve_items(
        &self,
        name: &str,
        items: &[RelatedItem],
    ) -> OdmResult<Option<Vec<RelatedItem>>> {
        let (_, reference) = self.relationship(name)?;
        let keys: Vec<Json> = items
            .iter()
            .filter_map(|item| match item {
                RelatedItem::Key(key) if !key.is_null() => Some(key.to_json()),
                _ => None,
            })
            .collect();
        if keys.is_empty() {
            return Ok(None);
        }

        let collection = self.database().collection(&reference.target)?;
        let pk_field = collection.class().pk_field_name().to_string();
        let query = CollectionQuery::new()
            .limit(keys.len() as u64)
            .param(pk_field, Json::Array(keys.clone()));
        let found = collection
            .get_collection(query)
            .await?
            .into_hits()
            .map(|hits| hits.into_documents())
            .unwrap_or_default();

        if found.is_empty() {
            tracing::debug!(
                "No '{}' documents found for '{}.{}' keys {:?}",
                reference.target,
                self.class_name(),
                name,
                keys
            );
            return Ok(None);
        }

        let resolved = items
            .iter()
            .cloned()
            .map(|item| match item {
                RelatedItem::Key(key) => {
                    let text = key.to_string();
                    found
                        .iter()
                        .find(|document| document.pk_string().as_deref() == Some(text.as_str()))
                        .map(|document| RelatedItem::Document(document.clone()))
                        .unwrap_or(RelatedItem::Key(key))
                }
                resolved => resolved,
            })
            .collect();
        Ok(Some(resolved))
    }

    /// Number of members, over all relationship fields, that are documents without a
    /// primary key and so cannot be written as keys yet.
    pub(super) fn unkeyed_members(&self) -> usize {
        let relations = self.inner.state.read().relations.clone();
        relations
            .values()
            .flatten()
            .filter(|item| matches!(item, RelatedItem::Document(document) if document.pk().is_null()))
            .count()
    }

    /// Collapses resolved documents of a relationship field back to their keys.
    ///
    /// Raw keys and documents without a primary key are left untouched.
    pub fn unload_related(&self, name: &str) -> OdmResult<()> {
        let items = self.related_items(name)?;
        if items.is_empty() {
            return Ok(());
        }
        let unloaded: Vec<RelatedItem> = items
            .into_iter()
            .map(|item| match item {
                RelatedItem::Document(document) => {
                    let key = document.pk();
                    if key.is_null() {
                        RelatedItem::Document(document)
                    } else {
                        RelatedItem::Key(key)
                    }
                }
                key => key,
            })
            .collect();
        self.inner
            .state
            .write()
            .relations
            .insert(name.to_string(), unloaded);
        Ok(())
    }
}
