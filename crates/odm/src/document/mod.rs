//! Document instances.
//!
//! A [`Document`] is a shared handle to one record of a registered
//! [`DocumentClass`]. Cloning the handle does not copy the record: every clone observes
//! the same field values, which is what lets relationship hooks update the very instance
//! an application holds.
//!
//! # Identity
//!
//! Each document has a store identity (`_id`, assigned on first save) and an
//! application-visible primary key. When the primary key is an [`Id`](FieldKind::Id)
//! field it mirrors the store identity and cannot be assigned.
//!
//! # Relationships
//!
//! Relationship fields hold [`RelatedItem`]s: raw store keys until the field is resolved,
//! full documents afterwards. Assigning a relationship with an inverse field stages
//! [`BackrefHook`]s that keep the other side consistent once [`Document::save`] runs.

mod related;
mod serialize;
mod sync;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value as Json};

use crate::client::Hit;
use crate::database::Database;
use crate::error::{DocumentError, OdmResult, ValidationError};
use crate::fields::{Field, FieldKind, Reference};
use crate::query::validate_fields;
use crate::schema::DocumentClass;
use crate::types::params::as_bool;
use crate::types::{RequestContext, Value};

pub use related::RelatedItem;
pub use serialize::{PK_KEY, TYPE_KEY};
pub use sync::{BackrefHook, HookKind};

use sync::HookQueue;

/// A value assigned through the generic setter.
#[derive(Debug, Clone)]
pub enum FieldUpdate {
    /// A scalar value, or raw keys for a relationship field.
    Value(Value),
    /// Related documents or keys for a relationship field.
    Related(Vec<RelatedItem>),
}

impl FieldUpdate {
    /// Wraps a scalar value.
    pub fn value(value: impl Into<Value>) -> Self {
        FieldUpdate::Value(value.into())
    }

    /// Wraps related documents or keys.
    pub fn related<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<RelatedItem>,
    {
        FieldUpdate::Related(items.into_iter().map(Into::into).collect())
    }

    /// Converts the update into the related items it designates.
    fn into_related(self) -> Vec<RelatedItem> {
        match self {
            FieldUpdate::Related(items) => items,
            FieldUpdate::Value(Value::Null) => Vec::new(),
            FieldUpdate::Value(Value::List(keys)) => keys
                .into_iter()
                .filter(|key| !key.is_null())
                .map(RelatedItem::Key)
                .collect(),
            FieldUpdate::Value(key) => vec![RelatedItem::Key(key)],
        }
    }

    /// The wire form, with related documents reduced to their keys.
    fn to_json(&self) -> Json {
        match self {
            FieldUpdate::Value(value) => value.to_json(),
            FieldUpdate::Related(items) => {
                Json::Array(items.iter().map(|item| item.pk().to_json()).collect())
            }
        }
    }
}

impl From<Value> for FieldUpdate {
    fn from(value: Value) -> Self {
        FieldUpdate::Value(value)
    }
}

impl From<&str> for FieldUpdate {
    fn from(value: &str) -> Self {
        FieldUpdate::Value(value.into())
    }
}

impl From<String> for FieldUpdate {
    fn from(value: String) -> Self {
        FieldUpdate::Value(value.into())
    }
}

impl From<i64> for FieldUpdate {
    fn from(value: i64) -> Self {
        FieldUpdate::Value(value.into())
    }
}

impl From<bool> for FieldUpdate {
    fn from(value: bool) -> Self {
        FieldUpdate::Value(value.into())
    }
}

impl From<Document> for FieldUpdate {
    fn from(document: Document) -> Self {
        FieldUpdate::Related(vec![RelatedItem::Document(document)])
    }
}

impl From<Vec<Document>> for FieldUpdate {
    fn from(documents: Vec<Document>) -> Self {
        FieldUpdate::related(documents)
    }
}

impl From<Vec<RelatedItem>> for FieldUpdate {
    fn from(items: Vec<RelatedItem>) -> Self {
        FieldUpdate::Related(items)
    }
}

/// Hashable identity of a document: its class and primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey {
    pub class: String,
    pub pk: String,
}

#[derive(Default)]
struct DocumentState {
    id: Option<String>,
    values: HashMap<String, Value>,
    relations: HashMap<String, Vec<RelatedItem>>,
    hooks: HookQueue,
    nesting_depth: Option<u32>,
    request: Option<RequestContext>,
}

struct DocumentInner {
    db: Arc<Database>,
    class: Arc<DocumentClass>,
    state: RwLock<DocumentState>,
}

/// A shared handle to a document instance.
#[derive(Clone)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("class", &self.class_name())
            .field("id", &self.id())
            .field("pk", &self.pk())
            .finish_non_exhaustive()
    }
}

/// Documents are equal when they share a class and both carry the same, non-null
/// primary key. Documents without a primary key are never equal, not even to themselves.
impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        if self.class_name() != other.class_name() {
            return false;
        }
        match (self.pk_string(), other.pk_string()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl Document {
    pub(crate) fn new(db: Arc<Database>, class: Arc<DocumentClass>) -> Self {
        Self {
            inner: Arc::new(DocumentInner {
                db,
                class,
                state: RwLock::new(DocumentState::default()),
            }),
        }
    }

    /// Builds a document from a stored hit, coercing every field present in the source.
    pub(crate) fn from_hit(
        db: Arc<Database>,
        class: Arc<DocumentClass>,
        hit: Hit,
    ) -> OdmResult<Self> {
        let mut state = DocumentState {
            id: Some(hit.id),
            ..DocumentState::default()
        };
        for (name, raw) in hit.source {
            let Some(field) = class.field(&name) else {
                tracing::debug!("Ignoring stored key '{}' unknown to '{}'", name, class.name());
                continue;
            };
            if field.is_relationship() {
                state.relations.insert(name, RelatedItem::keys_from_json(&raw));
            } else {
                let value = field.coerce(Value::from_json(&raw))?;
                state.values.insert(name, value);
            }
        }

        let document = Self {
            inner: Arc::new(DocumentInner {
                db,
                class,
                state: RwLock::new(state),
            }),
        };
        document.sync_id_field();
        Ok(document)
    }

    /// The document's class.
    pub fn class(&self) -> &Arc<DocumentClass> {
        &self.inner.class
    }

    /// Name of the document's class.
    pub fn class_name(&self) -> &str {
        self.inner.class.name()
    }

    /// The database this document belongs to.
    pub fn database(&self) -> &Arc<Database> {
        &self.inner.db
    }

    /// Store identity, once persisted.
    pub fn id(&self) -> Option<String> {
        self.inner.state.read().id.clone()
    }

    /// Returns true once the document has a store identity.
    pub fn is_persisted(&self) -> bool {
        self.inner.state.read().id.is_some()
    }

    /// The primary key value, `Null` while unset.
    pub fn pk(&self) -> Value {
        self.inner
            .state
            .read()
            .values
            .get(self.inner.class.pk_field_name())
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// String form of the primary key, `None` while unset.
    pub fn pk_string(&self) -> Option<String> {
        let pk = self.pk();
        (!pk.is_null()).then(|| pk.to_string())
    }

    /// The hashable identity of the document.
    ///
    /// Fails with [`DocumentError::Unhashable`] until a primary key is assigned.
    pub fn key(&self) -> OdmResult<DocumentKey> {
        let pk = self.pk_string().ok_or_else(|| DocumentError::Unhashable {
            class: self.class_name().to_string(),
        })?;
        Ok(DocumentKey {
            class: self.class_name().to_string(),
            pk,
        })
    }

    /// Returns true when both handles point at the same instance.
    pub fn ptr_eq(&self, other: &Document) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn field(&self, name: &str) -> OdmResult<&Field> {
        self.inner.class.field(name).ok_or_else(|| {
            DocumentError::UnknownField {
                class: self.class_name().to_string(),
                field: name.to_string(),
            }
            .into()
        })
    }

    pub(crate) fn relationship(&self, name: &str) -> OdmResult<(&Field, &Reference)> {
        let field = self.field(name)?;
        match field.as_reference() {
            Some(reference) => Ok((field, reference)),
            None => Err(DocumentError::NotRelationship {
                class: self.class_name().to_string(),
                field: name.to_string(),
            }
            .into()),
        }
    }

    /// Reads a field without resolving relationships.
    ///
    /// Relationship fields are reported as their keys: a list for multi-valued fields, a
    /// single key or `Null` otherwise. Nothing is loaded from the store; use
    /// [`related`](Self::related) to read the referenced documents, resolving stored keys
    /// on first access.
    pub fn get(&self, name: &str) -> OdmResult<Value> {
        let field = self.field(name)?;
        if !field.is_relationship() {
            let state = self.inner.state.read();
            return Ok(state.values.get(name).cloned().unwrap_or(Value::Null));
        }
        let keys: Vec<Value> = self
            .related_items(name)?
            .iter()
            .map(RelatedItem::pk)
            .collect();
        Ok(if field.is_multi() {
            Value::List(keys)
        } else {
            keys.into_iter().next().unwrap_or(Value::Null)
        })
    }

    /// Assigns a scalar field, coercing the value to the field's kind.
    pub fn set_value(&self, name: &str, value: impl Into<Value>) -> OdmResult<()> {
        let field = self.field(name)?;
        if field.is_relationship() {
            return Err(DocumentError::RelationshipField {
                class: self.class_name().to_string(),
                field: name.to_string(),
            }
            .into());
        }
        if field.is_primary_key() && self.inner.class.pk_is_id() {
            return Err(DocumentError::ReadOnly {
                field: name.to_string(),
            }
            .into());
        }
        let value = field.coerce(value.into())?;
        self.inner
            .state
            .write()
            .values
            .insert(name.to_string(), value);
        Ok(())
    }

    /// Assigns a relationship field.
    ///
    /// The current value is resolved first so the diff against the new value sees
    /// documents rather than keys. When the field names an inverse, raw keys in the new
    /// value are resolved too, and one addition hook per newly referenced document and one
    /// deletion hook per dropped document are queued; they fire on the next
    /// [`save`](Self::save). Keys that match no stored document stage no hook.
    pub async fn set_related<I, T>(&self, name: &str, items: I) -> OdmResult<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<RelatedItem>,
    {
        let mut items: Vec<RelatedItem> = items.into_iter().map(Into::into).collect();
        let (field, reference) = self.relationship(name)?;
        if !field.is_multi() && items.len() > 1 {
            return Err(ValidationError::Cardinality {
                field: name.to_string(),
                count: items.len(),
            }
            .into());
        }
        let back_populates = reference.back_populates.clone();

        self.load_related(name).await?;
        if let Some(inverse) = back_populates {
            if let Some(resolved) = self.resolve_items(name, &items).await? {
                items = resolved;
            }
            let current = self.related_items(name)?;
            self.sync_related(&items, &current, &inverse);
        }
        self.inner
            .state
            .write()
            .relations
            .insert(name.to_string(), items);
        Ok(())
    }

    /// Generic setter dispatching on the field's kind.
    pub async fn set(&self, name: &str, update: FieldUpdate) -> OdmResult<()> {
        let field = self.field(name)?;
        match (field.is_relationship(), update) {
            (true, update) => self.set_related(name, update.into_related()).await,
            (false, FieldUpdate::Value(value)) => self.set_value(name, value),
            (false, FieldUpdate::Related(_)) => Err(DocumentError::NotRelationship {
                class: self.class_name().to_string(),
                field: name.to_string(),
            }
            .into()),
        }
    }

    /// Assigns several fields and saves.
    ///
    /// `name__bool` keys are read as boolean assignments to `name`. Unknown field names
    /// are rejected as a bad request. The primary key is never reassigned.
    pub async fn update<I, K>(&self, params: I) -> OdmResult<()>
    where
        I: IntoIterator<Item = (K, FieldUpdate)>,
        K: Into<String>,
    {
        let mut normalized = Vec::new();
        for (key, value) in params {
            let key: String = key.into();
            match key.split_once("__") {
                Some((name, "bool")) => {
                    let flag = as_bool(&key, &value.to_json())?;
                    normalized.push((name.to_string(), FieldUpdate::Value(Value::Bool(flag))));
                }
                _ => normalized.push((key, value)),
            }
        }

        validate_fields(
            &self.inner.class,
            normalized.iter().map(|(name, _)| name.as_str()),
        )?;

        let pk_field = self.inner.class.pk_field_name().to_string();
        for (name, value) in normalized {
            if name == pk_field {
                continue;
            }
            self.set(&name, value).await?;
        }
        self.save().await
    }

    /// Persists the document.
    ///
    /// Writes the document, mirrors the store identity into an `Id` primary key, then
    /// fires every queued relationship hook in the order it was queued. The queue is
    /// emptied before the first hook runs, so hooks that save other documents never see
    /// or re-fire this document's hooks.
    ///
    /// Related documents without a primary key cannot be written as keys. When firing the
    /// hooks saves such a document and gives it one, the document is written again so the
    /// stored reference is complete.
    pub async fn save(&self) -> OdmResult<()> {
        let mut unkeyed = self.write_source().await?;
        loop {
            let hooks = self.inner.state.write().hooks.drain();
            if !hooks.is_empty() {
                tracing::debug!(
                    "Firing {} relationship hooks for '{}' document {:?}",
                    hooks.len(),
                    self.class_name(),
                    self.pk_string()
                );
            }
            for hook in hooks {
                hook.fire().await?;
            }

            if self.unkeyed_members() >= unkeyed {
                return Ok(());
            }
            tracing::debug!(
                "Rewriting '{}' document {:?} with newly keyed relationships",
                self.class_name(),
                self.pk_string()
            );
            unkeyed = self.write_source().await?;
        }
    }

    /// Indexes the store-mode representation and syncs the identity. Returns how many
    /// related documents were left out for lack of a primary key.
    async fn write_source(&self) -> OdmResult<usize> {
        let source = self.to_source()?;
        let unkeyed = self.unkeyed_members();
        let db = self.database();
        let index = db.index_name(&self.inner.class);
        let current_id = self.id();

        let id = db
            .client()
            .index(
                &index,
                current_id.as_deref(),
                Json::Object(source),
                db.config().refresh_on_save,
            )
            .await?;
        tracing::debug!("Saved '{}' document {} to '{}'", self.class_name(), id, index);

        self.inner.state.write().id = Some(id);
        self.sync_id_field();
        Ok(unkeyed)
    }

    /// Removes the persisted document from the store.
    pub async fn delete(&self) -> OdmResult<()> {
        let id = self.id().ok_or_else(|| DocumentError::NotPersisted {
            class: self.class_name().to_string(),
        })?;
        let db = self.database();
        let index = db.index_name(&self.inner.class);
        db.client()
            .delete(&index, &id, db.config().refresh_on_save)
            .await?;
        tracing::debug!("Deleted '{}' document {} from '{}'", self.class_name(), id, index);
        Ok(())
    }

    /// Hooks queued since the last save, in firing order.
    pub fn pending_hooks(&self) -> Vec<BackrefHook> {
        self.inner.state.read().hooks.to_vec()
    }

    /// Effective nesting depth for client-serving serialisation.
    pub fn nesting_depth(&self) -> u32 {
        self.inner
            .state
            .read()
            .nesting_depth
            .unwrap_or_else(|| self.inner.class.nesting_depth())
    }

    /// Overrides the class nesting depth for this instance.
    pub fn set_nesting_depth(&self, depth: u32) {
        self.inner.state.write().nesting_depth = Some(depth);
    }

    /// The serving context attached to this instance, if any.
    pub fn request(&self) -> Option<RequestContext> {
        self.inner.state.read().request.clone()
    }

    /// Attaches a serving context, switching `to_dict` into client-serving mode.
    pub fn set_request(&self, request: Option<RequestContext>) {
        self.inner.state.write().request = request;
    }

    /// Copies the store identity into an unset `Id` primary key.
    fn sync_id_field(&self) {
        if !self.inner.class.pk_is_id() {
            return;
        }
        let pk_field = self.inner.class.pk_field_name();
        let mut state = self.inner.state.write();
        let unset = state.values.get(pk_field).is_none_or(Value::is_empty);
        if let (true, Some(id)) = (unset, state.id.clone()) {
            state.values.insert(pk_field.to_string(), Value::Str(id));
        }
    }
}

/// Flattens update parameters for a partial store write.
///
/// Relationship values are reduced to their keys. A relationship present in the
/// parameters is always written: `null` for an empty single-valued field, `[]` for an
/// empty multi-valued one.
pub(crate) fn flatten_params<I, K>(class: &DocumentClass, params: I) -> OdmResult<Map<String, Json>>
where
    I: IntoIterator<Item = (K, FieldUpdate)>,
    K: Into<String>,
{
    let mut flat = Map::new();
    for (name, update) in params {
        let name: String = name.into();
        let Some(field) = class.field(&name) else {
            flat.insert(name, update.to_json());
            continue;
        };
        let json = match field.kind() {
            FieldKind::Reference(reference) => {
                let keys: Vec<Json> = update
                    .into_related()
                    .iter()
                    .map(|item| item.pk().to_json())
                    .filter(|key| !key.is_null())
                    .collect();
                if reference.cardinality.is_multi() {
                    Json::Array(keys)
                } else {
                    keys.into_iter().next().unwrap_or(Json::Null)
                }
            }
            _ => match update {
                FieldUpdate::Value(value) => field.coerce(value)?.to_json(),
                FieldUpdate::Related(_) => {
                    return Err(DocumentError::NotRelationship {
                        class: class.name().to_string(),
                        field: name,
                    }
                    .into());
                }
            },
        };
        flat.insert(name, json);
    }
    Ok(flat)
}
