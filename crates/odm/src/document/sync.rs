//! Relationship synchronisation hooks.
//!
//! Assigning a relationship field that names an inverse stages one hook per referenced
//! document that was added or dropped. Hooks are inert until the owning document is
//! saved; they then bring the inverse field of each affected document in line with the
//! assignment, writing only when its value actually changes.

use std::fmt;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::OdmResult;

use super::{Document, FieldUpdate, RelatedItem};

/// Whether a hook adds to or removes from an inverse field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Addition,
    Deletion,
}

/// A staged update of an inverse relationship field.
///
/// Fired on save, the hook adds `item` to (or removes it from) the `field` of `target`.
#[derive(Clone)]
pub struct BackrefHook {
    kind: HookKind,
    target: Document,
    item: Document,
    field: String,
}

impl fmt::Debug for BackrefHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackrefHook")
            .field("kind", &self.kind)
            .field("target", &self.target)
            .field("item", &self.item)
            .field("field", &self.field)
            .finish()
    }
}

impl BackrefHook {
    pub fn kind(&self) -> HookKind {
        self.kind
    }

    /// The document whose inverse field is updated.
    pub fn target(&self) -> &Document {
        &self.target
    }

    /// The document added to or removed from the inverse field.
    pub fn item(&self) -> &Document {
        &self.item
    }

    /// Name of the inverse field on the target.
    pub fn field(&self) -> &str {
        &self.field
    }

    pub(crate) fn fire(self) -> BoxFuture<'static, OdmResult<()>> {
        async move {
            tracing::debug!(
                "Firing {:?} hook on '{}.{}' for {:?}",
                self.kind,
                self.target.class_name(),
                self.field,
                self.item.pk_string()
            );
            match self.kind {
                HookKind::Addition => apply_addition(&self.target, &self.item, &self.field).await,
                HookKind::Deletion => apply_deletion(&self.target, &self.item, &self.field).await,
            }
        }
        .boxed()
    }
}

/// Per-document ordered queue of staged hooks.
#[derive(Default)]
pub(crate) struct HookQueue {
    hooks: Vec<BackrefHook>,
}

impl HookQueue {
    pub(crate) fn enqueue(&mut self, hook: BackrefHook) {
        self.hooks.push(hook);
    }

    /// Empties the queue, returning the hooks in enqueue order.
    pub(crate) fn drain(&mut self) -> Vec<BackrefHook> {
        std::mem::take(&mut self.hooks)
    }

    pub(crate) fn to_vec(&self) -> Vec<BackrefHook> {
        self.hooks.clone()
    }
}

async fn apply_addition(target: &Document, item: &Document, field: &str) -> OdmResult<()> {
    let multi = target.relationship(field)?.0.is_multi();
    target.load_related(field).await?;
    let current = target.related_items(field)?;
    let added = RelatedItem::Document(item.clone());

    let changed = if multi {
        !current.iter().any(|member| member.is_same(&added))
    } else {
        !(current.len() == 1 && current[0].is_same(&added))
    };
    if !changed {
        return Ok(());
    }

    let new_value = if multi {
        let mut members = current;
        members.push(added);
        members
    } else {
        vec![added]
    };
    target
        .update([(field.to_string(), FieldUpdate::Related(new_value))])
        .await
}

async fn apply_deletion(target: &Document, item: &Document, field: &str) -> OdmResult<()> {
    let multi = target.relationship(field)?.0.is_multi();
    target.load_related(field).await?;
    let current = target.related_items(field)?;
    if current.is_empty() {
        return Ok(());
    }
    let removed = RelatedItem::Document(item.clone());

    let new_value = if multi {
        let Some(position) = current.iter().position(|member| member.is_same(&removed)) else {
            return Ok(());
        };
        let mut members = current;
        members.remove(position);
        members
    } else if current.len() == 1 && current[0].is_same(&removed) {
        Vec::new()
    } else {
        return Ok(());
    };
    target
        .update([(field.to_string(), FieldUpdate::Related(new_value))])
        .await
}

impl Document {
    /// Stages hooks for the difference between the current and the new members of a
    /// relationship whose inverse field is `inverse`.
    pub(super) fn sync_related(&self, new: &[RelatedItem], old: &[RelatedItem], inverse: &str) {
        let mut hooks = Vec::new();
        let mut stage = |members: &[RelatedItem], others: &[RelatedItem], kind: HookKind| {
            let mut seen: Vec<&RelatedItem> = Vec::new();
            for member in members {
                if others.iter().any(|other| other.is_same(member))
                    || seen.iter().any(|prior| prior.is_same(member))
                {
                    continue;
                }
                seen.push(member);
                match member {
                    RelatedItem::Document(document) => hooks.push(BackrefHook {
                        kind,
                        target: document.clone(),
                        item: self.clone(),
                        field: inverse.to_string(),
                    }),
                    RelatedItem::Key(key) => tracing::debug!(
                        "Unresolved key {} in '{}' cannot be synchronised",
                        key,
                        self.class_name()
                    ),
                }
            }
        };
        stage(new, old, HookKind::Addition);
        stage(old, new, HookKind::Deletion);

        if hooks.is_empty() {
            return;
        }
        let mut state = self.inner.state.write();
        for hook in hooks {
            state.hooks.enqueue(hook);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::client::InMemoryClient;
    use crate::config::ElasticsearchConfig;
    use crate::database::Database;
    use crate::fields::Field;
    use crate::query::CollectionQuery;
    use crate::schema::{DocumentClass, SchemaRegistry};
    use crate::types::Value;

    fn database(client: Arc<InMemoryClient>) -> Arc<Database> {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                DocumentClass::builder("Story")
                    .field(Field::string("name").primary_key())
                    .field(Field::reference("author", "Person").back_populates("story")),
            )
            .register(DocumentClass::builder("Person").field(Field::string("name").primary_key()));
        Database::new(
            registry.finalize().unwrap(),
            client,
            ElasticsearchConfig::default(),
        )
    }

    async fn named(db: &Arc<Database>, class: &str, name: &str) -> Document {
        let document = db.create(class).unwrap();
        document.set_value("name", name).unwrap();
        document.save().await.unwrap();
        document
    }

    async fn fetch(db: &Arc<Database>, class: &str, name: &str) -> Document {
        db.collection(class)
            .unwrap()
            .get_item(CollectionQuery::new().param("name", name), true)
            .await
            .unwrap()
            .unwrap()
    }

    fn hook(kind: HookKind, target: &Document, item: &Document, field: &str) -> BackrefHook {
        BackrefHook {
            kind,
            target: target.clone(),
            item: item.clone(),
            field: field.to_string(),
        }
    }

    #[tokio::test]
    async fn test_addition_already_applied_writes_nothing() {
        let client = Arc::new(InMemoryClient::new());
        let db = database(client.clone());
        let ann = named(&db, "Person", "ann").await;
        let moby = named(&db, "Story", "moby").await;

        hook(HookKind::Addition, &ann, &moby, "story").fire().await.unwrap();
        assert_eq!(
            fetch(&db, "Person", "ann").await.get("story").unwrap(),
            Value::Str("moby".to_string())
        );
        assert_eq!(
            fetch(&db, "Story", "moby").await.get("author").unwrap(),
            Value::Str("ann".to_string())
        );

        let stored = fetch(&db, "Person", "ann").await;
        let before = client.request_count();
        hook(HookKind::Addition, &stored, &moby, "story").fire().await.unwrap();
        // Resolving the stored key is the only round trip.
        assert_eq!(client.request_count(), before + 1);
    }

    #[tokio::test]
    async fn test_deletion_already_applied_writes_nothing() {
        let client = Arc::new(InMemoryClient::new());
        let db = database(client.clone());
        let ann = named(&db, "Person", "ann").await;
        let moby = db.create("Story").unwrap();
        moby.set_value("name", "moby").unwrap();
        moby.set_related("author", [ann]).await.unwrap();
        moby.save().await.unwrap();

        let stored = fetch(&db, "Person", "ann").await;
        hook(HookKind::Deletion, &stored, &moby, "story").fire().await.unwrap();
        assert_eq!(fetch(&db, "Person", "ann").await.get("story").unwrap(), Value::Null);
        assert_eq!(fetch(&db, "Story", "moby").await.get("author").unwrap(), Value::Null);

        let stored = fetch(&db, "Person", "ann").await;
        let before = client.request_count();
        hook(HookKind::Deletion, &stored, &moby, "story").fire().await.unwrap();
        assert_eq!(client.request_count(), before);
    }

    #[tokio::test]
    async fn test_deletion_leaves_other_reference_alone() {
        let client = Arc::new(InMemoryClient::new());
        let db = database(client.clone());
        let ann = named(&db, "Person", "ann").await;
        let dune = named(&db, "Story", "dune").await;
        let moby = named(&db, "Story", "moby").await;
        hook(HookKind::Addition, &ann, &dune, "story").fire().await.unwrap();

        let stored = fetch(&db, "Person", "ann").await;
        let before = client.request_count();
        hook(HookKind::Deletion, &stored, &moby, "story").fire().await.unwrap();
        assert_eq!(client.request_count(), before + 1);
        assert_eq!(
            fetch(&db, "Person", "ann").await.get("story").unwrap(),
            Value::Str("dune".to_string())
        );
    }
}
