//! Document serialisation.
//!
//! Two modes exist. Store mode, used when writing, emits plain field data with
//! relationships collapsed to keys. Client-serving mode, selected by the presence of a
//! [`RequestContext`], also emits `_type` and `_pk` and expands the relationships the
//! class allows, down to the nesting depth.

use std::collections::HashMap;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Map, Value as Json};

use crate::error::OdmResult;
use crate::types::RequestContext;

use super::{Document, RelatedItem};

/// Key holding the class name in client-serving output.
pub const TYPE_KEY: &str = "_type";

/// Key holding the string form of the primary key in client-serving output.
pub const PK_KEY: &str = "_pk";

impl Document {
    /// Serialises the document.
    ///
    /// Without a request (argument or attached to the instance) this is the store-mode
    /// representation. With one, relationships listed in the class's nested
    /// relationships are expanded while the nesting depth is positive; every other
    /// relationship is collapsed to its keys.
    pub async fn to_dict(&self, request: Option<&RequestContext>) -> OdmResult<Map<String, Json>> {
        self.serialize(request.cloned(), None).await
    }

    /// Like [`to_dict`](Self::to_dict) with an explicit nesting depth.
    pub async fn to_dict_with_depth(
        &self,
        request: Option<&RequestContext>,
        depth: u32,
    ) -> OdmResult<Map<String, Json>> {
        self.serialize(request.cloned(), Some(depth)).await
    }

    /// The store-mode representation written on save.
    ///
    /// Ignores any request attached to the instance.
    pub(crate) fn to_source(&self) -> OdmResult<Map<String, Json>> {
        for field in self.class().relationships() {
            self.unload_related(field.name())?;
        }
        Ok(self.field_data(&HashMap::new()))
    }

    fn serialize(
        &self,
        request: Option<RequestContext>,
        depth: Option<u32>,
    ) -> BoxFuture<'static, OdmResult<Map<String, Json>>> {
        let document = self.clone();
        async move {
            let depth = depth.unwrap_or_else(|| document.nesting_depth());
            let request = request.or_else(|| document.request());
            let class = document.class().clone();

            let mut expanded = HashMap::new();
            for field in class.relationships() {
                let name = field.name();
                let include = request.is_some()
                    && depth > 0
                    && class.nested_relationships().iter().any(|n| n == name);
                if !include {
                    document.unload_related(name)?;
                    continue;
                }

                document.load_related(name).await?;
                let mut members = Vec::new();
                for item in document.related_items(name)? {
                    match item {
                        RelatedItem::Document(child) => {
                            child.set_nesting_depth(depth - 1);
                            child.set_request(request.clone());
                            let data = child.serialize(request.clone(), Some(depth - 1)).await?;
                            members.push(Json::Object(data));
                        }
                        RelatedItem::Key(key) => members.push(key.to_json()),
                    }
                }
                if members.is_empty() {
                    continue;
                }
                let value = if field.is_multi() {
                    Json::Array(members)
                } else {
                    members.swap_remove(0)
                };
                expanded.insert(name.to_string(), value);
            }

            let mut data = document.field_data(&expanded);
            if request.is_some() {
                data.insert(TYPE_KEY.to_string(), Json::String(class.name().to_string()));
                data.insert(PK_KEY.to_string(), Json::String(document.pk().to_string()));
            }
            Ok(data)
        }
        .boxed()
    }

    /// Field values with empty ones skipped. Relationships not in `expanded` are written
    /// as keys; documents without a primary key have no key and are left out.
    fn field_data(&self, expanded: &HashMap<String, Json>) -> Map<String, Json> {
        let relations = self.inner.state.read().relations.clone();
        let values = self.inner.state.read().values.clone();

        let mut data = Map::new();
        for field in self.class().fields() {
            let name = field.name();
            if let Some(value) = expanded.get(name) {
                data.insert(name.to_string(), value.clone());
                continue;
            }
            if field.is_relationship() {
                let keys: Vec<Json> = relations
                    .get(name)
                    .into_iter()
                    .flatten()
                    .map(RelatedItem::pk)
                    .filter(|key| !key.is_null())
                    .map(|key| key.to_json())
                    .collect();
                if keys.is_empty() {
                    continue;
                }
                let value = if field.is_multi() {
                    Json::Array(keys)
                } else {
                    keys.into_iter().next().unwrap_or(Json::Null)
                };
                data.insert(name.to_string(), value);
            } else if let Some(value) = values.get(name).filter(|value| !value.is_empty()) {
                data.insert(name.to_string(), value.to_json());
            }
        }
        data
    }
}
