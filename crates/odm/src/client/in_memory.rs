//! In-memory search client for testing and single-process scenarios.
//!
//! Evaluates the query DSL subset the collection compiler emits:
//!
//! - `match_all`
//! - `bool` with `filter` and `must` arrays
//! - `terms` (one field per clause, `_id` included)
//! - `query_string` with optional `fields`
//! - `from` / `size`, `sort`, `_source` includes/excludes
//!
//! Anything else is rejected as a bad query.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value as Json};
use uuid::Uuid;

use crate::error::BackendError;

use super::{BulkAction, BulkOp, BulkResponse, Hit, SearchClient, SearchResponse};

const BACKEND_NAME: &str = "memory";

#[derive(Debug, Default)]
struct StoredIndex {
    mappings: Json,
    /// Documents in insertion order.
    docs: Vec<(String, Map<String, Json>)>,
}

impl StoredIndex {
    fn position(&self, id: &str) -> Option<usize> {
        self.docs.iter().position(|(doc_id, _)| doc_id == id)
    }

    fn put(&mut self, id: String, source: Map<String, Json>) {
        match self.position(&id) {
            Some(i) => self.docs[i].1 = source,
            None => self.docs.push((id, source)),
        }
    }
}

/// Thread-safe, process-local [`SearchClient`].
///
/// Writes are immediately visible, so the refresh flag is accepted and ignored. Every
/// store call is counted, which lets tests assert that an operation did not reach the
/// store.
#[derive(Debug, Default)]
pub struct InMemoryClient {
    indices: RwLock<BTreeMap<String, StoredIndex>>,
    requests: AtomicUsize,
}

impl InMemoryClient {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of store calls served so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(AtomicOrdering::SeqCst)
    }

    /// Number of documents held by an index.
    pub fn document_count(&self, index: &str) -> usize {
        self.indices
            .read()
            .get(index)
            .map(|stored| stored.docs.len())
            .unwrap_or(0)
    }

    /// Returns the mappings an index was created with.
    pub fn mappings(&self, index: &str) -> Option<Json> {
        self.indices
            .read()
            .get(index)
            .map(|stored| stored.mappings.clone())
    }

    fn track(&self) {
        self.requests.fetch_add(1, AtomicOrdering::SeqCst);
    }

    fn matching(
        &self,
        index: &str,
        query: Option<&Json>,
    ) -> Result<Vec<(String, Map<String, Json>)>, BackendError> {
        let indices = self.indices.read();
        let Some(stored) = indices.get(index) else {
            tracing::debug!("Index '{}' does not exist, returning no matches", index);
            return Ok(Vec::new());
        };
        let mut found = Vec::new();
        for (id, source) in &stored.docs {
            let matched = match query {
                Some(clause) => matches_clause(clause, id, source)?,
                None => true,
            };
            if matched {
                found.push((id.clone(), source.clone()));
            }
        }
        Ok(found)
    }

    fn apply_action(
        indices: &mut BTreeMap<String, StoredIndex>,
        action: BulkAction,
    ) -> Result<(), String> {
        let BulkAction { op, index, id, doc } = action;
        match op {
            BulkOp::Index => {
                let source = match doc {
                    Some(Json::Object(map)) => map,
                    _ => return Err(format!("index [{}]: source must be an object", id)),
                };
                indices.entry(index).or_default().put(id, source);
                Ok(())
            }
            BulkOp::Update => {
                let partial = match doc {
                    Some(Json::Object(map)) => map,
                    _ => return Err(format!("update [{}]: doc must be an object", id)),
                };
                let missing = || format!("update [{}]: document missing", id);
                let stored = indices.get_mut(&index).ok_or_else(missing)?;
                let position = stored.position(&id).ok_or_else(missing)?;
                let stored = &mut stored.docs[position].1;
                for (key, value) in partial {
                    stored.insert(key, value);
                }
                Ok(())
            }
            BulkOp::Delete => {
                let stored = indices
                    .get_mut(&index)
                    .ok_or_else(|| format!("delete [{}]: not found", id))?;
                let position = stored
                    .position(&id)
                    .ok_or_else(|| format!("delete [{}]: not found", id))?;
                stored.docs.remove(position);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl SearchClient for InMemoryClient {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn index_exists(&self, index: &str) -> Result<bool, BackendError> {
        self.track();
        Ok(self.indices.read().contains_key(index))
    }

    async fn create_index(&self, index: &str, mappings: Json) -> Result<(), BackendError> {
        self.track();
        let mut indices = self.indices.write();
        if indices.contains_key(index) {
            return Err(bad_query(format!("index '{}' already exists", index)));
        }
        indices.insert(
            index.to_string(),
            StoredIndex {
                mappings,
                docs: Vec::new(),
            },
        );
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<(), BackendError> {
        self.track();
        match self.indices.write().remove(index) {
            Some(_) => Ok(()),
            None => Err(BackendError::NotFound {
                backend_name: BACKEND_NAME.to_string(),
                target: index.to_string(),
            }),
        }
    }

    async fn search(&self, index: &str, body: Json) -> Result<SearchResponse, BackendError> {
        self.track();
        let mut found = self.matching(index, body.get("query"))?;
        if let Some(sort) = body.get("sort") {
            sort_hits(&mut found, sort)?;
        }

        let total = found.len() as u64;
        let from = body.get("from").and_then(Json::as_u64).unwrap_or(0) as usize;
        let size = body
            .get("size")
            .and_then(Json::as_u64)
            .map(|size| size as usize)
            .unwrap_or(usize::MAX);

        let hits = found
            .into_iter()
            .skip(from)
            .take(size)
            .map(|(id, source)| Hit {
                id,
                source: filter_source(source, body.get("_source")),
            })
            .collect();
        Ok(SearchResponse { total, hits })
    }

    async fn count(&self, index: &str, body: Json) -> Result<u64, BackendError> {
        self.track();
        Ok(self.matching(index, body.get("query"))?.len() as u64)
    }

    async fn get(&self, index: &str, id: &str) -> Result<Option<Hit>, BackendError> {
        self.track();
        let indices = self.indices.read();
        Ok(indices.get(index).and_then(|stored| {
            stored.position(id).map(|i| Hit {
                id: id.to_string(),
                source: stored.docs[i].1.clone(),
            })
        }))
    }

    async fn index(
        &self,
        index: &str,
        id: Option<&str>,
        source: Json,
        _refresh: bool,
    ) -> Result<String, BackendError> {
        self.track();
        let Json::Object(source) = source else {
            return Err(bad_query("document source must be an object"));
        };
        let id = id
            .map(ToString::to_string)
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        self.indices
            .write()
            .entry(index.to_string())
            .or_default()
            .put(id.clone(), source);
        Ok(id)
    }

    async fn delete(&self, index: &str, id: &str, _refresh: bool) -> Result<(), BackendError> {
        self.track();
        let mut indices = self.indices.write();
        let stored = indices.get_mut(index);
        match stored.and_then(|stored| stored.position(id).map(|i| (stored, i))) {
            Some((stored, position)) => {
                stored.docs.remove(position);
                Ok(())
            }
            None => Err(BackendError::NotFound {
                backend_name: BACKEND_NAME.to_string(),
                target: format!("{}/{}", index, id),
            }),
        }
    }

    async fn bulk(
        &self,
        actions: Vec<BulkAction>,
        _refresh: bool,
    ) -> Result<BulkResponse, BackendError> {
        self.track();
        let mut response = BulkResponse::default();
        let mut indices = self.indices.write();
        for action in actions {
            match Self::apply_action(&mut indices, action) {
                Ok(()) => response.executed += 1,
                Err(message) => response.errors.push(message),
            }
        }
        Ok(response)
    }
}

fn bad_query(message: impl Into<String>) -> BackendError {
    BackendError::BadQuery {
        backend_name: BACKEND_NAME.to_string(),
        message: message.into(),
    }
}

fn clause_list(value: Option<&Json>) -> Result<Vec<&Json>, BackendError> {
    match value {
        None => Ok(Vec::new()),
        Some(Json::Array(items)) => Ok(items.iter().collect()),
        Some(clause @ Json::Object(_)) => Ok(vec![clause]),
        Some(other) => Err(bad_query(format!("malformed bool clause list: {}", other))),
    }
}

fn matches_clause(clause: &Json, id: &str, source: &Map<String, Json>) -> Result<bool, BackendError> {
    let Some(object) = clause.as_object() else {
        return Err(bad_query(format!("query clause must be an object: {}", clause)));
    };
    let Some((kind, body)) = object.iter().next().filter(|_| object.len() == 1) else {
        return Err(bad_query(format!("query clause must have one key: {}", clause)));
    };

    match kind.as_str() {
        "match_all" => Ok(true),
        "bool" => {
            for key in body.as_object().map(|b| b.keys()).into_iter().flatten() {
                if key != "filter" && key != "must" {
                    return Err(bad_query(format!("unsupported bool occurrence '{}'", key)));
                }
            }
            let clauses = clause_list(body.get("filter"))?
                .into_iter()
                .chain(clause_list(body.get("must"))?);
            for inner in clauses {
                if !matches_clause(inner, id, source)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        "terms" => {
            let Some((field, values)) = body.as_object().and_then(|b| b.iter().next()) else {
                return Err(bad_query("terms clause without a field"));
            };
            let Some(values) = values.as_array() else {
                return Err(bad_query(format!("terms on '{}' expects a list", field)));
            };
            if field == "_id" {
                let mut ids = Vec::with_capacity(values.len());
                for value in values {
                    ids.push(scalar_text(value).ok_or_else(|| {
                        bad_query(format!("invalid identifier for '_id': {}", value))
                    })?);
                }
                return Ok(ids.iter().any(|candidate| candidate == id));
            }
            Ok(match source.get(field) {
                Some(Json::Array(stored)) => stored
                    .iter()
                    .any(|item| values.iter().any(|v| loosely_equal(item, v))),
                Some(stored) => values.iter().any(|v| loosely_equal(stored, v)),
                None => false,
            })
        }
        "query_string" => {
            let query = body
                .get("query")
                .and_then(Json::as_str)
                .ok_or_else(|| bad_query("query_string without a query"))?;
            let fields: Option<Vec<&str>> = body
                .get("fields")
                .and_then(Json::as_array)
                .map(|fields| fields.iter().filter_map(Json::as_str).collect());
            Ok(matches_text(query, source, fields.as_deref()))
        }
        other => Err(bad_query(format!("unsupported query clause '{}'", other))),
    }
}

fn scalar_text(value: &Json) -> Option<String> {
    match value {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        Json::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn loosely_equal(stored: &Json, wanted: &Json) -> bool {
    if stored == wanted {
        return true;
    }
    match (scalar_text(stored), scalar_text(wanted)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn collect_text(value: &Json, out: &mut String) {
    match value {
        Json::Array(items) => items.iter().for_each(|item| collect_text(item, out)),
        Json::Object(_) | Json::Null => {}
        other => {
            if let Some(text) = scalar_text(other) {
                out.push(' ');
                out.push_str(&text.to_lowercase());
            }
        }
    }
}

/// Every whitespace-separated term must appear in one of the searched fields.
fn matches_text(query: &str, source: &Map<String, Json>, fields: Option<&[&str]>) -> bool {
    let mut haystack = String::new();
    match fields {
        Some(fields) => {
            for field in fields {
                if let Some(value) = source.get(*field) {
                    collect_text(value, &mut haystack);
                }
            }
        }
        None => source.values().for_each(|value| collect_text(value, &mut haystack)),
    }
    query
        .split_whitespace()
        .map(|term| term.trim_matches('*').to_lowercase())
        .filter(|term| !term.is_empty())
        .all(|term| haystack.contains(&term))
}

fn compare_json(a: Option<&Json>, b: Option<&Json>) -> Ordering {
    match (a, b) {
        (None | Some(Json::Null), None | Some(Json::Null)) => Ordering::Equal,
        // Missing values sort last.
        (None | Some(Json::Null), _) => Ordering::Greater,
        (_, None | Some(Json::Null)) => Ordering::Less,
        (Some(Json::Number(x)), Some(Json::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(x), Some(y)) => scalar_text(x).cmp(&scalar_text(y)),
    }
}

fn sort_hits(hits: &mut [(String, Map<String, Json>)], sort: &Json) -> Result<(), BackendError> {
    let mut keys = Vec::new();
    for spec in clause_list(Some(sort)).or_else(|_| match sort {
        Json::String(_) => Ok(vec![sort]),
        _ => Err(bad_query(format!("malformed sort: {}", sort))),
    })? {
        match spec {
            Json::String(field) => keys.push((field.clone(), false)),
            Json::Object(map) if map.len() == 1 => {
                for (field, options) in map {
                    let descending = options.get("order").and_then(Json::as_str) == Some("desc");
                    keys.push((field.clone(), descending));
                }
            }
            other => return Err(bad_query(format!("malformed sort entry: {}", other))),
        }
    }

    hits.sort_by(|(a_id, a), (b_id, b)| {
        for (field, descending) in &keys {
            let a_id_json = Json::String(a_id.clone());
            let b_id_json = Json::String(b_id.clone());
            let (left, right) = if field == "_id" {
                (Some(&a_id_json), Some(&b_id_json))
            } else {
                (a.get(field), b.get(field))
            };
            let ordering = compare_json(left, right);
            let ordering = if *descending { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    Ok(())
}

fn filter_source(mut source: Map<String, Json>, filter: Option<&Json>) -> Map<String, Json> {
    let Some(filter) = filter else {
        return source;
    };
    let names = |key: &str| -> Vec<String> {
        filter
            .get(key)
            .and_then(Json::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Json::as_str)
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };
    let includes = names("includes");
    let excludes = names("excludes");
    if !includes.is_empty() {
        source.retain(|key, _| includes.contains(key));
    }
    source.retain(|key, _| !excludes.contains(key));
    source
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn seeded() -> InMemoryClient {
        let client = InMemoryClient::new();
        for (id, name, price) in [("1", "lamp", 30), ("2", "desk", 120), ("3", "chair", 45)] {
            client
                .index(
                    "shop_item",
                    Some(id),
                    json!({"name": name, "price": price, "tags": ["home"]}),
                    true,
                )
                .await
                .unwrap();
        }
        client
    }

    #[tokio::test]
    async fn test_terms_filter_and_sort() {
        let client = seeded().await;
        let body = json!({
            "query": {"bool": {"filter": [{"terms": {"name": ["lamp", "chair"]}}]}},
            "sort": [{"price": {"order": "desc"}}]
        });
        let response = client.search("shop_item", body).await.unwrap();
        assert_eq!(response.total, 2);
        let ids: Vec<&str> = response.hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "1"]);
    }

    #[tokio::test]
    async fn test_array_fields_match_any_member() {
        let client = seeded().await;
        let body = json!({"query": {"terms": {"tags": ["home"]}}});
        assert_eq!(client.count("shop_item", body).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_pagination_and_source_filtering() {
        let client = seeded().await;
        let body = json!({
            "query": {"match_all": {}},
            "from": 1,
            "size": 1,
            "_source": {"includes": ["name"], "excludes": []}
        });
        let response = client.search("shop_item", body).await.unwrap();
        assert_eq!(response.total, 3);
        assert_eq!(response.hits.len(), 1);
        assert_eq!(response.hits[0].id, "2");
        assert_eq!(response.hits[0].source.len(), 1);
    }

    #[tokio::test]
    async fn test_query_string_respects_fields() {
        let client = seeded().await;
        let body = json!({"query": {"query_string": {"query": "desk", "fields": ["tags"]}}});
        assert_eq!(client.search("shop_item", body).await.unwrap().total, 0);
        let body = json!({"query": {"query_string": {"query": "DESK"}}});
        assert_eq!(client.search("shop_item", body).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_object_identifier_is_bad_query() {
        let client = seeded().await;
        let body = json!({"query": {"terms": {"_id": [{"nested": 1}]}}});
        let err = client.search("shop_item", body).await.unwrap_err();
        assert!(matches!(err, BackendError::BadQuery { .. }));
    }

    #[tokio::test]
    async fn test_unknown_clause_is_bad_query() {
        let client = seeded().await;
        let body = json!({"query": {"fuzzy": {"name": "lmp"}}});
        assert!(client.search("shop_item", body).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_index_searches_empty() {
        let client = InMemoryClient::new();
        let response = client.search("nothing", json!({})).await.unwrap();
        assert_eq!(response, SearchResponse::default());
        assert_eq!(client.request_count(), 1);
    }

    #[tokio::test]
    async fn test_bulk_reports_each_failure() {
        let client = seeded().await;
        let actions = vec![
            BulkAction::update("shop_item", "1", json!({"price": 10})),
            BulkAction::update("shop_item", "404", json!({"price": 10})),
            BulkAction::delete("shop_item", "2"),
            BulkAction::delete("shop_item", "405"),
            BulkAction {
                op: BulkOp::Index,
                index: "shop_item".to_string(),
                id: "4".to_string(),
                doc: Some(json!({"name": "shelf"})),
            },
        ];
        let response = client.bulk(actions, false).await.unwrap();
        assert_eq!(response.executed, 3);
        assert_eq!(response.errors.len(), 2);
        assert_eq!(client.document_count("shop_item"), 3);

        let updated = client.get("shop_item", "1").await.unwrap().unwrap();
        assert_eq!(updated.source["price"], json!(10));
        assert_eq!(updated.source["name"], json!("lamp"));
    }

    #[tokio::test]
    async fn test_generated_ids_are_unique() {
        let client = InMemoryClient::new();
        let a = client.index("x", None, json!({}), false).await.unwrap();
        let b = client.index("x", None, json!({}), false).await.unwrap();
        assert_ne!(a, b);
    }
}
