//! Search-index store clients.
//!
//! This module defines the [`SearchClient`] trait, the narrow set of store operations the
//! document layer consumes: index bootstrap, structured search, count, fetch by identifier,
//! single-document writes and batched writes. Query bodies use the Elasticsearch query DSL
//! as plain JSON.
//!
//! Two implementations ship with the crate:
//!
//! - [`InMemoryClient`]: process-local store evaluating the DSL subset the compiler emits.
//! - `ElasticsearchClient` (feature `elasticsearch`): HTTP client for a real cluster.

mod in_memory;

#[cfg(feature = "elasticsearch")]
mod elasticsearch;

use std::fmt::Debug;

use async_trait::async_trait;
use serde_json::{Map, Value as Json, json};

use crate::error::BackendError;

pub use in_memory::InMemoryClient;

#[cfg(feature = "elasticsearch")]
pub use self::elasticsearch::ElasticsearchClient;

/// A stored document returned by a search or fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    /// Store-assigned identity.
    pub id: String,
    /// Stored fields, possibly filtered by `_source`.
    pub source: Map<String, Json>,
}

/// Result of a search request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    /// Total number of matches, ignoring pagination.
    pub total: u64,
    /// The requested page of matches.
    pub hits: Vec<Hit>,
}

/// Kind of a bulk action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkOp {
    Index,
    Update,
    Delete,
}

impl BulkOp {
    /// The action name in the bulk wire format.
    pub fn as_str(self) -> &'static str {
        match self {
            BulkOp::Index => "index",
            BulkOp::Update => "update",
            BulkOp::Delete => "delete",
        }
    }
}

/// One action of a batched write.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkAction {
    pub op: BulkOp,
    pub index: String,
    pub id: String,
    /// Full source for `Index`, partial document for `Update`, unused for `Delete`.
    pub doc: Option<Json>,
}

impl BulkAction {
    /// Creates an update action merging `doc` into the stored document.
    pub fn update(index: impl Into<String>, id: impl Into<String>, doc: Json) -> Self {
        Self {
            op: BulkOp::Update,
            index: index.into(),
            id: id.into(),
            doc: Some(doc),
        }
    }

    /// Creates a delete action.
    pub fn delete(index: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            op: BulkOp::Delete,
            index: index.into(),
            id: id.into(),
            doc: None,
        }
    }

    /// The action and metadata line followed by the optional source line.
    pub fn to_lines(&self) -> Vec<Json> {
        let mut header = Map::new();
        header.insert(
            self.op.as_str().to_string(),
            json!({ "_index": self.index, "_id": self.id }),
        );
        let mut lines = vec![Json::Object(header)];
        match (self.op, &self.doc) {
            (BulkOp::Index, Some(doc)) => lines.push(doc.clone()),
            (BulkOp::Update, Some(doc)) => lines.push(json!({ "doc": doc })),
            _ => {}
        }
        lines
    }
}

/// Outcome of a batched write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkResponse {
    /// Number of actions the store applied.
    pub executed: usize,
    /// One message per failed action.
    pub errors: Vec<String>,
}

/// Store operations consumed by the document layer.
///
/// Implementations must keep "not found" and "bad query shape" distinguishable:
/// searching a missing index yields an empty response, while an unsupported clause or an
/// identifier of the wrong type fails with [`BackendError::BadQuery`].
#[async_trait]
pub trait SearchClient: Send + Sync + Debug {
    /// Returns a human-readable name for this client.
    fn backend_name(&self) -> &'static str;

    /// Checks whether an index exists.
    async fn index_exists(&self, index: &str) -> Result<bool, BackendError>;

    /// Creates an index with the given `mappings` body.
    async fn create_index(&self, index: &str, mappings: Json) -> Result<(), BackendError>;

    /// Deletes an index and everything in it.
    async fn delete_index(&self, index: &str) -> Result<(), BackendError>;

    /// Executes a search request body.
    async fn search(&self, index: &str, body: Json) -> Result<SearchResponse, BackendError>;

    /// Counts the documents matching a `{"query": ...}` body.
    async fn count(&self, index: &str, body: Json) -> Result<u64, BackendError>;

    /// Fetches a document by identity.
    async fn get(&self, index: &str, id: &str) -> Result<Option<Hit>, BackendError>;

    /// Writes a full document, assigning a new identity when `id` is `None`.
    ///
    /// Returns the identity of the written document.
    async fn index(
        &self,
        index: &str,
        id: Option<&str>,
        source: Json,
        refresh: bool,
    ) -> Result<String, BackendError>;

    /// Deletes a document by identity.
    async fn delete(&self, index: &str, id: &str, refresh: bool) -> Result<(), BackendError>;

    /// Executes a batch of actions in one round trip.
    async fn bulk(
        &self,
        actions: Vec<BulkAction>,
        refresh: bool,
    ) -> Result<BulkResponse, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_action_lines() {
        let action = BulkAction::update("app_story", "s1", json!({"name": "x"}));
        let lines = action.to_lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["update"]["_id"], json!("s1"));
        assert_eq!(lines[1], json!({"doc": {"name": "x"}}));
    }

    #[test]
    fn test_delete_action_has_no_source_line() {
        let lines = BulkAction::delete("app_story", "s1").to_lines();
        assert_eq!(lines, vec![json!({"delete": {"_index": "app_story", "_id": "s1"}})]);
    }
}
