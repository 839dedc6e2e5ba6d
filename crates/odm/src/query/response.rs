//! Collection query results.

use serde_json::Value as Json;

use crate::document::Document;

/// Metadata attached to a page of results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultMeta {
    /// Total number of matches, ignoring pagination.
    pub total: u64,
    /// Offset of the first returned document, when one was requested.
    pub start: Option<u64>,
    /// The requested field projection. Documents of a projected query are partially
    /// populated.
    pub fields: Vec<String>,
}

/// A page of matched documents.
#[derive(Debug, Clone, Default)]
pub struct Hits {
    documents: Vec<Document>,
    meta: ResultMeta,
}

impl Hits {
    pub fn new(documents: Vec<Document>, meta: ResultMeta) -> Self {
        Self { documents, meta }
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn meta(&self) -> &ResultMeta {
        &self.meta
    }

    /// Total number of matches, ignoring pagination.
    pub fn total(&self) -> u64 {
        self.meta.total
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn first(&self) -> Option<&Document> {
        self.documents.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Document> {
        self.documents.iter()
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }
}

impl IntoIterator for Hits {
    type Item = Document;
    type IntoIter = std::vec::IntoIter<Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.into_iter()
    }
}

/// What a collection query returns, depending on its flags.
#[derive(Debug, Clone)]
pub enum CollectionResponse {
    /// Matched documents.
    Hits(Hits),
    /// Number of matches, for count-only queries.
    Count(u64),
    /// The compiled request body, for explain queries.
    Explain(Json),
}

impl CollectionResponse {
    /// The matched documents, unless this is a count or explain response.
    pub fn into_hits(self) -> Option<Hits> {
        match self {
            CollectionResponse::Hits(hits) => Some(hits),
            _ => None,
        }
    }

    /// The count of a count-only query.
    pub fn as_count(&self) -> Option<u64> {
        match self {
            CollectionResponse::Count(count) => Some(*count),
            _ => None,
        }
    }

    /// The compiled body of an explain query.
    pub fn as_explain(&self) -> Option<&Json> {
        match self {
            CollectionResponse::Explain(body) => Some(body),
            _ => None,
        }
    }
}
