//! Search request builder.

use serde_json::{Map, Value as Json, json};

use crate::types::params::sort_field_name;

/// An immutable-style search request builder producing Elasticsearch query DSL.
///
/// ```
/// use helios_odm::query::Search;
/// use serde_json::json;
///
/// let search = Search::new()
///     .filter_terms("name", vec![json!("a"), json!("b")])
///     .sort(["-price"]);
/// let body = search.to_dict();
/// assert_eq!(body["query"]["bool"]["filter"][0]["terms"]["name"], json!(["a", "b"]));
/// assert_eq!(body["sort"][0]["price"]["order"], json!("desc"));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Search {
    from: Option<u64>,
    size: Option<u64>,
    source: Option<(Vec<String>, Vec<String>)>,
    filters: Vec<Json>,
    queries: Vec<Json>,
    sort: Vec<Json>,
}

impl Search {
    /// An empty search matching every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the result offset and page size.
    pub fn extra(mut self, from: u64, size: u64) -> Self {
        self.from = Some(from);
        self.size = Some(size);
        self
    }

    /// Restricts the returned source fields.
    pub fn source(mut self, includes: Vec<String>, excludes: Vec<String>) -> Self {
        self.source = Some((includes, excludes));
        self
    }

    /// Adds a non-scoring filter clause.
    pub fn filter(mut self, clause: Json) -> Self {
        self.filters.push(clause);
        self
    }

    /// Adds a `terms` filter on one field.
    pub fn filter_terms(self, field: impl Into<String>, values: Vec<Json>) -> Self {
        let mut terms = Map::new();
        terms.insert(field.into(), Json::Array(values));
        self.filter(json!({ "terms": terms }))
    }

    /// Adds a scoring query clause.
    pub fn query(mut self, clause: Json) -> Self {
        self.queries.push(clause);
        self
    }

    /// Adds a `query_string` full-text query, optionally restricted to `fields`.
    pub fn query_string(self, query: impl Into<String>, fields: Option<Vec<String>>) -> Self {
        let mut body = Map::new();
        body.insert("query".to_string(), Json::String(query.into()));
        if let Some(fields) = fields {
            body.insert("fields".to_string(), json!(fields));
        }
        self.query(json!({ "query_string": body }))
    }

    /// Appends sort keys. A leading `-` sorts descending.
    pub fn sort<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for spec in fields {
            let spec = spec.as_ref();
            let name = sort_field_name(spec);
            if name.len() == spec.len() {
                self.sort.push(Json::String(name.to_string()));
            } else {
                let mut key = Map::new();
                key.insert(name.to_string(), json!({ "order": "desc" }));
                self.sort.push(Json::Object(key));
            }
        }
        self
    }

    /// The query clause alone.
    pub fn query_dict(&self) -> Json {
        match (self.filters.as_slice(), self.queries.as_slice()) {
            ([], []) => json!({ "match_all": {} }),
            ([], [query]) => query.clone(),
            (filters, queries) => {
                let mut clauses = Map::new();
                if !filters.is_empty() {
                    clauses.insert("filter".to_string(), Json::Array(filters.to_vec()));
                }
                if !queries.is_empty() {
                    clauses.insert("must".to_string(), Json::Array(queries.to_vec()));
                }
                json!({ "bool": clauses })
            }
        }
    }

    /// The body of a count request.
    pub fn count_dict(&self) -> Json {
        json!({ "query": self.query_dict() })
    }

    /// The full search request body.
    pub fn to_dict(&self) -> Json {
        let mut body = Map::new();
        body.insert("query".to_string(), self.query_dict());
        if let Some(from) = self.from {
            body.insert("from".to_string(), json!(from));
        }
        if let Some(size) = self.size {
            body.insert("size".to_string(), json!(size));
        }
        if let Some((includes, excludes)) = &self.source {
            body.insert(
                "_source".to_string(),
                json!({ "includes": includes, "excludes": excludes }),
            );
        }
        if !self.sort.is_empty() {
            body.insert("sort".to_string(), Json::Array(self.sort.clone()));
        }
        Json::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_search_matches_all() {
        assert_eq!(Search::new().to_dict(), json!({"query": {"match_all": {}}}));
    }

    #[test]
    fn test_lone_query_is_not_wrapped() {
        let search = Search::new().query_string("foo", Some(vec!["name".to_string()]));
        assert_eq!(
            search.query_dict(),
            json!({"query_string": {"query": "foo", "fields": ["name"]}})
        );
    }

    #[test]
    fn test_filters_and_queries_combine() {
        let search = Search::new()
            .filter_terms("tags", vec![json!("rust")])
            .query_string("async", None)
            .extra(20, 10);
        let body = search.to_dict();
        assert_eq!(body["query"]["bool"]["filter"].as_array().unwrap().len(), 1);
        assert_eq!(body["query"]["bool"]["must"][0]["query_string"]["query"], json!("async"));
        assert_eq!(body["from"], json!(20));
        assert_eq!(body["size"], json!(10));
        assert_eq!(search.count_dict().as_object().unwrap().len(), 1);
    }

    #[test]
    fn test_ascending_sort_is_plain_name() {
        let body = Search::new().sort(["name", "-price"]).to_dict();
        assert_eq!(body["sort"], json!(["name", {"price": {"order": "desc"}}]));
    }
}
