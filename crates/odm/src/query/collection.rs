//! Collection queries.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{Map, Value as Json};

use crate::database::Database;
use crate::document::Document;
use crate::error::{BackendError, OdmError, OdmResult, RequestError};
use crate::schema::{DocumentClass, ID_FIELD};
use crate::types::RequestContext;
use crate::types::params::{as_bool, as_u64, json_list, process_fields, process_limit, sort_field_name};

use super::response::{CollectionResponse, Hits, ResultMeta};
use super::search::Search;

/// Value of a filter that matches everything; such filters are dropped.
pub const MATCH_ALL: &str = "_all";

/// Options and filters of a collection query.
///
/// Built with the chained setters or parsed from generic request parameters with
/// [`CollectionQuery::from_params`].
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionQuery {
    count: bool,
    strict: bool,
    sort: Vec<String>,
    fields: Vec<String>,
    limit: Option<u64>,
    page: Option<u64>,
    start: Option<u64>,
    query_set: Option<Search>,
    item_request: bool,
    explain: bool,
    search_fields: Option<Vec<String>>,
    q: Option<String>,
    params: Vec<(String, Json)>,
}

impl Default for CollectionQuery {
    fn default() -> Self {
        Self {
            count: false,
            strict: true,
            sort: Vec::new(),
            fields: Vec::new(),
            limit: None,
            page: None,
            start: None,
            query_set: None,
            item_request: false,
            explain: false,
            search_fields: None,
            q: None,
            params: Vec::new(),
        }
    }
}

impl CollectionQuery {
    /// A strict query with no filters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses generic request parameters.
    ///
    /// Reserved keys (`_count`, `_strict`, `_sort`, `_fields`, `_limit`, `_page`,
    /// `_start`, `_item_request`, `_explain`, `_search_fields`, `q`) set options;
    /// `_refresh_index` and `_raise_on_empty` are ignored; everything else is a filter.
    pub fn from_params(params: &Map<String, Json>) -> Result<Self, RequestError> {
        let mut query = Self::new();
        for (key, value) in params {
            match key.as_str() {
                "_count" => query.count = as_bool(key, value)?,
                "_strict" => query.strict = as_bool(key, value)?,
                "_sort" => query.sort = json_list(key, value)?,
                "_fields" => query.fields = json_list(key, value)?,
                "_limit" => query.limit = Some(as_u64(key, value)?),
                "_page" => query.page = Some(as_u64(key, value)?),
                "_start" => query.start = Some(as_u64(key, value)?),
                "_item_request" => query.item_request = as_bool(key, value)?,
                "_explain" => query.explain = as_bool(key, value)?,
                "_search_fields" => query.search_fields = Some(json_list(key, value)?),
                "q" => {
                    query.q = match value {
                        Json::String(s) => Some(s.clone()),
                        Json::Null => None,
                        other => Some(other.to_string()),
                    }
                }
                "_refresh_index" | "_raise_on_empty" => {}
                _ => query.params.push((key.clone(), value.clone())),
            }
        }
        Ok(query)
    }

    /// Parses the parameters of a serving-layer request.
    pub fn from_request(request: &RequestContext) -> Result<Self, RequestError> {
        Self::from_params(request.params())
    }

    /// Returns only the number of matches.
    pub fn count(mut self) -> Self {
        self.count = true;
        self
    }

    /// Rejects (`true`, the default) or drops (`false`) unknown field names.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Sort keys; a leading `-` sorts descending.
    pub fn sort<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sort = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Field projection; names prefixed with `-` are excluded.
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Page size.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// One-based page number, used with [`limit`](Self::limit).
    pub fn page(mut self, page: u64) -> Self {
        self.page = Some(page);
        self
    }

    /// Explicit result offset. Wins over [`page`](Self::page).
    pub fn start(mut self, start: u64) -> Self {
        self.start = Some(start);
        self
    }

    /// Applies the query to an existing search instead of the class's base search.
    pub fn query_set(mut self, search: Search) -> Self {
        self.query_set = Some(search);
        self
    }

    /// Marks the query as a single-item lookup, which reports a rejected identifier as
    /// not found rather than as a bad request.
    pub fn item_request(mut self) -> Self {
        self.item_request = true;
        self
    }

    /// Returns the compiled request body instead of executing it.
    pub fn explain(mut self) -> Self {
        self.explain = true;
        self
    }

    /// Full-text query string.
    pub fn q(mut self, q: impl Into<String>) -> Self {
        self.q = Some(q.into());
        self
    }

    /// Restricts the full-text query to these fields.
    pub fn search_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Adds a field filter. List values match any member.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Json>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// The filter parameters.
    pub fn params(&self) -> &[(String, Json)] {
        &self.params
    }

    fn params_display(&self) -> String {
        let params: Map<String, Json> = self.params.iter().cloned().collect();
        Json::Object(params).to_string()
    }
}

/// Checks that every name is a queryable field of `class`.
pub(crate) fn validate_fields<'a, I>(class: &DocumentClass, names: I) -> Result<(), RequestError>
where
    I: IntoIterator<Item = &'a str>,
{
    let valid = class.fields_to_query();
    let invalid: BTreeSet<&str> = names
        .into_iter()
        .filter(|name| !valid.contains(*name))
        .collect();
    if invalid.is_empty() {
        return Ok(());
    }
    Err(RequestError::bad_request(format!(
        "'{}' object does not have fields: {}",
        class.name(),
        invalid.into_iter().collect::<Vec<_>>().join(", ")
    )))
}

/// Drops reserved and match-all filters, reads `name__bool` filters as booleans, then
/// rejects (strict) or drops (non-strict) unknown field names.
fn cleaned_query_params(
    class: &DocumentClass,
    params: &[(String, Json)],
    strict: bool,
) -> Result<Vec<(String, Json)>, RequestError> {
    let mut cleaned = Vec::with_capacity(params.len());
    for (key, value) in params {
        if key.starts_with("__") || value.as_str() == Some(MATCH_ALL) {
            continue;
        }
        match key.split_once("__") {
            Some((name, "bool")) => cleaned.push((name.to_string(), Json::Bool(as_bool(key, value)?))),
            _ => cleaned.push((key.clone(), value.clone())),
        }
    }

    if strict {
        validate_fields(class, cleaned.iter().map(|(name, _)| name.as_str()))?;
    } else {
        let valid = class.fields_to_query();
        cleaned.retain(|(name, _)| {
            let keep = valid.contains(name);
            if !keep {
                tracing::debug!("Dropping unknown filter '{}' on '{}'", name, class.name());
            }
            keep
        });
    }
    Ok(cleaned)
}

/// Targets the store identity when the primary key is an `Id` field, and wraps scalar
/// values in single-member lists.
fn restructure_params(class: &DocumentClass, params: Vec<(String, Json)>) -> Vec<(String, Vec<Json>)> {
    let pk_field = class.pk_field_name();
    params
        .into_iter()
        .map(|(name, value)| {
            let name = if name == pk_field && class.pk_is_id() {
                ID_FIELD.to_string()
            } else {
                name
            };
            let values = match value {
                Json::Array(values) => values,
                scalar => vec![scalar],
            };
            (name, values)
        })
        .collect()
}

/// Query entry point for one document class.
#[derive(Debug, Clone)]
pub struct Collection {
    db: Arc<Database>,
    class: Arc<DocumentClass>,
}

impl Collection {
    pub(crate) fn new(db: Arc<Database>, class: Arc<DocumentClass>) -> Self {
        Self { db, class }
    }

    pub fn class(&self) -> &Arc<DocumentClass> {
        &self.class
    }

    pub(crate) fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Name of the index holding this class.
    pub fn index_name(&self) -> String {
        self.db.index_name(&self.class)
    }

    /// The base search of the class.
    pub fn search(&self) -> Search {
        Search::new()
    }

    /// Names accepted in filters, sort and projection.
    pub fn fields_to_query(&self) -> BTreeSet<String> {
        self.class.fields_to_query()
    }

    /// Declared parameters of a field.
    pub fn get_field_params(&self, name: &str) -> Option<Map<String, Json>> {
        self.class.get_field_params(name)
    }

    /// Compiles and runs a collection query.
    ///
    /// Steps run in a fixed order: pagination, projection, filters, full-text query,
    /// then either the count, the explain body, or the sorted search.
    pub async fn get_collection(&self, query: CollectionQuery) -> OdmResult<CollectionResponse> {
        let mut search = query.query_set.clone().unwrap_or_else(|| self.search());
        let mut start = query.start;

        if let Some(limit) = query.limit {
            let (offset, size) = process_limit(query.start, query.page, limit);
            start = Some(offset);
            search = search.extra(offset, size);
        }

        if !query.fields.is_empty() {
            let (include, exclude) = process_fields(&query.fields);
            if query.strict {
                validate_fields(
                    &self.class,
                    include.iter().chain(exclude.iter()).map(String::as_str),
                )?;
            }
            search = search.source(include, exclude);
        }

        if !query.params.is_empty() {
            let params = cleaned_query_params(&self.class, &query.params, query.strict)?;
            for (field, values) in restructure_params(&self.class, params) {
                search = search.filter_terms(field, values);
            }
        }

        if let Some(q) = &query.q {
            search = search.query_string(q.clone(), query.search_fields.clone());
        }

        let index = self.index_name();
        let client = self.db.client();

        if query.count {
            let count = client
                .count(&index, search.count_dict())
                .await
                .map_err(|e| self.query_error(e, query.item_request))?;
            return Ok(CollectionResponse::Count(count));
        }

        if query.explain {
            return Ok(CollectionResponse::Explain(search.to_dict()));
        }

        if !query.sort.is_empty() {
            if query.strict {
                validate_fields(&self.class, query.sort.iter().map(|s| sort_field_name(s)))?;
            }
            search = search.sort(&query.sort);
        }

        let response = client
            .search(&index, search.to_dict())
            .await
            .map_err(|e| self.query_error(e, query.item_request))?;
        tracing::debug!(
            "Query on '{}' matched {} documents, returning {}",
            index,
            response.total,
            response.hits.len()
        );

        let documents = response
            .hits
            .into_iter()
            .map(|hit| Document::from_hit(self.db.clone(), self.class.clone(), hit))
            .collect::<OdmResult<Vec<_>>>()?;
        Ok(CollectionResponse::Hits(Hits::new(
            documents,
            ResultMeta {
                total: response.total,
                start,
                fields: query.fields,
            },
        )))
    }

    /// Looks up a single document.
    ///
    /// Returns `Ok(None)` when nothing matches, unless `raise_on_empty` is set, in which
    /// case a not-found error naming the class and the filters is returned.
    pub async fn get_item(
        &self,
        query: CollectionQuery,
        raise_on_empty: bool,
    ) -> OdmResult<Option<Document>> {
        let description = query.params_display();
        let found = self
            .get_collection(query.limit(1).item_request())
            .await?
            .into_hits()
            .and_then(|hits| hits.into_documents().into_iter().next());
        match found {
            Some(document) => Ok(Some(document)),
            None if raise_on_empty => Err(RequestError::not_found(format!(
                "'{}({})' resource not found",
                self.class.name(),
                description
            ))
            .into()),
            None => Ok(None),
        }
    }

    /// Fetches a document by store identity.
    pub async fn get_by_id(&self, id: &str) -> OdmResult<Option<Document>> {
        let hit = self.db.client().get(&self.index_name(), id).await?;
        hit.map(|hit| Document::from_hit(self.db.clone(), self.class.clone(), hit))
            .transpose()
    }

    /// Reports a rejected query shape as a client error.
    fn query_error(&self, error: BackendError, item_request: bool) -> OdmError {
        match error {
            BackendError::BadQuery { message, .. } if item_request => {
                RequestError::not_found(format!("'{}': {}", self.class.name(), message)).into()
            }
            BackendError::BadQuery { message, .. } => {
                RequestError::bad_request(format!("'{}': {}", self.class.name(), message)).into()
            }
            other => other.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Field;
    use serde_json::json;

    fn item_class() -> DocumentClass {
        let mut registry = crate::schema::SchemaRegistry::new();
        registry.register(
            DocumentClass::builder("Item")
                .field(Field::id("id").primary_key())
                .field(Field::string("name"))
                .field(Field::boolean("active")),
        );
        let schema = registry.finalize().unwrap();
        schema.class("Item").unwrap().as_ref().clone()
    }

    #[test]
    fn test_from_params_splits_options_and_filters() {
        let params = json!({
            "_count": "false",
            "_limit": "20",
            "_page": 2,
            "_sort": "name,-price",
            "_fields": ["name"],
            "_strict": "no",
            "_refresh_index": "true",
            "q": "lamp",
            "_search_fields": "name,title",
            "name": "desk"
        });
        let query = CollectionQuery::from_params(params.as_object().unwrap()).unwrap();
        assert_eq!(query.limit, Some(20));
        assert_eq!(query.page, Some(2));
        assert!(!query.strict);
        assert_eq!(query.sort, vec!["name", "-price"]);
        assert_eq!(query.fields, vec!["name"]);
        assert_eq!(query.q.as_deref(), Some("lamp"));
        assert_eq!(
            query.search_fields,
            Some(vec!["name".to_string(), "title".to_string()])
        );
        assert_eq!(query.params(), &[("name".to_string(), json!("desk"))]);
    }

    #[test]
    fn test_from_params_rejects_malformed_control_values() {
        let params = json!({"_limit": "many"});
        let err = CollectionQuery::from_params(params.as_object().unwrap()).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_cleaning_drops_reserved_and_match_all() {
        let class = item_class();
        let params = vec![
            ("__internal".to_string(), json!("x")),
            ("name".to_string(), json!("_all")),
            ("active__bool".to_string(), json!("yes")),
        ];
        let cleaned = cleaned_query_params(&class, &params, true).unwrap();
        assert_eq!(cleaned, vec![("active".to_string(), json!(true))]);
    }

    #[test]
    fn test_cleaning_strictness() {
        let class = item_class();
        let params = vec![
            ("bogus_field".to_string(), json!(1)),
            ("name".to_string(), json!("a")),
        ];
        let err = cleaned_query_params(&class, &params, true).unwrap_err();
        assert_eq!(
            err.to_string(),
            "'Item' object does not have fields: bogus_field"
        );

        let cleaned = cleaned_query_params(&class, &params, false).unwrap();
        assert_eq!(cleaned, vec![("name".to_string(), json!("a"))]);
    }

    #[test]
    fn test_restructure_renames_id_primary_key() {
        let class = item_class();
        let restructured = restructure_params(
            &class,
            vec![
                ("id".to_string(), json!("abc")),
                ("name".to_string(), json!(["a", "b"])),
            ],
        );
        assert_eq!(
            restructured,
            vec![
                ("_id".to_string(), vec![json!("abc")]),
                ("name".to_string(), vec![json!("a"), json!("b")]),
            ]
        );
    }

    #[test]
    fn test_validate_fields_lists_every_unknown_name() {
        let class = item_class();
        let err = validate_fields(&class, ["zeta", "name", "alpha"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "'Item' object does not have fields: alpha, zeta"
        );
        assert!(validate_fields(&class, ["_id", "name"]).is_ok());
    }
}
