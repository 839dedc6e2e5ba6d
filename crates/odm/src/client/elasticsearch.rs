//! Elasticsearch search client.

use std::time::Duration;

use async_trait::async_trait;
use elasticsearch::auth::Credentials;
use elasticsearch::cert::CertificateValidation;
use elasticsearch::http::request::JsonBody;
use elasticsearch::http::response::Response;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use elasticsearch::indices::{IndicesCreateParts, IndicesDeleteParts, IndicesExistsParts};
use elasticsearch::params::Refresh;
use elasticsearch::{
    BulkParts, CountParts, DeleteParts, Elasticsearch, GetParts, IndexParts, SearchParts,
};
use serde_json::{Value as Json, json};

use crate::config::{ElasticsearchAuth, ElasticsearchConfig};
use crate::error::BackendError;

use super::{BulkAction, BulkResponse, Hit, SearchClient, SearchResponse};

const BACKEND_NAME: &str = "elasticsearch";

fn internal_error(message: String) -> BackendError {
    BackendError::Internal {
        backend_name: BACKEND_NAME.to_string(),
        message,
        source: None,
    }
}

fn refresh_param(refresh: bool) -> Refresh {
    if refresh { Refresh::True } else { Refresh::False }
}

/// [`SearchClient`] backed by an Elasticsearch cluster.
pub struct ElasticsearchClient {
    client: Elasticsearch,
    config: ElasticsearchConfig,
}

impl std::fmt::Debug for ElasticsearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchClient")
            .field("hosts", &self.config.hosts)
            .field("index_prefix", &self.config.index_prefix)
            .finish_non_exhaustive()
    }
}

impl ElasticsearchClient {
    /// Creates a client for the first configured host.
    pub fn new(config: ElasticsearchConfig) -> Result<Self, BackendError> {
        let client = Self::build_client(&config)?;
        Ok(Self { client, config })
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &ElasticsearchConfig {
        &self.config
    }

    fn build_client(config: &ElasticsearchConfig) -> Result<Elasticsearch, BackendError> {
        let url = config
            .hosts
            .first()
            .cloned()
            .unwrap_or_else(|| "http://localhost:9200".to_string());
        if config.hosts.len() > 1 || config.sniff {
            tracing::warn!(
                "Connecting to '{}' only; additional hosts and sniffing are not used",
                url
            );
        }

        let parsed_url: elasticsearch::http::Url =
            url.parse().map_err(|e| BackendError::ConnectionFailed {
                backend_name: BACKEND_NAME.to_string(),
                message: format!("Invalid URL: {}", e),
            })?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let mut builder = TransportBuilder::new(conn_pool)
            .timeout(Duration::from_millis(config.request_timeout_ms));

        if config.disable_certificate_validation {
            builder = builder.cert_validation(CertificateValidation::None);
        }

        if let Some(auth) = &config.auth {
            builder = match auth {
                ElasticsearchAuth::Basic { username, password } => {
                    builder.auth(Credentials::Basic(username.clone(), password.clone()))
                }
                ElasticsearchAuth::Bearer { token } => {
                    builder.auth(Credentials::Bearer(token.clone()))
                }
            };
        }

        let transport = builder
            .build()
            .map_err(|e| BackendError::ConnectionFailed {
                backend_name: BACKEND_NAME.to_string(),
                message: format!("Failed to build transport: {}", e),
            })?;

        Ok(Elasticsearch::new(transport))
    }

    /// Maps an unsuccessful response to an error kind.
    async fn failure(response: Response, action: &str) -> BackendError {
        let status = response.status_code().as_u16();
        let body = response.text().await.unwrap_or_default();
        match status {
            400 => BackendError::BadQuery {
                backend_name: BACKEND_NAME.to_string(),
                message: format!("{} rejected: {}", action, body),
            },
            404 => BackendError::NotFound {
                backend_name: BACKEND_NAME.to_string(),
                target: body,
            },
            _ => internal_error(format!("{} failed (status {}): {}", action, status, body)),
        }
    }

    async fn json_body(response: Response, action: &str) -> Result<Json, BackendError> {
        response
            .json::<Json>()
            .await
            .map_err(|e| internal_error(format!("Failed to parse {} response: {}", action, e)))
    }
}

fn parse_hit(hit: &Json) -> Option<Hit> {
    let id = hit.get("_id")?.as_str()?.to_string();
    let source = hit
        .get("_source")
        .and_then(Json::as_object)
        .cloned()
        .unwrap_or_default();
    Some(Hit { id, source })
}

#[async_trait]
impl SearchClient for ElasticsearchClient {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn index_exists(&self, index: &str) -> Result<bool, BackendError> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to check index existence: {}", e)))?;
        Ok(response.status_code().is_success())
    }

    async fn create_index(&self, index: &str, mappings: Json) -> Result<(), BackendError> {
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(json!({ "mappings": mappings }))
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to create index {}: {}", index, e)))?;

        if !response.status_code().is_success() {
            return Err(Self::failure(response, "create index").await);
        }
        tracing::info!("Created Elasticsearch index '{}'", index);
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<(), BackendError> {
        let response = self
            .client
            .indices()
            .delete(IndicesDeleteParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to delete index {}: {}", index, e)))?;

        if !response.status_code().is_success() {
            return Err(Self::failure(response, "delete index").await);
        }
        Ok(())
    }

    async fn search(&self, index: &str, body: Json) -> Result<SearchResponse, BackendError> {
        let response = self
            .client
            .search(SearchParts::Index(&[index]))
            .body(body)
            .send()
            .await
            .map_err(|e| internal_error(format!("Search failed: {}", e)))?;

        if !response.status_code().is_success() {
            let error = Self::failure(response, "search").await;
            // A missing index holds no documents.
            if let BackendError::NotFound { target, .. } = &error
                && target.contains("index_not_found_exception")
            {
                tracing::debug!("Index '{}' does not exist, returning no hits", index);
                return Ok(SearchResponse::default());
            }
            return Err(error);
        }

        let body = Self::json_body(response, "search").await?;
        let hits = body
            .get("hits")
            .and_then(|h| h.get("hits"))
            .and_then(Json::as_array)
            .map(|hits| hits.iter().filter_map(parse_hit).collect())
            .unwrap_or_default();
        let total = body
            .get("hits")
            .and_then(|h| h.get("total"))
            .and_then(|t| t.get("value").or(Some(t)))
            .and_then(Json::as_u64)
            .unwrap_or(0);

        Ok(SearchResponse { total, hits })
    }

    async fn count(&self, index: &str, body: Json) -> Result<u64, BackendError> {
        let response = self
            .client
            .count(CountParts::Index(&[index]))
            .body(body)
            .send()
            .await
            .map_err(|e| internal_error(format!("Count failed: {}", e)))?;

        if !response.status_code().is_success() {
            return match Self::failure(response, "count").await {
                BackendError::NotFound { .. } => Ok(0),
                other => Err(other),
            };
        }
        let body = Self::json_body(response, "count").await?;
        Ok(body.get("count").and_then(Json::as_u64).unwrap_or(0))
    }

    async fn get(&self, index: &str, id: &str) -> Result<Option<Hit>, BackendError> {
        let response = self
            .client
            .get(GetParts::IndexId(index, id))
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to get document: {}", e)))?;

        if response.status_code().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status_code().is_success() {
            return Err(Self::failure(response, "get").await);
        }
        let body = Self::json_body(response, "get").await?;
        Ok(parse_hit(&body))
    }

    async fn index(
        &self,
        index: &str,
        id: Option<&str>,
        source: Json,
        refresh: bool,
    ) -> Result<String, BackendError> {
        let parts = match id {
            Some(id) => IndexParts::IndexId(index, id),
            None => IndexParts::Index(index),
        };
        let response = self
            .client
            .index(parts)
            .body(source)
            .refresh(refresh_param(refresh))
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to index document: {}", e)))?;

        if !response.status_code().is_success() {
            return Err(Self::failure(response, "index").await);
        }
        let body = Self::json_body(response, "index").await?;
        body.get("_id")
            .and_then(Json::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| internal_error("Index response carries no _id".to_string()))
    }

    async fn delete(&self, index: &str, id: &str, refresh: bool) -> Result<(), BackendError> {
        let response = self
            .client
            .delete(DeleteParts::IndexId(index, id))
            .refresh(refresh_param(refresh))
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to delete document: {}", e)))?;

        if !response.status_code().is_success() {
            return Err(Self::failure(response, "delete").await);
        }
        Ok(())
    }

    async fn bulk(
        &self,
        actions: Vec<BulkAction>,
        refresh: bool,
    ) -> Result<BulkResponse, BackendError> {
        let body: Vec<JsonBody<Json>> = actions
            .iter()
            .flat_map(BulkAction::to_lines)
            .map(JsonBody::new)
            .collect();

        let mut request = self.client.bulk(BulkParts::None).body(body);
        if refresh {
            request = request.refresh(Refresh::True);
        }
        let response = request
            .send()
            .await
            .map_err(|e| internal_error(format!("Bulk request failed: {}", e)))?;

        if !response.status_code().is_success() {
            return Err(Self::failure(response, "bulk").await);
        }

        let body = Self::json_body(response, "bulk").await?;
        let mut result = BulkResponse::default();
        for item in body
            .get("items")
            .and_then(Json::as_array)
            .into_iter()
            .flatten()
        {
            let outcome = item.as_object().and_then(|item| item.values().next());
            match outcome.and_then(|outcome| outcome.get("error")) {
                Some(error) => result.errors.push(error.to_string()),
                None => result.executed += 1,
            }
        }
        Ok(result)
    }
}
