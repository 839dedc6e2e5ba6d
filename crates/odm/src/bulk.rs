//! Batched writes over several persisted documents.

use serde_json::Value as Json;

use crate::client::BulkAction;
use crate::document::{Document, FieldUpdate, flatten_params};
use crate::error::{BulkError, DocumentError, OdmResult};
use crate::query::Collection;
use crate::types::RequestContext;

/// Request parameter asking for an index refresh after a bulk write.
pub const REFRESH_INDEX_PARAM: &str = "_refresh_index";

impl Collection {
    /// Applies the same partial update to every document in one batched write.
    ///
    /// Relationship values are reduced to their keys before sending. Returns the number
    /// of actions the store applied. Per-action failures are collected and returned as a
    /// single [`BulkError::Failed`].
    pub async fn update_many<I, K>(
        &self,
        documents: &[Document],
        params: I,
        request: Option<&RequestContext>,
    ) -> OdmResult<usize>
    where
        I: IntoIterator<Item = (K, FieldUpdate)>,
        K: Into<String>,
    {
        if documents.is_empty() {
            return Ok(0);
        }
        let doc = Json::Object(flatten_params(self.class(), params)?);
        let actions = self.actions(documents, |index, id| {
            BulkAction::update(index, id, doc.clone())
        })?;
        self.execute(actions, request).await
    }

    /// Deletes every document in one batched write.
    pub async fn delete_many(
        &self,
        documents: &[Document],
        request: Option<&RequestContext>,
    ) -> OdmResult<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        let actions = self.actions(documents, |index, id| BulkAction::delete(index, id))?;
        self.execute(actions, request).await
    }

    fn actions<F>(&self, documents: &[Document], build: F) -> OdmResult<Vec<BulkAction>>
    where
        F: Fn(String, String) -> BulkAction,
    {
        documents
            .iter()
            .map(|document| {
                let id = document.id().ok_or_else(|| DocumentError::NotPersisted {
                    class: document.class_name().to_string(),
                })?;
                let index = self.database().index_name(document.class());
                Ok(build(index, id))
            })
            .collect()
    }

    async fn execute(
        &self,
        actions: Vec<BulkAction>,
        request: Option<&RequestContext>,
    ) -> OdmResult<usize> {
        let config = self.database().config();
        let refresh = match request {
            Some(request) if config.enable_refresh_query => {
                request.bool_param(REFRESH_INDEX_PARAM)?.unwrap_or(false)
            }
            _ => false,
        };

        let total = actions.len();
        let chunk_size = config.chunk_size.max(1);
        let mut executed = 0;
        let mut errors = Vec::new();
        let mut chunks = actions.into_iter().peekable();
        while chunks.peek().is_some() {
            let chunk: Vec<BulkAction> = chunks.by_ref().take(chunk_size).collect();
            let response = self.database().client().bulk(chunk, refresh).await?;
            executed += response.executed;
            errors.extend(response.errors);
        }

        if !errors.is_empty() {
            tracing::warn!(
                "Bulk write on '{}' failed for {} of {} actions",
                self.class().name(),
                errors.len(),
                total
            );
            return Err(BulkError::Failed { executed, errors }.into());
        }
        tracing::debug!(
            "Bulk write on '{}' executed {} actions (refresh: {})",
            self.class().name(),
            executed,
            refresh
        );
        Ok(executed)
    }
}
