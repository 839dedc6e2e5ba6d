//! The database handle tying a schema to a store client.

use std::fmt;
use std::sync::Arc;

use crate::client::SearchClient;
use crate::config::ElasticsearchConfig;
use crate::document::Document;
use crate::error::OdmResult;
use crate::query::Collection;
use crate::schema::{DocumentClass, Schema};

/// Shared entry point for documents and collections.
///
/// Constructed once at startup and shared as an `Arc`. Every document and collection
/// keeps a reference to it for store access and configuration.
pub struct Database {
    schema: Schema,
    client: Arc<dyn SearchClient>,
    config: ElasticsearchConfig,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("classes", &self.schema.len())
            .field("backend", &self.client.backend_name())
            .field("index_prefix", &self.config.index_prefix)
            .finish()
    }
}

impl Database {
    pub fn new(
        schema: Schema,
        client: Arc<dyn SearchClient>,
        config: ElasticsearchConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            schema,
            client,
            config,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn client(&self) -> &Arc<dyn SearchClient> {
        &self.client
    }

    pub fn config(&self) -> &ElasticsearchConfig {
        &self.config
    }

    /// Looks up a registered class.
    pub fn class(&self, name: &str) -> OdmResult<Arc<DocumentClass>> {
        Ok(self.schema.class(name)?.clone())
    }

    /// Index holding documents of `class`: the class's own index if it declares one,
    /// otherwise `{index_prefix}_{class name in lowercase}`.
    pub fn index_name(&self, class: &DocumentClass) -> String {
        match class.index() {
            Some(index) => index.to_string(),
            None => self.config.index_name(class.name()),
        }
    }

    /// Creates an unsaved document of the named class.
    pub fn create(self: &Arc<Self>, class: &str) -> OdmResult<Document> {
        Ok(Document::new(self.clone(), self.class(class)?))
    }

    /// The query entry point for the named class.
    pub fn collection(self: &Arc<Self>, class: &str) -> OdmResult<Collection> {
        Ok(Collection::new(self.clone(), self.class(class)?))
    }

    /// Creates the index of every registered class that does not have one yet, using the
    /// class mapping.
    pub async fn setup_index(&self) -> OdmResult<()> {
        for class in self.schema.classes() {
            let index = self.index_name(class);
            if self.client.index_exists(&index).await? {
                tracing::debug!("Index '{}' already exists", index);
                continue;
            }
            self.client.create_index(&index, class.mapping()).await?;
            tracing::info!("Created index '{}' for '{}'", index, class.name());
        }
        Ok(())
    }
}
