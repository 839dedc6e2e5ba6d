//! Helios Document Mapping Layer
//!
//! This crate maps typed document classes onto a search-index store with relational-style
//! relationships. Documents declare typed fields, reference each other by key, and keep
//! both sides of a bidirectional relationship consistent on save.
//!
//! # Architecture
//!
//! - [`fields`] - Field descriptors, value coercion and index mappings
//! - [`schema`] - Class registration and inverse relationship wiring
//! - [`document`] - Document instances: lazy relationship loading, relationship hooks,
//!   save protocol and serialisation
//! - [`query`] - The collection query compiler
//! - [`bulk`] - Batched multi-document updates and deletes
//! - [`client`] - The store client trait with in-memory and Elasticsearch implementations
//! - [`config`] - Store configuration
//! - [`error`] - Error types for all operations
//!
//! # Features
//!
//! - `elasticsearch` - Enables [`client::ElasticsearchClient`]
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use helios_odm::client::InMemoryClient;
//! use helios_odm::config::ElasticsearchConfig;
//! use helios_odm::database::Database;
//! use helios_odm::fields::Field;
//! use helios_odm::query::CollectionQuery;
//! use helios_odm::schema::{DocumentClass, SchemaRegistry};
//!
//! # async fn run() -> helios_odm::OdmResult<()> {
//! let mut registry = SchemaRegistry::new();
//! registry
//!     .register(
//!         DocumentClass::builder("Story")
//!             .field(Field::string("name").primary_key())
//!             .field(Field::reference("author", "Person").back_populates("story")),
//!     )
//!     .register(DocumentClass::builder("Person").field(Field::string("name").primary_key()));
//!
//! let db = Database::new(
//!     registry.finalize()?,
//!     Arc::new(InMemoryClient::new()),
//!     ElasticsearchConfig::default(),
//! );
//!
//! let author = db.create("Person")?;
//! author.set_value("name", "Ann")?;
//! author.save().await?;
//!
//! let story = db.create("Story")?;
//! story.set_value("name", "Moby")?;
//! story.set_related("author", [author.clone()]).await?;
//! story.save().await?;
//!
//! let found = db
//!     .collection("Person")?
//!     .get_item(CollectionQuery::new().param("name", "Ann"), true)
//!     .await?;
//! assert!(found.is_some());
//! # Ok(())
//! # }
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

pub mod bulk;
pub mod client;
pub mod config;
pub mod database;
pub mod document;
pub mod error;
pub mod fields;
pub mod query;
pub mod schema;
pub mod types;

pub use client::{InMemoryClient, SearchClient};
pub use config::ElasticsearchConfig;
pub use database::Database;
pub use document::{Document, FieldUpdate, RelatedItem};
pub use error::{OdmError, OdmResult};
pub use query::{Collection, CollectionQuery, CollectionResponse};
pub use schema::{DocumentClass, Schema, SchemaRegistry};
pub use types::{RequestContext, Value};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
