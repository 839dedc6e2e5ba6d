//! Shared fixtures for the document layer integration tests.
//!
//! Every test gets a fresh [`InMemoryClient`] and a schema with:
//!
//! - `Story` (primary key `name`): single `author` → `Person.story`, multi `tags` ↔
//!   `Tag.stories`, expandable `author` and `tags`
//! - `Person` (primary key `name`), with `age`
//! - `Tag` (primary key `name`)
//! - `Parent` (primary key `name`): multi `children` → single `Person.parent`
//! - `Item` (primary key `id`, mirroring the store identity) with scalar fields
//! - `Post` and `User` (both keyed by store identity): single `owner` → single `User.post`

#![allow(dead_code)]

use std::sync::Arc;

use helios_odm::client::InMemoryClient;
use helios_odm::config::ElasticsearchConfig;
use helios_odm::database::Database;
use helios_odm::document::Document;
use helios_odm::fields::Field;
use helios_odm::query::CollectionQuery;
use helios_odm::schema::{DocumentClass, SchemaRegistry};

/// A database over a fresh in-memory store.
pub struct TestDb {
    pub db: Arc<Database>,
    pub client: Arc<InMemoryClient>,
}

pub fn registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry
        .register(
            DocumentClass::builder("Story")
                .field(Field::string("name").primary_key())
                .field(Field::text("title"))
                .field(Field::reference("author", "Person").back_populates("story"))
                .field(
                    Field::reference("tags", "Tag")
                        .multi()
                        .back_populates("stories")
                        .backref_multi(),
                )
                .nested_relationships(["author", "tags"]),
        )
        .register(
            DocumentClass::builder("Person")
                .field(Field::string("name").primary_key())
                .field(Field::integer("age")),
        )
        .register(DocumentClass::builder("Tag").field(Field::string("name").primary_key()))
        .register(
            DocumentClass::builder("Parent")
                .field(Field::string("name").primary_key())
                .field(
                    Field::reference("children", "Person")
                        .multi()
                        .back_populates("parent"),
                ),
        )
        .register(
            DocumentClass::builder("Item")
                .field(Field::id("id").primary_key())
                .field(Field::string("name"))
                .field(Field::text("description"))
                .field(Field::integer("price"))
                .field(Field::boolean("active")),
        )
        .register(
            DocumentClass::builder("Post")
                .field(Field::id("id").primary_key())
                .field(Field::string("title"))
                .field(Field::reference("owner", "User").back_populates("post")),
        )
        .register(
            DocumentClass::builder("User")
                .field(Field::id("id").primary_key())
                .field(Field::string("name")),
        );
    registry
}

pub fn test_db() -> TestDb {
    test_db_with_config(ElasticsearchConfig::default())
}

pub fn test_db_with_config(config: ElasticsearchConfig) -> TestDb {
    let client = Arc::new(InMemoryClient::new());
    let schema = registry().finalize().expect("schema should finalize");
    let db = Database::new(schema, client.clone(), config);
    TestDb { db, client }
}

/// Creates and saves a document keyed by `name`.
pub async fn named(db: &Arc<Database>, class: &str, name: &str) -> Document {
    let document = db.create(class).expect("class is registered");
    document.set_value("name", name).expect("name is a string");
    document.save().await.expect("save should succeed");
    document
}

/// Creates and saves an `Item`.
pub async fn item(db: &Arc<Database>, name: &str, price: i64, active: bool) -> Document {
    let document = db.create("Item").expect("class is registered");
    document.set_value("name", name).unwrap();
    document.set_value("price", price).unwrap();
    document.set_value("active", active).unwrap();
    document.save().await.expect("save should succeed");
    document
}

/// Reads a document back from the store by primary key.
pub async fn fetch(db: &Arc<Database>, class: &str, name: &str) -> Document {
    db.collection(class)
        .expect("class is registered")
        .get_item(CollectionQuery::new().param("name", name), true)
        .await
        .expect("lookup should succeed")
        .expect("document should exist")
}

/// Primary keys held by a relationship field, as stored.
pub fn keys(document: &Document, field: &str) -> Vec<String> {
    document
        .related_items(field)
        .expect("relationship field")
        .iter()
        .map(|item| item.pk().to_string())
        .collect()
}
