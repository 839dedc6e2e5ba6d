//! Bulk update and delete tests.

mod common;

use helios_odm::config::ElasticsearchConfig;
use helios_odm::document::FieldUpdate;
use helios_odm::error::{BulkError, DocumentError, OdmError};
use helios_odm::query::CollectionQuery;
use helios_odm::types::{RequestContext, Value};

use common::{fetch, item, keys, named, test_db, test_db_with_config};

#[tokio::test]
async fn test_empty_update_makes_no_store_call() {
    let t = test_db();
    let collection = t.db.collection("Item").unwrap();
    let before = t.client.request_count();

    let executed = collection
        .update_many(&[], [("price", FieldUpdate::from(1_i64))], None)
        .await
        .unwrap();
    assert_eq!(executed, 0);
    assert_eq!(collection.delete_many(&[], None).await.unwrap(), 0);
    assert_eq!(t.client.request_count(), before);
}

#[tokio::test]
async fn test_update_many() {
    let t = test_db();
    let a = item(&t.db, "a", 10, true).await;
    let b = item(&t.db, "b", 20, true).await;
    item(&t.db, "c", 30, true).await;

    let collection = t.db.collection("Item").unwrap();
    let executed = collection
        .update_many(
            &[a, b],
            [
                ("active", FieldUpdate::from(false)),
                ("price", FieldUpdate::from("99")),
            ],
            None,
        )
        .await
        .unwrap();
    assert_eq!(executed, 2);

    let hits = collection
        .get_collection(CollectionQuery::new().param("active", false))
        .await
        .unwrap()
        .into_hits()
        .unwrap();
    assert_eq!(hits.total(), 2);
    assert!(hits.iter().all(|doc| doc.get("price").unwrap() == Value::Int(99)));
}

#[tokio::test]
async fn test_update_many_flattens_relationships() {
    let t = test_db();
    let ann = named(&t.db, "Person", "ann").await;
    let rust = named(&t.db, "Tag", "rust").await;
    let moby = named(&t.db, "Story", "moby").await;
    let dune = named(&t.db, "Story", "dune").await;

    let stories = t.db.collection("Story").unwrap();
    stories
        .update_many(
            &[moby.clone(), dune],
            [
                ("author", FieldUpdate::from(ann)),
                ("tags", FieldUpdate::from(vec![rust])),
            ],
            None,
        )
        .await
        .unwrap();

    let stored = fetch(&t.db, "Story", "dune").await;
    assert_eq!(stored.get("author").unwrap(), Value::Str("ann".to_string()));
    assert_eq!(keys(&stored, "tags"), vec!["rust"]);

    // An empty relationship is written explicitly.
    stories
        .update_many(
            &[moby],
            [
                ("author", FieldUpdate::Related(Vec::new())),
                ("tags", FieldUpdate::Related(Vec::new())),
            ],
            None,
        )
        .await
        .unwrap();
    let stored = fetch(&t.db, "Story", "moby").await;
    assert_eq!(stored.get("author").unwrap(), Value::Null);
    assert!(keys(&stored, "tags").is_empty());
}

#[tokio::test]
async fn test_delete_many() {
    let t = test_db();
    let a = item(&t.db, "a", 10, true).await;
    let b = item(&t.db, "b", 20, true).await;
    item(&t.db, "c", 30, true).await;

    let executed = t
        .db
        .collection("Item")
        .unwrap()
        .delete_many(&[a, b], None)
        .await
        .unwrap();
    assert_eq!(executed, 2);
    assert_eq!(t.client.document_count("helios_item"), 1);
}

#[tokio::test]
async fn test_unsaved_documents_are_rejected() {
    let t = test_db();
    let unsaved = t.db.create("Item").unwrap();
    let err = t
        .db
        .collection("Item")
        .unwrap()
        .delete_many(&[unsaved], None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OdmError::Document(DocumentError::NotPersisted { .. })
    ));
}

#[tokio::test]
async fn test_every_failure_is_reported() {
    let t = test_db();
    let a = item(&t.db, "a", 10, true).await;
    let b = item(&t.db, "b", 20, true).await;
    let c = item(&t.db, "c", 30, true).await;
    a.delete().await.unwrap();
    b.delete().await.unwrap();

    let err = t
        .db
        .collection("Item")
        .unwrap()
        .update_many(&[a, b, c], [("price", FieldUpdate::from(1_i64))], None)
        .await
        .unwrap_err();
    match err {
        OdmError::Bulk(BulkError::Failed { executed, errors }) => {
            assert_eq!(executed, 1);
            assert_eq!(errors.len(), 2);
        }
        other => panic!("expected a bulk failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_actions_are_chunked() {
    let config = ElasticsearchConfig {
        chunk_size: 2,
        ..ElasticsearchConfig::default()
    };
    let t = test_db_with_config(config);
    let mut documents = Vec::new();
    for (i, name) in ["a", "b", "c", "d", "e"].into_iter().enumerate() {
        documents.push(item(&t.db, name, i as i64, true).await);
    }

    let before = t.client.request_count();
    let executed = t
        .db
        .collection("Item")
        .unwrap()
        .delete_many(&documents, None)
        .await
        .unwrap();
    assert_eq!(executed, 5);
    assert_eq!(t.client.request_count(), before + 3);
}

#[tokio::test]
async fn test_refresh_flag_needs_configuration() {
    let t = test_db();
    let a = item(&t.db, "a", 10, true).await;
    let request = RequestContext::new().with_param("_refresh_index", "maybe");

    // Ignored unless refresh queries are enabled.
    t.db.collection("Item")
        .unwrap()
        .update_many(&[a], [("price", FieldUpdate::from(1_i64))], Some(&request))
        .await
        .unwrap();

    let config = ElasticsearchConfig {
        enable_refresh_query: true,
        ..ElasticsearchConfig::default()
    };
    let t = test_db_with_config(config);
    let b = item(&t.db, "b", 10, true).await;
    let err = t
        .db
        .collection("Item")
        .unwrap()
        .update_many(&[b], [("price", FieldUpdate::from(1_i64))], Some(&request))
        .await
        .unwrap_err();
    assert!(err.is_bad_request());
}
