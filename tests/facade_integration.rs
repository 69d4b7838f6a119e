//! Integration tests for the client facade against the in-memory driver.

use std::sync::Arc;

use futures::TryStreamExt;
use mongo_facade::prelude::*;
use mongo_facade::{ErrorKind, MemoryDriver};
use pretty_assertions::assert_eq;

const NAME: &str = "test";

async fn connected() -> Client {
    let client = Client::in_memory(FacadeConfig::new("localhost", 27017, "test")).unwrap();
    client.connect().await.unwrap();
    client
}

async fn seed(client: &Client, docs: Vec<Document>) -> InsertManyResult {
    client
        .insert_many(NAME, InsertManyArgs::docs(docs))
        .await
        .unwrap()
}

fn titles(docs: &[Document]) -> Vec<&str> {
    docs.iter().map(|d| d.get_str("title").unwrap()).collect()
}

// ==================== Lifecycle ====================

mod lifecycle {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_connect_publishes_state() {
        let client = Client::in_memory(FacadeConfig::new("localhost", 27017, "test")).unwrap();
        let mut rx = client.subscribe();
        assert_eq!(*rx.borrow(), ConnectionState::Idle);

        client.connect().await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), ConnectionState::Connected);

        // Late subscribers still see the connected state.
        assert_eq!(*client.subscribe().borrow(), ConnectionState::Connected);
        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_without_connect_is_noop() {
        let client = Client::in_memory(FacadeConfig::new("localhost", 27017, "test")).unwrap();
        client.close().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_operations_after_close_fail() {
        let client = connected().await;
        client.close().await.unwrap();

        let err = client
            .find(NAME, FindArgs::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FacadeError::Closed));
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn test_shared_driver() {
        let driver = Arc::new(MemoryDriver::new("shared"));
        let client = Client::with_driver(
            FacadeConfig::new("localhost", 27017, "shared"),
            driver.clone(),
        )
        .unwrap();
        client.connect().await.unwrap();
        assert_eq!(client.database_name(), "shared");

        client
            .insert_one(NAME, InsertOneArgs::doc(doc! { "title": "x" }))
            .await
            .unwrap();
        assert_eq!(driver.documents(NAME).len(), 1);
    }
}

// ==================== insert_one / insert_many ====================

mod insert {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_insert_one() {
        let client = connected().await;
        let result = client
            .insert_one(NAME, InsertOneArgs::doc(doc! { "title": "new doc" }))
            .await
            .unwrap();

        assert!(result.acknowledged);
        assert_eq!(result.inserted_count, 1);
        assert!(matches!(result.inserted_id, Bson::ObjectId(_)));
        assert_eq!(result.ops.len(), 1);
        assert_eq!(result.ops[0].get("_id"), Some(&result.inserted_id));
        assert_eq!(result.ops[0].get_str("title").unwrap(), "new doc");
    }

    #[tokio::test]
    async fn test_insert_empty_document() {
        let client = connected().await;
        let result = client
            .insert_one(NAME, InsertOneArgs::default())
            .await
            .unwrap();

        assert_eq!(result.inserted_count, 1);
        assert!(matches!(result.inserted_id, Bson::ObjectId(_)));
        assert!(result.ops[0].contains_key("_id"));
        assert_eq!(client.count(NAME, CountArgs::default()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_keeps_explicit_id() {
        let client = connected().await;
        let result = client
            .insert_one(NAME, InsertOneArgs::doc(doc! { "_id": "mine" }))
            .await
            .unwrap();
        assert_eq!(result.inserted_id, Bson::String("mine".into()));

        let err = client
            .insert_one(NAME, InsertOneArgs::doc(doc! { "_id": "mine" }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(11000));
        assert_eq!(err.kind(), ErrorKind::Operation);
    }

    #[tokio::test]
    async fn test_insert_many() {
        let client = connected().await;
        let result = seed(
            &client,
            vec![
                doc! { "title": "doc1" },
                doc! { "title": "doc2" },
                doc! { "title": "doc3" },
            ],
        )
        .await;

        assert_eq!(result.inserted_count, 3);
        assert_eq!(result.inserted_ids.len(), 3);
        assert_eq!(
            result.inserted_ids.keys().copied().collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(titles(&result.ops), vec!["doc1", "doc2", "doc3"]);
        for (i, op) in result.ops.iter().enumerate() {
            assert_eq!(op.get("_id"), result.inserted_ids.get(&i));
        }
    }

    #[tokio::test]
    async fn test_insert_many_requires_docs() {
        let client = connected().await;
        let err = client
            .insert_many(NAME, InsertManyArgs::default())
            .await
            .unwrap_err();
        assert!(err.is_argument());
        assert_eq!(err.to_string(), "docs parameter must be an array of documents");

        let err = client
            .insert_many(NAME, InsertManyArgs::docs(vec![]))
            .await
            .unwrap_err();
        assert!(err.is_argument());
        assert_eq!(client.count(NAME, CountArgs::default()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_collection_name() {
        let client = connected().await;
        let err = client
            .insert_one("", InsertOneArgs::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "collection names cannot be empty");
    }
}

// ==================== find / count / distinct ====================

mod query {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn indexed() -> Client {
        let client = connected().await;
        seed(
            &client,
            vec![
                doc! { "index": 1, "type": "doc" },
                doc! { "index": 2, "type": "doc" },
                doc! { "index": 3, "type": "doc" },
            ],
        )
        .await;
        client
    }

    async fn find_docs(client: &Client, args: FindArgs) -> Vec<Document> {
        let output = client.find(NAME, args).await.unwrap();
        assert!(!output.is_cursor());
        output.into_documents().await.unwrap()
    }

    #[tokio::test]
    async fn test_find_with_query() {
        let client = indexed().await;
        let docs = find_docs(&client, FindArgs::new().query(doc! { "type": "doc" })).await;
        assert_eq!(docs.len(), 3);
    }

    #[tokio::test]
    async fn test_find_empty_args() {
        let client = indexed().await;
        assert_eq!(find_docs(&client, FindArgs::default()).await.len(), 3);
    }

    #[tokio::test]
    async fn test_find_limit_and_skip() {
        let client = indexed().await;
        assert_eq!(find_docs(&client, FindArgs::new().limit(1)).await.len(), 1);
        assert_eq!(find_docs(&client, FindArgs::new().skip(1)).await.len(), 2);

        let docs = find_docs(&client, FindArgs::new().skip(1).limit(1)).await;
        assert_eq!(docs[0].get_i32("index").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_find_projection() {
        let client = indexed().await;
        let docs = find_docs(&client, FindArgs::new().projection(doc! { "index": 1 })).await;
        assert!(docs[0].contains_key("index"));
        assert!(docs[0].contains_key("_id"));
        assert!(!docs[0].contains_key("type"));
    }

    #[tokio::test]
    #[allow(deprecated)]
    async fn test_find_deprecated_project_alias() {
        let client = indexed().await;
        let docs = find_docs(&client, FindArgs::new().project(doc! { "index": 1 })).await;
        assert!(docs[0].contains_key("index"));
        assert!(!docs[0].contains_key("type"));
    }

    #[tokio::test]
    async fn test_find_sort() {
        let client = indexed().await;
        let docs = find_docs(&client, FindArgs::new().sort(doc! { "index": -1 })).await;
        let order: Vec<i32> = docs.iter().map(|d| d.get_i32("index").unwrap()).collect();
        assert_eq!(order, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_find_cursor() {
        let client = indexed().await;
        let output = client
            .find(NAME, FindArgs::new().cursor(true))
            .await
            .unwrap();
        assert!(output.is_cursor());
        assert!(output.documents().is_none());

        let cursor = output.into_cursor().unwrap();
        let docs: Vec<Document> = cursor.try_collect().await.unwrap();
        assert_eq!(docs.len(), 3);
    }

    #[tokio::test]
    async fn test_count() {
        let client = connected().await;
        seed(
            &client,
            vec![
                doc! { "type": "doc" },
                doc! { "type": "doc" },
                doc! { "type": "text" },
                doc! { "type": "text" },
            ],
        )
        .await;

        let n = client
            .count(NAME, CountArgs::query(doc! { "type": "doc" }))
            .await
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(client.count(NAME, CountArgs::default()).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_distinct() {
        let client = connected().await;
        seed(
            &client,
            vec![
                doc! { "type": "doc" },
                doc! { "type": "doc" },
                doc! { "type": "text" },
                doc! { "type": "text" },
            ],
        )
        .await;

        let values = client
            .distinct(NAME, DistinctArgs::key("type"))
            .await
            .unwrap();
        assert_eq!(values, vec![Bson::from("doc"), Bson::from("text")]);

        let values = client
            .distinct(NAME, DistinctArgs::key("type").query(doc! { "type": "doc" }))
            .await
            .unwrap();
        assert_eq!(values, vec![Bson::from("doc")]);
    }

    #[tokio::test]
    async fn test_distinct_requires_key() {
        let client = connected().await;
        let err = client
            .distinct(NAME, DistinctArgs::default())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "\"key\" had the wrong type. Expected string, found null"
        );
    }
}

// ==================== update_many / delete_many ====================

mod write {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn typed() -> Client {
        let client = connected().await;
        seed(
            &client,
            vec![
                doc! { "title": "doc1", "type": "doc" },
                doc! { "title": "doc2", "type": "doc" },
                doc! { "title": "doc3", "type": "text" },
                doc! { "title": "doc4", "type": "text" },
            ],
        )
        .await;
        client
    }

    #[tokio::test]
    async fn test_update_many() {
        let client = typed().await;
        let result = client
            .update_many(
                NAME,
                UpdateManyArgs::new(doc! { "type": "doc" }, doc! { "$set": { "type": "update" } }),
            )
            .await
            .unwrap();

        assert_eq!(result.matched_count, 2);
        assert_eq!(result.modified_count, 2);
        assert_eq!(result.upserted_count, 0);
        assert_eq!(result.upserted_id, None);

        let n = client
            .count(NAME, CountArgs::query(doc! { "type": "update" }))
            .await
            .unwrap();
        assert_eq!(n, 2);
    }

    #[tokio::test]
    async fn test_rejected_filter_leaves_documents_untouched() {
        let client = typed().await;
        let before = client
            .find(NAME, FindArgs::new())
            .await
            .unwrap()
            .into_documents()
            .await
            .unwrap();

        let err = client
            .delete_many(NAME, DeleteManyArgs::filter(doc! { "type": { "$regex": "doc" } }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Operation);
        assert_eq!(err.to_string(), "unknown operator: $regex");

        let err = client
            .update_many(
                NAME,
                UpdateManyArgs::new(
                    doc! { "type": { "$regex": "doc" } },
                    doc! { "$set": { "type": "update" } },
                ),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Operation);

        let n = client.count(NAME, CountArgs::default()).await.unwrap();
        assert_eq!(n, 4);
        let after = client
            .find(NAME, FindArgs::new())
            .await
            .unwrap()
            .into_documents()
            .await
            .unwrap();
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn test_update_many_all() {
        let client = typed().await;
        let result = client
            .update_many(
                NAME,
                UpdateManyArgs::new(doc! {}, doc! { "$set": { "type": "update" } }),
            )
            .await
            .unwrap();
        assert_eq!(result.matched_count, 4);
        assert_eq!(result.modified_count, 4);
    }

    #[tokio::test]
    async fn test_update_many_upsert() {
        let client = typed().await;
        let result = client
            .update_many(
                NAME,
                UpdateManyArgs::new(doc! { "doc": "doc5" }, doc! { "$set": { "type": "update" } })
                    .upsert(true),
            )
            .await
            .unwrap();

        assert_eq!(result.matched_count, 0);
        assert_eq!(result.modified_count, 0);
        assert_eq!(result.upserted_count, 1);
        let id = result.upserted_id.unwrap();

        let docs = client
            .find(NAME, FindArgs::new().query(doc! { "_id": id.clone() }))
            .await
            .unwrap()
            .into_documents()
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get_str("doc").unwrap(), "doc5");
        assert_eq!(docs[0].get_str("type").unwrap(), "update");
    }

    #[tokio::test]
    async fn test_update_many_argument_errors() {
        let client = typed().await;

        let err = client
            .update_many(NAME, UpdateManyArgs::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "selector must be a valid object");

        let err = client
            .update_many(
                NAME,
                UpdateManyArgs {
                    update: Some(doc! { "$set": { "type": "update" } }),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "selector must be a valid object");

        for update in [doc! {}, doc! { "type": "update" }] {
            let err = client
                .update_many(NAME, UpdateManyArgs::new(doc! {}, update))
                .await
                .unwrap_err();
            assert!(err.is_argument());
            assert_eq!(
                err.to_string(),
                "The update operation document must contain at least one atomic operator."
            );
        }

        // Nothing was touched by the rejected calls.
        let n = client
            .count(NAME, CountArgs::query(doc! { "type": "doc" }))
            .await
            .unwrap();
        assert_eq!(n, 2);
    }

    #[tokio::test]
    async fn test_delete_many() {
        let client = typed().await;
        let result = client
            .delete_many(NAME, DeleteManyArgs::filter(doc! { "type": "doc" }))
            .await
            .unwrap();
        assert!(result.acknowledged);
        assert_eq!(result.deleted_count, 2);

        let result = client
            .delete_many(NAME, DeleteManyArgs::filter(doc! {}))
            .await
            .unwrap();
        assert_eq!(result.deleted_count, 2);
    }

    #[tokio::test]
    async fn test_delete_many_requires_filter() {
        let client = typed().await;
        let err = client
            .delete_many(NAME, DeleteManyArgs::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "filter parameter must be an object");
        assert_eq!(client.count(NAME, CountArgs::default()).await.unwrap(), 4);
    }
}

// ==================== find_one_and_* ====================

mod find_and_modify {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn three() -> (Client, Bson) {
        let client = connected().await;
        let result = seed(
            &client,
            vec![
                doc! { "index": 1, "title": "new doc" },
                doc! { "index": 2, "title": "new doc" },
                doc! { "index": 3, "title": "new doc" },
            ],
        )
        .await;
        let id = result.inserted_ids[&0].clone();
        (client, id)
    }

    #[tokio::test]
    async fn test_update_returns_original_by_default() {
        let (client, id) = three().await;
        let result = client
            .find_one_and_update(
                NAME,
                FindOneAndUpdateArgs::new(
                    doc! { "_id": id.clone() },
                    doc! { "$set": { "title": "update doc" } },
                ),
            )
            .await
            .unwrap();

        let value = result.value.unwrap();
        assert_eq!(value.get("_id"), Some(&id));
        assert_eq!(value.get_str("title").unwrap(), "new doc");
        assert_eq!(result.ok, 1.0);
        assert_eq!(result.last_error_object.n, 1);
        assert!(result.last_error_object.updated_existing);
    }

    #[tokio::test]
    async fn test_update_returns_updated() {
        let (client, id) = three().await;
        let result = client
            .find_one_and_update(
                NAME,
                FindOneAndUpdateArgs::new(
                    doc! { "_id": id.clone() },
                    doc! { "$set": { "title": "update doc" } },
                )
                .options(FindAndModifyOptions::new().return_original(false)),
            )
            .await
            .unwrap();

        let value = result.value.unwrap();
        assert_eq!(value.get("_id"), Some(&id));
        assert_eq!(value.get_str("title").unwrap(), "update doc");
    }

    #[tokio::test]
    async fn test_update_with_sort() {
        let (client, _) = three().await;
        let result = client
            .find_one_and_update(
                NAME,
                FindOneAndUpdateArgs::new(doc! {}, doc! { "$set": { "title": "update doc" } })
                    .options(FindAndModifyOptions::new().sort(doc! { "index": -1 })),
            )
            .await
            .unwrap();

        assert_eq!(result.value.unwrap().get_i32("index").unwrap(), 3);
        assert_eq!(result.last_error_object.n, 1);
    }

    #[tokio::test]
    async fn test_update_upsert() {
        let (client, _) = three().await;
        let result = client
            .find_one_and_update(
                NAME,
                FindOneAndUpdateArgs::new(
                    doc! { "title": "upsert" },
                    doc! { "$setOnInsert": { "title": "upsert" } },
                )
                .options(FindAndModifyOptions::new().upsert(true).return_original(false)),
            )
            .await
            .unwrap();

        let value = result.value.unwrap();
        assert_eq!(value.get_str("title").unwrap(), "upsert");
        assert_eq!(result.last_error_object.n, 1);
        assert!(!result.last_error_object.updated_existing);
        assert_eq!(result.last_error_object.upserted.as_ref(), value.get("_id"));
    }

    #[tokio::test]
    async fn test_update_no_match() {
        let (client, _) = three().await;
        let result = client
            .find_one_and_update(
                NAME,
                FindOneAndUpdateArgs::new(
                    doc! { "title": "missing" },
                    doc! { "$set": { "title": "x" } },
                ),
            )
            .await
            .unwrap();
        assert_eq!(result.value, None);
        assert_eq!(result.last_error_object, LastErrorObject::default());
    }

    #[tokio::test]
    async fn test_update_argument_errors() {
        let (client, _) = three().await;

        let err = client
            .find_one_and_update(NAME, FindOneAndUpdateArgs::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "filter parameter must be an object");

        let err = client
            .find_one_and_update(
                NAME,
                FindOneAndUpdateArgs {
                    filter: Some(doc! {}),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "update parameter must be an object");

        let err = client
            .find_one_and_update(
                NAME,
                FindOneAndUpdateArgs::new(doc! {}, doc! { "title": "plain" }),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "The update operation document must contain at least one atomic operator."
        );
    }

    #[tokio::test]
    async fn test_replace() {
        let client = connected().await;
        let id = client
            .insert_one(NAME, InsertOneArgs::doc(doc! { "title": "new doc" }))
            .await
            .unwrap()
            .inserted_id;

        let result = client
            .find_one_and_replace(
                NAME,
                FindOneAndReplaceArgs::new(doc! { "_id": id.clone() }, doc! { "doc": "replace" }),
            )
            .await
            .unwrap();
        let value = result.value.unwrap();
        assert_eq!(value.get("_id"), Some(&id));
        assert_eq!(value.get_str("title").unwrap(), "new doc");
        assert!(result.last_error_object.updated_existing);

        let stored = client
            .find(NAME, FindArgs::new().query(doc! { "_id": id.clone() }))
            .await
            .unwrap()
            .into_documents()
            .await
            .unwrap();
        assert_eq!(stored, vec![doc! { "_id": id, "doc": "replace" }]);
    }

    #[tokio::test]
    async fn test_replace_returns_replaced() {
        let client = connected().await;
        let id = client
            .insert_one(NAME, InsertOneArgs::doc(doc! { "title": "new doc" }))
            .await
            .unwrap()
            .inserted_id;

        let result = client
            .find_one_and_replace(
                NAME,
                FindOneAndReplaceArgs::new(doc! { "_id": id.clone() }, doc! { "doc": "replace" })
                    .options(FindAndModifyOptions::new().return_original(false)),
            )
            .await
            .unwrap();
        let value = result.value.unwrap();
        assert_eq!(value.get("_id"), Some(&id));
        assert!(!value.contains_key("title"));
        assert_eq!(value.get_str("doc").unwrap(), "replace");
    }

    #[tokio::test]
    async fn test_replace_upsert() {
        let client = connected().await;
        let result = client
            .find_one_and_replace(
                NAME,
                FindOneAndReplaceArgs::new(doc! { "title": "upsert" }, doc! { "doc": "replace" })
                    .options(FindAndModifyOptions::new().upsert(true).return_original(false)),
            )
            .await
            .unwrap();

        let value = result.value.unwrap();
        assert_eq!(result.last_error_object.n, 1);
        assert!(!result.last_error_object.updated_existing);
        assert_eq!(result.last_error_object.upserted.as_ref(), value.get("_id"));
        assert_eq!(value.get_str("doc").unwrap(), "replace");
    }

    #[tokio::test]
    async fn test_replace_argument_errors() {
        let client = connected().await;

        let err = client
            .find_one_and_replace(NAME, FindOneAndReplaceArgs::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "filter parameter must be an object");

        let err = client
            .find_one_and_replace(
                NAME,
                FindOneAndReplaceArgs {
                    filter: Some(doc! {}),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "replacement parameter must be an object");

        let err = client
            .find_one_and_replace(
                NAME,
                FindOneAndReplaceArgs::new(doc! {}, doc! { "$set": { "a": 1 } }),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Replacement document must not contain atomic operators"
        );
    }

    #[tokio::test]
    async fn test_delete() {
        let client = connected().await;
        let result = seed(
            &client,
            vec![doc! { "title": "new doc" }, doc! { "title": "new doc" }],
        )
        .await;
        let id = result.inserted_ids[&0].clone();

        let result = client
            .find_one_and_delete(NAME, FindOneAndDeleteArgs::new(doc! { "_id": id.clone() }))
            .await
            .unwrap();
        let value = result.value.unwrap();
        assert_eq!(value.get("_id"), Some(&id));
        assert_eq!(value.get_str("title").unwrap(), "new doc");
        assert_eq!(result.ok, 1.0);
        assert_eq!(result.last_error_object.n, 1);
        assert_eq!(client.count(NAME, CountArgs::default()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_with_sort() {
        let client = connected().await;
        let result = seed(
            &client,
            vec![doc! { "title": "new doc" }, doc! { "title": "new doc" }],
        )
        .await;
        let first = result.inserted_ids[&0].clone();

        // Every document ties on the missing sort key, so natural order decides.
        let result = client
            .find_one_and_delete(
                NAME,
                FindOneAndDeleteArgs::new(doc! {})
                    .options(FindAndModifyOptions::new().sort(doc! { "id": 1 })),
            )
            .await
            .unwrap();
        assert_eq!(result.value.unwrap().get("_id"), Some(&first));

        let (client, _) = three().await;
        let result = client
            .find_one_and_delete(
                NAME,
                FindOneAndDeleteArgs::new(doc! {})
                    .options(FindAndModifyOptions::new().sort(doc! { "index": -1 })),
            )
            .await
            .unwrap();
        assert_eq!(result.value.unwrap().get_i32("index").unwrap(), 3);
    }

    #[tokio::test]
    async fn test_delete_requires_filter() {
        let client = connected().await;
        let err = client
            .find_one_and_delete(NAME, FindOneAndDeleteArgs::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "filter parameter must be an object");
    }

    #[tokio::test]
    async fn test_projection_on_returned_document() {
        let (client, id) = three().await;
        let result = client
            .find_one_and_delete(
                NAME,
                FindOneAndDeleteArgs::new(doc! { "_id": id })
                    .options(FindAndModifyOptions::new().projection(doc! { "_id": 0, "index": 1 })),
            )
            .await
            .unwrap();
        assert_eq!(result.value, Some(doc! { "index": 1 }));
    }
}

// ==================== Indexes and collections ====================

mod schema {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_create_index_names() {
        let client = connected().await;

        let name = client
            .create_index(NAME, CreateIndexArgs::new(doc! { "title": -1 }))
            .await
            .unwrap();
        assert_eq!(name, "title_-1");

        let name = client
            .create_index(NAME, CreateIndexArgs::new("title"))
            .await
            .unwrap();
        assert_eq!(name, "title_1");

        let name = client
            .create_index(NAME, CreateIndexArgs::new("title").name("title_lookup"))
            .await
            .unwrap();
        assert_eq!(name, "title_lookup");

        // Creating an identical index again returns the same name.
        let name = client
            .create_index(NAME, CreateIndexArgs::new("title"))
            .await
            .unwrap();
        assert_eq!(name, "title_1");
    }

    #[tokio::test]
    async fn test_create_index_empty_keys() {
        let client = connected().await;

        let err = client
            .create_index(NAME, CreateIndexArgs::new(doc! {}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Index keys cannot be empty.");

        let err = client
            .create_index(NAME, CreateIndexArgs::default())
            .await
            .unwrap_err();
        assert!(err.is_argument());
    }

    #[tokio::test]
    async fn test_unique_index_rejects_duplicates() {
        let client = connected().await;
        client
            .create_index(NAME, CreateIndexArgs::new("email").unique(true))
            .await
            .unwrap();
        client
            .insert_one(NAME, InsertOneArgs::doc(doc! { "email": "a@example.com" }))
            .await
            .unwrap();

        let err = client
            .insert_one(NAME, InsertOneArgs::doc(doc! { "email": "a@example.com" }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(11000));
    }

    #[tokio::test]
    async fn test_create_and_list_collections() {
        let client = connected().await;
        client
            .create_collection(CreateCollectionArgs::name("create"))
            .await
            .unwrap();

        let names = client.list_collections().await.unwrap();
        assert!(names.iter().any(|n| n == "create"));

        let err = client
            .create_collection(CreateCollectionArgs::name("create"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(48));
    }

    #[tokio::test]
    async fn test_create_collection_requires_name() {
        let client = connected().await;
        let err = client
            .create_collection(CreateCollectionArgs::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "must pass name of collection to create");
    }
}

// ==================== Aggregation ====================

mod aggregate {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn typed() -> Client {
        let client = connected().await;
        seed(
            &client,
            vec![
                doc! { "type": "doc1" },
                doc! { "type": "doc2" },
                doc! { "type": "doc3" },
                doc! { "type": "doc4" },
            ],
        )
        .await;
        client
    }

    #[tokio::test]
    async fn test_group_count() {
        let client = typed().await;
        let result = client
            .aggregate(
                NAME,
                AggregateArgs::pipeline(vec![
                    doc! { "$match": {} },
                    doc! { "$group": { "_id": Bson::Null, "count": { "$sum": 1 } } },
                ]),
            )
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].get_i32("count").unwrap(), 4);
    }

    #[tokio::test]
    async fn test_match_sort_limit() {
        let client = typed().await;
        let result = client
            .aggregate(
                NAME,
                AggregateArgs::pipeline(vec![
                    doc! { "$match": { "type": { "$in": ["doc2", "doc3", "doc4"] } } },
                    doc! { "$sort": { "type": -1 } },
                    doc! { "$limit": 2 },
                    doc! { "$project": { "_id": 0, "type": 1 } },
                ]),
            )
            .await
            .unwrap();
        assert_eq!(result, vec![doc! { "type": "doc4" }, doc! { "type": "doc3" }]);
    }

    #[tokio::test]
    async fn test_pipeline_argument_errors() {
        let client = typed().await;

        let err = client
            .aggregate(NAME, AggregateArgs::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "pipeline parameter must be an array of stages");

        let err = client
            .aggregate(NAME, AggregateArgs::pipeline(vec![doc! {}]))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "A pipeline stage specification object must contain exactly one field."
        );

        let err = client
            .aggregate(NAME, AggregateArgs::pipeline(vec![doc! { "match": {} }]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unrecognized pipeline stage name: 'match'");
    }

    #[tokio::test]
    async fn test_unknown_stage_rejected_by_driver() {
        let client = typed().await;
        let err = client
            .aggregate(NAME, AggregateArgs::pipeline(vec![doc! { "$bogus": {} }]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Operation);
        assert_eq!(err.to_string(), "Unrecognized pipeline stage name: '$bogus'");
    }
}
