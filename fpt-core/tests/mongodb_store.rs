//! MongoDB store integration tests using testcontainers.

#![cfg(feature = "mongodb")]

use fpt_core::Value;
use fpt_core::query::{FilterOp, FilterValue, QueryRequest, SortDirection, run_query};
use fpt_core::schema::{TypeTag, infer_schema};
use fpt_core::store::DocumentStore;
use fpt_core::store::mongodb::MongoStore;
use mongodb::bson::{doc, oid::ObjectId};
use testcontainers_modules::mongo::Mongo;
use testcontainers_modules::testcontainers::runners::AsyncRunner;

async fn seed(connection_string: &str) {
    let client = mongodb::Client::with_uri_str(connection_string)
        .await
        .expect("Failed to connect to MongoDB");
    let users = client
        .database("testdb")
        .collection::<mongodb::bson::Document>("users");

    let docs = (0..12).map(|i: i32| {
        let tag = if i % 3 == 0 { "admin" } else { "member" };
        let city = if i % 2 == 0 { "Oslo" } else { "Bergen" };
        doc! {
            "_id": format!("u{:02}", i),
            "age": 20 + (i % 4),
            "name": format!("User {}", i),
            "tags": [tag],
            "joined": mongodb::bson::DateTime::from_millis(1_704_067_200_000),
            "address": { "city": city },
        }
    });
    users.insert_many(docs).await.expect("Failed to insert users");

    client
        .database("testdb")
        .collection::<mongodb::bson::Document>("events")
        .insert_one(doc! { "_id": ObjectId::new(), "kind": "login" })
        .await
        .expect("Failed to insert event");
}

#[tokio::test]
async fn test_mongodb_store_end_to_end() {
    let container = Mongo::default()
        .start()
        .await
        .expect("Failed to start MongoDB container");
    let port = container
        .get_host_port_ipv4(27017)
        .await
        .expect("Failed to get MongoDB port");
    let connection_string = format!("mongodb://localhost:{}/testdb", port);
    seed(&connection_string).await;

    let store = MongoStore::new(&connection_string, "unused").await.unwrap();
    store.test_connection().await.unwrap();

    assert_eq!(store.list_collections().await.unwrap(), ["events", "users"]);

    // Inference sees nested paths and timestamps
    let schema = infer_schema(&store, "users", 200).await.unwrap();
    assert_eq!(schema.sample_size, 12);
    assert_eq!(schema.fields["address.city"].present, 12);
    assert_eq!(schema.fields["joined"].dominant_type(), Some(TypeTag::Timestamp));
    assert!(!schema.fields.contains_key("_id"));

    // Paginate by age desc and check nothing repeats or goes missing
    let mut seen = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let mut request = QueryRequest::new("users")
            .with_order_by("age", SortDirection::Desc)
            .with_limit(5);
        if let Some(id) = token.take() {
            request = request.with_start_after(id);
        }
        let page = run_query(&store, &request).await.unwrap();
        if page.docs.is_empty() {
            break;
        }
        seen.extend(page.docs.iter().map(|d| d.id.clone()));
        token = page.next_page_token;
    }
    let mut unique = seen.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(seen.len(), 12);
    assert_eq!(unique.len(), 12);

    let admins = run_query(
        &store,
        &QueryRequest::new("users").with_filter(
            "tags",
            FilterOp::ArrayContains,
            FilterValue::String("admin".to_string()),
        ),
    )
    .await
    .unwrap();
    let ids: Vec<_> = admins.docs.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, ["u00", "u03", "u06", "u09"]);

    // Merge keeps sibling fields of nested maps
    let patch = match Value::from_untyped(serde_json::json!({"address": {"zip": "0150"}})) {
        Value::Map(fields) => fields,
        other => panic!("expected map, got {:?}", other),
    };
    store.merge_document("users", "u00", patch).await.unwrap();
    let doc = store.get_document("users", "u00").await.unwrap().unwrap();
    assert_eq!(doc.field("address.city"), Some(&Value::from("Oslo")));
    assert_eq!(doc.field("address.zip"), Some(&Value::from("0150")));

    store.delete_document("users", "u00").await.unwrap();
    assert!(store.get_document("users", "u00").await.unwrap().is_none());
}

#[tokio::test]
async fn test_mongodb_pagination_crosses_mixed_types() {
    let container = Mongo::default()
        .start()
        .await
        .expect("Failed to start MongoDB container");
    let port = container
        .get_host_port_ipv4(27017)
        .await
        .expect("Failed to get MongoDB port");
    let connection_string = format!("mongodb://localhost:{}/mixed", port);

    let client = mongodb::Client::with_uri_str(&connection_string)
        .await
        .expect("Failed to connect to MongoDB");
    let items = client
        .database("mixed")
        .collection::<mongodb::bson::Document>("items");
    items
        .insert_many([
            doc! { "_id": "a", "rank": 1_i32 },
            doc! { "_id": "b", "rank": 2.5_f64 },
            doc! { "_id": "c", "rank": "x" },
            doc! { "_id": "d", "rank": "y" },
            doc! { "_id": "e", "rank": true },
            doc! { "_id": "f", "rank": mongodb::bson::Bson::Null },
            doc! { "_id": "g" },
        ])
        .await
        .expect("Failed to insert items");

    let store = MongoStore::new(&connection_string, "unused").await.unwrap();

    for (direction, expected) in [
        (SortDirection::Asc, ["f", "a", "b", "c", "d", "e"]),
        (SortDirection::Desc, ["e", "d", "c", "b", "a", "f"]),
    ] {
        let mut seen = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut request = QueryRequest::new("items")
                .with_order_by("rank", direction)
                .with_limit(2);
            if let Some(id) = token.take() {
                request = request.with_start_after(id);
            }
            let page = run_query(&store, &request).await.unwrap();
            if page.docs.is_empty() {
                break;
            }
            seen.extend(page.docs.iter().map(|d| d.id.clone()));
            token = page.next_page_token;
        }
        assert_eq!(seen, expected, "{:?}", direction);
    }
}
