//! End-to-end tests for the HTTP API.
//!
//! Each test binds a server to an ephemeral loopback port over a seeded
//! in-memory store and talks to it with reqwest.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::uninlined_format_args)]

use fpt::server::handlers::AppState;
use fpt::server::{self, ServerConfig};
use fpt_core::{DocumentStore, MemoryStore, WriteCredential};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

const TOKEN: &str = "test-write-token-0123456789abcdef";

const SEED: &str = r#"
{"collection": "users", "id": "u1", "data": {"name": "Al", "age": 30, "tags": ["admin"], "address": {"city": "Oslo"}}}
{"collection": "users", "id": "u2", "data": {"name": "Bo", "age": 41, "tags": ["dev"]}}
{"collection": "users", "id": "u3", "data": {"name": "Cy, Jr.", "age": 25, "note": "said \"hi\"\nthen left"}}
{"collection": "users", "id": "u4", "data": {"name": "Di", "age": 41}}
{"collection": "orders", "id": "o1", "data": {"total": 12.5, "placed": {"toDate": "2024-01-01T00:00:00Z"}}}
"#;

struct TestServer {
    base: String,
    store: Arc<MemoryStore>,
    client: reqwest::Client,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    async fn start(write: WriteCredential) -> Self {
        let store = Arc::new(MemoryStore::from_ndjson(SEED).unwrap());
        let state = AppState {
            store: store.clone(),
            write: Arc::new(write),
            export_page_size: 2,
        };
        let router = server::create_router(state, Duration::from_secs(10));

        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        let listener = server::bind(&config).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            server::serve(listener, router, async {
                rx.await.ok();
            })
            .await
            .unwrap();
        });

        Self {
            base: format!("http://{}", addr),
            store,
            client: reqwest::Client::new(),
            shutdown: Some(tx),
        }
    }

    async fn writable() -> Self {
        Self::start(WriteCredential::new(true, Some(TOKEN.to_string()))).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get_json(&self, path: &str) -> (reqwest::StatusCode, Value) {
        let response = self.client.get(self.url(path)).send().await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            tx.send(()).ok();
        }
    }
}

#[tokio::test]
async fn test_health_carries_request_id() {
    let server = TestServer::start(WriteCredential::disabled()).await;
    let response = server.client.get(server.url("/health")).send().await.unwrap();

    assert_eq!(response.status(), 200);
    let request_id = response
        .headers()
        .get("x-request-id")
        .expect("x-request-id header")
        .to_str()
        .unwrap()
        .to_string();
    assert!(uuid::Uuid::parse_str(&request_id).is_ok());
    assert_eq!(response.json::<Value>().await.unwrap(), json!({"ok": true}));
}

#[tokio::test]
async fn test_collections_are_sorted() {
    let server = TestServer::start(WriteCredential::disabled()).await;
    let (status, body) = server.get_json("/collections").await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"collections": ["orders", "users"]}));
}

#[tokio::test]
async fn test_schema_infer() {
    let server = TestServer::start(WriteCredential::disabled()).await;
    let (status, body) = server
        .get_json("/schema/infer?collection=users&limit=10")
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["collection"], "users");
    assert_eq!(body["sampleSize"], 4);
    assert_eq!(body["fields"]["age"]["present"], 4);
    assert_eq!(body["fields"]["age"]["types"]["number"], 4);
    assert_eq!(body["fields"]["address.city"]["present"], 1);
    assert_eq!(body["fields"]["tags"]["types"]["array"], 2);
    assert!(body["fields"].get("tags.0").is_none());
}

#[tokio::test]
async fn test_schema_infer_rejects_bad_limit() {
    let server = TestServer::start(WriteCredential::disabled()).await;
    for limit in ["abc", "0", "-1", "999999"] {
        let (status, body) = server
            .get_json(&format!("/schema/infer?collection=users&limit={}", limit))
            .await;
        assert_eq!(status, 400, "limit={}", limit);
        assert_eq!(body["error"], "validation_error");
        assert!(body["message"].as_str().unwrap().contains("limit"));
    }
}

#[tokio::test]
async fn test_query_paginates_without_overlap() {
    let server = TestServer::start(WriteCredential::disabled()).await;

    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let mut path = "/query?collection=users&orderByField=age&orderByDir=desc&limit=3".to_string();
        if let Some(token) = &cursor {
            path.push_str(&format!("&startAfterId={}", token));
        }
        let (status, body) = server.get_json(&path).await;
        assert_eq!(status, 200);

        let docs = body["docs"].as_array().unwrap();
        if docs.is_empty() {
            assert!(body["nextPageToken"].is_null());
            break;
        }
        for doc in docs {
            let id = doc["id"].as_str().unwrap().to_string();
            assert!(!seen.contains(&id), "{} returned twice", id);
            seen.push(id);
        }
        cursor = body["nextPageToken"].as_str().map(str::to_string);
    }

    // Ties on age=41 break by id, in the sort direction
    assert_eq!(seen, ["u4", "u2", "u1", "u3"]);
}

#[tokio::test]
async fn test_docs_browses_in_id_order() {
    let server = TestServer::start(WriteCredential::disabled()).await;

    let (status, first) = server.get_json("/docs?collection=users&limit=2").await;
    assert_eq!(status, 200);
    let ids: Vec<_> = first["docs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["u1", "u2"]);
    assert_eq!(first["nextPageToken"], "u2");
    assert_eq!(first["docs"][0]["data"]["address"], json!({"city": "Oslo"}));

    let (_, second) = server
        .get_json("/docs?collection=users&limit=2&startAfter=u2")
        .await;
    let ids: Vec<_> = second["docs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["u3", "u4"]);

    let (_, end) = server
        .get_json("/docs?collection=users&startAfter=u4")
        .await;
    assert_eq!(end["docs"], json!([]));
    assert!(end["nextPageToken"].is_null());

    let (status, body) = server.get_json("/docs?limit=2").await;
    assert_eq!(status, 400);
    assert!(body["message"].as_str().unwrap().contains("collection"));
}

#[tokio::test]
async fn test_query_with_filters() {
    let server = TestServer::start(WriteCredential::disabled()).await;
    let filters = r#"[{"field":"age","op":">=","value":30},{"field":"tags","op":"array-contains","value":"dev"}]"#;
    let url = reqwest::Url::parse_with_params(
        &server.url("/query"),
        &[("collection", "users"), ("where", filters)],
    )
    .unwrap();

    let body: Value = server
        .client
        .get(url)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let ids: Vec<_> = body["docs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["u2"]);
}

#[tokio::test]
async fn test_query_errors_name_the_field() {
    let server = TestServer::start(WriteCredential::disabled()).await;
    let cases = [
        ("/query", "collection"),
        ("/query?collection=users&limit=201", "limit"),
        ("/query?collection=users&orderByField=age&orderByDir=up", "orderByDir"),
        ("/query?collection=users&where=nope", "where"),
    ];
    for (path, field) in cases {
        let (status, body) = server.get_json(path).await;
        assert_eq!(status, 400, "{}", path);
        assert_eq!(body["error"], "validation_error");
        assert!(
            body["message"].as_str().unwrap().contains(field),
            "{} should name {}: {}",
            path,
            field,
            body["message"]
        );
    }
}

#[tokio::test]
async fn test_get_document() {
    let server = TestServer::start(WriteCredential::disabled()).await;

    let (status, body) = server.get_json("/doc?collection=orders&id=o1").await;
    assert_eq!(status, 200);
    assert_eq!(body["id"], "o1");
    assert_eq!(body["data"]["placed"], json!({"toDate": "2024-01-01T00:00:00Z"}));

    let (status, body) = server.get_json("/doc?collection=orders&id=missing").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_write_disabled_rejects_patch() {
    let server = TestServer::start(WriteCredential::disabled()).await;
    let response = server
        .client
        .patch(server.url("/doc?collection=users&id=u1"))
        .header("X-FPT-Write-Token", TOKEN)
        .json(&json!({"data": {"name": "Zed"}}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "write_disabled");
}

#[tokio::test]
async fn test_write_token_is_checked() {
    let server = TestServer::writable().await;

    let missing = server
        .client
        .patch(server.url("/doc?collection=users&id=u1"))
        .json(&json!({"data": {"name": "Zed"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 401);

    let wrong = server
        .client
        .patch(server.url("/doc?collection=users&id=u1"))
        .header("X-FPT-Write-Token", "not-the-token")
        .json(&json!({"data": {"name": "Zed"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), 401);
    let body: Value = wrong.json().await.unwrap();
    assert_eq!(body["error"], "invalid_write_token");

    // Nothing changed
    let doc = server.store.get_document("users", "u1").await.unwrap().unwrap();
    assert_eq!(doc.data["name"], fpt_core::Value::from("Al"));
}

#[tokio::test]
async fn test_write_patch_merges() {
    let server = TestServer::writable().await;
    let response = server
        .client
        .patch(server.url("/doc?collection=users&id=u1"))
        .header("X-FPT-Write-Token", TOKEN)
        .json(&json!({"data": {"name": "Zed", "address": {"zip": "0150"}}}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.json::<Value>().await.unwrap(), json!({"ok": true}));

    let (_, body) = server.get_json("/doc?collection=users&id=u1").await;
    assert_eq!(body["data"]["name"], "Zed");
    assert_eq!(body["data"]["age"], 30);
    assert_eq!(body["data"]["address"], json!({"city": "Oslo", "zip": "0150"}));
}

#[tokio::test]
async fn test_write_patch_keeps_marker_like_objects() {
    let server = TestServer::writable().await;
    let data = json!({
        "file": {"path": "/tmp/report.pdf", "id": "abc"},
        "pos": {"latitude": "north", "longitude": 2},
        "when": {"toDate": "not a date"}
    });
    let response = server
        .client
        .patch(server.url("/doc?collection=uploads&id=f1"))
        .header("X-FPT-Write-Token", TOKEN)
        .json(&json!({ "data": data }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let (_, body) = server.get_json("/doc?collection=uploads&id=f1").await;
    assert_eq!(body["data"], data);

    let (_, schema) = server.get_json("/schema/infer?collection=uploads").await;
    assert_eq!(schema["fields"]["file"]["types"], json!({"map": 1}));
    assert_eq!(schema["fields"]["file.path"]["types"], json!({"string": 1}));
    assert_eq!(schema["fields"]["pos.latitude"]["types"], json!({"string": 1}));
}

#[tokio::test]
async fn test_write_patch_upserts_and_validates_body() {
    let server = TestServer::writable().await;

    let created = server
        .client
        .patch(server.url("/doc?collection=users&id=u9"))
        .header("X-FPT-Write-Token", TOKEN)
        .json(&json!({"data": {"name": "New"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 200);
    assert!(server.store.get_document("users", "u9").await.unwrap().is_some());

    let not_object = server
        .client
        .patch(server.url("/doc?collection=users&id=u9"))
        .header("X-FPT-Write-Token", TOKEN)
        .json(&json!({"data": [1, 2]}))
        .send()
        .await
        .unwrap();
    assert_eq!(not_object.status(), 400);
    let body: Value = not_object.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("data"));

    let malformed = server
        .client
        .patch(server.url("/doc?collection=users&id=u9"))
        .header("X-FPT-Write-Token", TOKEN)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), 400);
}

#[tokio::test]
async fn test_write_delete() {
    let server = TestServer::writable().await;
    for _ in 0..2 {
        let response = server
            .client
            .delete(server.url("/doc?collection=users&id=u2"))
            .header("X-FPT-Write-Token", TOKEN)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    let (status, _) = server.get_json("/doc?collection=users&id=u2").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_export_jsonl() {
    let server = TestServer::start(WriteCredential::disabled()).await;
    let response = server
        .client
        .get(server.url("/export?collection=users&format=jsonl&limit=3"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"],
        "application/x-ndjson"
    );
    let disposition = response.headers()["content-disposition"].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment; filename=\"firestore-users-"));
    assert!(disposition.ends_with(".jsonl\""));

    let text = response.text().await.unwrap();
    let lines: Vec<Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["id"], "u1");
    assert_eq!(lines[0]["address"], json!({"city": "Oslo"}));
    assert_eq!(lines[2]["id"], "u3");
}

#[tokio::test]
async fn test_export_jsonl_id_field_overrides_document_id() {
    let server = TestServer::start(WriteCredential::disabled()).await;
    let mut data = fpt_core::Fields::new();
    data.insert("id".to_string(), fpt_core::Value::from("legacy-7"));
    data.insert("sku".to_string(), fpt_core::Value::from("A-1"));
    server
        .store
        .insert("items", fpt_core::Document::new("i1", data));
    server
        .store
        .insert("items", fpt_core::Document::new("i2", fpt_core::Fields::new()));

    let text = server
        .client
        .get(server.url("/export?collection=items&format=jsonl"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let lines: Vec<Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines, [json!({"id": "legacy-7", "sku": "A-1"}), json!({"id": "i2"})]);
}

#[tokio::test]
async fn test_export_csv_parses_back() {
    let server = TestServer::start(WriteCredential::disabled()).await;
    let response = server
        .client
        .get(server.url("/export?collection=users&format=csv&columns=name,note"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/csv")
    );
    let body = response.text().await.unwrap();

    let mut reader = csv::Reader::from_reader(body.as_bytes());
    let headers: Vec<String> = reader.headers().unwrap().iter().map(str::to_string).collect();
    assert_eq!(headers, ["id", "name", "note"]);

    let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
    assert_eq!(rows.len(), 4);
    assert_eq!(&rows[2][0], "u3");
    assert_eq!(&rows[2][1], "Cy, Jr.");
    assert_eq!(&rows[2][2], "said \"hi\"\nthen left");
    assert_eq!(&rows[0][2], "");
}

#[tokio::test]
async fn test_export_rejects_unknown_format() {
    let server = TestServer::start(WriteCredential::disabled()).await;
    let (status, body) = server
        .get_json("/export?collection=users&format=xml")
        .await;
    assert_eq!(status, 400);
    assert!(body["message"].as_str().unwrap().contains("format"));
}
