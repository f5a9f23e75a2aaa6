//! Document CRUD, `_all_docs`, and `_local` documents over HTTP.

mod common;

use common::fresh_db;
use serde_json::{Value, json};

async fn put(client: &reqwest::Client, url: &str, body: Value) -> reqwest::Response {
    client.put(url).json(&body).send().await.unwrap()
}

#[tokio::test]
async fn put_get_update_delete() {
    let url = fresh_db("crud").await;
    let client = reqwest::Client::new();
    let doc_url = format!("{url}doc1");

    let resp = put(&client, &doc_url, json!({"name": "Alice"})).await;
    assert_eq!(resp.status(), 201);
    let created: Value = resp.json().await.unwrap();
    assert_eq!(created["ok"], true);
    assert_eq!(created["id"], "doc1");
    let rev1 = created["rev"].as_str().unwrap().to_string();
    assert!(rev1.starts_with("1-"));

    let doc: Value = client.get(&doc_url).send().await.unwrap().json().await.unwrap();
    assert_eq!(doc["_id"], "doc1");
    assert_eq!(doc["_rev"], rev1.as_str());
    assert_eq!(doc["name"], "Alice");

    let resp = put(&client, &doc_url, json!({"_rev": rev1, "name": "Bob"})).await;
    assert_eq!(resp.status(), 201);
    let rev2 = resp.json::<Value>().await.unwrap()["rev"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(rev2.starts_with("2-"));

    let resp = client
        .delete(format!("{doc_url}?rev={rev2}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client.get(&doc_url).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(resp.json::<Value>().await.unwrap()["reason"], "deleted");
}

#[tokio::test]
async fn stale_update_conflicts() {
    let url = fresh_db("conflict").await;
    let client = reqwest::Client::new();
    let doc_url = format!("{url}doc1");

    put(&client, &doc_url, json!({"v": 1})).await;
    let resp = put(&client, &doc_url, json!({"v": 2})).await;
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "conflict");
    assert_eq!(body["reason"], "Document update conflict.");
}

#[tokio::test]
async fn post_generates_id() {
    let url = fresh_db("post").await;
    let resp = reqwest::Client::new()
        .post(&url)
        .json(&json!({"kind": "generated"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    assert!(!body["id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn bulk_docs_and_all_docs() {
    let url = fresh_db("bulk").await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{url}_bulk_docs"))
        .json(&json!({"docs": [{"_id": "a"}, {"_id": "b"}, {"_id": "c", "n": 3}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let results: Value = resp.json().await.unwrap();
    assert_eq!(results.as_array().unwrap().len(), 3);
    assert_eq!(results[0]["ok"], true);

    let all: Value = client
        .get(format!("{url}_all_docs?include_docs=true&startkey=\"b\""))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all["total_rows"], 3);
    let rows = all["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["id"], "b");
    assert_eq!(rows[1]["doc"]["n"], 3);

    let keyed: Value = client
        .post(format!("{url}_all_docs"))
        .json(&json!({"keys": ["c", "zz"]}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let rows = keyed["rows"].as_array().unwrap();
    assert_eq!(rows[0]["id"], "c");
    assert_eq!(rows[1]["key"], "zz");
    assert_eq!(rows[1]["error"], "not_found");
}

#[tokio::test]
async fn design_documents_keep_prefix() {
    let url = fresh_db("design").await;
    let client = reqwest::Client::new();

    let resp = put(&client, &format!("{url}_design/app"), json!({"language": "javascript"})).await;
    assert_eq!(resp.status(), 201);
    assert_eq!(resp.json::<Value>().await.unwrap()["id"], "_design/app");

    let doc: Value = client
        .get(format!("{url}_design/app"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(doc["_id"], "_design/app");
}

#[tokio::test]
async fn local_documents_round_trip() {
    let url = fresh_db("local").await;
    let client = reqwest::Client::new();
    let local_url = format!("{url}_local/checkpoint");

    let resp = put(&client, &local_url, json!({"last_seq": 5})).await;
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["id"], "_local/checkpoint");
    assert_eq!(body["rev"], "0-1");

    let doc: Value = client.get(&local_url).send().await.unwrap().json().await.unwrap();
    assert_eq!(doc["last_seq"], 5);
    assert_eq!(doc["_rev"], "0-1");

    // Local docs never show up in _all_docs.
    let all: Value = client
        .get(format!("{url}_all_docs"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all["total_rows"], 0);

    let resp = client
        .delete(format!("{local_url}?rev=0-1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(client.get(&local_url).send().await.unwrap().status(), 404);
}

#[tokio::test]
async fn missing_database_for_document() {
    let url = fresh_db("present").await;
    let base = url.trim_end_matches("present/");
    let resp = reqwest::get(format!("{base}absent/doc")).await.unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(
        resp.json::<Value>().await.unwrap()["reason"],
        "Database does not exist."
    );
}
