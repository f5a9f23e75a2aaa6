//! Server-level and database-level endpoints.

mod common;

use common::{fresh_db, start_server};
use serde_json::{Value, json};

#[tokio::test]
async fn welcome_reports_couchdb_version() {
    let base = start_server().await;
    let body: Value = reqwest::get(&base).await.unwrap().json().await.unwrap();
    assert_eq!(body["couchdb"], "Welcome");
    assert_eq!(body["version"], couchspawn_server::COUCHDB_VERSION);
}

#[tokio::test]
async fn create_info_delete_database() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let resp = client.put(format!("{base}/fixture/")).send().await.unwrap();
    assert_eq!(resp.status(), 201);
    assert_eq!(resp.json::<Value>().await.unwrap(), json!({"ok": true}));

    // Both spellings address the same database.
    let info: Value = client
        .get(format!("{base}/fixture"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(info["db_name"], "fixture");
    assert_eq!(info["doc_count"], 0);
    assert_eq!(info["update_seq"], 0);

    let dbs: Value = client
        .get(format!("{base}/_all_dbs"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(dbs, json!(["fixture"]));

    let resp = client.delete(format!("{base}/fixture/")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client.get(format!("{base}/fixture/")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["reason"], "Database does not exist.");
}

#[tokio::test]
async fn create_existing_database_fails() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    client.put(format!("{base}/dup/")).send().await.unwrap();
    let resp = client.put(format!("{base}/dup/")).send().await.unwrap();
    assert_eq!(resp.status(), 412);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "file_exists");
}

#[tokio::test]
async fn illegal_database_name_rejected() {
    let base = start_server().await;
    let resp = reqwest::Client::new()
        .put(format!("{base}/Upper/"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "illegal_database_name");
}

#[tokio::test]
async fn servers_do_not_share_databases() {
    let first = fresh_db("shared").await;
    let second = start_server().await;

    assert_eq!(reqwest::get(&first).await.unwrap().status(), 200);
    let resp = reqwest::get(format!("{second}/shared/")).await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn uuids_are_distinct() {
    let base = start_server().await;
    let body: Value = reqwest::get(format!("{base}/_uuids?count=3"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let uuids = body["uuids"].as_array().unwrap();
    assert_eq!(uuids.len(), 3);
    assert_ne!(uuids[0], uuids[1]);
    assert_eq!(uuids[0].as_str().unwrap().len(), 32);
}

#[tokio::test]
async fn ensure_full_commit_acknowledges() {
    let url = fresh_db("commit").await;
    let resp = reqwest::Client::new()
        .post(format!("{url}_ensure_full_commit"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], true);
}
