//! The endpoints a replicator drives: `_revs_diff`, `new_edits=false`
//! writes, `open_revs`, and `_bulk_get`.

mod common;

use common::fresh_db;
use serde_json::{Value, json};

async fn post(client: &reqwest::Client, url: String, body: Value) -> reqwest::Response {
    client.post(url).json(&body).send().await.unwrap()
}

#[tokio::test]
async fn replicated_writes_create_conflicts() {
    let url = fresh_db("target").await;
    let client = reqwest::Client::new();

    let diff: Value = post(
        &client,
        format!("{url}_revs_diff"),
        json!({"doc1": ["2-bbb", "2-ccc"]}),
    )
    .await
    .json()
    .await
    .unwrap();
    assert_eq!(diff["doc1"]["missing"], json!(["2-bbb", "2-ccc"]));

    let resp = post(
        &client,
        format!("{url}_bulk_docs"),
        json!({
            "new_edits": false,
            "docs": [
                {"_id": "doc1", "_rev": "2-bbb", "_revisions": {"start": 2, "ids": ["bbb", "aaa"]}, "side": "b"},
                {"_id": "doc1", "_rev": "2-ccc", "_revisions": {"start": 2, "ids": ["ccc", "aaa"]}, "side": "c"}
            ]
        }),
    )
    .await;
    assert_eq!(resp.status(), 201);
    // Replicated writes report failures only.
    assert_eq!(resp.json::<Value>().await.unwrap(), json!([]));

    let diff: Value = post(
        &client,
        format!("{url}_revs_diff"),
        json!({"doc1": ["2-bbb", "2-ccc", "3-ddd"]}),
    )
    .await
    .json()
    .await
    .unwrap();
    assert_eq!(diff["doc1"]["missing"], json!(["3-ddd"]));

    // Greater hash wins between equal-length branches.
    let doc: Value = client
        .get(format!("{url}doc1?conflicts=true"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(doc["_rev"], "2-ccc");
    assert_eq!(doc["side"], "c");
    assert_eq!(doc["_conflicts"], json!(["2-bbb"]));
}

#[tokio::test]
async fn open_revs_and_revision_history() {
    let url = fresh_db("openrevs").await;
    let client = reqwest::Client::new();

    post(
        &client,
        format!("{url}_bulk_docs"),
        json!({
            "new_edits": false,
            "docs": [{"_id": "doc1", "_rev": "3-ccc", "_revisions": {"start": 3, "ids": ["ccc", "bbb", "aaa"]}}]
        }),
    )
    .await;

    let results: Value = client
        .get(format!("{url}doc1?open_revs=all&revs=true"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["ok"]["_rev"], "3-ccc");
    assert_eq!(
        results[0]["ok"]["_revisions"],
        json!({"start": 3, "ids": ["ccc", "bbb", "aaa"]})
    );

    let results: Value = client
        .get(format!("{url}doc1?open_revs=[\"3-ccc\",\"9-zzz\"]"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(results[0]["ok"]["_id"], "doc1");
    assert_eq!(results[1]["missing"], "9-zzz");
}

#[tokio::test]
async fn bulk_get_mixes_found_and_missing() {
    let url = fresh_db("bulkget").await;
    let client = reqwest::Client::new();

    let rev = client
        .put(format!("{url}doc1"))
        .json(&json!({"v": 1}))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap()["rev"]
        .as_str()
        .unwrap()
        .to_string();

    let body: Value = post(
        &client,
        format!("{url}_bulk_get?revs=true"),
        json!({"docs": [{"id": "doc1", "rev": rev}, {"id": "nope"}]}),
    )
    .await
    .json()
    .await
    .unwrap();

    let results = body["results"].as_array().unwrap();
    assert_eq!(results[0]["docs"][0]["ok"]["v"], 1);
    assert_eq!(results[0]["docs"][0]["ok"]["_revisions"]["start"], 1);
    assert_eq!(results[1]["docs"][0]["error"]["error"], "not_found");
}

#[tokio::test]
async fn replicated_write_without_rev_is_reported() {
    let url = fresh_db("norev").await;
    let body: Value = post(
        &reqwest::Client::new(),
        format!("{url}_bulk_docs"),
        json!({"new_edits": false, "docs": [{"_id": "doc1"}]}),
    )
    .await
    .json()
    .await
    .unwrap();
    assert_eq!(body[0]["id"], "doc1");
    assert_eq!(body[0]["error"], "bad_request");
}
