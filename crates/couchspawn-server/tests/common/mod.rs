/// Shared helpers for the emulator's HTTP tests.
///
/// Each test gets its own server on an ephemeral loopback port, so tests
/// run in parallel without sharing databases.
use couchspawn_server::{ServerState, router};

/// Start an emulator and return its base URL (no trailing slash).
pub async fn start_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(ServerState::new()))
            .await
            .unwrap();
    });
    format!("http://{addr}")
}

/// Start an emulator and create one database on it, returning the
/// database URL with a trailing slash.
pub async fn fresh_db(name: &str) -> String {
    let base = start_server().await;
    let url = format!("{base}/{name}/");
    let resp = reqwest::Client::new().put(&url).send().await.unwrap();
    assert_eq!(resp.status(), 201, "failed to create {name}");
    url
}
