/// Shared helpers for fixture integration tests.
///
/// Every test builds its `FixtureConfig` explicitly, so the suite behaves
/// the same whether or not `NATIVE_COUCHDB` is set in the environment.
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use couchspawn_server::{ServerState, router};

/// Whether something currently listens on `port` (a bind attempt fails).
pub async fn port_in_use(port: u16) -> bool {
    tokio::net::TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        .await
        .is_err()
}

/// Poll until `port` can be bound again, or give up after `limit`.
pub async fn wait_until_free(port: u16, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if !port_in_use(port).await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Start an un-prefixed emulator that stands in for a native CouchDB.
/// Returns its port.
pub async fn start_standalone_couch() -> u16 {
    let listener = tokio::net::TcpListener::bind("0.0.0.0:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, router(ServerState::new()))
            .await
            .unwrap();
    });
    port
}
