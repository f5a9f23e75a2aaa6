//! Spawning a sync target and tearing it down.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use axum::Router;
use rand::Rng;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use couchspawn_server::{ServerState, router};

use crate::client::CouchClient;
use crate::config::FixtureConfig;
use crate::error::{Result, SpawnError};
use crate::port::next_port;

/// Path the embedded emulator is mounted under.
pub const EMBEDDED_PREFIX: &str = "/db";

/// How long `close()` keeps the server up before releasing it.
pub const CLOSE_GRACE: Duration = Duration::from_millis(1000);

/// Timeout for the bootstrap request against a native CouchDB.
pub const NATIVE_CREATE_TIMEOUT: Duration = Duration::from_secs(1);

const DB_NAME_LEN: usize = 5;

/// A random database name: five lowercase ASCII letters.
pub fn random_db_name() -> String {
    let mut rng = rand::thread_rng();
    (0..DB_NAME_LEN)
        .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
        .collect()
}

/// Spawn a sync target configured from the environment.
///
/// With `NATIVE_COUCHDB` set, the database is created on that CouchDB and
/// `port` must be `None`. Otherwise an embedded emulator is started on
/// `port`, or on the next free port from the shared allocator when `port`
/// is `None` or `Some(0)`.
pub async fn spawn(db_name: Option<&str>, port: Option<u16>) -> Result<ServerHandle> {
    spawn_with(&FixtureConfig::from_env()?, db_name, port).await
}

/// [`spawn`] with explicit configuration instead of the environment.
pub async fn spawn_with(
    config: &FixtureConfig,
    db_name: Option<&str>,
    port: Option<u16>,
) -> Result<ServerHandle> {
    let db_name = db_name.map_or_else(random_db_name, str::to_string);

    match config.native_port {
        Some(native_port) => {
            if port.is_some() {
                return Err(SpawnError::NativePortOverride);
            }
            spawn_native(config, db_name, native_port).await
        }
        None => {
            // Port 0 means "any port", which is what the allocator is for.
            let port = match port.filter(|&port| port != 0) {
                Some(port) => port,
                None => next_port().await?,
            };
            spawn_embedded(db_name, port).await
        }
    }
}

async fn spawn_native(config: &FixtureConfig, db_name: String, port: u16) -> Result<ServerHandle> {
    let url = format!("http://0.0.0.0:{port}/{db_name}/");
    tracing::debug!(%url, "using native CouchDB");

    let client = CouchClient::new(config.credentials.clone());
    let response: serde_json::Value = client
        .put(&url)
        .timeout(NATIVE_CREATE_TIMEOUT)
        .send()
        .await?
        .json()
        .await?;
    tracing::info!(%response, db = %db_name, "native CouchDB create response");

    Ok(ServerHandle {
        db_name,
        url,
        port,
        server: None,
    })
}

async fn spawn_embedded(db_name: String, port: u16) -> Result<ServerHandle> {
    let server = EmbeddedServer::start(port).await?;
    let url = format!("http://0.0.0.0:{port}{EMBEDDED_PREFIX}/{db_name}/");
    tracing::debug!(%url, "embedded emulator listening");

    // The handle owns the server from here on, so a failed bootstrap
    // request still releases the port.
    let handle = ServerHandle {
        db_name,
        url,
        port,
        server: Some(server),
    };

    let status = CouchClient::new(None).put(&handle.url).send().await?.status();
    tracing::debug!(%status, db = %handle.db_name, "embedded database created");

    Ok(handle)
}

/// Background serve task of an embedded emulator.
struct EmbeddedServer {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl EmbeddedServer {
    async fn start(port: u16) -> Result<Self> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| SpawnError::Bind { addr, source })?;

        let app = Router::new().nest(EMBEDDED_PREFIX, router(ServerState::new()));
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(signal.cancelled_owned())
                .await
            {
                tracing::warn!(port, error = %e, "embedded emulator stopped");
            }
        });

        Ok(Self { shutdown, task })
    }

    /// Stop accepting and drop the listener without waiting.
    fn abort(&self) {
        self.shutdown.cancel();
        self.task.abort();
    }

    /// Like `abort`, but returns only once the listener is closed.
    async fn release(self) {
        self.abort();
        // A cancelled task reports `JoinError::Cancelled`; that is the
        // expected outcome here.
        let _ = self.task.await;
    }
}

impl std::fmt::Debug for EmbeddedServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedServer")
            .field("cancelled", &self.shutdown.is_cancelled())
            .finish()
    }
}

/// A running sync target.
///
/// Dropping the handle releases an embedded server's port right away;
/// [`close`](Self::close) and [`close_now`](Self::close_now) do the same and
/// wait for it.
#[derive(Debug)]
pub struct ServerHandle {
    db_name: String,
    url: String,
    port: u16,
    server: Option<EmbeddedServer>,
}

impl ServerHandle {
    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Database URL, always with a trailing slash.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether this handle points at a native CouchDB.
    pub fn is_native(&self) -> bool {
        self.server.is_none()
    }

    /// Wait [`CLOSE_GRACE`], then release the server.
    ///
    /// The delay lives in this future: dropping it before it finishes drops
    /// the handle and releases the server immediately. Closing a native
    /// handle does nothing.
    pub async fn close(self) {
        if self.server.is_some() {
            tokio::time::sleep(CLOSE_GRACE).await;
        }
        self.close_now().await;
    }

    /// Release the server now. The port can be bound again as soon as this
    /// returns.
    pub async fn close_now(mut self) {
        if let Some(server) = self.server.take() {
            server.release().await;
            tracing::debug!(port = self.port, db = %self.db_name, "embedded emulator closed");
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(server) = self.server.take() {
            server.abort();
        }
    }
}
