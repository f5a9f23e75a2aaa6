//! # couchspawn
//!
//! Ephemeral CouchDB-compatible sync targets for integration tests.
//!
//! By default [`spawn`] starts an in-process emulator on its own port,
//! mounted under `/db`, and creates one database on it. When
//! `NATIVE_COUCHDB` is set to a port, the database is created on that
//! running CouchDB instead, using `COUCH_USERNAME` / `COUCH_PASSWORD` for
//! basic auth when present.
//!
//! ```no_run
//! # async fn run() -> couchspawn::Result<()> {
//! let server = couchspawn::spawn(None, None).await?;
//! let info: serde_json::Value = reqwest::get(server.url()).await?.json().await?;
//! assert_eq!(info["db_name"], server.db_name());
//! server.close_now().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod port;
mod spawn;

pub use client::CouchClient;
pub use config::{Credentials, FixtureConfig};
pub use error::{Result, SpawnError};
pub use port::next_port;
pub use spawn::{
    CLOSE_GRACE, EMBEDDED_PREFIX, NATIVE_CREATE_TIMEOUT, ServerHandle, random_db_name, spawn,
    spawn_with,
};
