use std::net::SocketAddr;

/// Errors raised while spawning a sync target.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("cannot pick a port for a native CouchDB; it is configured by NATIVE_COUCHDB")]
    NativePortOverride,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("no free port left above {0}")]
    PortsExhausted(u16),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, SpawnError>;
