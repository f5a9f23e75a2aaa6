//! Environment-driven fixture configuration.

use crate::error::{Result, SpawnError};

/// Enables native mode: the port of an already running CouchDB.
pub const NATIVE_COUCHDB: &str = "NATIVE_COUCHDB";
pub const COUCH_USERNAME: &str = "COUCH_USERNAME";
pub const COUCH_PASSWORD: &str = "COUCH_PASSWORD";

/// Basic-auth credentials for a native CouchDB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixtureConfig {
    /// Port of a running CouchDB. `None` selects the embedded emulator.
    pub native_port: Option<u16>,
    pub credentials: Option<Credentials>,
}

impl FixtureConfig {
    /// Read `NATIVE_COUCHDB`, `COUCH_USERNAME` and `COUCH_PASSWORD`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let native_port = lookup(NATIVE_COUCHDB)
            .map(|raw| {
                raw.trim().parse::<u16>().map_err(|_| {
                    SpawnError::InvalidConfig(format!("{NATIVE_COUCHDB} must be a port, got {raw:?}"))
                })
            })
            .transpose()?;

        let username = lookup(COUCH_USERNAME);
        let password = lookup(COUCH_PASSWORD);
        let credentials = (username.is_some() || password.is_some()).then(|| Credentials {
            username: username.unwrap_or_default(),
            password: password.unwrap_or_default(),
        });

        Ok(Self {
            native_port,
            credentials,
        })
    }

    /// Embedded emulator, no credentials.
    pub fn embedded() -> Self {
        Self::default()
    }

    pub fn native(port: u16) -> Self {
        Self {
            native_port: Some(port),
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }
}
