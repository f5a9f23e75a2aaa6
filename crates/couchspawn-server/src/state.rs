use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use couchspawn_adapter_memory::MemoryAdapter;
use couchspawn_changes::Notifier;
use couchspawn_core::adapter::Adapter;
use couchspawn_core::document::{BulkDocsOptions, DocResult, Document};
use couchspawn_core::error::{CouchError, Result};

use crate::error::{ApiError, ApiResult};

/// One emulated database: its storage plus the channel live feeds wait on.
#[derive(Clone)]
pub struct Database {
    pub adapter: Arc<MemoryAdapter>,
    pub changes: Notifier,
}

impl Database {
    fn new(name: &str) -> Self {
        Self {
            adapter: Arc::new(MemoryAdapter::new(name)),
            changes: Notifier::new(256),
        }
    }

    /// Write documents and wake any feed waiting on this database.
    pub async fn write(&self, docs: Vec<Document>, opts: BulkDocsOptions) -> Result<Vec<DocResult>> {
        let results = self.adapter.bulk_docs(docs, opts).await?;
        if results.iter().any(|r| r.ok) {
            let seq = self.adapter.info().await?.update_seq;
            for result in results.iter().filter(|r| r.ok) {
                self.changes.wake(seq.clone(), result.id.clone());
            }
        }
        Ok(results)
    }
}

/// The set of databases served by one router. Each spawned server owns its
/// own state, so databases never leak between servers.
#[derive(Clone, Default)]
pub struct ServerState {
    databases: Arc<RwLock<BTreeMap<String, Database>>>,
}

impl ServerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, name: &str) -> Result<()> {
        validate_db_name(name)?;
        let mut databases = self.databases.write().await;
        if databases.contains_key(name) {
            return Err(CouchError::DatabaseExists(name.to_string()));
        }
        databases.insert(name.to_string(), Database::new(name));
        tracing::debug!(db = name, "database created");
        Ok(())
    }

    pub async fn get(&self, name: &str) -> ApiResult<Database> {
        self.databases
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(ApiError::db_not_found)
    }

    pub async fn delete(&self, name: &str) -> ApiResult<()> {
        self.databases
            .write()
            .await
            .remove(name)
            .map(|_| tracing::debug!(db = name, "database deleted"))
            .ok_or_else(ApiError::db_not_found)
    }

    pub async fn names(&self) -> Vec<String> {
        self.databases.read().await.keys().cloned().collect()
    }
}

/// CouchDB's naming rule: a lowercase letter followed by lowercase letters,
/// digits, or any of `_$()+-/`.
pub fn validate_db_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || "_$()+-/".contains(c)
        });
    if valid {
        Ok(())
    } else {
        Err(CouchError::IllegalDatabaseName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_names() {
        assert!(validate_db_name("abcde").is_ok());
        assert!(validate_db_name("a1_$()+-/b").is_ok());
        assert!(validate_db_name("").is_err());
        assert!(validate_db_name("1abc").is_err());
        assert!(validate_db_name("Abc").is_err());
        assert!(validate_db_name("_users").is_err());
    }

    #[tokio::test]
    async fn create_get_delete() {
        let state = ServerState::new();
        state.create("alpha").await.unwrap();
        assert!(matches!(
            state.create("alpha").await,
            Err(CouchError::DatabaseExists(_))
        ));
        assert_eq!(state.names().await, vec!["alpha"]);

        state.get("alpha").await.unwrap();
        state.delete("alpha").await.unwrap();
        assert!(state.get("alpha").await.is_err());
        assert!(state.delete("alpha").await.is_err());
    }
}
