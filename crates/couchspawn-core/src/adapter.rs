use std::collections::HashMap;

use async_trait::async_trait;

use crate::document::{
    AllDocsOptions, AllDocsResponse, BulkDocsOptions, BulkGetItem, BulkGetResponse,
    ChangesOptions, ChangesResponse, DbInfo, DocResult, Document, GetOptions, OpenRevResult,
    OpenRevs, PutResponse, RevsDiffResponse,
};
use crate::error::Result;

/// Storage backend behind one emulated database.
///
/// Every method maps onto one CouchDB endpoint; the HTTP layer only parses
/// requests and serializes what comes back.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// `GET /{db}`
    async fn info(&self) -> Result<DbInfo>;

    /// `GET /{db}/{docid}`
    async fn get(&self, id: &str, opts: GetOptions) -> Result<Document>;

    /// `GET /{db}/{docid}?open_revs=...`
    async fn open_revs(&self, id: &str, revs: OpenRevs, history: bool)
    -> Result<Vec<OpenRevResult>>;

    /// `POST /{db}/_bulk_docs`, and every single-document write.
    async fn bulk_docs(&self, docs: Vec<Document>, opts: BulkDocsOptions)
    -> Result<Vec<DocResult>>;

    /// `GET /{db}/_all_docs`
    async fn all_docs(&self, opts: AllDocsOptions) -> Result<AllDocsResponse>;

    /// `GET /{db}/_changes` (one batch; live feeds are built on top).
    async fn changes(&self, opts: ChangesOptions) -> Result<ChangesResponse>;

    /// `POST /{db}/_revs_diff`
    async fn revs_diff(&self, revs: HashMap<String, Vec<String>>) -> Result<RevsDiffResponse>;

    /// `POST /{db}/_bulk_get`
    async fn bulk_get(&self, docs: Vec<BulkGetItem>, history: bool) -> Result<BulkGetResponse>;

    /// `GET /{db}/_local/{id}`
    async fn get_local(&self, id: &str) -> Result<serde_json::Value>;

    /// `PUT /{db}/_local/{id}`
    async fn put_local(&self, id: &str, doc: serde_json::Value) -> Result<PutResponse>;

    /// `DELETE /{db}/_local/{id}`
    async fn remove_local(&self, id: &str, rev: &str) -> Result<PutResponse>;
}
