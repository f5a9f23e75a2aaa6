use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::error::{CouchError, Result};
use crate::rev_tree::RevTree;

/// `{pos}-{hash}`: `pos` counts edits from 1 and `hash` is a 32-character hex MD5 digest for revisions minted by the
///   emulator; replicated revisions keep whatever hash the source chose.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Revision {
    pub pos: u64,
    pub hash: String,
}

impl Revision {
    pub fn new(pos: u64, hash: String) -> Self {
        Self { pos, hash }
    }

    /// Mint the revision that follows `parent` for the given body.
    ///
    /// The digest covers the deleted flag, the parent revision, and the
    /// serialized body, so two writers producing the same edit on the same
    /// parent arrive at the same revision.
    pub fn next(parent: Option<&Revision>, deleted: bool, body: &serde_json::Value) -> Self {
        let mut hasher = Md5::new();
        hasher.update([u8::from(deleted)]);
        if let Some(parent) = parent {
            hasher.update(parent.to_string().as_bytes());
        }
        hasher.update(body.to_string().as_bytes());
        let hash = format!("{:x}", hasher.finalize());

        Revision {
            pos: parent.map_or(1, |p| p.pos + 1),
            hash,
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.pos, self.hash)
    }
}

impl FromStr for Revision {
    type Err = CouchError;

    fn from_str(s: &str) -> Result<Self> {
        let (pos_str, hash) = s
            .split_once('-')
            .ok_or_else(|| CouchError::InvalidRev(s.to_string()))?;
        let pos: u64 = pos_str
            .parse()
            .map_err(|_| CouchError::InvalidRev(s.to_string()))?;
        if hash.is_empty() {
            return Err(CouchError::InvalidRev(s.to_string()));
        }
        Ok(Revision {
            pos,
            hash: hash.to_string(),
        })
    }
}

impl Ord for Revision {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.pos, &self.hash).cmp(&(other.pos, &other.hash))
    }
}

impl PartialOrd for Revision {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// The `_revisions` field: a document's ancestry, newest hash first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevHistory {
    pub start: u64,
    pub ids: Vec<String>,
}

/// A document as stored: the typed underscore fields split off the body.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub rev: Option<Revision>,
    pub deleted: bool,
    pub data: serde_json::Value,
    /// Ancestry supplied by a replicator alongside `new_edits=false` writes.
    pub revisions: Option<RevHistory>,
}

impl Document {
    /// Split a request body into a document.
    ///
    /// Extracts `_id`, `_rev`, `_deleted`, and `_revisions` from the value and
    /// keeps the remaining fields (including `_attachments`) in `data`.
    pub fn from_json(mut value: serde_json::Value) -> Result<Self> {
        let obj = value
            .as_object_mut()
            .ok_or_else(|| CouchError::BadRequest("Document must be a JSON object".into()))?;

        let id = obj
            .remove("_id")
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();

        let rev = obj
            .remove("_rev")
            .and_then(|v| v.as_str().map(String::from))
            .map(|s| s.parse::<Revision>())
            .transpose()?;

        let deleted = obj
            .remove("_deleted")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let revisions = obj
            .remove("_revisions")
            .map(serde_json::from_value::<RevHistory>)
            .transpose()?;

        // Read-only fields a client may echo back from a previous GET.
        for field in ["_conflicts", "_revs_info", "_local_seq"] {
            obj.remove(field);
        }

        Ok(Document {
            id,
            rev,
            deleted,
            data: value,
            revisions,
        })
    }

    /// The body as CouchDB returns it, underscore fields included.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = match &self.data {
            serde_json::Value::Object(m) => m.clone(),
            _ => serde_json::Map::new(),
        };

        obj.insert("_id".into(), serde_json::Value::String(self.id.clone()));

        if let Some(rev) = &self.rev {
            obj.insert("_rev".into(), serde_json::Value::String(rev.to_string()));
        }

        if self.deleted {
            obj.insert("_deleted".into(), serde_json::Value::Bool(true));
        }

        if let Some(revisions) = &self.revisions {
            obj.insert(
                "_revisions".into(),
                serde_json::json!({ "start": revisions.start, "ids": revisions.ids }),
            );
        }

        serde_json::Value::Object(obj)
    }
}

/// Per-document bookkeeping kept next to the bodies.
#[derive(Debug, Clone)]
pub struct DocMetadata {
    pub id: String,
    pub rev_tree: RevTree,
    pub seq: u64,
}

#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// `?rev=`
    pub rev: Option<String>,
    /// `?conflicts=true`: add `_conflicts`.
    pub conflicts: bool,
    /// `?revs=true`: add `_revisions`.
    pub revs: bool,
}

#[derive(Debug, Clone)]
pub enum OpenRevs {
    All,
    Specific(Vec<String>),
}

/// One entry of an `open_revs` response: `{"ok": doc}` or `{"missing": rev}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenRevResult {
    Ok(serde_json::Value),
    Missing(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutResponse {
    pub ok: bool,
    pub id: String,
    pub rev: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocResult {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ok: bool,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl DocResult {
    pub fn ok(id: String, rev: &Revision) -> Self {
        Self {
            ok: true,
            id,
            rev: Some(rev.to_string()),
            error: None,
            reason: None,
        }
    }

    pub fn failed(id: String, error: &CouchError) -> Self {
        let (name, reason) = match error {
            CouchError::Conflict => ("conflict", "Document update conflict.".to_string()),
            CouchError::NotFound(r) => ("not_found", r.clone()),
            CouchError::Forbidden(r) => ("forbidden", r.clone()),
            other => ("bad_request", other.to_string()),
        };
        Self {
            ok: false,
            id,
            rev: None,
            error: Some(name.into()),
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BulkDocsOptions {
    /// `false` stores the supplied revisions verbatim (`new_edits=false`).
    pub new_edits: bool,
}

impl BulkDocsOptions {
    pub fn new() -> Self {
        Self { new_edits: true }
    }

    pub fn replication() -> Self {
        Self { new_edits: false }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AllDocsOptions {
    pub start_key: Option<String>,
    pub end_key: Option<String>,
    pub key: Option<String>,
    pub keys: Option<Vec<String>>,
    pub include_docs: bool,
    pub descending: bool,
    pub skip: u64,
    pub limit: Option<u64>,
    pub inclusive_end: bool,
}

impl AllDocsOptions {
    pub fn new() -> Self {
        Self {
            inclusive_end: true,
            ..Default::default()
        }
    }
}

/// A row of `_all_docs`. Rows requested through `keys` that do not exist
/// carry only `key` and `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllDocsRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<AllDocsRowValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllDocsRowValue {
    pub rev: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllDocsResponse {
    pub total_rows: u64,
    pub offset: u64,
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbInfo {
    pub db_name: String,
    pub doc_count: u64,
    pub doc_del_count: u64,
    pub update_seq: Seq,
    pub instance_start_time: String,
}

/// Which revisions a change row lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChangesStyle {
    /// Only the winning revision.
    #[default]
    MainOnly,
    /// Every leaf revision, including conflicts and deleted leaves.
    AllDocs,
}

#[derive(Debug, Clone, Default)]
pub struct ChangesOptions {
    pub since: Seq,
    pub limit: Option<u64>,
    pub descending: bool,
    pub include_docs: bool,
    pub style: ChangesStyle,
    pub doc_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub seq: Seq,
    pub id: String,
    pub changes: Vec<ChangeRev>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRev {
    pub rev: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangesResponse {
    pub results: Vec<ChangeEvent>,
    pub last_seq: Seq,
    pub pending: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkGetItem {
    pub id: String,
    #[serde(default)]
    pub rev: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkGetResponse {
    pub results: Vec<BulkGetResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkGetResult {
    pub id: String,
    pub docs: Vec<BulkGetDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkGetDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BulkGetError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkGetError {
    pub id: String,
    pub rev: String,
    pub error: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RevsDiffResponse {
    #[serde(flatten)]
    pub results: HashMap<String, RevsDiffResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevsDiffResult {
    pub missing: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub possible_ancestors: Vec<String>,
}

/// A `_changes` sequence.
///
/// The emulator hands out numeric sequences (0, 1, 2, ...), but clients that
/// were talking to CouchDB 3.x may pass back opaque strings like `"13-g1A..."`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Seq {
    Num(u64),
    Str(String),
}

impl Seq {
    /// Numeric value; for opaque strings, the number before the first `-`.
    pub fn as_num(&self) -> u64 {
        match self {
            Seq::Num(n) => *n,
            Seq::Str(s) => s
                .split('-')
                .next()
                .and_then(|n| n.parse().ok())
                .unwrap_or(0),
        }
    }

    /// Parse a `since` query value. `"now"` is resolved by the caller, so
    /// here it maps to zero like any other unparseable value.
    pub fn from_query(s: &str) -> Self {
        let trimmed = s.trim_matches('"');
        match trimmed.parse::<u64>() {
            Ok(n) => Seq::Num(n),
            Err(_) => Seq::Str(trimmed.to_string()),
        }
    }
}

impl Default for Seq {
    fn default() -> Self {
        Seq::Num(0)
    }
}

impl From<u64> for Seq {
    fn from(n: u64) -> Self {
        Seq::Num(n)
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seq::Num(n) => write!(f, "{n}"),
            Seq::Str(s) => f.write_str(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_display_and_parse() {
        let rev = Revision::new(3, "abc123".into());
        assert_eq!(rev.to_string(), "3-abc123");

        let parsed: Revision = "3-abc123".parse().unwrap();
        assert_eq!(parsed, rev);
    }

    #[test]
    fn revision_ordering() {
        let r1 = Revision::new(1, "aaa".into());
        let r2 = Revision::new(2, "aaa".into());
        let r3 = Revision::new(2, "bbb".into());
        assert!(r1 < r2);
        assert!(r2 < r3);
    }

    #[test]
    fn invalid_revision() {
        assert!("nope".parse::<Revision>().is_err());
        assert!("abc-123".parse::<Revision>().is_err());
        assert!("3-".parse::<Revision>().is_err());
    }

    #[test]
    fn next_revision_is_deterministic() {
        let body = serde_json::json!({"v": 1});
        let first = Revision::next(None, false, &body);
        assert_eq!(first.pos, 1);
        assert_eq!(first.hash.len(), 32);
        assert_eq!(first, Revision::next(None, false, &body));

        let second = Revision::next(Some(&first), false, &body);
        assert_eq!(second.pos, 2);
        assert_ne!(second.hash, first.hash);

        let tombstone = Revision::next(Some(&first), true, &body);
        assert_ne!(tombstone.hash, second.hash);
    }

    #[test]
    fn document_from_json_strips_underscore_fields() {
        let json = serde_json::json!({
            "_id": "doc1",
            "_rev": "2-bbb",
            "_revisions": {"start": 2, "ids": ["bbb", "aaa"]},
            "_conflicts": ["2-ccc"],
            "_attachments": {"a.txt": {"stub": true}},
            "name": "Alice"
        });

        let doc = Document::from_json(json).unwrap();
        assert_eq!(doc.id, "doc1");
        assert_eq!(doc.rev.as_ref().unwrap().to_string(), "2-bbb");
        assert_eq!(
            doc.revisions,
            Some(RevHistory {
                start: 2,
                ids: vec!["bbb".into(), "aaa".into()]
            })
        );

        let data = doc.data.as_object().unwrap();
        assert!(!data.contains_key("_id"));
        assert!(!data.contains_key("_conflicts"));
        assert!(data.contains_key("_attachments"));

        let back = doc.to_json();
        assert_eq!(back["_id"], "doc1");
        assert_eq!(back["_rev"], "2-bbb");
        assert_eq!(back["_revisions"]["ids"][1], "aaa");
        assert_eq!(back["name"], "Alice");
    }

    #[test]
    fn document_from_json_rejects_non_objects() {
        assert!(matches!(
            Document::from_json(serde_json::json!([1, 2])),
            Err(CouchError::BadRequest(_))
        ));
    }

    #[test]
    fn doc_result_serializes_like_couchdb() {
        let ok = DocResult::ok("a".into(), &Revision::new(1, "x".into()));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            serde_json::json!({"ok": true, "id": "a", "rev": "1-x"})
        );

        let failed = DocResult::failed("a".into(), &CouchError::Conflict);
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            serde_json::json!({"id": "a", "error": "conflict", "reason": "Document update conflict."})
        );
    }

    #[test]
    fn open_rev_result_shape() {
        let missing = OpenRevResult::Missing("1-x".into());
        assert_eq!(
            serde_json::to_value(&missing).unwrap(),
            serde_json::json!({"missing": "1-x"})
        );
    }

    #[test]
    fn seq_from_query() {
        assert_eq!(Seq::from_query("12"), Seq::Num(12));
        assert_eq!(Seq::from_query("\"7\""), Seq::Num(7));
        assert_eq!(Seq::from_query("13-g1AAA").as_num(), 13);
    }
}
