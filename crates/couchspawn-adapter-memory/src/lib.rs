//! In-memory storage adapter.
//!
//! Holds every document's revision tree and stored bodies in a single
//! `RwLock`-guarded state. Nothing is persisted: dropping the adapter drops
//! the database, which is all an ephemeral test server needs.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use couchspawn_core::adapter::Adapter;
use couchspawn_core::document::{
    AllDocsOptions, AllDocsResponse, AllDocsRow, AllDocsRowValue, BulkDocsOptions, BulkGetDoc,
    BulkGetError, BulkGetItem, BulkGetResponse, BulkGetResult, ChangeEvent, ChangeRev,
    ChangesOptions, ChangesResponse, ChangesStyle, DbInfo, DocMetadata, DocResult, Document,
    GetOptions, OpenRevResult, OpenRevs, PutResponse, RevHistory, Revision, RevsDiffResponse,
    RevsDiffResult, Seq,
};
use couchspawn_core::error::{CouchError, Result};
use couchspawn_core::merge::{
    DEFAULT_REV_LIMIT, MergeResult, collect_conflicts, is_deleted, merge_tree, winning_rev,
};
use couchspawn_core::rev_tree::{
    NodeOpts, RevPath, RevStatus, ancestry, build_path_from_revs, collect_leaves, is_leaf,
    rev_exists,
};

/// The body of one stored revision.
#[derive(Debug, Clone)]
struct StoredRev {
    data: serde_json::Value,
    deleted: bool,
}

#[derive(Debug, Clone)]
struct StoredDoc {
    meta: DocMetadata,
    bodies: HashMap<String, StoredRev>,
}

#[derive(Debug, Clone)]
struct LocalDoc {
    rev: u64,
    data: serde_json::Value,
}

#[derive(Debug, Default)]
struct Inner {
    docs: BTreeMap<String, StoredDoc>,
    /// Latest sequence of each document; older entries are removed on write.
    by_seq: BTreeMap<u64, String>,
    update_seq: u64,
    local: HashMap<String, LocalDoc>,
}

/// An in-memory database.
pub struct MemoryAdapter {
    name: String,
    inner: RwLock<Inner>,
}

impl MemoryAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: RwLock::new(Inner::default()),
        }
    }
}

fn check_doc_id(id: &str) -> Result<()> {
    if id.starts_with('_') && !id.starts_with("_design/") {
        return Err(CouchError::BadRequest(
            "Only reserved document ids may start with underscore.".into(),
        ));
    }
    Ok(())
}

impl Inner {
    fn live_count(&self) -> u64 {
        self.docs
            .values()
            .filter(|d| !is_deleted(&d.meta.rev_tree))
            .count() as u64
    }

    /// Apply a merged path. Returns `false` when nothing changed.
    fn apply(&mut self, id: &str, path: RevPath, rev: &Revision, body: StoredRev) -> bool {
        let stored = self.docs.entry(id.to_string()).or_insert_with(|| StoredDoc {
            meta: DocMetadata {
                id: id.to_string(),
                rev_tree: Vec::new(),
                seq: 0,
            },
            bodies: HashMap::new(),
        });

        let (tree, result) = merge_tree(&stored.meta.rev_tree, &path, DEFAULT_REV_LIMIT);
        let rev_key = rev.to_string();
        if result == MergeResult::InternalNode && stored.bodies.contains_key(&rev_key) {
            return false;
        }

        self.update_seq += 1;
        self.by_seq.remove(&stored.meta.seq);
        self.by_seq.insert(self.update_seq, id.to_string());

        stored.meta.rev_tree = tree;
        stored.meta.seq = self.update_seq;
        stored.bodies.insert(rev_key, body);
        true
    }

    fn write_new_edit(&mut self, mut doc: Document) -> Result<(String, Revision)> {
        if doc.id.is_empty() {
            doc.id = uuid::Uuid::new_v4().simple().to_string();
        }
        check_doc_id(&doc.id)?;

        let parent = match (self.docs.get(&doc.id), &doc.rev) {
            (None, None) => None,
            (None, Some(_)) if doc.deleted => return Err(CouchError::NotFound("missing".into())),
            (None, Some(_)) => return Err(CouchError::Conflict),
            (Some(stored), Some(rev)) => {
                if !is_leaf(&stored.meta.rev_tree, rev.pos, &rev.hash) {
                    return Err(CouchError::Conflict);
                }
                Some(rev.clone())
            }
            // Recreating a deleted document continues its tombstone branch.
            (Some(stored), None) if is_deleted(&stored.meta.rev_tree) => {
                winning_rev(&stored.meta.rev_tree)
            }
            (Some(_), None) => return Err(CouchError::Conflict),
        };

        let rev = Revision::next(parent.as_ref(), doc.deleted, &doc.data);
        let mut hashes = vec![rev.hash.clone()];
        hashes.extend(parent.map(|p| p.hash));
        let path = build_path_from_revs(
            rev.pos,
            &hashes,
            NodeOpts {
                deleted: doc.deleted,
            },
            RevStatus::Available,
        );

        self.apply(
            &doc.id,
            path,
            &rev,
            StoredRev {
                data: doc.data,
                deleted: doc.deleted,
            },
        );
        Ok((doc.id, rev))
    }

    fn write_replicated(&mut self, doc: Document) -> Result<(String, Revision)> {
        if doc.id.is_empty() {
            return Err(CouchError::MissingId);
        }
        check_doc_id(&doc.id)?;
        let rev = doc.rev.clone().ok_or_else(|| {
            CouchError::BadRequest("Document must have a _rev when new_edits is false".into())
        })?;

        let hashes = match doc.revisions {
            Some(history)
                if history.start == rev.pos && history.ids.first() == Some(&rev.hash) =>
            {
                history.ids
            }
            _ => vec![rev.hash.clone()],
        };
        let path = build_path_from_revs(
            rev.pos,
            &hashes,
            NodeOpts {
                deleted: doc.deleted,
            },
            RevStatus::Available,
        );

        self.apply(
            &doc.id,
            path,
            &rev,
            StoredRev {
                data: doc.data,
                deleted: doc.deleted,
            },
        );
        Ok((doc.id, rev))
    }

    /// Materialize `rev` of a stored document, if its body is available.
    fn render(&self, id: &str, rev: &Revision, history: bool) -> Option<Document> {
        let stored = self.docs.get(id)?;
        let body = stored.bodies.get(&rev.to_string())?;
        let revisions = history
            .then(|| ancestry(&stored.meta.rev_tree, rev.pos, &rev.hash))
            .flatten()
            .map(|ids| RevHistory {
                start: rev.pos,
                ids,
            });

        Some(Document {
            id: id.to_string(),
            rev: Some(rev.clone()),
            deleted: body.deleted,
            data: body.data.clone(),
            revisions,
        })
    }

    fn get(&self, id: &str, opts: &GetOptions) -> Result<Document> {
        let stored = self
            .docs
            .get(id)
            .ok_or_else(|| CouchError::NotFound("missing".into()))?;
        let tree = &stored.meta.rev_tree;

        let rev = match &opts.rev {
            Some(rev) => rev.parse::<Revision>()?,
            None => {
                if is_deleted(tree) {
                    return Err(CouchError::NotFound("deleted".into()));
                }
                winning_rev(tree).ok_or_else(|| CouchError::NotFound("missing".into()))?
            }
        };

        let mut doc = self
            .render(id, &rev, opts.revs)
            .ok_or_else(|| CouchError::NotFound("missing".into()))?;

        if opts.conflicts {
            let conflicts = collect_conflicts(tree);
            if let (false, Some(obj)) = (conflicts.is_empty(), doc.data.as_object_mut()) {
                obj.insert(
                    "_conflicts".into(),
                    conflicts.iter().map(|r| r.to_string()).collect(),
                );
            }
        }
        Ok(doc)
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn info(&self) -> Result<DbInfo> {
        let inner = self.inner.read().await;
        let doc_count = inner.live_count();
        Ok(DbInfo {
            db_name: self.name.clone(),
            doc_count,
            doc_del_count: inner.docs.len() as u64 - doc_count,
            update_seq: Seq::Num(inner.update_seq),
            instance_start_time: "0".into(),
        })
    }

    async fn get(&self, id: &str, opts: GetOptions) -> Result<Document> {
        self.inner.read().await.get(id, &opts)
    }

    async fn open_revs(
        &self,
        id: &str,
        revs: OpenRevs,
        history: bool,
    ) -> Result<Vec<OpenRevResult>> {
        let inner = self.inner.read().await;

        let wanted: Vec<String> = match revs {
            OpenRevs::All => {
                let stored = inner
                    .docs
                    .get(id)
                    .ok_or_else(|| CouchError::NotFound("missing".into()))?;
                collect_leaves(&stored.meta.rev_tree)
                    .into_iter()
                    .map(|l| Revision::new(l.pos, l.hash).to_string())
                    .collect()
            }
            OpenRevs::Specific(revs) => revs,
        };

        Ok(wanted
            .into_iter()
            .map(|rev_str| {
                rev_str
                    .parse::<Revision>()
                    .ok()
                    .and_then(|rev| inner.render(id, &rev, history))
                    .map(|doc| OpenRevResult::Ok(doc.to_json()))
                    .unwrap_or(OpenRevResult::Missing(rev_str))
            })
            .collect())
    }

    async fn bulk_docs(
        &self,
        docs: Vec<Document>,
        opts: BulkDocsOptions,
    ) -> Result<Vec<DocResult>> {
        let mut inner = self.inner.write().await;
        let mut results = Vec::with_capacity(docs.len());

        for doc in docs {
            let id = doc.id.clone();
            let written = if opts.new_edits {
                inner.write_new_edit(doc)
            } else {
                inner.write_replicated(doc)
            };
            results.push(match written {
                Ok((id, rev)) => DocResult::ok(id, &rev),
                Err(e) => DocResult::failed(id, &e),
            });
        }

        Ok(results)
    }

    async fn all_docs(&self, opts: AllDocsOptions) -> Result<AllDocsResponse> {
        let inner = self.inner.read().await;
        let total_rows = inner.live_count();

        let row_for = |id: &str, stored: &StoredDoc| -> Option<AllDocsRow> {
            let tree = &stored.meta.rev_tree;
            let rev = winning_rev(tree)?;
            let deleted = is_deleted(tree);
            let doc = match (opts.include_docs, deleted) {
                (true, false) => inner.render(id, &rev, false).map(|d| d.to_json()),
                (true, true) => Some(serde_json::Value::Null),
                (false, _) => None,
            };
            Some(AllDocsRow {
                id: Some(id.to_string()),
                key: id.to_string(),
                value: Some(AllDocsRowValue {
                    rev: rev.to_string(),
                    deleted: deleted.then_some(true),
                }),
                doc,
                error: None,
            })
        };

        let rows: Vec<AllDocsRow> = if let Some(keys) = &opts.keys {
            keys.iter()
                .map(|key| {
                    inner
                        .docs
                        .get(key)
                        .and_then(|stored| row_for(key.as_str(), stored))
                        .unwrap_or_else(|| AllDocsRow {
                            id: None,
                            key: key.clone(),
                            value: None,
                            doc: None,
                            error: Some("not_found".into()),
                        })
                })
                .collect()
        } else {
            let in_range = |id: &str| -> bool {
                if let Some(key) = &opts.key {
                    return id == key;
                }
                let (lower, upper) = if opts.descending {
                    (&opts.end_key, &opts.start_key)
                } else {
                    (&opts.start_key, &opts.end_key)
                };
                let inclusive_lower = !opts.descending || opts.inclusive_end;
                let inclusive_upper = opts.descending || opts.inclusive_end;

                let above = lower.as_deref().is_none_or(|lo| {
                    if inclusive_lower { id >= lo } else { id > lo }
                });
                let below = upper.as_deref().is_none_or(|hi| {
                    if inclusive_upper { id <= hi } else { id < hi }
                });
                above && below
            };

            let mut live: Vec<(&String, &StoredDoc)> = inner
                .docs
                .iter()
                .filter(|(id, d)| !is_deleted(&d.meta.rev_tree) && in_range(id.as_str()))
                .collect();
            if opts.descending {
                live.reverse();
            }

            live.into_iter()
                .skip(opts.skip as usize)
                .take(opts.limit.map_or(usize::MAX, |l| l as usize))
                .filter_map(|(id, stored)| row_for(id.as_str(), stored))
                .collect()
        };

        Ok(AllDocsResponse {
            total_rows,
            offset: opts.skip,
            rows,
        })
    }

    async fn changes(&self, opts: ChangesOptions) -> Result<ChangesResponse> {
        let inner = self.inner.read().await;
        let since = opts.since.as_num();

        let mut entries: Vec<(u64, &String)> = if opts.descending {
            inner.by_seq.iter().rev().map(|(s, id)| (*s, id)).collect()
        } else {
            inner
                .by_seq
                .range(since.saturating_add(1)..)
                .map(|(s, id)| (*s, id))
                .collect()
        };
        if let Some(doc_ids) = &opts.doc_ids {
            entries.retain(|(_, id)| doc_ids.contains(id));
        }

        let limit = opts.limit.map_or(usize::MAX, |l| l as usize);
        let pending = entries.len().saturating_sub(limit) as u64;
        let truncated = pending > 0;

        let results: Vec<ChangeEvent> = entries
            .into_iter()
            .take(limit)
            .filter_map(|(seq, id)| {
                let stored = inner.docs.get(id)?;
                let tree = &stored.meta.rev_tree;
                let winner = winning_rev(tree)?;
                let changes = match opts.style {
                    ChangesStyle::MainOnly => vec![ChangeRev {
                        rev: winner.to_string(),
                    }],
                    ChangesStyle::AllDocs => collect_leaves(tree)
                        .into_iter()
                        .map(|l| ChangeRev {
                            rev: Revision::new(l.pos, l.hash).to_string(),
                        })
                        .collect(),
                };
                let doc = opts
                    .include_docs
                    .then(|| inner.render(id, &winner, false))
                    .flatten()
                    .map(|d| d.to_json());

                Some(ChangeEvent {
                    seq: Seq::Num(seq),
                    id: id.clone(),
                    changes,
                    deleted: is_deleted(tree),
                    doc,
                })
            })
            .collect();

        let last_seq = if truncated || opts.descending {
            results.last().map_or(since, |e| e.seq.as_num())
        } else {
            inner.update_seq.max(since)
        };

        Ok(ChangesResponse {
            results,
            last_seq: Seq::Num(last_seq),
            pending,
        })
    }

    async fn revs_diff(&self, revs: HashMap<String, Vec<String>>) -> Result<RevsDiffResponse> {
        let inner = self.inner.read().await;
        let mut response = RevsDiffResponse::default();

        for (id, rev_strs) in revs {
            let tree = inner.docs.get(&id).map(|d| &d.meta.rev_tree);
            let missing: Vec<String> = rev_strs
                .into_iter()
                .filter(|rev_str| {
                    let known = rev_str.parse::<Revision>().ok().zip(tree).is_some_and(
                        |(rev, tree)| rev_exists(tree, rev.pos, &rev.hash),
                    );
                    !known
                })
                .collect();

            if missing.is_empty() {
                continue;
            }

            let max_missing = missing
                .iter()
                .filter_map(|r| r.parse::<Revision>().ok())
                .map(|r| r.pos)
                .max()
                .unwrap_or(0);
            let possible_ancestors: Vec<String> = tree
                .map(|tree| {
                    collect_leaves(tree)
                        .into_iter()
                        .filter(|l| l.pos < max_missing)
                        .map(|l| Revision::new(l.pos, l.hash).to_string())
                        .collect()
                })
                .unwrap_or_default();

            response.results.insert(
                id,
                RevsDiffResult {
                    missing,
                    possible_ancestors,
                },
            );
        }

        Ok(response)
    }

    async fn bulk_get(&self, docs: Vec<BulkGetItem>, history: bool) -> Result<BulkGetResponse> {
        let inner = self.inner.read().await;

        let results = docs
            .into_iter()
            .map(|item| {
                let opts = GetOptions {
                    rev: item.rev.clone(),
                    revs: history,
                    ..Default::default()
                };
                let entry = match inner.get(&item.id, &opts) {
                    Ok(doc) => BulkGetDoc {
                        ok: Some(doc.to_json()),
                        error: None,
                    },
                    Err(e) => BulkGetDoc {
                        ok: None,
                        error: Some(BulkGetError {
                            id: item.id.clone(),
                            rev: item.rev.clone().unwrap_or_default(),
                            error: "not_found".into(),
                            reason: match e {
                                CouchError::NotFound(reason) => reason,
                                other => other.to_string(),
                            },
                        }),
                    },
                };
                BulkGetResult {
                    id: item.id,
                    docs: vec![entry],
                }
            })
            .collect();

        Ok(BulkGetResponse { results })
    }

    async fn get_local(&self, id: &str) -> Result<serde_json::Value> {
        let inner = self.inner.read().await;
        let local = inner
            .local
            .get(id)
            .ok_or_else(|| CouchError::NotFound("missing".into()))?;

        let mut value = local.data.clone();
        if let Some(obj) = value.as_object_mut() {
            obj.insert("_id".into(), format!("_local/{id}").into());
            obj.insert("_rev".into(), format!("0-{}", local.rev).into());
        }
        Ok(value)
    }

    async fn put_local(&self, id: &str, mut doc: serde_json::Value) -> Result<PutResponse> {
        let obj = doc
            .as_object_mut()
            .ok_or_else(|| CouchError::BadRequest("Document must be a JSON object".into()))?;
        obj.remove("_id");
        let given_rev = obj
            .remove("_rev")
            .and_then(|v| v.as_str().map(String::from));

        let mut inner = self.inner.write().await;
        let next = match (inner.local.get(id), given_rev) {
            (Some(current), Some(rev)) if rev == format!("0-{}", current.rev) => current.rev + 1,
            (Some(_), _) => return Err(CouchError::Conflict),
            (None, _) => 1,
        };
        inner.local.insert(
            id.to_string(),
            LocalDoc {
                rev: next,
                data: doc,
            },
        );

        Ok(PutResponse {
            ok: true,
            id: format!("_local/{id}"),
            rev: format!("0-{next}"),
        })
    }

    async fn remove_local(&self, id: &str, rev: &str) -> Result<PutResponse> {
        let mut inner = self.inner.write().await;
        let current = inner
            .local
            .get(id)
            .ok_or_else(|| CouchError::NotFound("missing".into()))?;
        if rev != format!("0-{}", current.rev) {
            return Err(CouchError::Conflict);
        }
        inner.local.remove(id);

        Ok(PutResponse {
            ok: true,
            id: format!("_local/{id}"),
            rev: "0-0".into(),
        })
    }
}
