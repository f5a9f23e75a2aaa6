//! Document endpoints: single documents, bulk operations, `_all_docs`, the
//! replication helpers, and `_local` checkpoints.

use std::collections::HashMap;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use couchspawn_core::adapter::Adapter;
use couchspawn_core::document::{
    AllDocsOptions, BulkDocsOptions, BulkGetItem, Document, GetOptions, OpenRevs, PutResponse,
};
use couchspawn_core::error::CouchError;

use crate::error::{ApiError, ApiResult};
use crate::query::{self, Params};
use crate::state::{Database, ServerState};

const DESIGN_PREFIX: &str = "_design/";

/// Write one document and turn a per-document failure into an error response.
async fn write_one(db: &Database, doc: Document, opts: BulkDocsOptions) -> ApiResult<PutResponse> {
    let result = db
        .write(vec![doc], opts)
        .await?
        .pop()
        .ok_or_else(|| CouchError::DatabaseError("write produced no result".into()))?;

    if !result.ok {
        return Err(ApiError::from_doc_result(result));
    }
    Ok(PutResponse {
        ok: true,
        id: result.id,
        rev: result.rev.unwrap_or_default(),
    })
}

fn write_opts(params: &Params) -> BulkDocsOptions {
    if params.get("new_edits").is_some_and(|v| v == "false") {
        BulkDocsOptions::replication()
    } else {
        BulkDocsOptions::new()
    }
}

// ---------------------------------------------------------------------------
// Single documents
// ---------------------------------------------------------------------------

async fn read_doc(db: &Database, id: &str, params: &Params) -> ApiResult<Response> {
    let revs = query::flag(params, "revs");

    if let Some(raw) = params.get("open_revs") {
        let open_revs = if raw == "all" {
            OpenRevs::All
        } else {
            OpenRevs::Specific(serde_json::from_str(raw)?)
        };
        let results = db.adapter.open_revs(id, open_revs, revs).await?;
        return Ok(Json(results).into_response());
    }

    let opts = GetOptions {
        rev: params.get("rev").cloned(),
        conflicts: query::flag(params, "conflicts"),
        revs,
    };
    let doc = db.adapter.get(id, opts).await?;
    Ok(Json(doc.to_json()).into_response())
}

async fn store_doc(db: &Database, id: String, params: &Params, body: &[u8]) -> ApiResult<Response> {
    let mut doc = Document::from_json(query::body_json(body)?)?;
    doc.id = id;
    if doc.rev.is_none()
        && let Some(rev) = params.get("rev")
    {
        doc.rev = Some(rev.parse()?);
    }

    let response = write_one(db, doc, write_opts(params)).await?;
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

async fn remove_doc(db: &Database, id: String, params: &Params) -> ApiResult<Response> {
    let rev = params
        .get("rev")
        .ok_or(CouchError::Conflict)?
        .parse()?;
    let doc = Document {
        id,
        rev: Some(rev),
        deleted: true,
        data: serde_json::json!({}),
        revisions: None,
    };

    let response = write_one(db, doc, BulkDocsOptions::new()).await?;
    Ok(Json(response).into_response())
}

pub async fn get_doc(
    State(state): State<ServerState>,
    Path((db, id)): Path<(String, String)>,
    Query(params): Query<Params>,
) -> ApiResult<Response> {
    read_doc(&state.get(&db).await?, &id, &params).await
}

pub async fn put_doc(
    State(state): State<ServerState>,
    Path((db, id)): Path<(String, String)>,
    Query(params): Query<Params>,
    body: Bytes,
) -> ApiResult<Response> {
    store_doc(&state.get(&db).await?, id, &params, &body).await
}

pub async fn delete_doc(
    State(state): State<ServerState>,
    Path((db, id)): Path<(String, String)>,
    Query(params): Query<Params>,
) -> ApiResult<Response> {
    remove_doc(&state.get(&db).await?, id, &params).await
}

pub async fn get_design(
    State(state): State<ServerState>,
    Path((db, name)): Path<(String, String)>,
    Query(params): Query<Params>,
) -> ApiResult<Response> {
    let id = format!("{DESIGN_PREFIX}{name}");
    read_doc(&state.get(&db).await?, &id, &params).await
}

pub async fn put_design(
    State(state): State<ServerState>,
    Path((db, name)): Path<(String, String)>,
    Query(params): Query<Params>,
    body: Bytes,
) -> ApiResult<Response> {
    let id = format!("{DESIGN_PREFIX}{name}");
    store_doc(&state.get(&db).await?, id, &params, &body).await
}

pub async fn delete_design(
    State(state): State<ServerState>,
    Path((db, name)): Path<(String, String)>,
    Query(params): Query<Params>,
) -> ApiResult<Response> {
    let id = format!("{DESIGN_PREFIX}{name}");
    remove_doc(&state.get(&db).await?, id, &params).await
}

/// `POST /{db}`: create a document, generating an id when the body has none.
pub async fn post_doc(
    State(state): State<ServerState>,
    Path(db): Path<String>,
    body: Bytes,
) -> ApiResult<Response> {
    let database = state.get(&db).await?;
    let doc = Document::from_json(query::body_json(&body)?)?;
    let response = write_one(&database, doc, BulkDocsOptions::new()).await?;
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

// ---------------------------------------------------------------------------
// Bulk operations
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct BulkDocsRequest {
    docs: Vec<serde_json::Value>,
    #[serde(default = "default_true")]
    new_edits: bool,
}

fn default_true() -> bool {
    true
}

pub async fn bulk_docs(
    State(state): State<ServerState>,
    Path(db): Path<String>,
    body: Bytes,
) -> ApiResult<Response> {
    let database = state.get(&db).await?;
    let request: BulkDocsRequest = serde_json::from_slice(&body)?;
    let docs = request
        .docs
        .into_iter()
        .map(Document::from_json)
        .collect::<Result<Vec<_>, _>>()?;

    let opts = if request.new_edits {
        BulkDocsOptions::new()
    } else {
        BulkDocsOptions::replication()
    };
    let mut results = database.write(docs, opts).await?;

    // Replicated writes only report failures.
    if !request.new_edits {
        results.retain(|r| !r.ok);
    }
    Ok((StatusCode::CREATED, Json(results)).into_response())
}

#[derive(Deserialize)]
struct BulkGetRequest {
    docs: Vec<BulkGetItem>,
}

pub async fn bulk_get(
    State(state): State<ServerState>,
    Path(db): Path<String>,
    Query(params): Query<Params>,
    body: Bytes,
) -> ApiResult<Response> {
    let database = state.get(&db).await?;
    let request: BulkGetRequest = serde_json::from_slice(&body)?;
    let response = database
        .adapter
        .bulk_get(request.docs, query::flag(&params, "revs"))
        .await?;
    Ok(Json(response).into_response())
}

pub async fn revs_diff(
    State(state): State<ServerState>,
    Path(db): Path<String>,
    body: Bytes,
) -> ApiResult<Response> {
    let database = state.get(&db).await?;
    let request: HashMap<String, Vec<String>> = serde_json::from_slice(&body)?;
    let response = database.adapter.revs_diff(request).await?;
    Ok(Json(response).into_response())
}

// ---------------------------------------------------------------------------
// _all_docs
// ---------------------------------------------------------------------------

fn all_docs_options(params: &Params) -> ApiResult<AllDocsOptions> {
    Ok(AllDocsOptions {
        start_key: query::json_string(params, &["startkey", "start_key"]),
        end_key: query::json_string(params, &["endkey", "end_key"]),
        key: query::json_string(params, &["key"]),
        keys: query::json_list(params, "keys")?,
        include_docs: query::flag(params, "include_docs"),
        descending: query::flag(params, "descending"),
        skip: query::number(params, "skip")?.unwrap_or(0),
        limit: query::number(params, "limit")?,
        inclusive_end: params.get("inclusive_end").is_none_or(|v| v != "false"),
    })
}

pub async fn all_docs_get(
    State(state): State<ServerState>,
    Path(db): Path<String>,
    Query(params): Query<Params>,
) -> ApiResult<Response> {
    let database = state.get(&db).await?;
    let response = database.adapter.all_docs(all_docs_options(&params)?).await?;
    Ok(Json(response).into_response())
}

#[derive(Deserialize)]
struct AllDocsRequest {
    keys: Option<Vec<String>>,
}

pub async fn all_docs_post(
    State(state): State<ServerState>,
    Path(db): Path<String>,
    Query(params): Query<Params>,
    body: Bytes,
) -> ApiResult<Response> {
    let database = state.get(&db).await?;
    let request: AllDocsRequest = serde_json::from_value(query::body_json(&body)?)?;
    let mut opts = all_docs_options(&params)?;
    if request.keys.is_some() {
        opts.keys = request.keys;
    }
    let response = database.adapter.all_docs(opts).await?;
    Ok(Json(response).into_response())
}

// ---------------------------------------------------------------------------
// _local documents
// ---------------------------------------------------------------------------

pub async fn get_local(
    State(state): State<ServerState>,
    Path((db, id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let database = state.get(&db).await?;
    Ok(Json(database.adapter.get_local(&id).await?).into_response())
}

pub async fn put_local(
    State(state): State<ServerState>,
    Path((db, id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<Response> {
    let database = state.get(&db).await?;
    let response = database
        .adapter
        .put_local(&id, query::body_json(&body)?)
        .await?;
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

pub async fn delete_local(
    State(state): State<ServerState>,
    Path((db, id)): Path<(String, String)>,
    Query(params): Query<Params>,
) -> ApiResult<Response> {
    let database = state.get(&db).await?;
    let rev = params.get("rev").ok_or(CouchError::Conflict)?;
    Ok(Json(database.adapter.remove_local(&id, rev).await?).into_response())
}
